// SPDX-License-Identifier: MIT
/*
 * Copyright (c) [2023 - Present] Emily Matheys <emilymatt96@gmail.com>
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! PCD (Point Cloud Data) files: an ASCII key/value header followed by an
//! ASCII or binary data section. Only the subset
//! this core needs is supported: `x y z`, optional `normal_x normal_y
//! normal_z`, optional `rgb`, `ascii` or little-endian `binary` data.

use crate::error::{SuiteError, SuiteResult};
use mapping_algorithms::point_cloud::{PointCloud, Scalar};
use nalgebra::{Point3, Vector3};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

#[derive(Debug, Default)]
struct Header {
    fields: Vec<String>,
    sizes: Vec<usize>,
    types: Vec<char>,
    counts: Vec<usize>,
    points: usize,
    binary: bool,
}

/// Whether `path`'s extension names it as a PCD file, the only content
/// check this format affords.
pub fn can_read(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()).map(|ext| ext.eq_ignore_ascii_case("pcd")).unwrap_or(false)
}

fn parse_header(reader: &mut BufReader<File>) -> SuiteResult<Header> {
    let mut header = Header::default();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(SuiteError::Parse("PCD file ended before DATA line".into()));
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let key = parts.next().unwrap_or_default().to_ascii_uppercase();
        match key.as_str() {
            "VERSION" | "WIDTH" | "HEIGHT" | "VIEWPOINT" => {}
            "FIELDS" => header.fields = parts.map(str::to_owned).collect(),
            "SIZE" => header.sizes = parts.map(|p| p.parse().unwrap_or(4)).collect(),
            "TYPE" => header.types = parts.map(|p| p.chars().next().unwrap_or('F')).collect(),
            "COUNT" => header.counts = parts.map(|p| p.parse().unwrap_or(1)).collect(),
            "POINTS" => {
                header.points = parts
                    .next()
                    .and_then(|p| p.parse().ok())
                    .ok_or_else(|| SuiteError::Parse("malformed POINTS line".into()))?;
            }
            "DATA" => {
                let mode = parts.next().unwrap_or_default();
                header.binary = match mode {
                    "ascii" => false,
                    "binary" => true,
                    other => return Err(SuiteError::Parse(format!("unsupported PCD DATA mode '{other}'"))),
                };
                if header.counts.is_empty() {
                    header.counts = vec![1; header.fields.len()];
                }
                return Ok(header);
            }
            _ => {}
        }
    }
}

fn field_offset(header: &Header, name: &str) -> Option<(usize, usize, char)> {
    let mut offset = 0usize;
    for ((field, &size), &ty) in header.fields.iter().zip(header.sizes.iter()).zip(header.types.iter()) {
        if field.eq_ignore_ascii_case(name) {
            return Some((offset, size, ty));
        }
        offset += size;
    }
    None
}

fn record_size(header: &Header) -> usize {
    header.sizes.iter().zip(header.counts.iter()).map(|(&s, &c)| s * c).sum()
}

fn read_scalar(bytes: &[u8], size: usize, ty: char) -> f64 {
    match (ty, size) {
        ('F', 4) => f32::from_le_bytes(bytes[..4].try_into().unwrap()) as f64,
        ('F', 8) => f64::from_le_bytes(bytes[..8].try_into().unwrap()),
        ('U', 4) => u32::from_le_bytes(bytes[..4].try_into().unwrap()) as f64,
        ('U', 1) => bytes[0] as f64,
        ('I', 4) => i32::from_le_bytes(bytes[..4].try_into().unwrap()) as f64,
        _ => 0.0,
    }
}

/// Reads a PCD file. Supports `x y z`, optional `normal_x/y/z`, optional
/// packed `rgb`, ASCII or little-endian binary data.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(path = %path.as_ref().display())))]
pub fn read_pcd<T: Scalar>(path: impl AsRef<Path>) -> SuiteResult<PointCloud<T>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let header = parse_header(&mut reader)?;

    let xyz = [
        field_offset(&header, "x").ok_or_else(|| SuiteError::Parse("PCD file has no x field".into()))?,
        field_offset(&header, "y").ok_or_else(|| SuiteError::Parse("PCD file has no y field".into()))?,
        field_offset(&header, "z").ok_or_else(|| SuiteError::Parse("PCD file has no z field".into()))?,
    ];
    let normal_fields = [field_offset(&header, "normal_x"), field_offset(&header, "normal_y"), field_offset(&header, "normal_z")];
    let has_normals = normal_fields.iter().all(Option::is_some);
    let rgb_field = field_offset(&header, "rgb");

    let mut points = Vec::with_capacity(header.points);
    let mut normals = Vec::with_capacity(header.points);
    let mut colors = Vec::with_capacity(header.points);

    if header.binary {
        let record_len = record_size(&header);
        let mut record = vec![0u8; record_len];
        for _ in 0..header.points {
            reader.read_exact(&mut record)?;
            let x = read_scalar(&record[xyz[0].0..], xyz[0].1, xyz[0].2);
            let y = read_scalar(&record[xyz[1].0..], xyz[1].1, xyz[1].2);
            let z = read_scalar(&record[xyz[2].0..], xyz[2].1, xyz[2].2);
            points.push(Point3::new(num_traits::cast(x).unwrap(), num_traits::cast(y).unwrap(), num_traits::cast(z).unwrap()));

            if has_normals {
                let (nx_off, nx_sz, nx_ty) = normal_fields[0].unwrap();
                let (ny_off, ny_sz, ny_ty) = normal_fields[1].unwrap();
                let (nz_off, nz_sz, nz_ty) = normal_fields[2].unwrap();
                normals.push(Vector3::new(
                    num_traits::cast(read_scalar(&record[nx_off..], nx_sz, nx_ty)).unwrap(),
                    num_traits::cast(read_scalar(&record[ny_off..], ny_sz, ny_ty)).unwrap(),
                    num_traits::cast(read_scalar(&record[nz_off..], nz_sz, nz_ty)).unwrap(),
                ));
            }
            if let Some((off, sz, ty)) = rgb_field {
                let packed = read_scalar(&record[off..], sz, ty) as u32;
                colors.push([(packed >> 16) as u8, (packed >> 8) as u8, packed as u8]);
            }
        }
    } else {
        for _ in 0..header.points {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                return Err(SuiteError::Parse("PCD ascii data ended early".into()));
            }
            let values: Vec<f64> = line.split_whitespace().map(|v| v.parse().unwrap_or(0.0)).collect();
            let field_index_of = |byte_offset: usize| -> usize {
                let mut offset = 0usize;
                for (i, (&size, &count)) in header.sizes.iter().zip(header.counts.iter()).enumerate() {
                    if offset == byte_offset {
                        return i;
                    }
                    offset += size * count;
                }
                0
            };
            let get = |offset: usize| values.get(field_index_of(offset)).copied().unwrap_or(0.0);

            points.push(Point3::new(num_traits::cast(get(xyz[0].0)).unwrap(), num_traits::cast(get(xyz[1].0)).unwrap(), num_traits::cast(get(xyz[2].0)).unwrap()));
            if has_normals {
                normals.push(Vector3::new(
                    num_traits::cast(get(normal_fields[0].unwrap().0)).unwrap(),
                    num_traits::cast(get(normal_fields[1].unwrap().0)).unwrap(),
                    num_traits::cast(get(normal_fields[2].unwrap().0)).unwrap(),
                ));
            }
            if let Some((off, _, _)) = rgb_field {
                let packed = get(off) as u32;
                colors.push([(packed >> 16) as u8, (packed >> 8) as u8, packed as u8]);
            }
        }
    }

    let mut cloud = PointCloud::from_points(points);
    if has_normals {
        cloud = cloud.with_normals(normals)?;
    }
    if rgb_field.is_some() {
        cloud = cloud.with_colors(colors)?;
    }
    log::debug!("read {} points from {}", cloud.len(), path.display());
    Ok(cloud)
}

/// Writes `cloud` as an ASCII PCD file: `x y z`, plus `normal_x/y/z` and
/// packed `rgb` columns when present.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(path = %path.as_ref().display())))]
pub fn write_pcd_ascii<T: Scalar>(path: impl AsRef<Path>, cloud: &PointCloud<T>) -> SuiteResult<()> {
    let path = path.as_ref();
    let mut fields = vec!["x", "y", "z"];
    let mut sizes = vec!["4", "4", "4"];
    let mut types = vec!["F", "F", "F"];
    let mut counts = vec!["1", "1", "1"];
    if cloud.normals.is_some() {
        fields.extend(["normal_x", "normal_y", "normal_z"]);
        sizes.extend(["4", "4", "4"]);
        types.extend(["F", "F", "F"]);
        counts.extend(["1", "1", "1"]);
    }
    if cloud.colors.is_some() {
        fields.push("rgb");
        sizes.push("4");
        types.push("U");
        counts.push("1");
    }

    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(writer, "VERSION 0.7")?;
    writeln!(writer, "FIELDS {}", fields.join(" "))?;
    writeln!(writer, "SIZE {}", sizes.join(" "))?;
    writeln!(writer, "TYPE {}", types.join(" "))?;
    writeln!(writer, "COUNT {}", counts.join(" "))?;
    writeln!(writer, "WIDTH {}", cloud.len())?;
    writeln!(writer, "HEIGHT 1")?;
    writeln!(writer, "VIEWPOINT 0 0 0 1 0 0 0")?;
    writeln!(writer, "POINTS {}", cloud.len())?;
    writeln!(writer, "DATA ascii")?;

    for i in 0..cloud.len() {
        let p = cloud.points[i];
        write!(writer, "{} {} {}", p.x.to_f64().unwrap(), p.y.to_f64().unwrap(), p.z.to_f64().unwrap())?;
        if let Some(normals) = &cloud.normals {
            let n = normals[i];
            write!(writer, " {} {} {}", n.x.to_f64().unwrap(), n.y.to_f64().unwrap(), n.z.to_f64().unwrap())?;
        }
        if let Some(colors) = &cloud.colors {
            let [r, g, b] = colors[i];
            let packed = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
            write!(writer, " {packed}")?;
        }
        writeln!(writer)?;
    }

    log::debug!("wrote {} points to {}", cloud.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("mapping_suites_pcd_test_{}_{name}", std::process::id()))
    }

    #[test]
    fn round_trips_xyz_normals_and_colors_through_ascii() {
        let path = temp_path("roundtrip.pcd");
        let cloud = PointCloud::from_points(vec![Point3::new(1.0_f32, 2.0, 3.0), Point3::new(-1.0, 0.5, 9.0)])
            .with_normals(vec![Vector3::new(0.0, 0.0, 1.0), Vector3::new(1.0, 0.0, 0.0)])
            .unwrap()
            .with_colors(vec![[255, 0, 0], [0, 255, 0]])
            .unwrap();
        write_pcd_ascii(&path, &cloud).unwrap();
        let read_back = read_pcd::<f32>(&path).unwrap();
        assert_eq!(read_back.len(), 2);
        for i in 0..2 {
            assert!((read_back.points[i] - cloud.points[i]).norm() < 1e-5);
        }
        assert_eq!(read_back.colors.unwrap(), vec![[255, 0, 0], [0, 255, 0]]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rejects_an_unsupported_data_mode() {
        let path = temp_path("bad_mode.pcd");
        std::fs::write(
            &path,
            "VERSION 0.7\nFIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nCOUNT 1 1 1\nWIDTH 0\nHEIGHT 1\nPOINTS 0\nDATA weird\n",
        )
        .unwrap();
        assert!(read_pcd::<f32>(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }
}
