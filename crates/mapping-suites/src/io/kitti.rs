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

//! KITTI Velodyne `.bin` point clouds: a packed little-endian array of
//! `(x, y, z, intensity)` float32 tuples, 16 bytes per point, no header.
//! Extension (`.bin`) is the only content check; a file whose length isn't
//! a multiple of 16 is rejected outright.

use crate::error::{SuiteError, SuiteResult};
use byteorder::{LittleEndian, WriteBytesExt};
use mapping_algorithms::point_cloud::{PointCloud, Scalar};
use memmap2::Mmap;
use nalgebra::Point3;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

const RECORD_SIZE: usize = 16;

/// Whether `path`'s extension names it as a KITTI `.bin` file; KITTI has no
/// magic number, so this is the only content check the format affords.
pub fn can_read(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()).map(|ext| ext.eq_ignore_ascii_case("bin")).unwrap_or(false)
}

/// Reads a KITTI `.bin` file by memory-mapping it and viewing the mapped
/// bytes as a packed `f32` array; no data is copied until the per-point
/// cast into `T`.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(path = %path.as_ref().display())))]
pub fn read_kitti_bin<T: Scalar>(path: impl AsRef<Path>) -> SuiteResult<PointCloud<T>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    // SAFETY: the file is not concurrently truncated or written by another
    // process for the duration of this mapping; the crate takes the same
    // risk every mmap-backed reader does and does not attempt to detect it.
    let mmap = unsafe { Mmap::map(&file)? };

    if mmap.len() % RECORD_SIZE != 0 {
        return Err(SuiteError::Parse(format!(
            "KITTI .bin file size {} is not a multiple of {RECORD_SIZE}",
            mmap.len()
        )));
    }

    let count = mmap.len() / RECORD_SIZE;
    let mut points = Vec::with_capacity(count);
    let mut intensity = Vec::with_capacity(count);
    for chunk in mmap.chunks_exact(RECORD_SIZE) {
        let x = f32::from_le_bytes(chunk[0..4].try_into().unwrap());
        let y = f32::from_le_bytes(chunk[4..8].try_into().unwrap());
        let z = f32::from_le_bytes(chunk[8..12].try_into().unwrap());
        let i = f32::from_le_bytes(chunk[12..16].try_into().unwrap());
        points.push(Point3::new(num_traits::cast(x).unwrap(), num_traits::cast(y).unwrap(), num_traits::cast(z).unwrap()));
        intensity.push(num_traits::cast(i).unwrap());
    }

    log::debug!("read {count} points from {}", path.display());
    Ok(PointCloud::from_points(points).with_intensity(intensity)?)
}

/// Writes `cloud` in KITTI `.bin` layout; points with no attached intensity
/// are written with `0.0` in that slot.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(path = %path.as_ref().display())))]
pub fn write_kitti_bin<T: Scalar>(path: impl AsRef<Path>, cloud: &PointCloud<T>) -> SuiteResult<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    for (i, p) in cloud.points.iter().enumerate() {
        let intensity = cloud.intensity.as_ref().map(|values| values[i]).unwrap_or(T::zero());
        writer.write_f32::<LittleEndian>(num_traits::cast(p.x).unwrap())?;
        writer.write_f32::<LittleEndian>(num_traits::cast(p.y).unwrap())?;
        writer.write_f32::<LittleEndian>(num_traits::cast(p.z).unwrap())?;
        writer.write_f32::<LittleEndian>(num_traits::cast(intensity).unwrap())?;
    }

    log::debug!("wrote {} points to {}", cloud.points.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("mapping_suites_kitti_test_{}_{name}", std::process::id()))
    }

    #[test]
    fn rejects_a_truncated_record() {
        let path = temp_path("truncated.bin");
        std::fs::File::create(&path).unwrap().write_all(&[0u8; 17]).unwrap();
        let result = read_kitti_bin::<f32>(&path);
        assert!(result.is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn round_trips_through_write_and_read() {
        let path = temp_path("roundtrip.bin");
        let cloud = PointCloud::from_points(vec![Point3::new(1.0_f32, 2.0, 3.0), Point3::new(-1.0, 0.5, 9.0)])
            .with_intensity(vec![0.25_f32, 0.75])
            .unwrap();
        write_kitti_bin(&path, &cloud).unwrap();
        let read_back = read_kitti_bin::<f32>(&path).unwrap();
        assert_eq!(read_back.points, cloud.points);
        assert_eq!(read_back.intensity, cloud.intensity);
        let _ = std::fs::remove_file(&path);
    }
}
