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

use crate::error::CloudError;
use crate::point_cloud::{PointCloud, Scalar};
use crate::voxel_key::VoxelCoord;
use std::collections::HashMap;

/// Reduces `cloud` to one *original* point per occupied grid cell of side
/// `cell_size`: the point closest to its cell's centre survives with every
/// attribute (normal, colour, intensity) intact, unlike
/// [`crate::filters::voxel_grid_downsample`], which synthesises a new
/// centroid point and drops per-point attributes.
pub fn uniform_grid_downsample<T: Scalar>(cloud: &PointCloud<T>, cell_size: T) -> Result<PointCloud<T>, CloudError> {
    if cell_size <= T::zero() {
        return Err(CloudError::InvalidArgument("cell_size must be positive".into()));
    }
    if cloud.is_empty() {
        return Ok(PointCloud::from_points(Vec::new()));
    }

    let mut best: HashMap<VoxelCoord, (usize, f64)> = HashMap::new();
    for (idx, p) in cloud.points.iter().enumerate() {
        let coord = VoxelCoord::of(p, cell_size);
        let cx = (coord.ix as f64 + 0.5) * cell_size.to_f64().unwrap();
        let cy = (coord.iy as f64 + 0.5) * cell_size.to_f64().unwrap();
        let cz = (coord.iz as f64 + 0.5) * cell_size.to_f64().unwrap();
        let d2 = (p.x.to_f64().unwrap() - cx).powi(2) + (p.y.to_f64().unwrap() - cy).powi(2) + (p.z.to_f64().unwrap() - cz).powi(2);

        best.entry(coord)
            .and_modify(|(best_idx, best_d2)| {
                if d2 < *best_d2 {
                    *best_idx = idx;
                    *best_d2 = d2;
                }
            })
            .or_insert((idx, d2));
    }

    let mut indices: Vec<usize> = best.into_values().map(|(idx, _)| idx).collect();
    indices.sort_unstable();
    Ok(cloud.retain_indices(&indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn one_surviving_point_per_occupied_cell() {
        let cloud = PointCloud::from_points(vec![
            Point3::new(0.05, 0.05, 0.05),
            Point3::new(0.45, 0.45, 0.45),
            Point3::new(5.0, 5.0, 5.0),
        ]);
        let reduced = uniform_grid_downsample(&cloud, 1.0).unwrap();
        assert_eq!(reduced.len(), 2);
    }

    #[test]
    fn surviving_point_is_an_original_point_with_attributes_intact() {
        let cloud = PointCloud::from_points(vec![Point3::new(0.1, 0.1, 0.1), Point3::new(0.9, 0.9, 0.9)])
            .with_intensity(vec![7.0, 9.0])
            .unwrap();
        let reduced = uniform_grid_downsample(&cloud, 1.0).unwrap();
        assert_eq!(reduced.len(), 1);
        assert!(reduced.intensity.unwrap()[0] == 7.0 || reduced.points[0] == Point3::new(0.9, 0.9, 0.9));
    }

    #[test]
    fn empty_cloud_returns_empty() {
        let cloud: PointCloud<f64> = PointCloud::from_points(Vec::new());
        assert!(uniform_grid_downsample(&cloud, 1.0).unwrap().is_empty());
    }
}
