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
use nalgebra::Point3;
use std::collections::HashMap;

/// Reduces `cloud` to one point per occupied voxel of side `cell_size`, each
/// output point the centroid of every input point the voxel contains.
///
/// Output point order is not guaranteed to match input order. A non-positive
/// `cell_size` is a programming error.
#[cfg_attr(feature = "tracing", tracing::instrument("Voxel Grid Downsample", skip_all, level = "debug"))]
pub fn voxel_grid_downsample<T: Scalar>(cloud: &PointCloud<T>, cell_size: T) -> Result<PointCloud<T>, CloudError> {
    if cell_size <= T::zero() {
        return Err(CloudError::InvalidArgument(format!("cell_size must be positive, got {cell_size:?}", cell_size = cell_size.to_f64())));
    }
    if cloud.is_empty() {
        return Ok(PointCloud::from_points(Vec::new()));
    }

    let mut voxels: HashMap<VoxelCoord, (Point3<f64>, usize)> = HashMap::new();
    for p in &cloud.points {
        let coord = VoxelCoord::of(p, cell_size);
        let entry = voxels.entry(coord).or_insert((Point3::origin(), 0));
        entry.0.x += p.x.to_f64().unwrap();
        entry.0.y += p.y.to_f64().unwrap();
        entry.0.z += p.z.to_f64().unwrap();
        entry.1 += 1;
    }

    let mut points: Vec<Point3<T>> = voxels
        .into_values()
        .map(|(sum, count)| {
            let n = count as f64;
            Point3::new(
                num_traits::cast(sum.x / n).unwrap(),
                num_traits::cast(sum.y / n).unwrap(),
                num_traits::cast(sum.z / n).unwrap(),
            )
        })
        .collect();
    points.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap().then(a.y.partial_cmp(&b.y).unwrap()).then(a.z.partial_cmp(&b.z).unwrap()));

    Ok(PointCloud::from_points(points))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_points_reduce_to_two_voxel_centroids() {
        let cloud = PointCloud::from_points(vec![
            Point3::new(0.1, 0.1, 0.1),
            Point3::new(0.9, 0.9, 0.9),
            Point3::new(1.1, 1.1, 1.1),
            Point3::new(1.9, 1.9, 1.9),
        ]);
        let reduced = voxel_grid_downsample(&cloud, 1.0).unwrap();
        assert_eq!(reduced.len(), 2);
        let expect_a = Point3::new(0.5, 0.5, 0.5);
        let expect_b = Point3::new(1.5, 1.5, 1.5);
        assert!(reduced.points.iter().any(|p| (p - expect_a).norm() < 1e-6));
        assert!(reduced.points.iter().any(|p| (p - expect_b).norm() < 1e-6));
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let cloud = PointCloud::from_points(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.2, 0.2, 0.2), Point3::new(3.0, 3.0, 3.0)]);
        let once = voxel_grid_downsample(&cloud, 1.0).unwrap();
        let twice = voxel_grid_downsample(&once, 1.0).unwrap();
        assert_eq!(once.len(), twice.len());
        let mut once_sorted = once.points.clone();
        let mut twice_sorted = twice.points.clone();
        once_sorted.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap());
        twice_sorted.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap());
        for (a, b) in once_sorted.iter().zip(twice_sorted.iter()) {
            assert!((a - b).norm() < 1e-9);
        }
    }

    #[test]
    fn empty_cloud_returns_empty_cloud() {
        let cloud: PointCloud<f64> = PointCloud::from_points(Vec::new());
        let reduced = voxel_grid_downsample(&cloud, 1.0).unwrap();
        assert!(reduced.is_empty());
    }

    #[test]
    fn rejects_non_positive_cell_size() {
        let cloud = PointCloud::from_points(vec![Point3::new(0.0, 0.0, 0.0)]);
        assert!(voxel_grid_downsample(&cloud, 0.0).is_err());
    }
}
