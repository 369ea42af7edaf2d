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
use nalgebra::{Point3, Vector3};

/// The floating-point precision every algorithm in this crate is generic
/// over; blanket-implemented for [`f32`] and [`f64`], matching the two
/// precisions the original point-cloud toolbox supported.
pub trait Scalar: nalgebra::RealField + Copy + num_traits::Float + num_traits::NumCast + Default {}
impl<T> Scalar for T where T: nalgebra::RealField + Copy + num_traits::Float + num_traits::NumCast + Default {}

/// An ordered collection of 3D points, with optional per-point normals,
/// colours and intensity.
///
/// All present arrays are parallel: index `i` names the same physical point
/// in `points`, `normals`, `colors` and `intensity`. Clouds never mutate
/// their own points except through [`PointCloud::retain_indices`] and the
/// dedicated filters in [`crate::filters`]; every other algorithm takes a
/// cloud by shared reference.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud<T: Scalar> {
    /// The points themselves, in insertion order.
    pub points: Vec<Point3<T>>,
    /// Per-point unit surface normals, if known.
    pub normals: Option<Vec<Vector3<T>>>,
    /// Per-point RGB colour, if known.
    pub colors: Option<Vec<[u8; 3]>>,
    /// Per-point scalar intensity (e.g. LiDAR return strength), if known.
    pub intensity: Option<Vec<T>>,
}

impl<T: Scalar> PointCloud<T> {
    /// Builds a cloud from bare points, with no normals, colours or intensity.
    pub fn from_points(points: Vec<Point3<T>>) -> Self {
        Self {
            points,
            normals: None,
            colors: None,
            intensity: None,
        }
    }

    /// Number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the cloud holds zero points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Attaches per-point normals, checking the length invariant.
    pub fn with_normals(mut self, normals: Vec<Vector3<T>>) -> Result<Self, CloudError> {
        if normals.len() != self.points.len() {
            return Err(CloudError::InvalidArgument(format!(
                "normals length {} does not match point count {}",
                normals.len(),
                self.points.len()
            )));
        }
        self.normals = Some(normals);
        Ok(self)
    }

    /// Attaches per-point colours, checking the length invariant.
    pub fn with_colors(mut self, colors: Vec<[u8; 3]>) -> Result<Self, CloudError> {
        if colors.len() != self.points.len() {
            return Err(CloudError::InvalidArgument(format!(
                "colors length {} does not match point count {}",
                colors.len(),
                self.points.len()
            )));
        }
        self.colors = Some(colors);
        Ok(self)
    }

    /// Attaches per-point intensity values, checking the length invariant.
    pub fn with_intensity(mut self, intensity: Vec<T>) -> Result<Self, CloudError> {
        if intensity.len() != self.points.len() {
            return Err(CloudError::InvalidArgument(format!(
                "intensity length {} does not match point count {}",
                intensity.len(),
                self.points.len()
            )));
        }
        self.intensity = Some(intensity);
        Ok(self)
    }

    /// Returns a new cloud containing only the points (and parallel arrays)
    /// named by `indices`, in the order given.
    pub fn retain_indices(&self, indices: &[usize]) -> Self {
        Self {
            points: indices.iter().map(|&i| self.points[i]).collect(),
            normals: self
                .normals
                .as_ref()
                .map(|normals| indices.iter().map(|&i| normals[i]).collect()),
            colors: self
                .colors
                .as_ref()
                .map(|colors| indices.iter().map(|&i| colors[i]).collect()),
            intensity: self
                .intensity
                .as_ref()
                .map(|intensity| indices.iter().map(|&i| intensity[i]).collect()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use nalgebra::Point3;
    use rand::{Rng, SeedableRng};

    /// Generates a deterministic, reproducible random point cloud, used
    /// throughout this crate's test suites so that fixtures are comparable
    /// across modules.
    pub(crate) fn generate_point_cloud(num_points: usize, extent: f32) -> PointCloud<f32> {
        let mut rng = rand::rngs::SmallRng::seed_from_u64(3765665954583626552);
        let points = (0..num_points)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-extent..=extent),
                    rng.gen_range(-extent..=extent),
                    rng.gen_range(-extent..=extent),
                )
            })
            .collect();
        PointCloud::from_points(points)
    }

    #[test]
    fn length_invariants_are_enforced() {
        let cloud = PointCloud::from_points(vec![Point3::new(0.0, 0.0, 0.0)]);
        assert!(cloud
            .with_normals(vec![Vector3::new(0.0, 0.0, 1.0), Vector3::new(0.0, 0.0, 1.0)])
            .is_err());
    }

    #[test]
    fn retain_indices_keeps_parallel_arrays_aligned() {
        let cloud = PointCloud::from_points(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ])
        .with_intensity(vec![1.0, 2.0, 3.0])
        .unwrap();

        let sub = cloud.retain_indices(&[2, 0]);
        assert_eq!(sub.points, vec![Point3::new(2.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0)]);
        assert_eq!(sub.intensity.unwrap(), vec![3.0, 1.0]);
    }
}
