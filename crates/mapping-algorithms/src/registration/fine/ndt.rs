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

use super::FineRegistration;
use crate::error::{CloudError, CloudResult};
use crate::point_cloud::{PointCloud, Scalar};
use crate::registration::coarse::RegistrationAlgorithm;
use crate::registration::RigidTransform;
use crate::voxel_key::{VoxelCoord, VoxelIndexer};
use nalgebra::{Isometry3, Matrix3, Matrix6, Point3, Translation3, UnitQuaternion, Vector3, Vector6};
use std::collections::HashMap;

struct VoxelDistribution {
    mean: Vector3<f64>,
    inverse_covariance: Matrix3<f64>,
}

struct NdtVoxelGrid {
    indexer: VoxelIndexer,
    cell_size: f64,
    distributions: HashMap<u64, VoxelDistribution>,
}

/// Buckets `points` into `cell_size` voxels and fits a mean/inverse
/// covariance to every voxel holding at least `min_points` points; voxels
/// with fewer than that are marked invalid. Voxels with a singular
/// covariance (fewer than 4 distinct
/// points, a degenerate planar/linear cluster) are dropped rather than
/// inverted.
fn build_voxel_grid<T: Scalar>(points: &[Point3<T>], cell_size: f64, min_points: usize) -> NdtVoxelGrid {
    let pts64: Vec<Vector3<f64>> = points.iter().map(|p| Vector3::new(p.x.to_f64().unwrap(), p.y.to_f64().unwrap(), p.z.to_f64().unwrap())).collect();
    let coords: Vec<VoxelCoord> = pts64.iter().map(|p| VoxelCoord::of(&Point3::from(*p), cell_size)).collect();
    let indexer = VoxelIndexer::covering(&coords);

    let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();
    for (i, &coord) in coords.iter().enumerate() {
        buckets.entry(indexer.key(coord).0).or_default().push(i);
    }

    let mut distributions = HashMap::new();
    for (key, members) in buckets {
        if members.len() < min_points {
            continue;
        }
        let n = members.len() as f64;
        let mean = members.iter().fold(Vector3::zeros(), |acc, &i| acc + pts64[i]) / n;
        let mut cov = Matrix3::<f64>::zeros();
        for &i in &members {
            let d = pts64[i] - mean;
            cov += d * d.transpose();
        }
        cov /= n;
        if let Some(inverse_covariance) = cov.try_inverse() {
            distributions.insert(key, VoxelDistribution { mean, inverse_covariance });
        }
    }

    NdtVoxelGrid { indexer, cell_size, distributions }
}

impl NdtVoxelGrid {
    fn lookup(&self, point: &Vector3<f64>) -> Option<(u64, &VoxelDistribution)> {
        let coord = VoxelCoord::of(&Point3::from(*point), self.cell_size);
        let key = self.indexer.key(coord).0;
        self.distributions.get(&key).map(|d| (key, d))
    }
}

/// Configuration for [`Ndt`].
#[derive(Debug, Clone, Copy)]
pub struct NdtConfiguration<T: Scalar> {
    /// Outer iteration budget.
    pub max_iterations: usize,
    /// Target voxel grid resolution.
    pub voxel_size: T,
    /// Minimum points a voxel needs to contribute a valid distribution.
    pub min_points_per_voxel: usize,
    /// Assumed fraction of source points that are outliers; feeds into the
    /// Gaussian mixture weight `c1`.
    pub outlier_ratio: T,
    /// Newton steps per outer iteration.
    pub newton_iterations: usize,
    /// Backtracking halvings tried per Newton step before giving up and
    /// keeping the previous iterate (a simplified stand-in for the
    /// safeguarded cubic-interpolation More-Thuente search; see [`Ndt`]'s
    /// doc comment).
    pub line_search_steps: usize,
    /// Minimum surviving correspondences to attempt a solve.
    pub min_correspondences: usize,
    /// Convergence threshold on the incremental transform.
    pub transformation_epsilon: T,
    /// Convergence threshold on consecutive mean-distance errors.
    pub euclidean_fitness_epsilon: T,
}

impl<T: Scalar> Default for NdtConfiguration<T> {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            voxel_size: num_traits::cast(1.0).unwrap(),
            min_points_per_voxel: 4,
            outlier_ratio: num_traits::cast(0.05).unwrap(),
            newton_iterations: 3,
            line_search_steps: 8,
            min_correspondences: 6,
            transformation_epsilon: num_traits::cast(1e-6).unwrap(),
            euclidean_fitness_epsilon: num_traits::cast(1e-6).unwrap(),
        }
    }
}

/// Fluent builder for [`NdtConfiguration`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NdtConfigurationBuilder<T: Scalar> {
    config: NdtConfiguration<T>,
}

impl<T: Scalar> NdtConfigurationBuilder<T> {
    /// Starts from the default configuration.
    pub fn new() -> Self {
        Self { config: NdtConfiguration::default() }
    }

    /// Sets the outer iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Sets the voxel grid resolution.
    pub fn with_voxel_size(mut self, voxel_size: T) -> Self {
        self.config.voxel_size = voxel_size;
        self
    }

    /// Sets the minimum points per valid voxel.
    pub fn with_min_points_per_voxel(mut self, min_points_per_voxel: usize) -> Self {
        self.config.min_points_per_voxel = min_points_per_voxel;
        self
    }

    /// Sets the assumed outlier ratio.
    pub fn with_outlier_ratio(mut self, outlier_ratio: T) -> Self {
        self.config.outlier_ratio = outlier_ratio;
        self
    }

    /// Sets the Newton steps per outer iteration.
    pub fn with_newton_iterations(mut self, newton_iterations: usize) -> Self {
        self.config.newton_iterations = newton_iterations;
        self
    }

    /// Sets the line search backtracking cap.
    pub fn with_line_search_steps(mut self, line_search_steps: usize) -> Self {
        self.config.line_search_steps = line_search_steps;
        self
    }

    /// Sets the minimum correspondence count.
    pub fn with_min_correspondences(mut self, min_correspondences: usize) -> Self {
        self.config.min_correspondences = min_correspondences;
        self
    }

    /// Sets the transform convergence threshold.
    pub fn with_transformation_epsilon(mut self, epsilon: T) -> Self {
        self.config.transformation_epsilon = epsilon;
        self
    }

    /// Sets the error convergence threshold.
    pub fn with_euclidean_fitness_epsilon(mut self, epsilon: T) -> Self {
        self.config.euclidean_fitness_epsilon = epsilon;
        self
    }

    /// Finishes the configuration.
    pub fn build(self) -> NdtConfiguration<T> {
        self.config
    }
}

fn gaussian_score(d: &Vector3<f64>, inverse_covariance: &Matrix3<f64>, c1: f64, c2: f64) -> f64 {
    let mahalanobis = (d.transpose() * inverse_covariance * d)[(0, 0)];
    c1 * (-c2 / 2.0 * mahalanobis).exp()
}

/// Normal Distributions Transform: the target is voxelised into Gaussian
/// distributions once per solve, and the transform is refined by Newton
/// steps maximising the sum of per-point Gaussian scores.
pub struct Ndt<T: Scalar> {
    config: NdtConfiguration<T>,
}

impl<T: Scalar> Ndt<T> {
    /// Builds an NDT registrar from a configuration.
    pub fn new(config: NdtConfiguration<T>) -> Self {
        Self { config }
    }

    /// Starts a builder seeded with the default configuration.
    pub fn builder() -> NdtConfigurationBuilder<T> {
        NdtConfigurationBuilder::new()
    }
}

impl<T: Scalar> RegistrationAlgorithm for Ndt<T> {
    fn name(&self) -> &'static str {
        "ndt"
    }
}

impl<T: Scalar> FineRegistration<T> for Ndt<T> {
    fn max_iterations(&self) -> usize {
        self.config.max_iterations
    }

    fn min_correspondences(&self) -> usize {
        self.config.min_correspondences
    }

    fn outlier_rejection_ratio(&self) -> T {
        T::zero()
    }

    fn transformation_epsilon(&self) -> T {
        self.config.transformation_epsilon
    }

    fn euclidean_fitness_epsilon(&self) -> T {
        self.config.euclidean_fitness_epsilon
    }

    #[cfg_attr(feature = "tracing", tracing::instrument("NDT voxelisation", skip_all, level = "debug"))]
    fn find_correspondences(&self, transformed: &[Point3<T>], target: &PointCloud<T>) -> (Vec<(usize, usize)>, Vec<T>) {
        let cell_size = self.config.voxel_size.to_f64().unwrap();
        let grid = build_voxel_grid(&target.points, cell_size, self.config.min_points_per_voxel);

        let mut pairs = Vec::new();
        let mut distances = Vec::new();
        for (i, p) in transformed.iter().enumerate() {
            let p64 = Vector3::new(p.x.to_f64().unwrap(), p.y.to_f64().unwrap(), p.z.to_f64().unwrap());
            if let Some((key, voxel)) = grid.lookup(&p64) {
                let distance = (p64 - voxel.mean).norm();
                pairs.push((i, key as usize));
                distances.push(num_traits::cast(distance).unwrap());
            }
        }
        (pairs, distances)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument("NDT Newton solve", skip_all, level = "debug"))]
    fn compute_transformation(&self, transformed: &[Point3<T>], target: &PointCloud<T>, pairs: &[(usize, usize)]) -> CloudResult<RigidTransform<T>> {
        let cell_size = self.config.voxel_size.to_f64().unwrap();
        let grid = build_voxel_grid(&target.points, cell_size, self.config.min_points_per_voxel);
        if grid.distributions.is_empty() {
            return Err(CloudError::NumericalFailure("no valid NDT voxels in target".into()));
        }

        let c1 = (1.0 - self.config.outlier_ratio.to_f64().unwrap()).max(1e-3);
        let c2 = 1.0 / (cell_size * cell_size).max(1e-12);

        let total_score = |candidate: &RigidTransform<T>| -> f64 {
            pairs
                .iter()
                .filter_map(|&(i, voxel_key)| {
                    let voxel = grid.distributions.get(&(voxel_key as u64))?;
                    let p = candidate.transform_point(&transformed[i]).coords;
                    let p64 = Vector3::new(p.x.to_f64().unwrap(), p.y.to_f64().unwrap(), p.z.to_f64().unwrap());
                    Some(gaussian_score(&(p64 - voxel.mean), &voxel.inverse_covariance, c1, c2))
                })
                .sum()
        };

        let mut accumulated = RigidTransform::<T>::identity();
        for _ in 0..self.config.newton_iterations.max(1) {
            let mut gradient = Vector6::<f64>::zeros();
            let mut hessian = Matrix6::<f64>::zeros();

            for &(i, voxel_key) in pairs {
                let Some(voxel) = grid.distributions.get(&(voxel_key as u64)) else { continue };
                let p = accumulated.transform_point(&transformed[i]).coords;
                let p64 = Vector3::new(p.x.to_f64().unwrap(), p.y.to_f64().unwrap(), p.z.to_f64().unwrap());
                let d = p64 - voxel.mean;
                let score = gaussian_score(&d, &voxel.inverse_covariance, c1, c2);

                let skew = Matrix3::new(0.0, -p64.z, p64.y, p64.z, 0.0, -p64.x, -p64.y, p64.x, 0.0);
                let mut jacobian = nalgebra::Matrix3x6::<f64>::zeros();
                jacobian.fixed_view_mut::<3, 3>(0, 0).copy_from(&(-skew));
                jacobian.fixed_view_mut::<3, 3>(0, 3).copy_from(&Matrix3::identity());

                let weighted = voxel.inverse_covariance * d;
                gradient += jacobian.transpose() * weighted * (score * c2);
                hessian += jacobian.transpose() * voxel.inverse_covariance * jacobian * (score * c2);
            }
            for k in 0..6 {
                hessian[(k, k)] += 1e-6;
            }
            let Some(direction) = hessian.lu().solve(&(-gradient)) else {
                return Err(CloudError::NumericalFailure("singular NDT Hessian".into()));
            };

            let score_before = total_score(&accumulated);
            let mut step_scale = 1.0;
            let mut accepted = accumulated;
            for _ in 0..self.config.line_search_steps.max(1) {
                let scaled = direction * step_scale;
                let omega: Vector3<T> = Vector3::new(num_traits::cast(scaled[0]).unwrap(), num_traits::cast(scaled[1]).unwrap(), num_traits::cast(scaled[2]).unwrap());
                let trans: Vector3<T> = Vector3::new(num_traits::cast(scaled[3]).unwrap(), num_traits::cast(scaled[4]).unwrap(), num_traits::cast(scaled[5]).unwrap());
                let step = Isometry3::from_parts(Translation3::from(trans), UnitQuaternion::from_scaled_axis(omega));
                let candidate = step * accumulated;
                if total_score(&candidate) >= score_before {
                    accepted = candidate;
                    break;
                }
                step_scale *= 0.5;
            }
            accumulated = accepted;
        }
        Ok(accumulated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_plane() -> PointCloud<f64> {
        let points: Vec<Point3<f64>> = (0..10).flat_map(|x| (0..10).map(move |y| Point3::new(x as f64 * 0.3, y as f64 * 0.3, 0.0))).collect();
        PointCloud::from_points(points)
    }

    #[test]
    fn identity_clouds_converge() {
        let cloud = dense_plane();
        let ndt = Ndt::new(NdtConfiguration {
            voxel_size: num_traits::cast(0.6).unwrap(),
            max_iterations: 15,
            ..Default::default()
        });
        let result = ndt.align(&cloud, &cloud, RigidTransform::identity(), false);
        assert!(result.success);
        assert!(result.transform.translation.vector.norm() < 0.05);
    }

    #[test]
    fn recovers_a_small_in_plane_translation() {
        let target = dense_plane();
        let translation = Vector3::new(0.05, 0.03, 0.0);
        let source = PointCloud::from_points(target.points.iter().map(|p| p - translation).collect());

        let ndt = Ndt::new(NdtConfiguration {
            voxel_size: num_traits::cast(0.6).unwrap(),
            max_iterations: 20,
            ..Default::default()
        });
        let result = ndt.align(&source, &target, RigidTransform::identity(), false);
        assert!(result.success);
        assert!((result.transform.translation.vector - translation).norm() < 0.1);
    }

    #[test]
    fn sparse_target_reports_too_few_correspondences() {
        let target = PointCloud::from_points(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(5.0, 5.0, 5.0)]);
        let source = target.clone();
        let ndt = Ndt::new(NdtConfiguration::default());
        let result = ndt.align(&source, &target, RigidTransform::identity(), false);
        assert!(!result.success);
    }
}
