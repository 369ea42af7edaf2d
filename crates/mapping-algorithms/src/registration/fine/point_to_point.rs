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
use crate::error::CloudResult;
use crate::metric::L2;
use crate::neighbor_search::build_index;
use crate::point_cloud::{PointCloud, Scalar};
use crate::registration::coarse::RegistrationAlgorithm;
use crate::registration::{umeyama_alignment, RigidTransform};
use nalgebra::Point3;

/// Configuration for [`PointToPointIcp`].
#[derive(Debug, Clone, Copy)]
pub struct PointToPointIcpConfiguration<T: Scalar> {
    /// Iteration budget.
    pub max_iterations: usize,
    /// Correspondences farther apart than this are dropped before solving.
    pub max_correspondence_distance: T,
    /// Minimum surviving correspondences to attempt a solve.
    pub min_correspondences: usize,
    /// Fraction of correspondences dropped by worst distance each iteration.
    pub outlier_rejection_ratio: T,
    /// Convergence threshold on the incremental transform.
    pub transformation_epsilon: T,
    /// Convergence threshold on consecutive mean-distance errors.
    pub euclidean_fitness_epsilon: T,
}

impl<T: Scalar> Default for PointToPointIcpConfiguration<T> {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_correspondence_distance: num_traits::cast(1.0).unwrap(),
            min_correspondences: 3,
            outlier_rejection_ratio: T::zero(),
            transformation_epsilon: num_traits::cast(1e-6).unwrap(),
            euclidean_fitness_epsilon: num_traits::cast(1e-6).unwrap(),
        }
    }
}

/// Fluent builder for [`PointToPointIcpConfiguration`], mirroring the
/// teacher's `ICPConfigurationBuilder`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointToPointIcpConfigurationBuilder<T: Scalar> {
    config: PointToPointIcpConfiguration<T>,
}

impl<T: Scalar> PointToPointIcpConfigurationBuilder<T> {
    /// Starts from the default configuration.
    pub fn new() -> Self {
        Self { config: PointToPointIcpConfiguration::default() }
    }

    /// Sets the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Sets the correspondence distance cutoff.
    pub fn with_max_correspondence_distance(mut self, distance: T) -> Self {
        self.config.max_correspondence_distance = distance;
        self
    }

    /// Sets the minimum correspondence count.
    pub fn with_min_correspondences(mut self, min_correspondences: usize) -> Self {
        self.config.min_correspondences = min_correspondences;
        self
    }

    /// Sets the per-iteration outlier rejection fraction.
    pub fn with_outlier_rejection_ratio(mut self, ratio: T) -> Self {
        self.config.outlier_rejection_ratio = ratio;
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
    pub fn build(self) -> PointToPointIcpConfiguration<T> {
        self.config
    }
}

/// Point-to-point ICP: nearest target point via KD-tree, solved by
/// [`umeyama_alignment`] on the matched pairs.
pub struct PointToPointIcp<T: Scalar> {
    config: PointToPointIcpConfiguration<T>,
}

impl<T: Scalar> PointToPointIcp<T> {
    /// Builds a point-to-point ICP registrar from a configuration.
    pub fn new(config: PointToPointIcpConfiguration<T>) -> Self {
        Self { config }
    }

    /// Starts a builder seeded with the default configuration.
    pub fn builder() -> PointToPointIcpConfigurationBuilder<T> {
        PointToPointIcpConfigurationBuilder::new()
    }
}

impl<T: Scalar> RegistrationAlgorithm for PointToPointIcp<T> {
    fn name(&self) -> &'static str {
        "point_to_point_icp"
    }
}

impl<T: Scalar> FineRegistration<T> for PointToPointIcp<T> {
    fn max_iterations(&self) -> usize {
        self.config.max_iterations
    }

    fn min_correspondences(&self) -> usize {
        self.config.min_correspondences
    }

    fn outlier_rejection_ratio(&self) -> T {
        self.config.outlier_rejection_ratio
    }

    fn transformation_epsilon(&self) -> T {
        self.config.transformation_epsilon
    }

    fn euclidean_fitness_epsilon(&self) -> T {
        self.config.euclidean_fitness_epsilon
    }

    #[cfg_attr(feature = "tracing", tracing::instrument("Point-to-Point ICP correspondences", skip_all, level = "trace"))]
    fn find_correspondences(&self, transformed: &[Point3<T>], target: &PointCloud<T>) -> (Vec<(usize, usize)>, Vec<T>) {
        let index = build_index(&target.points, L2);
        let mut pairs = Vec::new();
        let mut distances = Vec::new();
        for (i, p) in transformed.iter().enumerate() {
            if let Some(&(j, d)) = index.k_nearest(p, 1).first() {
                if d <= self.config.max_correspondence_distance {
                    pairs.push((i, j));
                    distances.push(d);
                }
            }
        }
        (pairs, distances)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument("Point-to-Point ICP solve", skip_all, level = "trace"))]
    fn compute_transformation(&self, transformed: &[Point3<T>], target: &PointCloud<T>, pairs: &[(usize, usize)]) -> CloudResult<RigidTransform<T>> {
        let source: Vec<Point3<T>> = pairs.iter().map(|&(i, _)| transformed[i]).collect();
        let dest: Vec<Point3<T>> = pairs.iter().map(|&(_, j)| target.points[j]).collect();
        umeyama_alignment(&source, &dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn five_point_cloud() -> PointCloud<f64> {
        PointCloud::from_points(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ])
    }

    #[test]
    fn identity_clouds_converge_in_one_iteration() {
        let cloud = five_point_cloud();
        let icp = PointToPointIcp::new(PointToPointIcpConfiguration {
            max_iterations: 10,
            max_correspondence_distance: num_traits::cast(1.0).unwrap(),
            ..Default::default()
        });
        let result = icp.align(&cloud, &cloud, RigidTransform::identity(), false);
        assert!(result.success);
        assert!(result.iterations <= 1);
        assert!(result.fitness_score < 1e-6);
        assert_eq!(result.inliers.len(), 5);
    }

    #[test]
    fn pure_translation_is_recovered_within_twenty_iterations() {
        let source = five_point_cloud();
        let translation = Vector3::new(0.1, 0.2, 0.3);
        let target = PointCloud::from_points(source.points.iter().map(|p| p + translation).collect());

        let icp = PointToPointIcp::new(PointToPointIcpConfiguration {
            max_iterations: 20,
            max_correspondence_distance: num_traits::cast(1.0).unwrap(),
            ..Default::default()
        });
        let result = icp.align(&source, &target, RigidTransform::identity(), false);
        assert!(result.success);
        assert!(result.iterations <= 20);
        assert!((result.transform.translation.vector - translation).norm() < 1e-3);
        assert!(crate::registration::rotation_deviation_from_identity(&result.transform) < 1e-3);
    }

    #[test]
    fn too_few_points_reports_too_few_correspondences() {
        let source = PointCloud::from_points(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)]);
        let target = source.clone();
        let icp = PointToPointIcp::new(PointToPointIcpConfiguration::default());
        let result = icp.align(&source, &target, RigidTransform::identity(), false);
        assert!(!result.success);
        assert_eq!(result.termination_reason, crate::registration::TerminationReason::TooFewCorrespondences);
    }
}
