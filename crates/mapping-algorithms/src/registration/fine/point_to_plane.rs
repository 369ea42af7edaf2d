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
use crate::metric::L2;
use crate::neighbor_search::build_index;
use crate::point_cloud::{PointCloud, Scalar};
use crate::registration::coarse::RegistrationAlgorithm;
use crate::registration::RigidTransform;
use nalgebra::{Isometry3, Matrix6, Point3, Translation3, UnitQuaternion, Vector6};

/// Configuration for [`PointToPlaneIcp`].
#[derive(Debug, Clone, Copy)]
pub struct PointToPlaneIcpConfiguration<T: Scalar> {
    /// Iteration budget.
    pub max_iterations: usize,
    /// Correspondences farther apart than this are dropped before solving.
    pub max_correspondence_distance: T,
    /// Minimum surviving correspondences to attempt a solve.
    pub min_correspondences: usize,
    /// Fraction of correspondences dropped by worst distance each iteration.
    pub outlier_rejection_ratio: T,
    /// Diagonal regularisation added to the 6x6 normal equations before
    /// solving, for conditioning near-degenerate geometry.
    pub regularization: T,
    /// Convergence threshold on the incremental transform.
    pub transformation_epsilon: T,
    /// Convergence threshold on consecutive mean-distance errors.
    pub euclidean_fitness_epsilon: T,
}

impl<T: Scalar> Default for PointToPlaneIcpConfiguration<T> {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_correspondence_distance: num_traits::cast(1.0).unwrap(),
            min_correspondences: 6,
            outlier_rejection_ratio: T::zero(),
            regularization: num_traits::cast(1e-8).unwrap(),
            transformation_epsilon: num_traits::cast(1e-6).unwrap(),
            euclidean_fitness_epsilon: num_traits::cast(1e-6).unwrap(),
        }
    }
}

/// Fluent builder for [`PointToPlaneIcpConfiguration`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PointToPlaneIcpConfigurationBuilder<T: Scalar> {
    config: PointToPlaneIcpConfiguration<T>,
}

impl<T: Scalar> PointToPlaneIcpConfigurationBuilder<T> {
    /// Starts from the default configuration.
    pub fn new() -> Self {
        Self { config: PointToPlaneIcpConfiguration::default() }
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

    /// Sets the normal-equations regularisation.
    pub fn with_regularization(mut self, regularization: T) -> Self {
        self.config.regularization = regularization;
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
    pub fn build(self) -> PointToPlaneIcpConfiguration<T> {
        self.config
    }
}

/// Point-to-plane ICP: minimises `sum((R*s + t - q) . n)^2` over the
/// `(omega, t)` Lie-algebra increment via Gauss-Newton.
/// Requires the target cloud to carry normals.
pub struct PointToPlaneIcp<T: Scalar> {
    config: PointToPlaneIcpConfiguration<T>,
}

impl<T: Scalar> PointToPlaneIcp<T> {
    /// Builds a point-to-plane ICP registrar from a configuration.
    pub fn new(config: PointToPlaneIcpConfiguration<T>) -> Self {
        Self { config }
    }

    /// Starts a builder seeded with the default configuration.
    pub fn builder() -> PointToPlaneIcpConfigurationBuilder<T> {
        PointToPlaneIcpConfigurationBuilder::new()
    }
}

impl<T: Scalar> RegistrationAlgorithm for PointToPlaneIcp<T> {
    fn name(&self) -> &'static str {
        "point_to_plane_icp"
    }
}

impl<T: Scalar> FineRegistration<T> for PointToPlaneIcp<T> {
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

    #[cfg_attr(feature = "tracing", tracing::instrument("Point-to-Plane ICP correspondences", skip_all, level = "trace"))]
    fn find_correspondences(&self, transformed: &[Point3<T>], target: &PointCloud<T>) -> (Vec<(usize, usize)>, Vec<T>) {
        if target.normals.is_none() {
            log::warn!("point-to-plane ICP requires target normals, none were attached");
            return (Vec::new(), Vec::new());
        }
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

    #[cfg_attr(feature = "tracing", tracing::instrument("Point-to-Plane ICP solve", skip_all, level = "trace"))]
    fn compute_transformation(&self, transformed: &[Point3<T>], target: &PointCloud<T>, pairs: &[(usize, usize)]) -> CloudResult<RigidTransform<T>> {
        let normals = target
            .normals
            .as_ref()
            .ok_or_else(|| CloudError::NotConfigured("point-to-plane ICP requires target normals".into()))?;

        let mut ata = Matrix6::<T>::zeros();
        let mut atb = Vector6::<T>::zeros();
        for &(i, j) in pairs {
            let p = transformed[i].coords;
            let q = target.points[j].coords;
            let n = normals[j];
            let cross = p.cross(&n);

            let mut row = Vector6::<T>::zeros();
            row[0] = cross.x;
            row[1] = cross.y;
            row[2] = cross.z;
            row[3] = n.x;
            row[4] = n.y;
            row[5] = n.z;

            let residual = (p - q).dot(&n);
            ata += row * row.transpose();
            atb += row * (-residual);
        }
        for k in 0..6 {
            ata[(k, k)] = ata[(k, k)] + self.config.regularization;
        }

        let solution = ata
            .lu()
            .solve(&atb)
            .ok_or_else(|| CloudError::NumericalFailure("singular normal equations in point-to-plane ICP".into()))?;

        let omega = nalgebra::Vector3::new(solution[0], solution[1], solution[2]);
        let translation = nalgebra::Vector3::new(solution[3], solution[4], solution[5]);
        let rotation = UnitQuaternion::from_scaled_axis(omega);
        Ok(Isometry3::from_parts(Translation3::from(translation), rotation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    /// Points spread over a unit sphere, normal = position, so the normal
    /// directions span all three axes and the point-to-plane Jacobian is
    /// full rank (a single flat plane would leave in-plane motion
    /// unconstrained).
    fn sphere_with_normals() -> PointCloud<f64> {
        let mut points = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                let theta = std::f64::consts::PI * (i as f64 + 0.5) / 10.0;
                let phi = 2.0 * std::f64::consts::PI * (j as f64) / 10.0;
                points.push(Point3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos()));
            }
        }
        let normals: Vec<Vector3<f64>> = points.iter().map(|p| p.coords.normalize()).collect();
        PointCloud::from_points(points).with_normals(normals).unwrap()
    }

    #[test]
    fn recovers_a_small_translation_on_a_curved_surface() {
        let target = sphere_with_normals();
        let translation = Vector3::new(0.02, -0.015, 0.01);
        let source = PointCloud::from_points(target.points.iter().map(|p| p - translation).collect());

        let icp = PointToPlaneIcp::new(PointToPlaneIcpConfiguration {
            max_iterations: 30,
            max_correspondence_distance: num_traits::cast(2.0).unwrap(),
            ..Default::default()
        });
        let result = icp.align(&source, &target, RigidTransform::identity(), false);
        assert!(result.success);
        assert!((result.transform.translation.vector - translation).norm() < 1e-2);
    }

    #[test]
    fn missing_target_normals_fails_cleanly() {
        let target = PointCloud::from_points(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)]);
        let source = target.clone();
        let icp = PointToPlaneIcp::new(PointToPlaneIcpConfiguration::default());
        let result = icp.align(&source, &target, RigidTransform::identity(), false);
        assert!(!result.success);
        assert_eq!(result.termination_reason, crate::registration::TerminationReason::TooFewCorrespondences);
    }
}
