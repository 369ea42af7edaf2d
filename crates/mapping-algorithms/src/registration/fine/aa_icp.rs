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
use crate::error::CloudError;
use crate::point_cloud::{PointCloud, Scalar};
use crate::registration::coarse::RegistrationAlgorithm;
use crate::registration::{rotation_deviation_from_identity, IterationRecord, RegistrationResult, RigidTransform, TerminationReason};
use nalgebra::{DMatrix, DVector, Isometry3, Matrix3, SVector, Translation3, UnitQuaternion};
use std::collections::VecDeque;

/// Flattens a rigid transform into a 12-vector (row-major rotation matrix,
/// then translation), the vector space Anderson mixing operates in.
fn to_vec12<T: Scalar>(t: &RigidTransform<T>) -> SVector<f64, 12> {
    let r = t.rotation.to_rotation_matrix();
    let m = r.matrix();
    let tr = t.translation.vector;
    SVector::<f64, 12>::from_row_slice(&[
        m[(0, 0)].to_f64().unwrap(),
        m[(0, 1)].to_f64().unwrap(),
        m[(0, 2)].to_f64().unwrap(),
        m[(1, 0)].to_f64().unwrap(),
        m[(1, 1)].to_f64().unwrap(),
        m[(1, 2)].to_f64().unwrap(),
        m[(2, 0)].to_f64().unwrap(),
        m[(2, 1)].to_f64().unwrap(),
        m[(2, 2)].to_f64().unwrap(),
        tr.x.to_f64().unwrap(),
        tr.y.to_f64().unwrap(),
        tr.z.to_f64().unwrap(),
    ])
}

/// Reconstructs a rigid transform from a mixed 12-vector. The rotation
/// block is, in general, no longer orthonormal after linear mixing, so it
/// is projected back onto `SO(3)` via the same SVD trick
/// [`crate::registration::umeyama_alignment`] uses to build a rotation
/// matrix from a correlation matrix.
fn from_vec12<T: Scalar>(v: &SVector<f64, 12>) -> RigidTransform<T> {
    let m = Matrix3::new(v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7], v[8]);
    let svd = m.svd(true, true);
    let rotation_matrix = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => {
            let v = v_t.transpose();
            let det = (v * u.transpose()).determinant();
            let d = Matrix3::from_diagonal(&nalgebra::Vector3::new(1.0, 1.0, if det < 0.0 { -1.0 } else { 1.0 }));
            v * d * u.transpose()
        }
        _ => Matrix3::identity(),
    };
    let rotation: UnitQuaternion<T> = UnitQuaternion::from_matrix(&rotation_matrix.map(|x| num_traits::cast(x).unwrap()));
    let translation = nalgebra::Vector3::new(num_traits::cast::<f64, T>(v[9]).unwrap(), num_traits::cast::<f64, T>(v[10]).unwrap(), num_traits::cast::<f64, T>(v[11]).unwrap());
    Isometry3::from_parts(Translation3::from(translation), rotation)
}

/// Configuration for [`AaIcp`].
#[derive(Debug, Clone, Copy)]
pub struct AaIcpConfiguration<T: Scalar> {
    /// Iteration budget.
    pub max_iterations: usize,
    /// Number of past iterates kept for mixing (`m`).
    pub history_length: usize,
    /// Damping factor blending the mixed `G(x)` average against the mixed
    /// `x` average; `1.0` is unmixed acceleration, `0.0` disables it.
    pub beta: T,
    /// Tikhonov regularisation added to the mixing normal equations.
    pub tikhonov_lambda: T,
    /// Convergence threshold on the incremental transform.
    pub transformation_epsilon: T,
    /// Convergence threshold on consecutive mean-distance errors.
    pub euclidean_fitness_epsilon: T,
}

impl<T: Scalar> Default for AaIcpConfiguration<T> {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            history_length: 4,
            beta: num_traits::cast(1.0).unwrap(),
            tikhonov_lambda: num_traits::cast(1e-8).unwrap(),
            transformation_epsilon: num_traits::cast(1e-6).unwrap(),
            euclidean_fitness_epsilon: num_traits::cast(1e-6).unwrap(),
        }
    }
}

/// Fluent builder for [`AaIcpConfiguration`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AaIcpConfigurationBuilder<T: Scalar> {
    config: AaIcpConfiguration<T>,
}

impl<T: Scalar> AaIcpConfigurationBuilder<T> {
    /// Starts from the default configuration.
    pub fn new() -> Self {
        Self { config: AaIcpConfiguration::default() }
    }

    /// Sets the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Sets the mixing history length.
    pub fn with_history_length(mut self, history_length: usize) -> Self {
        self.config.history_length = history_length;
        self
    }

    /// Sets the damping factor.
    pub fn with_beta(mut self, beta: T) -> Self {
        self.config.beta = beta;
        self
    }

    /// Sets the Tikhonov regularisation.
    pub fn with_tikhonov_lambda(mut self, lambda: T) -> Self {
        self.config.tikhonov_lambda = lambda;
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
    pub fn build(self) -> AaIcpConfiguration<T> {
        self.config
    }
}

/// Anderson-accelerated ICP: wraps any [`FineRegistration`] method's single
/// iteration (`G`) and extrapolates from a short history of iterates and
/// residuals to speed convergence. Does not implement [`FineRegistration`]
/// itself, since it accelerates an existing fixed-point map rather than
/// defining a new `find_correspondences`/`compute_transformation` pair.
pub struct AaIcp<T: Scalar, Inner: FineRegistration<T>> {
    config: AaIcpConfiguration<T>,
    inner: Inner,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Scalar, Inner: FineRegistration<T>> AaIcp<T, Inner> {
    /// Wraps `inner` with Anderson acceleration under `config`.
    pub fn new(inner: Inner, config: AaIcpConfiguration<T>) -> Self {
        Self { config, inner, _marker: std::marker::PhantomData }
    }
}

impl<T: Scalar, Inner: FineRegistration<T>> RegistrationAlgorithm for AaIcp<T, Inner> {
    fn name(&self) -> &'static str {
        "aa_icp"
    }
}

impl<T: Scalar, Inner: FineRegistration<T>> AaIcp<T, Inner> {
    /// Runs the accelerated loop, mirroring [`FineRegistration::align`]'s
    /// shape but replacing the plain `step` with Anderson-mixed iterates.
    #[cfg_attr(feature = "tracing", tracing::instrument("AA-ICP", skip_all, level = "debug"))]
    pub fn align(&self, source: &PointCloud<T>, target: &PointCloud<T>, initial_guess: RigidTransform<T>, record_history: bool) -> RegistrationResult<T> {
        let mut current = initial_guess;
        let mut prev_error: Option<T> = None;
        let mut history = if record_history { Some(Vec::new()) } else { None };
        let mut last_inliers: Vec<usize> = Vec::new();
        let mut last_error = T::zero();
        let mut mixing_history: VecDeque<(SVector<f64, 12>, SVector<f64, 12>, SVector<f64, 12>)> = VecDeque::new();

        for iteration in 1..=self.config.max_iterations {
            let (g_of_current, pairs, distances) = match self.inner.step(&source.points, target, &current) {
                Ok(step) => step,
                Err(CloudError::InsufficientData(_)) => {
                    return RegistrationResult {
                        success: false,
                        transform: current,
                        fitness_score: last_error,
                        inliers: last_inliers,
                        iterations: iteration,
                        converged: false,
                        termination_reason: TerminationReason::TooFewCorrespondences,
                        history,
                    };
                }
                Err(_) => {
                    return RegistrationResult {
                        success: false,
                        transform: current,
                        fitness_score: last_error,
                        inliers: last_inliers,
                        iterations: iteration,
                        converged: false,
                        termination_reason: TerminationReason::NumericalFailure,
                        history,
                    };
                }
            };

            let x_vec = to_vec12(&current);
            let g_vec = to_vec12(&g_of_current);
            let residual = g_vec - x_vec;

            mixing_history.push_back((x_vec, g_vec, residual));
            while mixing_history.len() > self.config.history_length.max(1) {
                mixing_history.pop_front();
            }

            let proposal = self.mix(&mixing_history).unwrap_or(g_of_current);
            let delta = proposal * current.inverse();

            let error = self.inner.compute_error(&distances);
            current = proposal;
            last_inliers = pairs.iter().map(|&(s, _)| s).collect();
            last_error = error;

            if let Some(h) = history.as_mut() {
                h.push(IterationRecord { iteration, correspondence_count: pairs.len(), error, transform: current });
            }

            let transform_delta = rotation_deviation_from_identity(&delta) + delta.translation.vector.norm();
            if transform_delta < self.config.transformation_epsilon {
                return RegistrationResult {
                    success: true,
                    transform: current,
                    fitness_score: error,
                    inliers: last_inliers,
                    iterations: iteration,
                    converged: true,
                    termination_reason: TerminationReason::ConvergedTransform,
                    history,
                };
            }
            if let Some(prev) = prev_error {
                if (error - prev).abs() < self.config.euclidean_fitness_epsilon {
                    return RegistrationResult {
                        success: true,
                        transform: current,
                        fitness_score: error,
                        inliers: last_inliers,
                        iterations: iteration,
                        converged: true,
                        termination_reason: TerminationReason::ConvergedError,
                        history,
                    };
                }
            }
            prev_error = Some(error);
        }

        RegistrationResult {
            success: true,
            transform: current,
            fitness_score: last_error,
            inliers: last_inliers,
            iterations: self.config.max_iterations,
            converged: false,
            termination_reason: TerminationReason::MaxIterations,
            history,
        }
    }

    /// Solves `minimise ||sum alpha_i g_i|| subject to sum alpha_i = 1` over
    /// the kept history and returns `beta*(sum alpha_i G(x_i)) + (1-beta)*
    /// (sum alpha_i x_i)`, or `None` if fewer than two iterates are
    /// available yet or the normal equations are singular (the safeguard
    /// then falls back to the unaccelerated step in [`AaIcp::align`]).
    fn mix(&self, history: &VecDeque<(SVector<f64, 12>, SVector<f64, 12>, SVector<f64, 12>)>) -> Option<RigidTransform<T>> {
        let m = history.len();
        if m < 2 {
            return None;
        }
        let residuals: Vec<&SVector<f64, 12>> = history.iter().map(|(_, _, g)| g).collect();
        let lambda = self.config.tikhonov_lambda.to_f64().unwrap_or(1e-8);

        // Solve [G 1; 1^T 0] [alpha; mu] = [0; 1] for the equality-constrained
        // least-squares problem via the bordered (KKT) system, sized to the
        // current (possibly partial) history rather than the configured cap.
        let mut kkt = DMatrix::<f64>::zeros(m + 1, m + 1);
        for i in 0..m {
            for j in 0..m {
                kkt[(i, j)] = residuals[i].dot(residuals[j]);
            }
            kkt[(i, i)] += lambda;
            kkt[(i, m)] = 1.0;
            kkt[(m, i)] = 1.0;
        }
        let mut rhs = DVector::<f64>::zeros(m + 1);
        rhs[m] = 1.0;

        let solution = kkt.lu().solve(&rhs)?;
        let alpha: Vec<f64> = (0..m).map(|i| solution[i]).collect();
        if alpha.iter().any(|a| !a.is_finite()) {
            return None;
        }

        let beta = self.config.beta.to_f64().unwrap_or(1.0);
        let mut mixed_g = SVector::<f64, 12>::zeros();
        let mut mixed_x = SVector::<f64, 12>::zeros();
        for (k, (x, g, _)) in history.iter().enumerate() {
            mixed_g += *g * alpha[k];
            mixed_x += *x * alpha[k];
        }
        let mixed = mixed_g * beta + mixed_x * (1.0 - beta);
        if !mixed.iter().all(|v| v.is_finite()) {
            return None;
        }
        Some(from_vec12(&mixed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::fine::{PointToPointIcp, PointToPointIcpConfiguration};
    use nalgebra::{Point3, Vector3};

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
    fn accelerated_point_to_point_recovers_a_translation() {
        let source = five_point_cloud();
        let translation = Vector3::new(0.1, 0.2, 0.3);
        let target = PointCloud::from_points(source.points.iter().map(|p| p + translation).collect());

        let inner = PointToPointIcp::new(PointToPointIcpConfiguration {
            max_iterations: 1,
            max_correspondence_distance: num_traits::cast(1.0).unwrap(),
            ..Default::default()
        });
        let aa = AaIcp::new(inner, AaIcpConfiguration { max_iterations: 20, ..Default::default() });
        let result = aa.align(&source, &target, RigidTransform::identity(), false);
        assert!(result.success);
        assert!((result.transform.translation.vector - translation).norm() < 1e-2);
    }

    #[test]
    fn falls_back_cleanly_with_too_few_correspondences() {
        let source = PointCloud::from_points(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)]);
        let target = source.clone();
        let inner = PointToPointIcp::new(PointToPointIcpConfiguration::default());
        let aa = AaIcp::new(inner, AaIcpConfiguration::default());
        let result = aa.align(&source, &target, RigidTransform::identity(), false);
        assert!(!result.success);
    }
}
