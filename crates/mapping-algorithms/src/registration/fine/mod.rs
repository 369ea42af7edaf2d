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

//! Iterative fine registration: every method refines an initial guess by
//! repeatedly finding correspondences against the current transform and
//! solving for an incremental update, until the transform or the error
//! stops changing.
//!
//! [`FineRegistration::align`] owns that outer loop; implementations only
//! provide [`FineRegistration::find_correspondences`] and
//! [`FineRegistration::compute_transformation`] (plus the convergence knobs
//! as accessor methods). [`FineRegistration::step`] is the one-iteration
//! fixed-point map `G` that [`super::fine::AaIcp`] accelerates.

mod aa_icp;
mod generalized_icp;
mod ndt;
mod point_to_plane;
mod point_to_point;

pub use aa_icp::{AaIcp, AaIcpConfiguration, AaIcpConfigurationBuilder};
pub use generalized_icp::{GeneralizedIcp, GeneralizedIcpConfiguration, GeneralizedIcpConfigurationBuilder};
pub use ndt::{Ndt, NdtConfiguration, NdtConfigurationBuilder};
pub use point_to_plane::{PointToPlaneIcp, PointToPlaneIcpConfiguration, PointToPlaneIcpConfigurationBuilder};
pub use point_to_point::{PointToPointIcp, PointToPointIcpConfiguration, PointToPointIcpConfigurationBuilder};

use crate::error::{CloudError, CloudResult};
use crate::point_cloud::{PointCloud, Scalar};
use crate::registration::{rotation_deviation_from_identity, IterationRecord, RegistrationResult, RigidTransform, TerminationReason};
use nalgebra::Point3;

/// A correspondence-and-solve fine registration method: point-to-point ICP,
/// point-to-plane ICP, generalised ICP, or NDT. AA-ICP wraps any of these
/// (as the `Inner` type parameter) rather than implementing this trait
/// itself, since it accelerates the fixed-point map rather than defining a
/// new one.
pub trait FineRegistration<T: Scalar>: super::coarse::RegistrationAlgorithm {
    /// Iteration budget.
    fn max_iterations(&self) -> usize;

    /// Fewer surviving correspondences than this terminates the run with
    /// [`TerminationReason::TooFewCorrespondences`].
    fn min_correspondences(&self) -> usize;

    /// Fraction of correspondences (by worst distance) dropped every
    /// iteration before solving, `0` disables rejection.
    fn outlier_rejection_ratio(&self) -> T;

    /// Convergence threshold on the incremental transform's deviation from
    /// identity (rotation Frobenius norm plus translation norm).
    fn transformation_epsilon(&self) -> T;

    /// Convergence threshold on the change in [`FineRegistration::compute_error`]
    /// between consecutive iterations.
    fn euclidean_fitness_epsilon(&self) -> T;

    /// Matches every (already-transformed) source point to a target index,
    /// returning the surviving `(source_index, target_index)` pairs and
    /// their distances. Implementations that need extra target data
    /// (normals, voxel distributions) return an empty result when that data
    /// is missing, which `step` turns into `TooFewCorrespondences`.
    fn find_correspondences(&self, transformed: &[Point3<T>], target: &PointCloud<T>) -> (Vec<(usize, usize)>, Vec<T>);

    /// Solves for the incremental transform aligning `transformed` onto
    /// `target` over the given pairs.
    fn compute_transformation(&self, transformed: &[Point3<T>], target: &PointCloud<T>, pairs: &[(usize, usize)]) -> CloudResult<RigidTransform<T>>;

    /// The scalar error reported per iteration and used for
    /// `euclidean_fitness_epsilon`; the mean correspondence distance by
    /// default.
    fn compute_error(&self, distances: &[T]) -> T {
        if distances.is_empty() {
            return T::zero();
        }
        let sum = distances.iter().fold(T::zero(), |acc, &d| acc + d);
        sum / num_traits::cast(distances.len()).unwrap()
    }

    /// One iteration of the fixed-point map `G`: transform `source` by
    /// `current`, find correspondences, reject outliers, solve, and return
    /// the new absolute transform (`ΔT · current`) alongside the pairs and
    /// distances used, so callers can compute an error or inliers without
    /// re-deriving them.
    fn step(&self, source: &[Point3<T>], target: &PointCloud<T>, current: &RigidTransform<T>) -> CloudResult<(RigidTransform<T>, Vec<(usize, usize)>, Vec<T>)> {
        let transformed: Vec<Point3<T>> = source.iter().map(|p| current.transform_point(p)).collect();
        let (mut pairs, mut distances) = self.find_correspondences(&transformed, target);

        if pairs.len() < self.min_correspondences() {
            return Err(CloudError::InsufficientData(format!(
                "{} correspondences survived, need at least {}",
                pairs.len(),
                self.min_correspondences()
            )));
        }

        let ratio = self.outlier_rejection_ratio();
        if ratio > T::zero() {
            let drop_count = num_traits::cast::<T, f64>(ratio).unwrap_or(0.0) * pairs.len() as f64;
            let drop_count = (drop_count.round() as usize).min(pairs.len().saturating_sub(self.min_correspondences()));
            if drop_count > 0 {
                let mut order: Vec<usize> = (0..pairs.len()).collect();
                order.sort_by(|&a, &b| distances[a].partial_cmp(&distances[b]).unwrap_or(std::cmp::Ordering::Equal));
                let keep: Vec<usize> = order[..pairs.len() - drop_count].to_vec();
                pairs = keep.iter().map(|&i| pairs[i]).collect();
                distances = keep.iter().map(|&i| distances[i]).collect();
            }
        }

        if pairs.len() < self.min_correspondences() {
            return Err(CloudError::InsufficientData(format!(
                "{} correspondences survived outlier rejection, need at least {}",
                pairs.len(),
                self.min_correspondences()
            )));
        }

        let delta = self.compute_transformation(&transformed, target, &pairs)?;
        let next = delta * *current;
        Ok((next, pairs, distances))
    }

    /// Runs [`FineRegistration::step`] until convergence or
    /// `max_iterations`, per spec's fine-registration loop: track the
    /// incremental transform's deviation from identity and the change in
    /// `compute_error` between iterations as the two convergence tests.
    fn align(&self, source: &PointCloud<T>, target: &PointCloud<T>, initial_guess: RigidTransform<T>, record_history: bool) -> RegistrationResult<T> {
        let mut transform = initial_guess;
        let mut prev_error: Option<T> = None;
        let mut history = if record_history { Some(Vec::new()) } else { None };
        let mut last_inliers: Vec<usize> = Vec::new();
        let mut last_error = T::zero();

        for iteration in 1..=self.max_iterations() {
            match self.step(&source.points, target, &transform) {
                Ok((next, pairs, distances)) => {
                    let delta = next * transform.inverse();
                    let error = self.compute_error(&distances);
                    transform = next;
                    last_inliers = pairs.iter().map(|&(s, _)| s).collect();
                    last_error = error;

                    if let Some(h) = history.as_mut() {
                        h.push(IterationRecord { iteration, correspondence_count: pairs.len(), error, transform });
                    }

                    let transform_delta = rotation_deviation_from_identity(&delta) + delta.translation.vector.norm();
                    if transform_delta < self.transformation_epsilon() {
                        return RegistrationResult {
                            success: true,
                            transform,
                            fitness_score: error,
                            inliers: last_inliers,
                            iterations: iteration,
                            converged: true,
                            termination_reason: TerminationReason::ConvergedTransform,
                            history,
                        };
                    }
                    if let Some(prev) = prev_error {
                        if (error - prev).abs() < self.euclidean_fitness_epsilon() {
                            return RegistrationResult {
                                success: true,
                                transform,
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
                Err(CloudError::InsufficientData(_)) => {
                    return RegistrationResult {
                        success: false,
                        transform,
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
                        transform,
                        fitness_score: last_error,
                        inliers: last_inliers,
                        iterations: iteration,
                        converged: false,
                        termination_reason: TerminationReason::NumericalFailure,
                        history,
                    };
                }
            }
        }

        RegistrationResult {
            success: true,
            transform,
            fitness_score: last_error,
            inliers: last_inliers,
            iterations: self.max_iterations(),
            converged: false,
            termination_reason: TerminationReason::MaxIterations,
            history,
        }
    }
}
