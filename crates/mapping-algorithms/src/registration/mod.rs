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

//! Coarse (correspondence-based) and fine (iterative) rigid registration.
//!
//! Both families converge on the same output shape, [`RegistrationResult`],
//! so pipeline glue can seed a fine method from a coarse one's transform
//! without caring which concrete algorithm produced it.

pub mod coarse;
pub mod fine;
mod transform;

pub use transform::{rotation_deviation_from_identity, umeyama_alignment};

use crate::point_cloud::Scalar;
use nalgebra::Isometry3;

/// The rigid transform type every registration method estimates: a 4x4
/// homogeneous matrix restricted to its rigid-body subset (orthonormal
/// rotation, det = +1, plus translation).
pub type RigidTransform<T> = Isometry3<T>;

/// Why a registration method stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// `|delta_transform - I| < transformation_epsilon`.
    ConvergedTransform,
    /// `|error - prev_error| < euclidean_fitness_epsilon`.
    ConvergedError,
    /// The iteration budget was exhausted without convergence.
    MaxIterations,
    /// Fewer correspondences remained than the method's minimum.
    TooFewCorrespondences,
    /// An SVD, eigensolver or line search failed to produce a usable step.
    NumericalFailure,
}

impl TerminationReason {
    /// The `&'static str` spelling used in logs and [`RegistrationResult`]
    /// consumers that want a stable string rather than matching the enum.
    pub fn as_str(self) -> &'static str {
        match self {
            TerminationReason::ConvergedTransform => "converged_transform",
            TerminationReason::ConvergedError => "converged_error",
            TerminationReason::MaxIterations => "max_iterations",
            TerminationReason::TooFewCorrespondences => "too_few_correspondences",
            TerminationReason::NumericalFailure => "numerical_failure",
        }
    }
}

/// One entry of a fine-registration iteration history, kept only when the
/// caller asks for recording.
#[derive(Debug, Clone)]
pub struct IterationRecord<T: Scalar> {
    /// 1-based iteration number this record describes.
    pub iteration: usize,
    /// Number of correspondences used by this iteration.
    pub correspondence_count: usize,
    /// The error metric (method-specific) at this iteration.
    pub error: T,
    /// The accumulated transform after this iteration.
    pub transform: RigidTransform<T>,
}

/// The outcome of any coarse or fine registration method.
#[derive(Debug, Clone)]
pub struct RegistrationResult<T: Scalar> {
    /// Whether the method produced a usable transform at all (distinct from
    /// [`RegistrationResult::converged`]: a method can fail to converge
    /// within its iteration budget and still report its best transform so
    /// far, succeeding with `converged = false`).
    pub success: bool,
    /// The estimated rigid transform, source onto target.
    pub transform: RigidTransform<T>,
    /// Mean inlier residual distance; lower is better.
    pub fitness_score: T,
    /// Indices into the correspondence (or point) set that were judged
    /// inliers under the returned transform.
    pub inliers: Vec<usize>,
    /// Number of iterations actually performed.
    pub iterations: usize,
    /// Whether the method's convergence criterion was met (as opposed to
    /// exhausting `max_iterations`).
    pub converged: bool,
    /// Why the method stopped.
    pub termination_reason: TerminationReason,
    /// Per-iteration history, populated only when recording was requested;
    /// fine methods only.
    pub history: Option<Vec<IterationRecord<T>>>,
}

impl<T: Scalar> RegistrationResult<T> {
    /// A failure result carrying an identity transform, used whenever a
    /// method cannot even begin (empty inputs, missing configuration).
    pub fn failure(reason: TerminationReason) -> Self {
        Self {
            success: false,
            transform: RigidTransform::identity(),
            fitness_score: T::zero(),
            inliers: Vec::new(),
            iterations: 0,
            converged: false,
            termination_reason: reason,
            history: None,
        }
    }
}
