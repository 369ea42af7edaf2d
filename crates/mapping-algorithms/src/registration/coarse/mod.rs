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

//! Coarse, correspondence-based registration: RANSAC, 4PCS, Super4PCS.

mod four_pcs;
mod ransac;
mod super_four_pcs;

pub use four_pcs::FourPcs;
pub use ransac::{RansacConfiguration, RansacConfigurationBuilder, RansacRegistration};
pub use super_four_pcs::{Super4Pcs, Super4PcsConfiguration};

use crate::point_cloud::Scalar;
use crate::registration::RegistrationResult;

/// A registration algorithm that exposes its own name for logging and
/// `termination_reason` messages, mirroring the original toolbox's
/// `get_algorithm_name()` on `base_coarse_registration_t`/`base_fine_registration_t`.
pub trait RegistrationAlgorithm {
    /// A short, stable name for this algorithm.
    fn name(&self) -> &'static str;
}

/// Estimates a rigid transform from correspondences between two keypoint
/// clouds. Descriptor-based implementations ([`RansacRegistration`]) take
/// correspondences; geometric implementations ([`FourPcs`], [`Super4Pcs`])
/// ignore them and work directly from the point clouds.
pub trait CoarseRegistration<T: Scalar>: RegistrationAlgorithm {
    /// `source_points`/`target_points` are the full keypoint clouds a
    /// correspondence's `source_index`/`target_index` refer into.
    fn register(&self, source_points: &[nalgebra::Point3<T>], target_points: &[nalgebra::Point3<T>], correspondences: &[crate::correspondence::Correspondence<T>]) -> RegistrationResult<T>;
}
