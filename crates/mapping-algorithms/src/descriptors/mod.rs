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

//! Fixed-length local and global descriptor extractors.
//!
//! Every extractor emits one [`Signature`] per requested keypoint (or, for
//! [`Vfh`], exactly one for the whole cloud), comparable under any
//! [`crate::metric::Metric`] via [`Signature::distance_with`].

mod fpfh;
mod pfh;
mod shot;
mod vfh;

pub use fpfh::Fpfh;
pub use pfh::Pfh;
pub use shot::Shot;
pub use vfh::Vfh;

use crate::metric::{Metric, L2};
use crate::point_cloud::Scalar;
use nalgebra::{Point3, Vector3};
use num_traits::ToPrimitive;

/// A fixed-length histogram signature, default-zero where its neighbourhood
/// was empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature<T: Scalar> {
    /// The histogram bins, in extractor-defined order.
    pub bins: Vec<T>,
}

impl<T: Scalar> Signature<T> {
    /// A signature of `len` zero bins.
    pub fn zeros(len: usize) -> Self {
        Self { bins: vec![T::zero(); len] }
    }

    /// L1-normalises this signature's bins in place (a no-op when every bin
    /// is zero).
    pub fn l1_normalize(&mut self) {
        let sum: T = self.bins.iter().fold(T::zero(), |a, &b| a + b.abs());
        if sum > T::zero() {
            for b in &mut self.bins {
                *b = *b / sum;
            }
        }
    }

    /// L2-normalises this signature's bins in place (a no-op when every bin
    /// is zero).
    pub fn l2_normalize(&mut self) {
        let norm: T = self.bins.iter().fold(T::zero(), |a, &b| a + b * b).sqrt();
        if norm > T::zero() {
            for b in &mut self.bins {
                *b = *b / norm;
            }
        }
    }

    /// Distance under the default metric (L2).
    pub fn distance(&self, other: &Self) -> T {
        L2.distance(&self.bins, &other.bins)
    }

    /// Distance under an explicit metric, letting any extractor pair with
    /// any metric from [`crate::metric`].
    pub fn distance_with(&self, other: &Self, metric: &dyn Metric<T>) -> T {
        metric.distance(&self.bins, &other.bins)
    }
}

/// Consumes a cloud, its normals, a neighbour index and a keypoint index
/// list, emitting one signature per keypoint (all but [`Vfh`], which always
/// returns exactly one).
pub trait DescriptorExtractor<T: Scalar> {
    /// Extracts signatures at `keypoint_indices`.
    fn extract(
        &self,
        points: &[Point3<T>],
        normals: &[Vector3<T>],
        index: &dyn crate::neighbor_search::NeighborSearch<T>,
        keypoint_indices: &[usize],
    ) -> Vec<Signature<T>>;
}

/// The Darboux-frame angular features `(alpha, phi, theta)` between an
/// oriented reference point `(p1, n1)` and a second oriented point
/// `(p2, n2)`, as used by PFH/FPFH/SHOT pair features. The distance feature
/// is intentionally omitted from the return value.5's "the
/// distance feature is ignored in histogram" note for PFH.
pub(crate) fn darboux_features<T: Scalar>(p1: &Point3<T>, n1: &Vector3<T>, p2: &Point3<T>, n2: &Vector3<T>) -> Option<(T, T, T)> {
    let d = p2 - p1;
    let dist = d.norm();
    if dist <= T::zero() {
        return None;
    }
    let d_unit = d / dist;

    let u = *n1;
    let v = u.cross(&d_unit);
    let v_norm = v.norm();
    if v_norm <= T::zero() {
        return None;
    }
    let v = v / v_norm;
    let w = u.cross(&v);

    let alpha = v.dot(n2);
    let phi = u.dot(&d_unit);
    let theta = w.dot(n2).atan2(u.dot(n2));
    Some((alpha, phi, theta))
}

/// Bins a value known to lie in `[lo, hi]` into one of `num_bins` equal
/// divisions, clamping to the valid range for values exactly at `hi`.
pub(crate) fn bin_index<T: Scalar>(value: T, lo: T, hi: T, num_bins: usize) -> usize {
    let span = hi - lo;
    if span <= T::zero() {
        return 0;
    }
    let normalized = ((value - lo) / span).max(T::zero()).min(T::one());
    let idx = (normalized * num_traits::cast::<usize, T>(num_bins).unwrap()).to_usize().unwrap_or(0);
    idx.min(num_bins - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_index_clamps_to_last_bin_at_the_upper_bound() {
        assert_eq!(bin_index(1.0_f64, -1.0, 1.0, 5), 4);
        assert_eq!(bin_index(-1.0_f64, -1.0, 1.0, 5), 0);
        assert_eq!(bin_index(0.0_f64, -1.0, 1.0, 5), 2);
    }

    #[test]
    fn signature_normalization_is_idempotent_on_zero() {
        let mut sig: Signature<f64> = Signature::zeros(4);
        sig.l1_normalize();
        assert_eq!(sig.bins, vec![0.0; 4]);
    }
}
