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

//! Scalar distance metrics over equal-length vectors.
//!
//! Two dispatch modes coexist, matching `metric_traits.hpp`/`base_metric.hpp`
//! in the original toolbox: [`Metric`] is monomorphised at the call site for
//! hot loops (neighbour search, descriptor comparison inside a single
//! extractor), while [`dynamic::DynMetric`] is an object-safe equivalent used
//! by [`dynamic::MetricRegistry`] to select a metric by name at runtime.

mod builtin;
mod composite;
pub mod dynamic;

pub use builtin::*;
pub use composite::{LambdaMetric, ScaledMetric, WeightedSum};

use crate::point_cloud::Scalar;

/// A scalar distance between two equal-length vectors.
///
/// Implementors are zero-sized or small `Copy` structs so that `distance`
/// monomorphises to a tight loop; see [`dynamic::DynMetric`] for the
/// object-safe, runtime-selectable equivalent.
pub trait Metric<T: Scalar>: Send + Sync {
    /// Distance between `a` and `b`. Both slices must have equal length;
    /// an empty pair of slices returns zero per spec.
    fn distance(&self, a: &[T], b: &[T]) -> T;

    /// The squared form of [`Metric::distance`], when one exists more
    /// cheaply than squaring the result (e.g. L2 avoids a `sqrt`).
    /// Metrics without a natural squared form square their own distance.
    fn squared_distance(&self, a: &[T], b: &[T]) -> T {
        let d = self.distance(a, b);
        d * d
    }
}

/// Compile-time properties of a metric, queried the way
/// `toolbox::metrics::metric_traits` exposes them in the original toolbox.
pub trait MetricProperties {
    /// Whether `m(x, y) == m(y, x)` for all `x`, `y`.
    const IS_SYMMETRIC: bool;
    /// Whether the metric implements a natural squared form distinct from
    /// squaring `distance`.
    const HAS_SQUARED_FORM: bool;
    /// Whether inputs must be non-negative (most histogram metrics).
    const REQUIRES_POSITIVE_VALUES: bool;
}

/// Clamps an `acos` argument to its safe `[-1, 1]` domain before evaluating,
/// matching the numerical-edge-case requirement.
#[inline]
pub(crate) fn safe_acos<T: Scalar>(x: T) -> T {
    x.max(-T::one()).min(T::one()).acos()
}

/// Clamps a logarithm argument away from zero, avoiding `-inf`/NaN.
#[inline]
pub(crate) fn safe_ln<T: Scalar>(x: T) -> T {
    let eps: T = num_traits::cast(1e-12).unwrap();
    x.max(eps).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_symmetric_and_zero_self<M: Metric<f64>>(m: &M, a: &[f64], b: &[f64]) {
        assert!((m.distance(a, a)).abs() < 1e-9, "m(x, x) must be 0");
        assert!(
            (m.distance(a, b) - m.distance(b, a)).abs() < 1e-9,
            "symmetric metric must satisfy m(x, y) == m(y, x)"
        );
    }

    #[test]
    fn l1_l2_linf_are_symmetric_and_zero_on_diagonal() {
        let a = [1.0, 2.0, 3.0];
        let b = [3.0, 1.0, 0.5];
        check_symmetric_and_zero_self(&L1, &a, &b);
        check_symmetric_and_zero_self(&L2, &a, &b);
        check_symmetric_and_zero_self(&LInf, &a, &b);
    }

    #[test]
    fn empty_vectors_return_zero_distance() {
        let empty: [f64; 0] = [];
        assert_eq!(L2.distance(&empty, &empty), 0.0);
        assert_eq!(Cosine.distance(&empty, &empty), 0.0);
    }
}
