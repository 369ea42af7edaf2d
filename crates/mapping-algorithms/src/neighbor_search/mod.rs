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

//! Nearest-neighbour search over 3D points.
//!
//! An index borrows the point slice it was built on for its entire life
//! (rebuilding is required to retarget); queries are read-only and may be
//! issued concurrently from many threads, which is why every
//! [`NeighborSearch`] implementation here only requires `&self`.

mod brute_force;
mod kd_tree;

pub use brute_force::BruteForceSearch;
pub use kd_tree::KdTree;

use crate::metric::{Metric, L2};
use crate::point_cloud::Scalar;
use nalgebra::Point3;
use std::any::TypeId;

/// The size above which brute-force search switches to its parallel code
/// path, matching a "~1024 elements" threshold.
pub const PARALLEL_THRESHOLD: usize = 1024;

/// A single neighbour result: the index into the data the search index was
/// built over, and the distance (never squared) to the
/// query point.
pub type Neighbor<T> = (usize, T);

/// Given an indexed set of 3D points, answers k-nearest and radius queries.
///
/// Results are always sorted by ascending distance, with ties broken by
/// lower index first, so answers are reproducible bit-for-bit across runs
/// of the same build.
pub trait NeighborSearch<T: Scalar> {
    /// Returns up to `k` nearest neighbours of `query`, sorted ascending by
    /// distance. Returns fewer than `k` if the index holds fewer points.
    /// An empty index or `k == 0` returns an empty vector, not an error.
    fn k_nearest(&self, query: &Point3<T>, k: usize) -> Vec<Neighbor<T>>;

    /// Returns every point within distance `r` of `query`, sorted ascending
    /// by distance. A non-positive `r` returns an empty vector.
    fn radius(&self, query: &Point3<T>, r: T) -> Vec<Neighbor<T>>;

    /// Number of points backing this index.
    fn len(&self) -> usize;

    /// Whether this index was built over zero points.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the best available index for `points` under metric `M`: a
/// KD-tree when `M` is [`L2`] (the only metric a KD-tree's spatial pruning
/// is valid for), transparently falling back to brute force for every
/// other metric.
///
/// The fallback is resolved once, at build time, via a `TypeId` check
/// against `L2` — there is no dynamic re-dispatch per query.
pub fn build_index<'a, T, M>(points: &'a [Point3<T>], metric: M) -> Box<dyn NeighborSearch<T> + 'a>
where
    T: Scalar + 'static,
    M: Metric<T> + 'static,
{
    if TypeId::of::<M>() == TypeId::of::<L2>() {
        Box::new(KdTree::build(points, 16))
    } else {
        Box::new(BruteForceSearch::new(points, metric))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Cosine;
    use nalgebra::Point3;

    fn sample_points() -> Vec<Point3<f32>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(5.0, 5.0, 5.0),
        ]
    }

    #[test]
    fn build_index_picks_kd_tree_for_l2_and_brute_force_otherwise() {
        let points = sample_points();
        let l2_index = build_index(&points, L2);
        assert_eq!(l2_index.len(), points.len());

        let cosine_index = build_index(&points, Cosine);
        assert_eq!(cosine_index.len(), points.len());
    }

    #[test]
    fn every_variant_agrees_with_brute_force_on_k_nearest() {
        let points = sample_points();
        let brute = BruteForceSearch::new(&points, L2);
        let tree = KdTree::build(&points, 2);

        let query = Point3::new(0.2, 0.1, 0.0);
        for k in 1..=points.len() {
            let mut expected = brute.k_nearest(&query, k);
            let mut actual = tree.k_nearest(&query, k);
            expected.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
            actual.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
            assert_eq!(expected, actual, "k={k}");
        }
    }
}
