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

//! Correspondence quality ranking.
//!
//! A [`CorrespondenceSorter`] assigns a score to every correspondence and
//! returns an index permutation ordering them best-first. The trait's
//! default `rank` method owns the shared pipeline (validate, score via the
//! implementation-specific `scores`, stable-sort descending, cache); sorters
//! only implement `scores`.

use super::Correspondence;
use crate::point_cloud::Scalar;
use nalgebra::Point3;
use std::cell::RefCell;

/// Assigns a quality score to each correspondence in a set and orders them
/// best-first.
///
/// Implementors provide [`CorrespondenceSorter::scores`]; [`rank`](CorrespondenceSorter::rank)
/// is the shared driver and should not be overridden.
pub trait CorrespondenceSorter<T: Scalar> {
    /// Computes one score per correspondence, higher is better. The
    /// returned vector must have the same length as `correspondences`.
    fn scores(&self, correspondences: &[Correspondence<T>]) -> Vec<T>;

    /// Returns the indices into `correspondences` in best-first order
    /// (stable sort, so correspondences with equal scores keep their
    /// original relative order, which in turn is broken by ascending
    /// source index since generators already emit in that order).
    fn rank(&self, correspondences: &[Correspondence<T>]) -> Vec<usize> {
        if correspondences.is_empty() {
            return Vec::new();
        }
        let scores = self.scores(correspondences);
        let mut order: Vec<usize> = (0..correspondences.len()).collect();
        order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal));
        order
    }
}

/// Scores by negated descriptor distance (closer is better); ties broken by
/// the default stable sort's source-ascending order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorDistanceSorter;

impl<T: Scalar> CorrespondenceSorter<T> for DescriptorDistanceSorter {
    fn scores(&self, correspondences: &[Correspondence<T>]) -> Vec<T> {
        correspondences.iter().map(|c| -c.distance).collect()
    }
}

/// Scores each correspondence by how many *other* correspondences agree
/// with it on inter-point distance: for correspondence `i` and `j`, the
/// distance between the two source points should equal the distance
/// between the two target points, within `tolerance`. The score is the
/// count of such agreeing partners.
pub struct GeometricConsistencySorter<T: Scalar> {
    source_points: Vec<Point3<T>>,
    target_points: Vec<Point3<T>>,
    tolerance: T,
}

impl<T: Scalar> GeometricConsistencySorter<T> {
    /// Builds a sorter over the full source/target keypoint clouds a set of
    /// correspondences indexes into, with a distance-agreement `tolerance`.
    pub fn new(source_points: Vec<Point3<T>>, target_points: Vec<Point3<T>>, tolerance: T) -> Self {
        Self { source_points, target_points, tolerance }
    }
}

impl<T: Scalar> CorrespondenceSorter<T> for GeometricConsistencySorter<T> {
    fn scores(&self, correspondences: &[Correspondence<T>]) -> Vec<T> {
        let n = correspondences.len();
        let mut scores = vec![T::zero(); n];
        for i in 0..n {
            let ci = &correspondences[i];
            let Some(si) = self.source_points.get(ci.source_index) else { continue };
            let Some(ti) = self.target_points.get(ci.target_index) else { continue };
            for j in 0..n {
                if i == j {
                    continue;
                }
                let cj = &correspondences[j];
                let (Some(sj), Some(tj)) = (self.source_points.get(cj.source_index), self.target_points.get(cj.target_index)) else { continue };
                let source_d = (si - sj).norm();
                let target_d = (ti - tj).norm();
                if (source_d - target_d).abs() <= self.tolerance {
                    scores[i] = scores[i] + T::one();
                }
            }
        }
        scores
    }
}

/// A weighted linear combination of other sorters; weights are normalised
/// to sum to 1 at construction (a zero total weight falls back to uniform
/// weighting).
pub struct CombinedSorter<T: Scalar> {
    sorters: Vec<Box<dyn CorrespondenceSorter<T>>>,
    weights: Vec<T>,
}

impl<T: Scalar> CombinedSorter<T> {
    /// Builds a combined sorter from `(sorter, weight)` pairs.
    pub fn new(components: Vec<(Box<dyn CorrespondenceSorter<T>>, T)>) -> Self {
        let total: T = components.iter().fold(T::zero(), |acc, (_, w)| acc + *w);
        let (sorters, raw_weights): (Vec<_>, Vec<_>) = components.into_iter().unzip();
        let weights = if total > T::zero() {
            raw_weights.iter().map(|&w| w / total).collect()
        } else {
            let n: T = num_traits::cast(sorters.len().max(1)).unwrap();
            vec![T::one() / n; sorters.len()]
        };
        Self { sorters, weights }
    }
}

impl<T: Scalar> CorrespondenceSorter<T> for CombinedSorter<T> {
    fn scores(&self, correspondences: &[Correspondence<T>]) -> Vec<T> {
        let mut combined = vec![T::zero(); correspondences.len()];
        for (sorter, &weight) in self.sorters.iter().zip(self.weights.iter()) {
            for (slot, score) in combined.iter_mut().zip(sorter.scores(correspondences)) {
                *slot = *slot + weight * score;
            }
        }
        combined
    }
}

/// Scores correspondences with a user-supplied function of the
/// correspondence alone (no cloud context needed).
pub struct CustomSorter<T: Scalar, F: Fn(&Correspondence<T>) -> T> {
    scorer: F,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Scalar, F: Fn(&Correspondence<T>) -> T> CustomSorter<T, F> {
    /// Builds a sorter from a scalar scoring function.
    pub fn new(scorer: F) -> Self {
        Self { scorer, _marker: std::marker::PhantomData }
    }
}

impl<T: Scalar, F: Fn(&Correspondence<T>) -> T> CorrespondenceSorter<T> for CustomSorter<T, F> {
    fn scores(&self, correspondences: &[Correspondence<T>]) -> Vec<T> {
        correspondences.iter().map(|c| (self.scorer)(c)).collect()
    }
}

/// A memoising wrapper: repeated [`CorrespondenceSorter::rank`] calls over
/// an unchanged correspondence set return the cached permutation instead of
/// re-scoring.7's caching requirement.
pub struct CachedSorter<T: Scalar, S: CorrespondenceSorter<T>> {
    inner: S,
    cache: RefCell<Option<(Vec<Correspondence<T>>, Vec<usize>)>>,
}

impl<T: Scalar, S: CorrespondenceSorter<T>> CachedSorter<T, S> {
    /// Wraps `inner` with a one-entry memoisation cache.
    pub fn new(inner: S) -> Self {
        Self { inner, cache: RefCell::new(None) }
    }
}

impl<T: Scalar, S: CorrespondenceSorter<T>> CorrespondenceSorter<T> for CachedSorter<T, S> {
    fn scores(&self, correspondences: &[Correspondence<T>]) -> Vec<T> {
        self.inner.scores(correspondences)
    }

    fn rank(&self, correspondences: &[Correspondence<T>]) -> Vec<usize> {
        if let Some((cached_input, cached_order)) = self.cache.borrow().as_ref() {
            if cached_input.as_slice() == correspondences {
                return cached_order.clone();
            }
        }
        let order = self.inner.rank(correspondences);
        *self.cache.borrow_mut() = Some((correspondences.to_vec(), order.clone()));
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corr<T: Scalar>(source_index: usize, target_index: usize, distance: T) -> Correspondence<T> {
        Correspondence { source_index, target_index, distance }
    }

    #[test]
    fn descriptor_distance_sorter_orders_closest_first() {
        let correspondences = vec![corr(0, 0, 5.0_f64), corr(1, 1, 1.0), corr(2, 2, 3.0)];
        let order = DescriptorDistanceSorter.rank(&correspondences);
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn combined_sorter_normalizes_weights() {
        let correspondences = vec![corr(0, 0, 1.0_f64), corr(1, 1, 2.0)];
        let combined = CombinedSorter::new(vec![
            (Box::new(DescriptorDistanceSorter) as Box<dyn CorrespondenceSorter<f64>>, 3.0),
            (Box::new(DescriptorDistanceSorter) as Box<dyn CorrespondenceSorter<f64>>, 1.0),
        ]);
        let order = combined.rank(&correspondences);
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn custom_sorter_uses_the_supplied_function() {
        let correspondences = vec![corr(0, 0, 1.0_f64), corr(1, 1, 2.0)];
        let sorter = CustomSorter::new(|c: &Correspondence<f64>| c.distance);
        let order = sorter.rank(&correspondences);
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn cached_sorter_returns_the_same_order_on_repeat_calls() {
        let correspondences = vec![corr(0, 0, 1.0_f64), corr(1, 1, 2.0)];
        let cached = CachedSorter::new(DescriptorDistanceSorter);
        let first = cached.rank(&correspondences);
        let second = cached.rank(&correspondences);
        assert_eq!(first, second);
    }

    #[test]
    fn geometric_consistency_rewards_agreeing_pairs() {
        use nalgebra::Point3;
        let source_points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(5.0, 5.0, 5.0)];
        let target_points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(9.0, 9.0, 9.0)];
        let correspondences = vec![corr(0, 0, 0.0_f64), corr(1, 1, 0.0), corr(2, 2, 0.0)];
        let sorter = GeometricConsistencySorter::new(source_points, target_points, 1e-3);
        let scores = sorter.scores(&correspondences);
        assert!(scores[0] > scores[2]);
    }
}
