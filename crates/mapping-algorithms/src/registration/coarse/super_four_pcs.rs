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

//! Super4PCS: 4PCS with the pairwise distance search replaced by a voxel
//! grid lookup, trading the brute-force `O(n^2)` scan over target pairs for
//! a roughly `O(n)` one. The base selection, candidate scoring and LCP
//! verification are otherwise identical to [`super::FourPcs`], so this
//! module reuses them rather than duplicating the geometry.

use super::four_pcs::{lcp_score, pick_base, segment_intersection, to_f64, Base};
use super::RegistrationAlgorithm;
use crate::correspondence::Correspondence;
use crate::point_cloud::Scalar;
use crate::registration::{umeyama_alignment, RegistrationResult, RigidTransform, TerminationReason};
use crate::voxel_key::{VoxelCoord, VoxelIndexer};
use nalgebra::Point3;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::cell::RefCell;

/// All unordered point-index pairs in `points` whose Euclidean distance
/// lies within `tolerance` of `distance`, found via a voxel grid sized so
/// that any two points exactly `distance` apart land in the same or an
/// adjacent cell: bucket every point, then for each point only scan its
/// 27-cell neighbourhood instead of every other point.
fn find_pairs_in_range_grid<T: Scalar>(points: &[Point3<T>], distance: f64, tolerance: f64) -> Vec<(usize, usize)> {
    let cell_size = (distance + tolerance).max(1e-9);
    let pts64: Vec<Point3<f64>> = points.iter().map(to_f64).collect();
    let coords: Vec<VoxelCoord> = pts64.iter().map(|p| VoxelCoord::of(p, cell_size)).collect();
    let indexer = VoxelIndexer::covering(&coords);

    let mut buckets: std::collections::HashMap<u64, Vec<usize>> = std::collections::HashMap::new();
    for (i, &coord) in coords.iter().enumerate() {
        buckets.entry(indexer.key(coord).0).or_default().push(i);
    }

    let mut out = Vec::new();
    for (i, &coord) in coords.iter().enumerate() {
        for neighbor in VoxelIndexer::neighborhood(coord) {
            let Some(candidates) = buckets.get(&indexer.key(neighbor).0) else { continue };
            for &j in candidates {
                if j <= i {
                    continue;
                }
                let d = (pts64[i] - pts64[j]).norm();
                if (d - distance).abs() <= tolerance {
                    out.push((i, j));
                }
            }
        }
    }
    out
}

/// Candidate target quadruples whose pair distances and crossing ratios
/// match `base` within `delta`, built from the grid-indexed pair search
/// rather than [`super::four_pcs::find_pairs_in_range`]'s brute force.
fn candidate_quads_grid<T: Scalar>(target: &[Point3<T>], base: &Base, delta: f64) -> Vec<[usize; 4]> {
    let pairs1 = find_pairs_in_range_grid(target, base.d1, delta);
    let pairs2 = find_pairs_in_range_grid(target, base.d2, delta);
    let tgt64: Vec<Point3<f64>> = target.iter().map(to_f64).collect();

    let mut out = Vec::new();
    for &(i0, i1) in &pairs1 {
        for &(j0, j1) in &pairs2 {
            if [i0, i1].contains(&j0) || [i0, i1].contains(&j1) {
                continue;
            }
            for &(a, b) in &[(i0, i1), (i1, i0)] {
                for &(c, d) in &[(j0, j1), (j1, j0)] {
                    let Some((_, r1, r2)) = segment_intersection(&tgt64[a], &tgt64[b], &tgt64[c], &tgt64[d]) else { continue };
                    if (r1 - base.r1).abs() <= delta && (r2 - base.r2).abs() <= delta {
                        out.push([a, b, c, d]);
                    }
                }
            }
        }
    }
    out
}

pub use super::four_pcs::FourPcsConfiguration as Super4PcsConfiguration;

/// Super4PCS coarse registration: same base-and-quad matching as
/// [`super::FourPcs`], but with the target pair search grid-indexed so it
/// scales to larger target clouds.
pub struct Super4Pcs<T: Scalar> {
    config: Super4PcsConfiguration<T>,
    rng: RefCell<SmallRng>,
}

impl<T: Scalar> Super4Pcs<T> {
    /// Builds a Super4PCS registrar from a configuration.
    pub fn new(config: Super4PcsConfiguration<T>) -> Self {
        let seed = config.seed;
        Self { config, rng: RefCell::new(SmallRng::seed_from_u64(seed)) }
    }
}

impl<T: Scalar> RegistrationAlgorithm for Super4Pcs<T> {
    fn name(&self) -> &'static str {
        "super4pcs"
    }
}

impl<T: Scalar> super::CoarseRegistration<T> for Super4Pcs<T> {
    #[cfg_attr(feature = "tracing", tracing::instrument("Super4PCS Registration", skip_all, level = "debug"))]
    fn register(&self, source_points: &[Point3<T>], target_points: &[Point3<T>], _correspondences: &[Correspondence<T>]) -> RegistrationResult<T> {
        if source_points.len() < 4 || target_points.len() < 4 {
            return RegistrationResult::failure(TerminationReason::TooFewCorrespondences);
        }

        let delta = self.config.delta.to_f64().unwrap();
        let mut rng = self.rng.borrow_mut();
        let Some(base) = pick_base(source_points, self.config.base_attempts, &mut rng) else {
            drop(rng);
            return RegistrationResult::failure(TerminationReason::NumericalFailure);
        };
        drop(rng);

        let base_points: Vec<Point3<T>> = base.indices.iter().map(|&i| source_points[i]).collect();
        let mut best_transform = RigidTransform::identity();
        let mut best_score = T::zero();

        for quad in candidate_quads_grid(target_points, &base, delta) {
            let quad_points: Vec<Point3<T>> = quad.iter().map(|&i| target_points[i]).collect();
            let Ok(candidate) = umeyama_alignment(&base_points, &quad_points) else { continue };
            let score = lcp_score(&candidate, source_points, target_points, self.config.delta);
            if score > best_score {
                best_score = score;
                best_transform = candidate;
            }
        }

        if best_score <= T::zero() {
            return RegistrationResult::failure(TerminationReason::NumericalFailure);
        }

        let inliers: Vec<usize> = (0..source_points.len())
            .filter(|&i| {
                let transformed = best_transform.transform_point(&source_points[i]);
                target_points.iter().any(|t| (transformed - t).norm() <= self.config.delta)
            })
            .collect();
        let fitness_score = if inliers.is_empty() {
            T::zero()
        } else {
            let total: T = inliers
                .iter()
                .map(|&i| {
                    let transformed = best_transform.transform_point(&source_points[i]);
                    target_points.iter().map(|t| (transformed - t).norm()).fold(T::infinity(), |a, b| if b < a { b } else { a })
                })
                .fold(T::zero(), |a, b| a + b);
            total / num_traits::cast(inliers.len()).unwrap()
        };

        RegistrationResult {
            success: true,
            transform: best_transform,
            fitness_score,
            inliers,
            iterations: 1,
            converged: true,
            termination_reason: TerminationReason::ConvergedError,
            history: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::coarse::CoarseRegistration;
    use nalgebra::Vector3;

    #[test]
    fn grid_pair_search_agrees_with_brute_force() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(2.5, 2.5, 0.0),
        ];
        let mut grid_pairs = find_pairs_in_range_grid(&points, 1.0, 0.01);
        let mut brute_pairs = super::super::four_pcs::find_pairs_in_range(&points, 1.0, 0.01);
        grid_pairs.sort();
        brute_pairs.sort();
        assert_eq!(grid_pairs, brute_pairs);
    }

    #[test]
    fn identity_clouds_yield_near_identity_transform() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.5, 0.5, 0.0),
            Point3::new(2.0, 0.3, 0.0),
        ];
        let super4pcs = Super4Pcs::new(Super4PcsConfiguration { delta: 0.05, base_attempts: 500, seed: 1 });
        let result = super4pcs.register(&points, &points, &[]);
        assert!(result.success);
        assert!(result.transform.translation.vector.norm() < 0.2);
    }

    #[test]
    fn too_few_points_fails_cleanly() {
        let super4pcs: Super4Pcs<f64> = Super4Pcs::new(Super4PcsConfiguration::default());
        let points = vec![Point3::new(0.0, 0.0, 0.0); 2];
        let result = super4pcs.register(&points, &points, &[]);
        assert!(!result.success);
    }

    #[test]
    fn recovers_a_pure_translation_on_a_larger_planar_grid() {
        let mut points = Vec::new();
        for x in 0..8 {
            for y in 0..8 {
                points.push(Point3::new(x as f64, y as f64, 0.0));
            }
        }
        let translation = Vector3::new(0.3, 0.2, 0.0);
        let target: Vec<_> = points.iter().map(|p| p + translation).collect();

        let super4pcs = Super4Pcs::new(Super4PcsConfiguration { delta: 0.1, base_attempts: 1000, seed: 3 });
        let result = super4pcs.register(&points, &target, &[]);
        assert!(result.success);
        assert!((result.transform.translation.vector - translation).norm() < 0.3);
    }
}
