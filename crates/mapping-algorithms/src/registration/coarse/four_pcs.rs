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

use super::RegistrationAlgorithm;
use crate::correspondence::Correspondence;
use crate::point_cloud::Scalar;
use crate::registration::{umeyama_alignment, RegistrationResult, RigidTransform, TerminationReason};
use nalgebra::Point3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;

/// A coplanar 4-point base: two point pairs `(b0, b1)` and `(b2, b3)` whose
/// segments cross (approximately) at `intersection`, with `r1`/`r2` the
/// affine ratios at which the crossing splits each segment — the
/// rigid-invariant signature 4PCS matches against the target.
pub(crate) struct Base {
    pub(crate) indices: [usize; 4],
    pub(crate) intersection: Point3<f64>,
    pub(crate) r1: f64,
    pub(crate) r2: f64,
    pub(crate) d1: f64,
    pub(crate) d2: f64,
}

pub(crate) fn to_f64<T: Scalar>(p: &Point3<T>) -> Point3<f64> {
    Point3::new(p.x.to_f64().unwrap(), p.y.to_f64().unwrap(), p.z.to_f64().unwrap())
}

/// Finds the closest-approach point of segments `(a, b)` and `(c, d)` and
/// the affine parameters at which each segment is split there. Returns
/// `None` when the segments are (numerically) parallel.
pub(crate) fn segment_intersection(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> Option<(Point3<f64>, f64, f64)> {
    let u = b - a;
    let v = d - c;
    let w = a - c;
    let uu = u.dot(&u);
    let uv = u.dot(&v);
    let vv = v.dot(&v);
    let uw = u.dot(&w);
    let vw = v.dot(&w);
    let denom = uu * vv - uv * uv;
    if denom.abs() < 1e-12 {
        return None;
    }
    let s = (uv * vw - vv * uw) / denom;
    let t = (uu * vw - uv * uw) / denom;
    if !(0.0..=1.0).contains(&s) || !(0.0..=1.0).contains(&t) {
        return None;
    }
    let p1 = a + u * s;
    let p2 = c + v * t;
    let mid = Point3::from((p1.coords + p2.coords) * 0.5);
    Some((mid, s, t))
}

/// Samples candidate coplanar 4-point bases from `points`, keeping the one
/// whose diagonals span the largest fraction of the cloud's extent.
/// `attempts` random quadruples are tried; a genuinely planar
/// point cloud may need many attempts to find four points whose diagonals
/// actually cross.
pub(crate) fn pick_base<T: Scalar>(points: &[Point3<T>], attempts: usize, rng: &mut SmallRng) -> Option<Base> {
    if points.len() < 4 {
        return None;
    }
    let pts64: Vec<Point3<f64>> = points.iter().map(to_f64).collect();
    let mut best: Option<Base> = None;
    let mut best_span = 0.0f64;

    for _ in 0..attempts {
        let mut idx = [0usize; 4];
        for slot in idx.iter_mut() {
            *slot = rng.gen_range(0..points.len());
        }
        if idx.iter().collect::<std::collections::HashSet<_>>().len() < 4 {
            continue;
        }
        let (a, b, c, d) = (pts64[idx[0]], pts64[idx[1]], pts64[idx[2]], pts64[idx[3]]);
        let Some((intersection, r1, r2)) = segment_intersection(&a, &b, &c, &d) else { continue };
        let d1 = (b - a).norm();
        let d2 = (d - c).norm();
        let span = d1 + d2;
        if span > best_span {
            best_span = span;
            best = Some(Base { indices: idx, intersection, r1, r2, d1, d2 });
        }
    }
    best
}

/// All unordered point-index pairs in `points` whose Euclidean distance
/// lies within `tolerance` of `distance`. Brute force over every pair,
/// which is where 4PCS gets its documented `O(n^2)` cost in target size;
/// [`super::Super4Pcs`] replaces this with a grid lookup.
pub(crate) fn find_pairs_in_range<T: Scalar>(points: &[Point3<T>], distance: f64, tolerance: f64) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let d = (points[i] - points[j]).norm().to_f64().unwrap();
            if (d - distance).abs() <= tolerance {
                out.push((i, j));
            }
        }
    }
    out
}

/// Candidate target quadruples whose pair distances and crossing ratios
/// match `base` within `delta`.
fn candidate_quads<T: Scalar>(target: &[Point3<T>], base: &Base, delta: f64) -> Vec<[usize; 4]> {
    let pairs1 = find_pairs_in_range(target, base.d1, delta);
    let pairs2 = find_pairs_in_range(target, base.d2, delta);
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

/// Fraction of `source` points lying within `delta` of some point in
/// `target` once `transform` is applied — the Largest Common Pointset
/// score 4PCS uses to pick the best candidate among geometrically
/// consistent quads ("largest common pointset").
pub(crate) fn lcp_score<T: Scalar>(transform: &RigidTransform<T>, source: &[Point3<T>], target: &[Point3<T>], delta: T) -> T {
    if source.is_empty() {
        return T::zero();
    }
    let count = source
        .iter()
        .filter(|s| {
            let transformed = transform.transform_point(s);
            target.iter().any(|t| (transformed - t).norm() <= delta)
        })
        .count();
    num_traits::cast::<usize, T>(count).unwrap() / num_traits::cast(source.len()).unwrap()
}

/// Configuration for [`FourPcs`]/[`super::Super4Pcs`].
#[derive(Debug, Clone, Copy)]
pub struct FourPcsConfiguration<T: Scalar> {
    /// Tolerance (in 3-space distance and in affine-ratio units) used both
    /// to match candidate quads and to score the LCP.
    pub delta: T,
    /// Random base quadruples tried before giving up on this run.
    pub base_attempts: usize,
    /// Seed for reproducible base/quad selection.
    pub seed: u64,
}

impl<T: Scalar> Default for FourPcsConfiguration<T> {
    fn default() -> Self {
        Self { delta: num_traits::cast(0.05).unwrap(), base_attempts: 200, seed: 0xF0C5 }
    }
}

/// 4-Points Congruent Sets coarse registration, independent of descriptors:
/// picks a coplanar 4-point base in source, finds target quads with
/// matching pairwise distances and crossing ratios, verifies each by LCP,
/// and keeps the best.
pub struct FourPcs<T: Scalar> {
    config: FourPcsConfiguration<T>,
    rng: RefCell<SmallRng>,
}

impl<T: Scalar> FourPcs<T> {
    /// Builds a 4PCS registrar from a configuration.
    pub fn new(config: FourPcsConfiguration<T>) -> Self {
        let seed = config.seed;
        Self { config, rng: RefCell::new(SmallRng::seed_from_u64(seed)) }
    }
}

impl<T: Scalar> RegistrationAlgorithm for FourPcs<T> {
    fn name(&self) -> &'static str {
        "4pcs"
    }
}

impl<T: Scalar> super::CoarseRegistration<T> for FourPcs<T> {
    #[cfg_attr(feature = "tracing", tracing::instrument("4PCS Registration", skip_all, level = "debug"))]
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

        for quad in candidate_quads(target_points, &base, delta) {
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
    fn identity_clouds_yield_near_identity_transform() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.5, 0.5, 0.0),
            Point3::new(2.0, 0.3, 0.0),
        ];
        let four_pcs = FourPcs::new(FourPcsConfiguration { delta: 0.05, base_attempts: 500, seed: 1 });
        let result = four_pcs.register(&points, &points, &[]);
        assert!(result.success);
        assert!(result.transform.translation.vector.norm() < 0.2);
    }

    #[test]
    fn too_few_points_fails_cleanly() {
        let four_pcs: FourPcs<f64> = FourPcs::new(FourPcsConfiguration::default());
        let points = vec![Point3::new(0.0, 0.0, 0.0); 2];
        let result = four_pcs.register(&points, &points, &[]);
        assert!(!result.success);
    }

    #[test]
    fn recovers_a_pure_translation_on_a_planar_grid() {
        let mut points = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                points.push(Point3::new(x as f64, y as f64, 0.0));
            }
        }
        let translation = Vector3::new(0.3, 0.2, 0.0);
        let target: Vec<_> = points.iter().map(|p| p + translation).collect();

        let four_pcs = FourPcs::new(FourPcsConfiguration { delta: 0.1, base_attempts: 1000, seed: 3 });
        let result = four_pcs.register(&points, &target, &[]);
        assert!(result.success);
        assert!((result.transform.translation.vector - translation).norm() < 0.3);
    }
}
