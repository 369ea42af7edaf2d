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
use rand::seq::index::sample;
use rand::SeedableRng;
use std::cell::RefCell;

/// Parameters for [`RansacRegistration`].
#[derive(Debug, Clone, Copy)]
pub struct RansacConfiguration<T: Scalar> {
    /// Upper bound on iterations; adaptively shrunk as the best inlier
    /// ratio improves.
    pub max_iterations: usize,
    /// 3-space distance below which a transformed correspondence counts as
    /// an inlier.
    pub inlier_threshold: T,
    /// Desired probability, in `(0, 1)`, of having sampled at least one
    /// all-inlier minimal set by the time iteration stops.
    pub confidence: T,
    /// Points per minimal sample; 3 is Horn's minimum.
    pub sample_size: usize,
    /// Whether to recompute the transform over every inlier after the
    /// search settles on a best sample.
    pub refine_result: bool,
    /// Stop early once the running-best inlier ratio meets this fraction.
    pub early_stop_ratio: T,
    /// Seed for the sampler, for bit-reproducible runs.
    pub seed: u64,
}

/// Builder for [`RansacConfiguration`], mirroring
/// `ICPConfiguration`/`ICPConfigurationBuilder`'s shape.
#[derive(Debug, Clone, Copy)]
pub struct RansacConfigurationBuilder<T: Scalar> {
    config: RansacConfiguration<T>,
}

impl<T: Scalar> RansacConfiguration<T> {
    /// Starts a builder seeded with the defaults the S3 scenario
    /// exercises (`max_iterations=1000`, `inlier_threshold=0.05`,
    /// `confidence=0.99`).
    pub fn builder() -> RansacConfigurationBuilder<T> {
        RansacConfigurationBuilder {
            config: RansacConfiguration {
                max_iterations: 1000,
                inlier_threshold: num_traits::cast(0.05).unwrap(),
                confidence: num_traits::cast(0.99).unwrap(),
                sample_size: 3,
                refine_result: true,
                early_stop_ratio: T::one(),
                seed: 0x5EED,
            },
        }
    }
}

impl<T: Scalar> RansacConfigurationBuilder<T> {
    /// Sets the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }
    /// Sets the inlier distance threshold.
    pub fn with_inlier_threshold(mut self, inlier_threshold: T) -> Self {
        self.config.inlier_threshold = inlier_threshold;
        self
    }
    /// Sets the target confidence.
    pub fn with_confidence(mut self, confidence: T) -> Self {
        self.config.confidence = confidence;
        self
    }
    /// Sets the minimal sample size (at least 3).
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.config.sample_size = sample_size.max(3);
        self
    }
    /// Sets whether to refine over all inliers after sampling.
    pub fn with_refine_result(mut self, refine_result: bool) -> Self {
        self.config.refine_result = refine_result;
        self
    }
    /// Sets the early-stop inlier ratio.
    pub fn with_early_stop_ratio(mut self, early_stop_ratio: T) -> Self {
        self.config.early_stop_ratio = early_stop_ratio;
        self
    }
    /// Sets the sampler seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }
    /// Finalises the configuration.
    pub fn build(self) -> RansacConfiguration<T> {
        self.config
    }
}

/// RANSAC rigid-transform estimation from descriptor correspondences:
/// sample a minimal set, estimate via Umeyama SVD, count
/// inliers, adaptively shrink the remaining iteration budget, optionally
/// refine over every inlier at the end.
pub struct RansacRegistration<T: Scalar> {
    config: RansacConfiguration<T>,
    rng: RefCell<SmallRng>,
}

impl<T: Scalar> RansacRegistration<T> {
    /// Builds a RANSAC registrar from a configuration.
    pub fn new(config: RansacConfiguration<T>) -> Self {
        let seed = config.seed;
        Self { config, rng: RefCell::new(SmallRng::seed_from_u64(seed)) }
    }
}

impl<T: Scalar> RegistrationAlgorithm for RansacRegistration<T> {
    fn name(&self) -> &'static str {
        "ransac"
    }
}

fn count_inliers<T: Scalar>(transform: &RigidTransform<T>, source: &[Point3<T>], target: &[Point3<T>], threshold: T) -> (Vec<usize>, T) {
    let mut inliers = Vec::new();
    let mut total = T::zero();
    for (i, (s, t)) in source.iter().zip(target.iter()).enumerate() {
        let d = (transform.transform_point(s) - t).norm();
        if d <= threshold {
            inliers.push(i);
            total = total + d;
        }
    }
    (inliers, total)
}

impl<T: Scalar> super::CoarseRegistration<T> for RansacRegistration<T> {
    #[cfg_attr(feature = "tracing", tracing::instrument("RANSAC Registration", skip_all, level = "debug"))]
    fn register(&self, source_points: &[Point3<T>], target_points: &[Point3<T>], correspondences: &[Correspondence<T>]) -> RegistrationResult<T> {
        if correspondences.len() < self.config.sample_size {
            return RegistrationResult::failure(TerminationReason::TooFewCorrespondences);
        }

        let src: Vec<Point3<T>> = correspondences.iter().map(|c| source_points[c.source_index]).collect();
        let tgt: Vec<Point3<T>> = correspondences.iter().map(|c| target_points[c.target_index]).collect();
        let n = src.len();

        let mut best_transform = RigidTransform::identity();
        let mut best_inliers: Vec<usize> = Vec::new();
        let mut remaining_iterations = self.config.max_iterations;
        let mut iterations_run = 0usize;

        let mut rng = self.rng.borrow_mut();
        let mut iter = 0usize;
        while iter < remaining_iterations.max(1) && iter < self.config.max_iterations {
            iterations_run = iter + 1;
            let sample_indices: Vec<usize> = sample(&mut *rng, n, self.config.sample_size).into_vec();
            let sample_src: Vec<Point3<T>> = sample_indices.iter().map(|&i| src[i]).collect();
            let sample_tgt: Vec<Point3<T>> = sample_indices.iter().map(|&i| tgt[i]).collect();

            let Ok(candidate) = umeyama_alignment(&sample_src, &sample_tgt) else {
                iter += 1;
                continue;
            };
            let (inliers, _) = count_inliers(&candidate, &src, &tgt, self.config.inlier_threshold);

            if inliers.len() > best_inliers.len() {
                best_inliers = inliers;
                best_transform = candidate;

                let inlier_ratio: T = num_traits::cast(best_inliers.len()).unwrap() / num_traits::cast(n).unwrap();
                if inlier_ratio >= self.config.early_stop_ratio {
                    break;
                }
                if inlier_ratio > T::zero() && inlier_ratio < T::one() {
                    let p_no_outliers = T::one() - inlier_ratio.powi(self.config.sample_size as i32);
                    if p_no_outliers < T::one() && p_no_outliers > T::zero() {
                        let log_p_no_outliers = p_no_outliers.ln();
                        if log_p_no_outliers < T::zero() {
                            let adaptive: T = (T::one() - self.config.confidence).ln() / log_p_no_outliers;
                            let adaptive_usize = adaptive.to_f64().unwrap_or(f64::INFINITY).ceil();
                            if adaptive_usize.is_finite() && (adaptive_usize as usize) < remaining_iterations {
                                remaining_iterations = (adaptive_usize as usize).max(1);
                            }
                        }
                    }
                }
            }
            iter += 1;
        }
        drop(rng);

        if best_inliers.is_empty() {
            return RegistrationResult::failure(TerminationReason::TooFewCorrespondences);
        }

        let final_transform = if self.config.refine_result && best_inliers.len() >= self.config.sample_size {
            let inlier_src: Vec<Point3<T>> = best_inliers.iter().map(|&i| src[i]).collect();
            let inlier_tgt: Vec<Point3<T>> = best_inliers.iter().map(|&i| tgt[i]).collect();
            umeyama_alignment(&inlier_src, &inlier_tgt).unwrap_or(best_transform)
        } else {
            best_transform
        };

        let (final_inliers, total_distance) = count_inliers(&final_transform, &src, &tgt, self.config.inlier_threshold);
        let fitness_score = if final_inliers.is_empty() {
            T::zero()
        } else {
            total_distance / num_traits::cast(final_inliers.len()).unwrap()
        };

        RegistrationResult {
            success: true,
            transform: final_transform,
            fitness_score,
            inliers: final_inliers,
            iterations: iterations_run,
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
    use rand::Rng;

    fn corr<T: Scalar>(i: usize, j: usize, d: T) -> Correspondence<T> {
        Correspondence { source_index: i, target_index: j, distance: d }
    }

    #[test]
    fn recovers_transform_with_seventy_percent_outliers() {
        let mut rng = SmallRng::seed_from_u64(7);
        let translation = Vector3::new(2.0f64, 1.0, 0.5);

        let mut source = Vec::new();
        let mut target = Vec::new();
        let mut correspondences = Vec::new();
        for i in 0..30 {
            let p = Point3::new(rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0));
            let noise = Vector3::new(rng.gen_range(-0.01..0.01), rng.gen_range(-0.01..0.01), rng.gen_range(-0.01..0.01));
            source.push(p);
            target.push(p + translation + noise);
            correspondences.push(corr(i, i, 0.0));
        }
        for i in 0..70 {
            let s = Point3::new(rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0));
            let t = Point3::new(rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0));
            let idx = 30 + i;
            source.push(s);
            target.push(t);
            correspondences.push(corr(idx, idx, 0.0));
        }

        let ransac = RansacRegistration::new(
            RansacConfiguration::builder()
                .with_max_iterations(1000)
                .with_inlier_threshold(0.05)
                .with_confidence(0.99)
                .build(),
        );
        let result = ransac.register(&source, &target, &correspondences);
        assert!(result.success);
        assert!(result.inliers.len() >= 25, "expected >= 25 inliers, got {}", result.inliers.len());
        assert!((result.transform.translation.vector - translation).norm() < 0.05);
    }

    #[test]
    fn too_few_correspondences_fails_cleanly() {
        let ransac = RansacRegistration::new(RansacConfiguration::builder().build());
        let result = ransac.register(&[], &[], &[]);
        assert!(!result.success);
        assert_eq!(result.termination_reason, TerminationReason::TooFewCorrespondences);
    }
}
