use super::{Correspondence, CorrespondenceStats};
use crate::descriptors::Signature;
use crate::metric::{Metric, L2};
use crate::point_cloud::Scalar;

/// Parameters shared by every correspondence generator.
#[derive(Debug, Clone, Copy)]
pub struct CorrespondenceParams<T: Scalar> {
    /// Lowe's ratio test threshold, `d1/d2 <= ratio` to keep a match. Must lie
    /// in `(0, 1]`.
    pub ratio: T,
    /// Whether to additionally require the match to be mutually nearest.
    pub mutual_verification: bool,
    /// An optional absolute descriptor-distance cutoff.
    pub distance_threshold: Option<T>,
}

/// Consumes two descriptor sets and produces filtered, source-ascending
/// correspondences plus the filtering statistics.
pub trait CorrespondenceGenerator<T: Scalar> {
    /// Generates correspondences from `source` descriptors to `target`
    /// descriptors, under `metric`.
    fn generate(
        &self,
        source: &[Signature<T>],
        target: &[Signature<T>],
        metric: &dyn Metric<T>,
        params: &CorrespondenceParams<T>,
    ) -> (Vec<Correspondence<T>>, CorrespondenceStats);
}

struct Candidate<T: Scalar> {
    source_index: usize,
    best: (usize, T),
    second: Option<(usize, T)>,
}

fn two_nearest<T: Scalar>(query: &Signature<T>, targets: &[Signature<T>], metric: &dyn Metric<T>) -> Option<((usize, T), Option<(usize, T)>)> {
    let mut best: Option<(usize, T)> = None;
    let mut second: Option<(usize, T)> = None;
    for (idx, candidate) in targets.iter().enumerate() {
        let d = query.distance_with(candidate, metric);
        match best {
            None => best = Some((idx, d)),
            Some((_, bd)) if d < bd => {
                second = best;
                best = Some((idx, d));
            }
            _ => match second {
                None => second = Some((idx, d)),
                Some((_, sd)) if d < sd => second = Some((idx, d)),
                _ => {}
            },
        }
    }
    best.map(|b| (b, second))
}

fn best_source_for_target<T: Scalar>(target_idx: usize, source: &[Signature<T>], target: &[Signature<T>], metric: &dyn Metric<T>) -> Option<usize> {
    source
        .iter()
        .enumerate()
        .map(|(i, s)| (i, s.distance_with(&target[target_idx], metric)))
        .fold(None, |acc: Option<(usize, T)>, (i, d)| match acc {
            Some((_, bd)) if bd <= d => acc,
            _ => Some((i, d)),
        })
        .map(|(i, _)| i)
}

fn finalize<T: Scalar>(
    candidates: Vec<Candidate<T>>,
    source: &[Signature<T>],
    target: &[Signature<T>],
    metric: &dyn Metric<T>,
    params: &CorrespondenceParams<T>,
) -> (Vec<Correspondence<T>>, CorrespondenceStats) {
    let mut stats = CorrespondenceStats {
        total_candidates: candidates.len(),
        ..Default::default()
    };

    let mut after_ratio: Vec<(usize, usize, T)> = Vec::new();
    for c in candidates {
        let passes_ratio = match c.second {
            None => true,
            Some((_, d2)) if d2 > T::zero() => (c.best.1 / d2) <= params.ratio,
            Some(_) => true,
        };
        if passes_ratio {
            stats.ratio_test_passed += 1;
            after_ratio.push((c.source_index, c.best.0, c.best.1));
        }
    }

    let after_distance: Vec<(usize, usize, T)> = match params.distance_threshold {
        Some(threshold) => {
            let kept: Vec<_> = after_ratio.into_iter().filter(|&(_, _, d)| d <= threshold).collect();
            stats.distance_test_passed = kept.len();
            kept
        }
        None => {
            stats.distance_test_passed = after_ratio.len();
            after_ratio
        }
    };

    let final_pairs: Vec<(usize, usize, T)> = if params.mutual_verification {
        let kept: Vec<_> = after_distance
            .into_iter()
            .filter(|&(s, t, _)| best_source_for_target(t, source, target, metric) == Some(s))
            .collect();
        stats.mutual_test_passed = kept.len();
        kept
    } else {
        after_distance
    };

    let mut correspondences: Vec<Correspondence<T>> = final_pairs
        .into_iter()
        .map(|(source_index, target_index, distance)| Correspondence {
            source_index,
            target_index,
            distance,
        })
        .collect();
    correspondences.sort_by_key(|c| c.source_index);
    (correspondences, stats)
}

/// Builds candidate matches by scanning target descriptors per source
/// descriptor, keeping the two nearest. The name mirrors the "KNN
/// generator"; see this module's doc comment for why it is not backed by
/// [`crate::neighbor_search`].
#[derive(Debug, Clone, Copy, Default)]
pub struct KnnCorrespondenceGenerator;

impl<T: Scalar> CorrespondenceGenerator<T> for KnnCorrespondenceGenerator {
    fn generate(
        &self,
        source: &[Signature<T>],
        target: &[Signature<T>],
        metric: &dyn Metric<T>,
        params: &CorrespondenceParams<T>,
    ) -> (Vec<Correspondence<T>>, CorrespondenceStats) {
        let candidates: Vec<Candidate<T>> = source
            .iter()
            .enumerate()
            .filter_map(|(i, s)| two_nearest(s, target, metric).map(|(best, second)| Candidate { source_index: i, best, second }))
            .collect();
        finalize(candidates, source, target, metric, params)
    }
}

/// Computes every source-target descriptor distance directly (optionally
/// data-parallel above [`crate::neighbor_search::PARALLEL_THRESHOLD`]
/// source descriptors).
#[derive(Debug, Clone, Copy)]
pub struct BruteForceCorrespondenceGenerator {
    /// Whether to use rayon's data parallelism across source descriptors.
    pub parallel: bool,
}

impl Default for BruteForceCorrespondenceGenerator {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl<T: Scalar> CorrespondenceGenerator<T> for BruteForceCorrespondenceGenerator
where
    T: Send + Sync,
{
    fn generate(
        &self,
        source: &[Signature<T>],
        target: &[Signature<T>],
        metric: &dyn Metric<T>,
        params: &CorrespondenceParams<T>,
    ) -> (Vec<Correspondence<T>>, CorrespondenceStats) {
        let compute = |(i, s): (usize, &Signature<T>)| two_nearest(s, target, metric).map(|(best, second)| Candidate { source_index: i, best, second });

        #[cfg(feature = "parallel")]
        let candidates: Vec<Candidate<T>> = if self.parallel && source.len() >= crate::neighbor_search::PARALLEL_THRESHOLD {
            use rayon::prelude::*;
            source.par_iter().enumerate().filter_map(compute).collect()
        } else {
            source.iter().enumerate().filter_map(compute).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let candidates: Vec<Candidate<T>> = source.iter().enumerate().filter_map(compute).collect();

        finalize(candidates, source, target, metric, params)
    }
}

impl<T: Scalar> Default for CorrespondenceParams<T> {
    fn default() -> Self {
        Self {
            ratio: T::one(),
            mutual_verification: false,
            distance_threshold: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(values: &[f64]) -> Signature<f64> {
        Signature { bins: values.to_vec() }
    }

    #[test]
    fn ratio_test_rejects_ambiguous_matches() {
        let source = vec![sig(&[0.0, 0.0])];
        let target = vec![sig(&[0.0, 0.0]), sig(&[0.01, 0.0])];
        let params = CorrespondenceParams {
            ratio: 0.5,
            mutual_verification: false,
            distance_threshold: None,
        };
        let (correspondences, stats) = KnnCorrespondenceGenerator.generate(&source, &target, &L2, &params);
        assert!(correspondences.is_empty());
        assert_eq!(stats.total_candidates, 1);
        assert_eq!(stats.ratio_test_passed, 0);
    }

    #[test]
    fn mutual_verification_discards_a_spurious_extra_target() {
        let source = vec![sig(&[0.0]), sig(&[10.0]), sig(&[20.0])];
        let target = vec![sig(&[0.0]), sig(&[10.0]), sig(&[20.0]), sig(&[0.1])];
        let params = CorrespondenceParams {
            ratio: 1.0,
            mutual_verification: true,
            distance_threshold: None,
        };
        let (correspondences, stats) = KnnCorrespondenceGenerator.generate(&source, &target, &L2, &params);
        assert_eq!(correspondences.len(), 3);
        assert_eq!(stats.mutual_test_passed, 3);
        for c in &correspondences {
            assert_eq!(c.source_index, c.target_index.min(2));
        }
    }

    #[test]
    fn distance_threshold_drops_far_matches() {
        let source = vec![sig(&[0.0]), sig(&[100.0])];
        let target = vec![sig(&[0.0]), sig(&[100.5])];
        let params = CorrespondenceParams {
            ratio: 1.0,
            mutual_verification: false,
            distance_threshold: Some(1.0),
        };
        let (correspondences, _stats) = KnnCorrespondenceGenerator.generate(&source, &target, &L2, &params);
        assert_eq!(correspondences.len(), 1);
        assert_eq!(correspondences[0].source_index, 0);
    }
}
