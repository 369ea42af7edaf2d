use super::{Neighbor, NeighborSearch, PARALLEL_THRESHOLD};
use crate::metric::{Metric, L2};
use crate::point_cloud::Scalar;
use nalgebra::Point3;

/// A single-threaded (or, above a size threshold, data-parallel) exhaustive
/// search, correct for every [`Metric`]. This is the baseline every other
/// index is validated against in this crate's tests.
pub struct BruteForceSearch<'a, T: Scalar, M: Metric<T> = L2> {
    points: &'a [Point3<T>],
    metric: M,
    parallel_enabled: bool,
}

impl<'a, T: Scalar, M: Metric<T>> BruteForceSearch<'a, T, M> {
    /// Builds a brute-force index over `points` under `metric`. Parallel
    /// execution (see [`Self::enable_parallel`]) is on by default and is
    /// only actually used once `points.len()` exceeds
    /// [`super::PARALLEL_THRESHOLD`].
    pub fn new(points: &'a [Point3<T>], metric: M) -> Self {
        Self {
            points,
            metric,
            parallel_enabled: true,
        }
    }

    /// Enables or disables the parallel code path; disabling it (matching
    /// the `enable_parallel(false)`) guarantees a bit-reproducible,
    /// single-threaded scan regardless of cloud size.
    pub fn enable_parallel(mut self, enabled: bool) -> Self {
        self.parallel_enabled = enabled;
        self
    }

    fn use_parallel(&self) -> bool {
        self.parallel_enabled && self.points.len() >= PARALLEL_THRESHOLD
    }

    fn all_distances(&self, query: &Point3<T>) -> Vec<(usize, T)> {
        let compute = |(idx, point): (usize, &Point3<T>)| {
            (idx, self.metric.distance(query.coords.as_slice(), point.coords.as_slice()))
        };

        #[cfg(feature = "parallel")]
        if self.use_parallel() {
            use rayon::prelude::*;
            return self
                .points
                .par_iter()
                .enumerate()
                .map(compute)
                .collect();
        }

        self.points.iter().enumerate().map(compute).collect()
    }
}

impl<'a, T: Scalar, M: Metric<T>> NeighborSearch<T> for BruteForceSearch<'a, T, M> {
    fn k_nearest(&self, query: &Point3<T>, k: usize) -> Vec<Neighbor<T>> {
        if self.points.is_empty() || k == 0 {
            return Vec::new();
        }
        let mut distances = self.all_distances(query);
        distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
        distances.truncate(k);
        distances
    }

    fn radius(&self, query: &Point3<T>, r: T) -> Vec<Neighbor<T>> {
        if self.points.is_empty() || r <= T::zero() {
            return Vec::new();
        }
        let mut distances: Vec<_> = self
            .all_distances(query)
            .into_iter()
            .filter(|&(_, d)| d <= r)
            .collect();
        distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
        distances
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::L2;

    fn sample() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
        ]
    }

    #[test]
    fn k_nearest_sorts_ascending_with_index_tie_break() {
        let points = sample();
        let index = BruteForceSearch::new(&points, L2);
        let result = index.k_nearest(&Point3::new(1.5, 0.0, 0.0), 2);
        assert_eq!(result, vec![(1, 0.5), (2, 0.5)]);
    }

    #[test]
    fn radius_query_filters_and_sorts() {
        let points = sample();
        let index = BruteForceSearch::new(&points, L2);
        let result = index.radius(&Point3::new(0.0, 0.0, 0.0), 1.5);
        assert_eq!(result, vec![(0, 0.0), (1, 1.0)]);
    }

    #[test]
    fn empty_index_or_nonpositive_query_returns_empty() {
        let points: Vec<Point3<f64>> = Vec::new();
        let index = BruteForceSearch::new(&points, L2);
        assert!(index.k_nearest(&Point3::origin(), 3).is_empty());

        let points = sample();
        let index = BruteForceSearch::new(&points, L2);
        assert!(index.radius(&Point3::origin(), 0.0).is_empty());
        assert!(index.k_nearest(&Point3::origin(), 0).is_empty());
    }
}
