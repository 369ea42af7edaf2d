use super::Metric;
use crate::point_cloud::Scalar;

/// A weighted linear combination of other metrics: `sum(weight_i * metric_i(a, b))`.
pub struct WeightedSum<T: Scalar> {
    components: Vec<(T, Box<dyn Metric<T>>)>,
}

impl<T: Scalar> WeightedSum<T> {
    /// Builds a weighted sum from `(weight, metric)` pairs. Weights are not
    /// required to sum to 1; callers wanting a normalised combination should
    /// divide each weight by their sum beforehand.
    pub fn new(components: Vec<(T, Box<dyn Metric<T>>)>) -> Self {
        Self { components }
    }
}

impl<T: Scalar> Metric<T> for WeightedSum<T> {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        self.components
            .iter()
            .fold(T::zero(), |acc, (weight, metric)| {
                acc + *weight * metric.distance(a, b)
            })
    }
}

/// Scales each dimension before delegating to an inner metric: useful when
/// descriptor dimensions carry different units or reliabilities.
pub struct ScaledMetric<T: Scalar, M: Metric<T>> {
    scales: Vec<T>,
    inner: M,
}

impl<T: Scalar, M: Metric<T>> ScaledMetric<T, M> {
    /// Builds a per-dimension-scaled metric; `scales.len()` must match the
    /// length of the vectors this metric is later called with.
    pub fn new(scales: Vec<T>, inner: M) -> Self {
        Self { scales, inner }
    }
}

impl<T: Scalar, M: Metric<T>> Metric<T> for ScaledMetric<T, M> {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        if a.len() != self.scales.len() || b.len() != self.scales.len() {
            return self.inner.distance(a, b);
        }
        let scaled_a: Vec<T> = a.iter().zip(&self.scales).map(|(&x, &s)| x * s).collect();
        let scaled_b: Vec<T> = b.iter().zip(&self.scales).map(|(&x, &s)| x * s).collect();
        self.inner.distance(&scaled_a, &scaled_b)
    }
}

/// A metric backed by a user-supplied closure, for bespoke distance
/// functions that don't warrant a dedicated type.
pub struct LambdaMetric<T: Scalar, F: Fn(&[T], &[T]) -> T + Send + Sync> {
    f: F,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Scalar, F: Fn(&[T], &[T]) -> T + Send + Sync> LambdaMetric<T, F> {
    /// Wraps `f` as a [`Metric`].
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Scalar, F: Fn(&[T], &[T]) -> T + Send + Sync> Metric<T> for LambdaMetric<T, F> {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        (self.f)(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{L1, L2};

    #[test]
    fn weighted_sum_combines_components() {
        let combo: WeightedSum<f64> = WeightedSum::new(vec![
            (0.5, Box::new(L1)),
            (0.5, Box::new(L2)),
        ]);
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        // L1 = 7, L2 = 5, weighted = 0.5*7 + 0.5*5 = 6
        assert!((combo.distance(&a, &b) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn lambda_metric_calls_through() {
        let m = LambdaMetric::new(|a: &[f64], b: &[f64]| {
            a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
        });
        assert!((m.distance(&[1.0, 2.0], &[3.0, 5.0]) - 5.0).abs() < 1e-9);
    }
}
