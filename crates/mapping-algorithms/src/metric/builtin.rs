use super::{safe_acos, safe_ln, Metric, MetricProperties};
use crate::point_cloud::Scalar;

macro_rules! zero_on_empty {
    ($a:expr, $b:expr, $zero:expr) => {
        if $a.is_empty() || $b.is_empty() {
            return $zero;
        }
    };
}

/// L1 (Manhattan / city-block) distance: `sum(|a_i - b_i|)`.
#[derive(Copy, Clone, Debug, Default)]
pub struct L1;

impl<T: Scalar> Metric<T> for L1 {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        zero_on_empty!(a, b, T::zero());
        a.iter()
            .zip(b)
            .fold(T::zero(), |acc, (&x, &y)| acc + (x - y).abs())
    }
}
impl MetricProperties for L1 {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = false;
}

/// L2 (Euclidean) distance: `sqrt(sum((a_i - b_i)^2))`.
#[derive(Copy, Clone, Debug, Default)]
pub struct L2;

impl<T: Scalar> Metric<T> for L2 {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        self.squared_distance(a, b).sqrt()
    }

    fn squared_distance(&self, a: &[T], b: &[T]) -> T {
        zero_on_empty!(a, b, T::zero());
        a.iter()
            .zip(b)
            .fold(T::zero(), |acc, (&x, &y)| acc + (x - y) * (x - y))
    }
}
impl MetricProperties for L2 {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = true;
    const REQUIRES_POSITIVE_VALUES: bool = false;
}

/// L∞ (Chebyshev) distance: `max(|a_i - b_i|)`.
#[derive(Copy, Clone, Debug, Default)]
pub struct LInf;

impl<T: Scalar> Metric<T> for LInf {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        zero_on_empty!(a, b, T::zero());
        a.iter()
            .zip(b)
            .fold(T::zero(), |acc, (&x, &y)| acc.max((x - y).abs()))
    }
}
impl MetricProperties for LInf {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = false;
}

/// General Lp distance: `(sum(|a_i - b_i|^p))^(1/p)`, with `p` chosen at
/// runtime (unlike the original toolbox's compile-time `LpMetric<T, P>`,
/// which this mirrors but does not need the const-generic form of, since
/// `p` is rarely known at compile time by callers of this crate).
#[derive(Copy, Clone, Debug)]
pub struct Lp<T> {
    /// The order of the norm.
    pub p: T,
}

impl<T: Scalar> Metric<T> for Lp<T> {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        zero_on_empty!(a, b, T::zero());
        let sum = a
            .iter()
            .zip(b)
            .fold(T::zero(), |acc, (&x, &y)| acc + (x - y).abs().powf(self.p));
        sum.powf(T::one() / self.p)
    }
}
impl<T> MetricProperties for Lp<T> {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = false;
}

/// Chi-squared distance between two histograms: `sum((a_i - b_i)^2 / (a_i + b_i))`,
/// skipping bins where `a_i + b_i` is (near) zero.
#[derive(Copy, Clone, Debug, Default)]
pub struct ChiSquared;

impl<T: Scalar> Metric<T> for ChiSquared {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        zero_on_empty!(a, b, T::zero());
        let eps: T = num_traits::cast(1e-12).unwrap();
        a.iter().zip(b).fold(T::zero(), |acc, (&x, &y)| {
            let denom = x + y;
            if denom <= eps {
                acc
            } else {
                acc + (x - y) * (x - y) / denom
            }
        })
    }
}
impl MetricProperties for ChiSquared {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = true;
}

/// Histogram intersection *distance*: `1 - sum(min(a_i, b_i)) / sum(max(sum(a), sum(b), eps))`.
#[derive(Copy, Clone, Debug, Default)]
pub struct HistogramIntersection;

impl<T: Scalar> Metric<T> for HistogramIntersection {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        zero_on_empty!(a, b, T::zero());
        let intersection = a
            .iter()
            .zip(b)
            .fold(T::zero(), |acc, (&x, &y)| acc + x.min(y));
        let sum_a: T = a.iter().fold(T::zero(), |acc, &x| acc + x);
        let sum_b: T = b.iter().fold(T::zero(), |acc, &x| acc + x);
        let normaliser = sum_a.max(sum_b);
        let eps: T = num_traits::cast(1e-12).unwrap();
        if normaliser <= eps {
            return T::one();
        }
        T::one() - intersection / normaliser
    }
}
impl MetricProperties for HistogramIntersection {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = true;
}

/// Bhattacharyya distance: `-ln(sum(sqrt(a_i * b_i)))`, with both histograms
/// implicitly treated as mass distributions (no internal normalisation is
/// performed; callers pass already-normalised histograms).
#[derive(Copy, Clone, Debug, Default)]
pub struct Bhattacharyya;

impl<T: Scalar> Metric<T> for Bhattacharyya {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        zero_on_empty!(a, b, T::zero());
        let bc = a
            .iter()
            .zip(b)
            .fold(T::zero(), |acc, (&x, &y)| acc + (x * y).max(T::zero()).sqrt());
        -safe_ln(bc)
    }
}
impl MetricProperties for Bhattacharyya {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = true;
}

/// Hellinger distance: `sqrt(1 - sum(sqrt(a_i * b_i)))` (clamped to 0 to
/// absorb floating-point error pushing the radicand slightly negative).
#[derive(Copy, Clone, Debug, Default)]
pub struct Hellinger;

impl<T: Scalar> Metric<T> for Hellinger {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        zero_on_empty!(a, b, T::zero());
        let bc = a
            .iter()
            .zip(b)
            .fold(T::zero(), |acc, (&x, &y)| acc + (x * y).max(T::zero()).sqrt());
        (T::one() - bc).max(T::zero()).sqrt()
    }
}
impl MetricProperties for Hellinger {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = true;
}

/// Earth Mover's Distance in its 1-D cumulative-difference form:
/// `sum(|cumsum(a)_i - cumsum(b)_i|)`, valid for histograms over an ordered
/// set of bins (as all descriptor histograms in this crate are).
#[derive(Copy, Clone, Debug, Default)]
pub struct Emd;

impl<T: Scalar> Metric<T> for Emd {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        zero_on_empty!(a, b, T::zero());
        let mut cum_a = T::zero();
        let mut cum_b = T::zero();
        let mut total = T::zero();
        for (&x, &y) in a.iter().zip(b) {
            cum_a = cum_a + x;
            cum_b = cum_b + y;
            total = total + (cum_a - cum_b).abs();
        }
        total
    }
}
impl MetricProperties for Emd {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = true;
}

/// Kullback-Leibler divergence `sum(p_i * ln(p_i / q_i))`, returning `+inf`
/// wherever `q_i == 0` and `p_i > 0`.
#[derive(Copy, Clone, Debug, Default)]
pub struct KlDivergence;

impl<T: Scalar> Metric<T> for KlDivergence {
    fn distance(&self, p: &[T], q: &[T]) -> T {
        zero_on_empty!(p, q, T::zero());
        let eps: T = num_traits::cast(1e-12).unwrap();
        let mut total = T::zero();
        for (&pi, &qi) in p.iter().zip(q) {
            if pi <= eps {
                continue;
            }
            if qi <= eps {
                return T::infinity();
            }
            total = total + pi * (pi / qi).ln();
        }
        total
    }
}
impl MetricProperties for KlDivergence {
    const IS_SYMMETRIC: bool = false;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = true;
}

/// Jensen-Shannon divergence: the symmetrised, bounded relative of
/// [`KlDivergence`], `0.5 * KL(p, m) + 0.5 * KL(q, m)` with `m = (p + q) / 2`.
#[derive(Copy, Clone, Debug, Default)]
pub struct JensenShannon;

impl<T: Scalar> Metric<T> for JensenShannon {
    fn distance(&self, p: &[T], q: &[T]) -> T {
        zero_on_empty!(p, q, T::zero());
        let half: T = num_traits::cast(0.5).unwrap();
        let eps: T = num_traits::cast(1e-12).unwrap();
        let mut total = T::zero();
        for (&pi, &qi) in p.iter().zip(q) {
            let mi = (pi + qi) * half;
            if mi <= eps {
                continue;
            }
            if pi > eps {
                total = total + half * pi * (pi / mi).ln();
            }
            if qi > eps {
                total = total + half * qi * (qi / mi).ln();
            }
        }
        total
    }
}
impl MetricProperties for JensenShannon {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = true;
}

/// Cosine distance, `1 - cos(theta)`. A zero-norm vector returns the defined
/// maximum of `1`.
#[derive(Copy, Clone, Debug, Default)]
pub struct Cosine;

impl<T: Scalar> Metric<T> for Cosine {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        zero_on_empty!(a, b, T::zero());
        let dot = a.iter().zip(b).fold(T::zero(), |acc, (&x, &y)| acc + x * y);
        let norm_a = a.iter().fold(T::zero(), |acc, &x| acc + x * x).sqrt();
        let norm_b = b.iter().fold(T::zero(), |acc, &x| acc + x * x).sqrt();
        let eps: T = num_traits::cast(1e-12).unwrap();
        if norm_a <= eps || norm_b <= eps {
            return T::one();
        }
        T::one() - (dot / (norm_a * norm_b)).max(-T::one()).min(T::one())
    }
}
impl MetricProperties for Cosine {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = false;
}

/// Angular distance, `acos(cos(theta))`, in radians. A zero-norm vector
/// returns the defined maximum of `pi`.
#[derive(Copy, Clone, Debug, Default)]
pub struct Angular;

impl<T: Scalar> Metric<T> for Angular {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        zero_on_empty!(a, b, T::zero());
        let dot = a.iter().zip(b).fold(T::zero(), |acc, (&x, &y)| acc + x * y);
        let norm_a = a.iter().fold(T::zero(), |acc, &x| acc + x * x).sqrt();
        let norm_b = b.iter().fold(T::zero(), |acc, &x| acc + x * x).sqrt();
        let eps: T = num_traits::cast(1e-12).unwrap();
        if norm_a <= eps || norm_b <= eps {
            return T::pi();
        }
        safe_acos(dot / (norm_a * norm_b))
    }
}
impl MetricProperties for Angular {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = false;
}

/// [`Angular`] normalised to `[0, 1]` by dividing by pi.
#[derive(Copy, Clone, Debug, Default)]
pub struct NormalizedAngular;

impl<T: Scalar> Metric<T> for NormalizedAngular {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        Angular.distance(a, b) / T::pi()
    }
}
impl MetricProperties for NormalizedAngular {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = false;
}

/// Pearson correlation distance, `1 - corr(a, b)`.
#[derive(Copy, Clone, Debug, Default)]
pub struct Pearson;

impl<T: Scalar> Metric<T> for Pearson {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        zero_on_empty!(a, b, T::zero());
        let n: T = num_traits::cast(a.len()).unwrap();
        let mean_a = a.iter().fold(T::zero(), |acc, &x| acc + x) / n;
        let mean_b = b.iter().fold(T::zero(), |acc, &x| acc + x) / n;

        let mut cov = T::zero();
        let mut var_a = T::zero();
        let mut var_b = T::zero();
        for (&x, &y) in a.iter().zip(b) {
            let da = x - mean_a;
            let db = y - mean_b;
            cov = cov + da * db;
            var_a = var_a + da * da;
            var_b = var_b + db * db;
        }

        let eps: T = num_traits::cast(1e-12).unwrap();
        let denom = (var_a * var_b).sqrt();
        if denom <= eps {
            return T::one();
        }
        T::one() - (cov / denom).max(-T::one()).min(T::one())
    }
}
impl MetricProperties for Pearson {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = false;
}

/// Inner-product distance, `-dot(a, b)`, useful when descriptors are
/// normalised and a higher inner product should mean "closer".
#[derive(Copy, Clone, Debug, Default)]
pub struct InnerProduct;

impl<T: Scalar> Metric<T> for InnerProduct {
    fn distance(&self, a: &[T], b: &[T]) -> T {
        zero_on_empty!(a, b, T::zero());
        -a.iter().zip(b).fold(T::zero(), |acc, (&x, &y)| acc + x * y)
    }
}
impl MetricProperties for InnerProduct {
    const IS_SYMMETRIC: bool = true;
    const HAS_SQUARED_FORM: bool = false;
    const REQUIRES_POSITIVE_VALUES: bool = false;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chi_squared_skips_zero_mass_bins() {
        let a = [0.0, 1.0, 2.0];
        let b = [0.0, 1.0, 3.0];
        let d = ChiSquared.distance(&a, &b);
        assert!(d.is_finite());
        assert!(d > 0.0);
    }

    #[test]
    fn kl_divergence_is_infinite_when_q_is_zero_and_p_is_positive() {
        let p = [0.5, 0.5];
        let q = [0.0, 1.0];
        assert!(KlDivergence.distance(&p, &q).is_infinite());
    }

    #[test]
    fn zero_norm_cosine_and_angular_return_documented_maxima() {
        let zero = [0.0, 0.0, 0.0];
        let other = [1.0, 0.0, 0.0];
        assert_eq!(Cosine.distance(&zero, &other), 1.0);
        assert_eq!(Angular.distance(&zero, &other), std::f64::consts::PI);
    }

    #[test]
    fn low_mass_histogram_intersection_returns_defined_maximum() {
        let a = [0.0, 0.0, 0.0];
        let b = [0.0, 0.0, 0.0];
        assert_eq!(HistogramIntersection.distance(&a, &b), 1.0);
    }

    #[test]
    fn l2_matches_nalgebra_vector_distance() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 6.0, 3.0];
        assert!((L2.distance(&a, &b) - 5.0).abs() < 1e-9);
        assert!((L2.squared_distance(&a, &b) - 25.0).abs() < 1e-9);
    }
}
