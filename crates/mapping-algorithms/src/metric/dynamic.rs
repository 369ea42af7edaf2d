//! Runtime metric selection by name.
//!
//! [`Metric`](super::Metric) is already object-safe, so [`DynMetric`] is
//! simply an alias for `dyn Metric<T>`; the real addition here is
//! [`MetricRegistry`], which maps a string name to a boxed metric the way
//! `toolbox::metrics::metric_factory` does in the original toolbox.

use super::{
    Angular, Bhattacharyya, ChiSquared, Cosine, Emd, Hellinger, HistogramIntersection,
    InnerProduct, JensenShannon, KlDivergence, Metric, NormalizedAngular, Pearson, L1, L2, LInf,
};
use crate::point_cloud::Scalar;
use std::collections::HashMap;

/// An object-safe metric, selected and invoked through a trait object.
pub type DynMetric<T> = dyn Metric<T>;

/// A name -> metric factory registry, used to select a metric by a
/// configuration string rather than a compile-time type parameter.
pub struct MetricRegistry<T: Scalar> {
    factories: HashMap<String, Box<dyn Fn() -> Box<dyn Metric<T>> + Send + Sync>>,
}

impl<T: Scalar + 'static> Default for MetricRegistry<T> {
    fn default() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("l1", || Box::new(L1));
        registry.register("l2", || Box::new(L2));
        registry.register("linf", || Box::new(LInf));
        registry.register("chi_squared", || Box::new(ChiSquared));
        registry.register("histogram_intersection", || Box::new(HistogramIntersection));
        registry.register("bhattacharyya", || Box::new(Bhattacharyya));
        registry.register("hellinger", || Box::new(Hellinger));
        registry.register("emd", || Box::new(Emd));
        registry.register("kl_divergence", || Box::new(KlDivergence));
        registry.register("jensen_shannon", || Box::new(JensenShannon));
        registry.register("cosine", || Box::new(Cosine));
        registry.register("angular", || Box::new(Angular));
        registry.register("normalized_angular", || Box::new(NormalizedAngular));
        registry.register("pearson", || Box::new(Pearson));
        registry.register("inner_product", || Box::new(InnerProduct));
        registry
    }
}

impl<T: Scalar + 'static> MetricRegistry<T> {
    /// Registers (or overwrites) a named metric factory.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Metric<T>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Constructs the metric registered under `name`, or `None` if no such
    /// metric is registered.
    pub fn create(&self, name: &str) -> Option<Box<dyn Metric<T>>> {
        self.factories.get(name).map(|factory| factory())
    }

    /// Names currently registered, for diagnostics and CLI help text.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_resolves_default_metrics_by_name() {
        let registry: MetricRegistry<f64> = MetricRegistry::default();
        let l2 = registry.create("l2").expect("l2 should be registered");
        assert_eq!(l2.distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert!(registry.create("no-such-metric").is_none());
    }

    #[test]
    fn custom_metric_can_be_registered() {
        let mut registry: MetricRegistry<f64> = MetricRegistry::default();
        registry.register("always_one", || {
            Box::new(crate::metric::LambdaMetric::new(|_: &[f64], _: &[f64]| 1.0))
        });
        assert_eq!(registry.create("always_one").unwrap().distance(&[], &[]), 1.0);
    }
}
