//! Concurrent metric registry
//!
//! The [`MetricsRegistry`] maps metric names to their aggregators. The first
//! measure registered under a name creates the aggregator and fixes the
//! value type of that metric until the registry is cleared.
//!
//! ```rust
//! use metrics_crawler::{reducer, MetricsRegistry, RegistryConfig};
//! use std::time::Instant;
//!
//! let registry = MetricsRegistry::with_config(RegistryConfig::with_sampling_size(16));
//! let float = reducer::float();
//!
//! registry.register_measure("m", Instant::now(), 1.0, &float).unwrap();
//! registry.register_measure("m", Instant::now(), 5.0, &float).unwrap();
//!
//! let snapshot = registry.get_metric("m").unwrap();
//! assert_eq!(snapshot.total_hits(), 2);
//! assert_eq!(snapshot.formatted_average(), "3");
//! ```

use crate::aggregator::{Aggregator, DynAggregator};
use crate::clock::{Clock, SystemClock};
use crate::config::RegistryConfig;
use crate::error::{CrawlerError, Result};
use crate::naming::build_name;
use crate::reducer::{Measurable, Reducer};
use crate::snapshot::{DynSnapshot, Snapshot};
use log::debug;
use parking_lot::RwLock;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Thread-safe name to aggregator map
#[derive(Debug)]
pub struct MetricsRegistry {
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    metrics: RwLock<BTreeMap<String, Arc<dyn DynAggregator>>>,
}

impl MetricsRegistry {
    /// Registry with the default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Registry stamping measures recorded through [`record`](Self::record)
    /// with `clock`
    pub fn with_clock(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            metrics: RwLock::new(BTreeMap::new()),
        }
    }

    /// Process-wide registry with the default configuration
    ///
    /// Meant for instrumentation that has no registry handed to it; code that
    /// can take a registry explicitly should do so.
    pub fn global() -> &'static MetricsRegistry {
        static GLOBAL: OnceLock<MetricsRegistry> = OnceLock::new();
        GLOBAL.get_or_init(MetricsRegistry::new)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Window capacity of every metric created by this registry
    pub fn sampling_size(&self) -> usize {
        self.config.sampling_size
    }

    /// Current instant of the registry clock
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Register a measure under `name`
    ///
    /// Creates the metric on first use. Fails with
    /// [`CrawlerError::IncorrectMeasureType`] if the metric already holds
    /// another value type, and with [`CrawlerError::InvalidSamplingSize`] if
    /// the metric has to be created and the configured sampling size is zero.
    pub fn register_measure<T: Measurable>(
        &self,
        name: &str,
        timestamp: Instant,
        value: T,
        reducer: &Arc<dyn Reducer<T>>,
    ) -> Result<()> {
        let metric = self.resolve(name, reducer)?;
        metric.add_measure(timestamp, value)
    }

    /// Register a measure stamped with the registry clock
    pub fn record<T: Measurable>(
        &self,
        name: &str,
        value: T,
        reducer: &Arc<dyn Reducer<T>>,
    ) -> Result<()> {
        self.register_measure(name, self.now(), value, reducer)
    }

    /// Register a measure under the name built from `template` and
    /// `placeholders` with [`build_name`]
    pub fn register_measure_with<T: Measurable>(
        &self,
        template: &str,
        placeholders: &[&dyn fmt::Display],
        timestamp: Instant,
        value: T,
        reducer: &Arc<dyn Reducer<T>>,
    ) -> Result<()> {
        let name = build_name(template, placeholders)?;
        self.register_measure(&name, timestamp, value, reducer)
    }

    fn resolve<T: Measurable>(
        &self,
        name: &str,
        reducer: &Arc<dyn Reducer<T>>,
    ) -> Result<Arc<dyn DynAggregator>> {
        if name.is_empty() {
            return Err(CrawlerError::InvalidName(
                "can not register a measure without metric name".to_string(),
            ));
        }

        if let Some(metric) = self.metrics.read().get(name) {
            return Ok(Arc::clone(metric));
        }

        let mut metrics = self.metrics.write();
        match metrics.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let aggregator =
                    Aggregator::new(entry.key().clone(), self.sampling_size(), Arc::clone(reducer))?;
                debug!(
                    "metric::{}::created::{}::sampling::{}",
                    name,
                    std::any::type_name::<T>(),
                    self.sampling_size()
                );
                let metric: Arc<dyn DynAggregator> = Arc::new(aggregator);
                Ok(Arc::clone(entry.insert(metric)))
            }
        }
    }

    /// Snapshot of the metric named `name`, if it exists
    pub fn get_metric(&self, name: &str) -> Option<Box<dyn DynSnapshot>> {
        let metric = self.metrics.read().get(name).cloned()?;
        Some(metric.snapshot())
    }

    /// Snapshot of the metric whose name is built from `template` and
    /// `placeholders`
    pub fn get_metric_with(
        &self,
        template: &str,
        placeholders: &[&dyn fmt::Display],
    ) -> Result<Option<Box<dyn DynSnapshot>>> {
        let name = build_name(template, placeholders)?;
        Ok(self.get_metric(&name))
    }

    /// Typed snapshot of the metric named `name`
    ///
    /// Fails with [`CrawlerError::IncorrectMeasureType`] when the metric holds
    /// another value type.
    pub fn get_snapshot<T: Measurable>(&self, name: &str) -> Result<Option<Snapshot<T>>> {
        let Some(metric) = self.metrics.read().get(name).cloned() else {
            return Ok(None);
        };
        let snapshot = metric.typed::<T>()?.to_snapshot();
        Ok(Some(snapshot))
    }

    /// Snapshots of every metric, ordered by name
    pub fn get_metrics(&self) -> Vec<Box<dyn DynSnapshot>> {
        let metrics: Vec<_> = self.metrics.read().values().cloned().collect();
        metrics.iter().map(|metric| metric.snapshot()).collect()
    }

    /// Names of every metric, in ascending order
    pub fn names(&self) -> Vec<String> {
        self.metrics.read().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.metrics.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.read().is_empty()
    }

    /// Discard every metric
    pub fn clear(&self) {
        let discarded = std::mem::take(&mut *self.metrics.write());
        debug!("registry::cleared::{}", discarded.len());
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
