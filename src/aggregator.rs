//! Per-metric aggregation state
//!
//! The [`Aggregator`] owns the lifetime hit counter and the bounded window of
//! recent measures for one metric name, and folds them into a [`Snapshot`]
//! on demand.

use crate::error::{CrawlerError, Result};
use crate::measure::Measure;
use crate::reducer::{Measurable, Reducer};
use crate::snapshot::{DynSnapshot, Snapshot};
use crate::window::SampleWindow;
use log::trace;
use std::any::{self, Any};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Running state of a single named metric
pub struct Aggregator<T: Measurable> {
    name: String,
    reducer: Arc<dyn Reducer<T>>,
    window: SampleWindow<Measure<T>>,
    hits: AtomicU64,
}

impl<T: Measurable> Aggregator<T> {
    /// Create an aggregator keeping the last `sampling_size` measures
    ///
    /// Fails with [`CrawlerError::InvalidSamplingSize`] when `sampling_size`
    /// is zero.
    pub fn new(
        name: impl Into<String>,
        sampling_size: usize,
        reducer: Arc<dyn Reducer<T>>,
    ) -> Result<Self> {
        let name = name.into();
        let capacity = NonZeroUsize::new(sampling_size).ok_or_else(|| {
            CrawlerError::InvalidSamplingSize {
                metric: name.clone(),
                size: sampling_size,
            }
        })?;

        Ok(Self {
            name,
            reducer,
            window: SampleWindow::new(capacity),
            hits: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reducer(&self) -> &Arc<dyn Reducer<T>> {
        &self.reducer
    }

    /// Measures accepted since creation, evicted ones included
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn sampling_size(&self) -> usize {
        self.window.capacity()
    }

    /// Measures currently held in the window, oldest first
    pub fn measures(&self) -> Vec<Measure<T>> {
        self.window.contents()
    }

    /// Record a measure
    pub fn add_measure(&self, timestamp: Instant, value: T) {
        // counted before windowed so hits never trail the window size
        let hits = self.hits.fetch_add(1, Ordering::SeqCst) + 1;
        self.window
            .offer(Measure::new(timestamp, value, Arc::clone(&self.reducer)));
        trace!("measure::{}::registered::{}", self.name, hits);
    }

    /// Fold the current window into a snapshot
    pub fn to_snapshot(&self) -> Snapshot<T> {
        let measures = self.window.contents();
        let hits = self.hits();

        measures
            .iter()
            .map(Measure::to_snapshot)
            .reduce(|acc, next| acc.reduce(&next))
            .map(|folded| {
                folded
                    .to_builder()
                    .name(self.name.clone())
                    .total_hits(hits)
                    .build()
            })
            .unwrap_or_else(|| {
                Snapshot::builder(Arc::clone(&self.reducer))
                    .name(self.name.clone())
                    .build()
            })
    }
}

impl<T: Measurable> fmt::Debug for Aggregator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("name", &self.name)
            .field("type", &any::type_name::<T>())
            .field("hits", &self.hits())
            .field("window", &self.window.len())
            .field("reducer", &self.reducer)
            .finish()
    }
}

/// Type-erased aggregator as stored by the registry
pub trait DynAggregator: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    /// Type name of the values the metric was created with
    fn value_type(&self) -> &'static str;
    fn hits(&self) -> u64;
    fn snapshot(&self) -> Box<dyn DynSnapshot>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Measurable> DynAggregator for Aggregator<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn value_type(&self) -> &'static str {
        any::type_name::<T>()
    }

    fn hits(&self) -> u64 {
        Aggregator::hits(self)
    }

    fn snapshot(&self) -> Box<dyn DynSnapshot> {
        Box::new(self.to_snapshot())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn DynAggregator {
    /// Typed view of this aggregator
    ///
    /// Fails with [`CrawlerError::IncorrectMeasureType`] when the metric was
    /// created for another value type.
    pub fn typed<T: Measurable>(&self) -> Result<&Aggregator<T>> {
        self.as_any()
            .downcast_ref::<Aggregator<T>>()
            .ok_or_else(|| CrawlerError::IncorrectMeasureType {
                metric: self.name().to_string(),
                original: self.value_type(),
                offending: any::type_name::<T>(),
            })
    }

    /// Record a measure after checking its type against the metric
    ///
    /// State is left untouched when the type does not match.
    pub fn add_measure<T: Measurable>(&self, timestamp: Instant, value: T) -> Result<()> {
        self.typed::<T>()?.add_measure(timestamp, value);
        Ok(())
    }
}
