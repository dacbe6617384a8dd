//! Single observed value

use crate::reducer::{Measurable, Reducer};
use crate::snapshot::Snapshot;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// One observed value with its timestamp and the reducer that folds it
#[derive(Clone)]
pub struct Measure<T: Measurable> {
    timestamp: Instant,
    value: T,
    reducer: Arc<dyn Reducer<T>>,
}

impl<T: Measurable> Measure<T> {
    pub fn new(timestamp: Instant, value: T, reducer: Arc<dyn Reducer<T>>) -> Self {
        Self {
            timestamp,
            value,
            reducer,
        }
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn reducer(&self) -> &Arc<dyn Reducer<T>> {
        &self.reducer
    }

    /// Unnamed one-sample snapshot of this measure
    pub fn to_snapshot(&self) -> Snapshot<T> {
        Snapshot::builder(Arc::clone(&self.reducer))
            .window_size(1)
            .accumulated(self.value.clone())
            .max(self.value.clone())
            .min(self.value.clone())
            .average(self.value.clone())
            .last(self.value.clone())
            .last_occurrence(self.timestamp)
            .build()
    }
}

impl<T: Measurable> fmt::Debug for Measure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Measure")
            .field("timestamp", &self.timestamp)
            .field("type", &std::any::type_name::<T>())
            .field("value", &self.value)
            .field("reducer", &self.reducer)
            .finish()
    }
}

impl<T: Measurable + PartialEq> PartialEq for Measure<T> {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.value == other.value
    }
}
