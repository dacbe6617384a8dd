//! Immutable metric summaries
//!
//! A [`Snapshot`] is the statistical summary of a metric at one point in
//! time. Snapshots of the same value type merge with [`Snapshot::reduce`],
//! which is associative and commutative on every value field, so the window
//! of a metric can be folded in any order.
//!
//! The registry hands out snapshots as [`DynSnapshot`] trait objects because
//! each metric carries its own value type; [`DynSnapshot::downcast_ref`]
//! recovers the typed view.

use crate::reducer::{Measurable, Reducer};
use std::any::{self, Any};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Statistical summary of a metric
#[derive(Clone)]
pub struct Snapshot<T: Measurable> {
    reducer: Arc<dyn Reducer<T>>,
    name: String,
    accumulated: T,
    window_size: u64,
    total_hits: u64,
    max: T,
    min: T,
    average: T,
    last: T,
    last_occurrence: Option<Instant>,
    generated_at: Instant,
}

impl<T: Measurable> Snapshot<T> {
    /// Builder with every value field at the reducer identity
    pub fn builder(reducer: Arc<dyn Reducer<T>>) -> SnapshotBuilder<T> {
        SnapshotBuilder::new(reducer)
    }

    /// Builder seeded with the fields of this snapshot
    pub fn to_builder(&self) -> SnapshotBuilder<T> {
        SnapshotBuilder {
            reducer: Arc::clone(&self.reducer),
            name: self.name.clone(),
            accumulated: self.accumulated.clone(),
            window_size: self.window_size,
            total_hits: self.total_hits,
            max: self.max.clone(),
            min: self.min.clone(),
            average: self.average.clone(),
            last: self.last.clone(),
            last_occurrence: self.last_occurrence,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sum of the windowed samples
    pub fn accumulated(&self) -> &T {
        &self.accumulated
    }

    /// Number of samples folded into this snapshot
    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    /// Lifetime hits of the metric, evicted samples included
    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    pub fn max(&self) -> &T {
        &self.max
    }

    pub fn min(&self) -> &T {
        &self.min
    }

    pub fn average(&self) -> &T {
        &self.average
    }

    pub fn last(&self) -> &T {
        &self.last
    }

    pub fn last_occurrence(&self) -> Option<Instant> {
        self.last_occurrence
    }

    pub fn generated_at(&self) -> Instant {
        self.generated_at
    }

    pub fn reducer(&self) -> &Arc<dyn Reducer<T>> {
        &self.reducer
    }

    /// Merge two snapshots into a new one
    ///
    /// The merged average is recomputed from the merged accumulation and
    /// window size. The last value comes from whichever side occurred
    /// strictly later, ties keep `self`. The name is taken from `self`.
    /// A side with an empty window contributes no max or min.
    pub fn reduce(&self, other: &Snapshot<T>) -> Snapshot<T> {
        let reducer = &self.reducer;
        let window_size = self.window_size + other.window_size;
        let accumulated = reducer.accumulate(Some(&self.accumulated), Some(&other.accumulated));
        let average = reducer
            .average(accumulated.as_ref(), window_size)
            .unwrap_or_else(|| reducer.identity());

        let (last, last_occurrence) = if occurred_before(self.last_occurrence, other.last_occurrence) {
            (other.last.clone(), other.last_occurrence)
        } else {
            (self.last.clone(), self.last_occurrence)
        };

        let mut builder = Snapshot::builder(Arc::clone(reducer))
            .name(self.name.clone())
            .window_size(window_size)
            .total_hits(self.total_hits + other.total_hits)
            .max(
                reducer
                    .max(self.extreme(&self.max), other.extreme(&other.max))
                    .unwrap_or_else(|| reducer.identity()),
            )
            .min(
                reducer
                    .min(self.extreme(&self.min), other.extreme(&other.min))
                    .unwrap_or_else(|| reducer.identity()),
            )
            .average(average)
            .last(last);
        builder.last_occurrence = last_occurrence;
        if let Some(accumulated) = accumulated {
            builder = builder.accumulated(accumulated);
        }

        let mut merged = builder.build();
        merged.generated_at = stamp_after(self.generated_at.max(other.generated_at));
        merged
    }

    /// Extremes of a snapshot without samples are placeholders, not observations
    fn extreme<'a>(&self, value: &'a T) -> Option<&'a T> {
        (self.window_size > 0).then_some(value)
    }

    /// Rendered accumulated value
    pub fn formatted_accumulated(&self) -> String {
        self.reducer.render(Some(&self.accumulated))
    }

    pub fn formatted_max(&self) -> String {
        self.reducer.render(Some(&self.max))
    }

    pub fn formatted_min(&self) -> String {
        self.reducer.render(Some(&self.min))
    }

    pub fn formatted_average(&self) -> String {
        self.reducer.render(Some(&self.average))
    }

    pub fn formatted_last(&self) -> String {
        self.reducer.render(Some(&self.last))
    }
}

/// Absent occurrences happen before any present one
fn occurred_before(left: Option<Instant>, right: Option<Instant>) -> bool {
    match (left, right) {
        (Some(left), Some(right)) => left < right,
        (None, Some(_)) => true,
        _ => false,
    }
}

/// An instant strictly later than `floor`
fn stamp_after(floor: Instant) -> Instant {
    let now = Instant::now();
    if now > floor {
        now
    } else {
        floor + Duration::from_nanos(1)
    }
}

impl<T: Measurable> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("name", &self.name)
            .field("accumulated", &self.accumulated)
            .field("window_size", &self.window_size)
            .field("total_hits", &self.total_hits)
            .field("max", &self.max)
            .field("min", &self.min)
            .field("average", &self.average)
            .field("last", &self.last)
            .field("last_occurrence", &self.last_occurrence)
            .field("generated_at", &self.generated_at)
            .finish()
    }
}

impl<T: Measurable> fmt::Display for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: hits={} samples={} acc={} avg={} min={} max={} last={}",
            self.name,
            self.total_hits,
            self.window_size,
            self.formatted_accumulated(),
            self.formatted_average(),
            self.formatted_min(),
            self.formatted_max(),
            self.formatted_last()
        )
    }
}

/// Equality on every field except `generated_at`
impl<T: Measurable + PartialEq> PartialEq for Snapshot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.accumulated == other.accumulated
            && self.window_size == other.window_size
            && self.total_hits == other.total_hits
            && self.max == other.max
            && self.min == other.min
            && self.average == other.average
            && self.last == other.last
            && self.last_occurrence == other.last_occurrence
    }
}

/// Builder for [`Snapshot`]
pub struct SnapshotBuilder<T: Measurable> {
    reducer: Arc<dyn Reducer<T>>,
    name: String,
    accumulated: T,
    window_size: u64,
    total_hits: u64,
    max: T,
    min: T,
    average: T,
    last: T,
    last_occurrence: Option<Instant>,
}

impl<T: Measurable> SnapshotBuilder<T> {
    pub fn new(reducer: Arc<dyn Reducer<T>>) -> Self {
        let identity = reducer.identity();
        Self {
            name: String::new(),
            accumulated: identity.clone(),
            window_size: 0,
            total_hits: 0,
            max: identity.clone(),
            min: identity.clone(),
            average: identity.clone(),
            last: identity,
            last_occurrence: None,
            reducer,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn accumulated(mut self, value: T) -> Self {
        self.accumulated = value;
        self
    }

    pub fn window_size(mut self, window_size: u64) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn total_hits(mut self, total_hits: u64) -> Self {
        self.total_hits = total_hits;
        self
    }

    pub fn max(mut self, value: T) -> Self {
        self.max = value;
        self
    }

    pub fn min(mut self, value: T) -> Self {
        self.min = value;
        self
    }

    pub fn average(mut self, value: T) -> Self {
        self.average = value;
        self
    }

    pub fn last(mut self, value: T) -> Self {
        self.last = value;
        self
    }

    pub fn last_occurrence(mut self, at: Instant) -> Self {
        self.last_occurrence = Some(at);
        self
    }

    /// Build the snapshot, stamping `generated_at` with the current instant
    pub fn build(self) -> Snapshot<T> {
        Snapshot {
            reducer: self.reducer,
            name: self.name,
            accumulated: self.accumulated,
            window_size: self.window_size,
            total_hits: self.total_hits,
            max: self.max,
            min: self.min,
            average: self.average,
            last: self.last,
            last_occurrence: self.last_occurrence,
            generated_at: Instant::now(),
        }
    }
}

/// Type-erased view over a [`Snapshot`] of any value type
pub trait DynSnapshot: fmt::Debug + fmt::Display + Send + Sync {
    fn name(&self) -> &str;
    fn window_size(&self) -> u64;
    fn total_hits(&self) -> u64;
    fn last_occurrence(&self) -> Option<Instant>;
    fn generated_at(&self) -> Instant;
    /// Type name of the values held by the metric
    fn value_type(&self) -> &'static str;
    fn formatted_accumulated(&self) -> String;
    fn formatted_max(&self) -> String;
    fn formatted_min(&self) -> String;
    fn formatted_average(&self) -> String;
    fn formatted_last(&self) -> String;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Measurable> DynSnapshot for Snapshot<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn window_size(&self) -> u64 {
        self.window_size
    }

    fn total_hits(&self) -> u64 {
        self.total_hits
    }

    fn last_occurrence(&self) -> Option<Instant> {
        self.last_occurrence
    }

    fn generated_at(&self) -> Instant {
        self.generated_at
    }

    fn value_type(&self) -> &'static str {
        any::type_name::<T>()
    }

    fn formatted_accumulated(&self) -> String {
        Snapshot::formatted_accumulated(self)
    }

    fn formatted_max(&self) -> String {
        Snapshot::formatted_max(self)
    }

    fn formatted_min(&self) -> String {
        Snapshot::formatted_min(self)
    }

    fn formatted_average(&self) -> String {
        Snapshot::formatted_average(self)
    }

    fn formatted_last(&self) -> String {
        Snapshot::formatted_last(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn DynSnapshot {
    /// Typed view of this snapshot, `None` if it holds another value type
    pub fn downcast_ref<T: Measurable>(&self) -> Option<&Snapshot<T>> {
        self.as_any().downcast_ref::<Snapshot<T>>()
    }
}

/// Order snapshots by name
pub fn compare_names(left: &dyn DynSnapshot, right: &dyn DynSnapshot) -> Ordering {
    left.name().cmp(right.name())
}
