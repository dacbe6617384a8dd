//! Scoped sensors
//!
//! A sensor captures a timestamp when it is created and registers a measure
//! in its registry when it is dropped, on every exit path. Registration
//! failures are logged and swallowed so instrumentation never fails the
//! instrumented code.
//!
//! Nested sensors (`*_nested` constructors) open a segment on the current
//! thread's [`naming`](crate::naming) stack, so a sensor created while another
//! nested sensor is alive registers under the dotted name `outer.inner`.
//! The `*_in` constructors do the same on an explicit [`NameContext`], for
//! tasks that share an executor thread.
//!
//! ```rust
//! use metrics_crawler::sensor::{DurationSensor, ValueSensor};
//! use metrics_crawler::MetricsRegistry;
//!
//! let registry = MetricsRegistry::new();
//! {
//!     let _request = DurationSensor::start_nested(&registry, "request");
//!     let mut rows = ValueSensor::integer_nested(&registry, "rows");
//!     rows.set(42);
//! }
//! assert!(registry.get_metric("request").is_some());
//! assert_eq!(registry.get_metric("request.rows").unwrap().formatted_last(), "42");
//! ```

use crate::error::Result;
use crate::naming::{self, ContextScope, NameContext, NameScope};
use crate::reducer::{self, Measurable, Reducer};
use crate::registry::MetricsRegistry;
use log::warn;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State shared by every sensor kind
struct Probe<'a, T: Measurable> {
    registry: &'a MetricsRegistry,
    reducer: Arc<dyn Reducer<T>>,
    name: String,
    timestamp: Instant,
    skip: bool,
    // dropped after the measure is registered
    _scope: Option<Segment>,
}

/// Open naming segment held by a nested sensor
enum Segment {
    Thread(NameScope),
    Context(ContextScope),
}

impl Segment {
    fn name(&self) -> &str {
        match self {
            Segment::Thread(scope) => scope.name(),
            Segment::Context(scope) => scope.name(),
        }
    }
}

impl<'a, T: Measurable> Probe<'a, T> {
    fn flat(registry: &'a MetricsRegistry, name: String, reducer: Arc<dyn Reducer<T>>) -> Self {
        Self {
            registry,
            reducer,
            timestamp: registry.now(),
            name,
            skip: false,
            _scope: None,
        }
    }

    fn nested(registry: &'a MetricsRegistry, segment: &str, reducer: Arc<dyn Reducer<T>>) -> Self {
        Self::scoped(registry, Segment::Thread(naming::enter(segment)), reducer)
    }

    fn nested_in(
        registry: &'a MetricsRegistry,
        context: &NameContext,
        segment: &str,
        reducer: Arc<dyn Reducer<T>>,
    ) -> Self {
        Self::scoped(registry, Segment::Context(context.enter(segment)), reducer)
    }

    fn scoped(registry: &'a MetricsRegistry, scope: Segment, reducer: Arc<dyn Reducer<T>>) -> Self {
        Self {
            registry,
            reducer,
            timestamp: registry.now(),
            name: scope.name().to_string(),
            skip: false,
            _scope: Some(scope),
        }
    }

    fn register(&self, value: T) {
        if self.skip {
            return;
        }
        if let Err(e) =
            self.registry
                .register_measure(&self.name, self.timestamp, value, &self.reducer)
        {
            warn!("measure::{}::registry::failed::{}", self.name, e);
        }
    }
}

/// Measures the time elapsed between its creation and its drop
pub struct DurationSensor<'a> {
    probe: Probe<'a, Duration>,
    started: Instant,
}

impl<'a> DurationSensor<'a> {
    /// Start timing under `name`
    pub fn start(registry: &'a MetricsRegistry, name: impl Into<String>) -> Self {
        Self {
            probe: Probe::flat(registry, name.into(), reducer::duration()),
            started: Instant::now(),
        }
    }

    /// Start timing under `segment` nested in the current thread's name
    pub fn start_nested(registry: &'a MetricsRegistry, segment: &str) -> Self {
        Self {
            probe: Probe::nested(registry, segment, reducer::duration()),
            started: Instant::now(),
        }
    }

    /// Start timing under `segment` nested in the name of `context`
    pub fn start_in(registry: &'a MetricsRegistry, context: &NameContext, segment: &str) -> Self {
        Self {
            probe: Probe::nested_in(registry, context, segment, reducer::duration()),
            started: Instant::now(),
        }
    }

    /// Effective metric name
    pub fn name(&self) -> &str {
        &self.probe.name
    }

    /// Time elapsed so far
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Do not register anything on drop
    pub fn skip(&mut self) {
        self.probe.skip = true;
    }

    pub fn is_skipped(&self) -> bool {
        self.probe.skip
    }
}

impl Drop for DurationSensor<'_> {
    fn drop(&mut self) {
        self.probe.register(self.elapsed());
    }
}

/// Registers a manually set value on drop
///
/// Nothing is registered if no value was ever set.
pub struct ValueSensor<'a, T: Measurable> {
    probe: Probe<'a, T>,
    value: Option<T>,
}

impl<'a, T: Measurable> ValueSensor<'a, T> {
    pub fn new(
        registry: &'a MetricsRegistry,
        name: impl Into<String>,
        reducer: Arc<dyn Reducer<T>>,
    ) -> Self {
        Self {
            probe: Probe::flat(registry, name.into(), reducer),
            value: None,
        }
    }

    pub fn nested(registry: &'a MetricsRegistry, segment: &str, reducer: Arc<dyn Reducer<T>>) -> Self {
        Self {
            probe: Probe::nested(registry, segment, reducer),
            value: None,
        }
    }

    pub fn nested_in(
        registry: &'a MetricsRegistry,
        context: &NameContext,
        segment: &str,
        reducer: Arc<dyn Reducer<T>>,
    ) -> Self {
        Self {
            probe: Probe::nested_in(registry, context, segment, reducer),
            value: None,
        }
    }

    /// Start with `value` already set
    pub fn with_value(mut self, value: T) -> Self {
        self.value = Some(value);
        self
    }

    pub fn set(&mut self, value: T) {
        self.value = Some(value);
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Effective metric name
    pub fn name(&self) -> &str {
        &self.probe.name
    }

    /// Do not register anything on drop
    pub fn skip(&mut self) {
        self.probe.skip = true;
    }

    pub fn is_skipped(&self) -> bool {
        self.probe.skip
    }
}

impl<'a> ValueSensor<'a, i64> {
    pub fn integer(registry: &'a MetricsRegistry, name: impl Into<String>) -> Self {
        Self::new(registry, name, reducer::integer())
    }

    pub fn integer_nested(registry: &'a MetricsRegistry, segment: &str) -> Self {
        Self::nested(registry, segment, reducer::integer())
    }
}

impl<'a> ValueSensor<'a, f64> {
    pub fn float(registry: &'a MetricsRegistry, name: impl Into<String>) -> Self {
        Self::new(registry, name, reducer::float())
    }

    pub fn float_nested(registry: &'a MetricsRegistry, segment: &str) -> Self {
        Self::nested(registry, segment, reducer::float())
    }
}

impl<T: Measurable> Drop for ValueSensor<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.probe.register(value);
        }
    }
}

/// Register a single value under `segment` nested in the current name
///
/// Unlike sensors this reports registration failures to the caller.
pub fn measure<T: Measurable>(
    registry: &MetricsRegistry,
    segment: &str,
    value: T,
    reducer: &Arc<dyn Reducer<T>>,
) -> Result<()> {
    let scope = naming::enter(segment);
    registry.register_measure(scope.name(), registry.now(), value, reducer)
}

/// Register a single value under `segment` nested in the name of `context`
pub fn measure_in<T: Measurable>(
    registry: &MetricsRegistry,
    context: &NameContext,
    segment: &str,
    value: T,
    reducer: &Arc<dyn Reducer<T>>,
) -> Result<()> {
    let scope = context.enter(segment);
    registry.register_measure(scope.name(), registry.now(), value, reducer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use std::thread;

    #[test]
    fn test_duration_sensor_registers_on_drop() {
        let registry = MetricsRegistry::new();
        {
            let sensor = DurationSensor::start(&registry, "work");
            assert_eq!(sensor.name(), "work");
            thread::sleep(Duration::from_millis(2));
        }
        let snapshot = registry.get_snapshot::<Duration>("work").unwrap().unwrap();
        assert_eq!(snapshot.total_hits(), 1);
        assert!(*snapshot.last() >= Duration::from_millis(2));
    }

    #[test]
    fn test_duration_sensor_skip() {
        let registry = MetricsRegistry::new();
        {
            let mut sensor = DurationSensor::start(&registry, "skipped");
            sensor.skip();
            assert!(sensor.is_skipped());
        }
        assert!(registry.get_metric("skipped").is_none());
    }

    #[test]
    fn test_value_sensor_without_value_registers_nothing() {
        let registry = MetricsRegistry::new();
        {
            let sensor = ValueSensor::float(&registry, "empty");
            assert!(sensor.value().is_none());
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_value_sensor_registers_last_set_value() {
        let registry = MetricsRegistry::new();
        {
            let mut sensor = ValueSensor::integer(&registry, "rows").with_value(1);
            sensor.set(7);
            assert_eq!(sensor.value(), Some(&7));
        }
        let snapshot = registry.get_snapshot::<i64>("rows").unwrap().unwrap();
        assert_eq!(*snapshot.last(), 7);
        assert_eq!(snapshot.total_hits(), 1);
    }

    #[test]
    fn test_sensor_registers_on_panic() {
        let registry = MetricsRegistry::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _sensor = DurationSensor::start(&registry, "panicking");
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(registry.get_metric("panicking").is_some());
    }

    #[test]
    fn test_sensor_failure_is_swallowed() {
        let registry = MetricsRegistry::new();
        registry
            .record("mixed", 1.0, &reducer::float())
            .unwrap();
        {
            let _sensor = DurationSensor::start(&registry, "mixed");
        }
        let snapshot = registry.get_snapshot::<f64>("mixed").unwrap().unwrap();
        assert_eq!(snapshot.total_hits(), 1);
    }

    #[test]
    fn test_nested_sensors() {
        let registry = MetricsRegistry::with_config(RegistryConfig::with_sampling_size(8));
        {
            let outer = DurationSensor::start_nested(&registry, "a");
            assert_eq!(outer.name(), "a");
            {
                let inner = ValueSensor::float_nested(&registry, "b").with_value(1.5);
                assert_eq!(inner.name(), "a.b");
            }
            {
                let inner = ValueSensor::integer_nested(&registry, "c").with_value(3);
                assert_eq!(inner.name(), "a.c");
            }
        }
        assert_eq!(naming::current(), None);
        assert_eq!(registry.names(), vec!["a", "a.b", "a.c"]);
    }

    #[test]
    fn test_sensors_on_separate_contexts() {
        let registry = MetricsRegistry::new();
        let upload = NameContext::new();
        let download = NameContext::new();
        {
            let _up = DurationSensor::start_in(&registry, &upload, "upload");
            let _down = DurationSensor::start_in(&registry, &download, "download");
            let mut bytes = ValueSensor::nested_in(&registry, &upload, "bytes", reducer::integer());
            bytes.set(512);
            assert_eq!(bytes.name(), "upload.bytes");
            measure_in(&registry, &download, "bytes", 128, &reducer::integer()).unwrap();
            assert_eq!(naming::current(), None);
        }
        assert_eq!(upload.current(), None);
        assert_eq!(download.current(), None);
        assert_eq!(
            registry.names(),
            vec!["download", "download.bytes", "upload", "upload.bytes"]
        );
    }

    #[test]
    fn test_measure_helper() {
        let registry = MetricsRegistry::new();
        let integer = reducer::integer();
        {
            let _outer = naming::enter("batch");
            measure(&registry, "size", 10, &integer).unwrap();
            measure(&registry, "size", 20, &integer).unwrap();
        }
        let snapshot = registry.get_snapshot::<i64>("batch.size").unwrap().unwrap();
        assert_eq!(*snapshot.accumulated(), 30);
        assert_eq!(naming::current(), None);
    }
}
