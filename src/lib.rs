//! # metrics-crawler - In-process metric aggregation
//!
//! Application code pushes typed measurements (durations, counts, doubles)
//! tagged by name. For every name the crawler keeps a lifetime hit counter and
//! a bounded window of the most recent measures, and folds that window into a
//! statistical summary (accumulated, min, max, average, last) on demand.
//!
//! ## Quick Start
//!
//! ```rust
//! use metrics_crawler::{reducer, MetricsRegistry, RegistryConfig};
//! use std::time::{Duration, Instant};
//!
//! let registry = MetricsRegistry::with_config(RegistryConfig::with_sampling_size(64));
//!
//! let duration = reducer::duration();
//! registry
//!     .register_measure("db.query", Instant::now(), Duration::from_millis(12), &duration)
//!     .unwrap();
//!
//! let snapshot = registry.get_snapshot::<Duration>("db.query").unwrap().unwrap();
//! assert_eq!(snapshot.total_hits(), 1);
//! assert_eq!(*snapshot.max(), Duration::from_millis(12));
//!
//! for snapshot in registry.get_metrics() {
//!     println!("{}", snapshot);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`reducer`]: Per-type algebra (identity, accumulate, max, min, average, render)
//! - [`window`]: Bounded drop-oldest sample window
//! - [`measure`]: Single timestamped value
//! - [`snapshot`]: Immutable, mergeable metric summaries
//! - [`aggregator`]: Per-metric hit counter and window
//! - [`registry`]: Concurrent name to metric map
//! - [`naming`]: Name templates and nested dotted names
//! - [`sensor`]: Scoped guards registering on drop

// Modules
pub mod aggregator;
pub mod clock;
pub mod config;
pub mod error;
pub mod measure;
pub mod naming;
pub mod reducer;
pub mod registry;
pub mod sensor;
pub mod snapshot;
pub mod window;

// Re-exports for convenient access
pub use aggregator::{Aggregator, DynAggregator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RegistryConfig, DEFAULT_SAMPLING_SIZE};
pub use error::{CrawlerError, Result};
pub use measure::Measure;
pub use naming::{build_name, ContextScope, FrameId, NameContext, NameScope, NameStack};
pub use reducer::{DurationReducer, FloatReducer, IntegerReducer, Measurable, Reducer};
pub use registry::MetricsRegistry;
pub use sensor::{DurationSensor, ValueSensor};
pub use snapshot::{compare_names, DynSnapshot, Snapshot, SnapshotBuilder};
pub use window::SampleWindow;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
