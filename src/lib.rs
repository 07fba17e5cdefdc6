//! Glance - metrics aggregation and windowed sampling for live charts.
//!
//! Glance ingests resource-scoped metric batches, keeps raw series per
//! instrument and attribute set, and samples them into fixed-cadence chart
//! buckets on demand. Refresh loops keep open chart views current without
//! recomputing history on every tick.
//!
//! # Features
//!
//! - **Concurrent Ingest**: Lock-free get-or-create registries converge
//!   races from multiple ingest callers onto a single instance
//! - **Gap-aware Sampling**: A bucket with no data is absent, never zero
//! - **Histogram Percentiles**: Cumulative bucket counts diffed into
//!   per-interval distributions, percentiles interpolated from bounds
//! - **Live Refresh**: Per-view timer tasks with throttled incremental
//!   updates and clean shutdown
//!
//! # Architecture
//!
//! - `core`: Configuration and error types
//! - `metrics`: The store, sampler, filters, and refresh loop
//!
//! # Example
//!
//! ```no_run
//! use glance::core::EngineConfig;
//! use glance::metrics::{MetricStore, ResourceInfo};
//!
//! fn main() -> glance::core::Result<()> {
//!     let config = EngineConfig::default();
//!     config.validate()?;
//!
//!     let store = MetricStore::new(config.ingest.max_applications);
//!     let resource = ResourceInfo {
//!         attributes: vec![(
//!             ResourceInfo::SERVICE_NAME.to_string(),
//!             "frontend".to_string(),
//!         )],
//!     };
//!     let context = store.add_metrics(&resource, &[])?;
//!     assert_eq!(context.failure_count, 0);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod core;
pub mod metrics;

// Re-export core types for convenience
pub use crate::core::{EngineConfig, GlanceError, Result};
pub use crate::metrics::{ChartRefreshLoop, ChartUpdate, MetricStore};
