//! Metrics ingestion, storage, and chart sampling.
//!
//! Data flows in one direction: resource-scoped metric batches enter
//! through [`MetricStore::add_metrics`], land in per-attribute-set series
//! under their instrument, and are read back by the stateless sampler as
//! bucketed chart series. A [`ChartRefreshLoop`] drives live views,
//! recomputing on a timer and pushing throttled updates.

pub mod attributes;
pub mod filter;
pub mod instrument;
pub mod refresh;
pub mod sampler;
pub mod series;
pub mod store;
pub mod types;

pub use attributes::{AttributeScratch, AttributeSet, KeyValue};
pub use filter::{matches_all, DimensionFilter, FilterValue};
pub use instrument::{Instrument, InstrumentKind};
pub use refresh::{ChartRefreshLoop, ChartUpdate};
pub use sampler::{
    calculate_percentile, compute_histogram_series, compute_value_series, ChartSeries,
    ChartTrace, ChartWindow,
};
pub use series::DimensionScope;
pub use store::{Application, ApplicationKey, IngestContext, Meter, MetricStore};
pub use types::{
    HistogramPoint, HistogramSnapshot, MetricData, MetricRecord, MetricValue, NumberPoint,
    ResourceInfo, ScalarValue, ScopedMetrics, ValueRecord,
};
