//! Metric value types for the ingest and storage paths.
//!
//! The engine receives already-decoded metric batches; wire deserialization
//! happens upstream. Each data point carries the collection interval it
//! represents, so chart sampling matches points against query buckets by
//! interval overlap rather than by a single timestamp.

use crate::metrics::attributes::KeyValue;
use std::sync::Arc;
use std::time::SystemTime;

/// Resource identity attributes for one reporting process.
///
/// `service.name` and `service.instance.id` identify the application;
/// all other attributes are kept as application properties.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    /// Raw resource attributes
    pub attributes: Vec<KeyValue>,
}

impl ResourceInfo {
    /// Well-known attribute key for the application name
    pub const SERVICE_NAME: &'static str = "service.name";
    /// Well-known attribute key for the process instance id
    pub const SERVICE_INSTANCE_ID: &'static str = "service.instance.id";
}

/// A group of metric records reported under one scope (meter) name
#[derive(Debug, Clone)]
pub struct ScopedMetrics {
    /// Scope (meter) name
    pub scope_name: String,
    /// Decoded metric records
    pub metrics: Vec<MetricRecord>,
}

/// One decoded metric record
#[derive(Debug, Clone)]
pub struct MetricRecord {
    /// Instrument name, unique within the meter
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Unit string as reported ("ms", "{requests}", ...)
    pub unit: String,
    /// Data points, tagged by kind
    pub data: MetricData,
}

/// The closed set of supported metric kinds
#[derive(Debug, Clone)]
pub enum MetricData {
    /// Point-in-time measurements
    Gauge(Vec<NumberPoint>),
    /// Monotonic or delta counters
    Sum(Vec<NumberPoint>),
    /// Cumulative histogram snapshots
    Histogram(Vec<HistogramPoint>),
}

impl MetricData {
    /// Name of the kind for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            MetricData::Gauge(_) => "gauge",
            MetricData::Sum(_) => "sum",
            MetricData::Histogram(_) => "histogram",
        }
    }
}

/// A scalar data point with its collection interval
#[derive(Debug, Clone)]
pub struct NumberPoint {
    /// Unordered attribute pairs distinguishing the series
    pub attributes: Vec<KeyValue>,
    /// Start of the collection interval
    pub start: SystemTime,
    /// End of the collection interval
    pub end: SystemTime,
    /// The measured value
    pub value: ScalarValue,
}

/// A cumulative histogram data point with its collection interval
#[derive(Debug, Clone)]
pub struct HistogramPoint {
    /// Unordered attribute pairs distinguishing the series
    pub attributes: Vec<KeyValue>,
    /// Start of the collection interval
    pub start: SystemTime,
    /// End of the collection interval
    pub end: SystemTime,
    /// Ascending bucket upper bounds
    pub bounds: Vec<f64>,
    /// Cumulative per-bucket counts, as reported
    pub counts: Vec<u64>,
    /// Total observation count
    pub count: u64,
    /// Sum of all observations
    pub sum: f64,
}

/// Scalar metric value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    /// Integer-valued measurement
    Long(i64),
    /// Floating-point measurement
    Double(f64),
}

impl ScalarValue {
    /// The value as f64 for chart aggregation
    pub fn as_f64(&self) -> f64 {
        match *self {
            ScalarValue::Long(v) => v as f64,
            ScalarValue::Double(v) => v,
        }
    }
}

/// A stored cumulative histogram snapshot.
///
/// Counts hold running totals since the start of collection; the sampler
/// subtracts consecutive snapshots to recover incremental counts.
#[derive(Debug, Clone)]
pub struct HistogramSnapshot {
    /// Ascending bucket upper bounds, shared across snapshots of a series
    pub bounds: Arc<[f64]>,
    /// Cumulative per-bucket counts
    pub counts: Box<[u64]>,
    /// Total observation count
    pub count: u64,
    /// Sum of all observations
    pub sum: f64,
}

/// The stored value of one record
#[derive(Debug, Clone)]
pub enum MetricValue {
    /// A scalar measurement
    Scalar(ScalarValue),
    /// A cumulative histogram snapshot
    Histogram(HistogramSnapshot),
}

/// One stored record: a value plus the interval it covers
#[derive(Debug, Clone)]
pub struct ValueRecord {
    /// Start of the collection interval
    pub start: SystemTime,
    /// End of the collection interval
    pub end: SystemTime,
    /// The recorded value
    pub value: MetricValue,
}

impl ValueRecord {
    /// Interval-overlap test against a query bucket.
    ///
    /// True when either interval contains the other or they straddle:
    /// points may represent instantaneous samples or small accumulation
    /// windows, so a bucket claims any record whose interval touches it.
    pub fn overlaps(&self, start: SystemTime, end: SystemTime) -> bool {
        (self.start <= end && self.end >= start) || (self.start >= start && self.end <= end)
    }
}
