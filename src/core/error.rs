//! Error types used throughout glance.

use thiserror::Error;

/// Main error type for glance operations
#[derive(Error, Debug)]
pub enum GlanceError {
    /// A metric record that cannot be interpreted
    #[error("Malformed metric record: {0}")]
    MalformedRecord(String),

    /// A record whose data kind disagrees with its instrument
    #[error("Metric kind mismatch for instrument '{instrument}': expected {expected}, got {actual}")]
    KindMismatch {
        /// Instrument the record was addressed to
        instrument: String,
        /// Kind the instrument was created with
        expected: &'static str,
        /// Kind the record carried
        actual: &'static str,
    },

    /// Histogram snapshots with differing bucket layouts cannot be merged
    #[error("Histogram bucket layout changed: expected {expected} buckets, got {actual}")]
    HistogramLayoutChanged {
        /// Bucket count of the established layout
        expected: usize,
        /// Bucket count of the offending snapshot
        actual: usize,
    },

    /// A requested percentile outside 0..=100
    #[error("Percentile must be between 0 and 100, got {0}")]
    InvalidPercentile(f64),

    /// A chart window that cannot be sampled
    #[error("Invalid chart window: {0}")]
    InvalidWindow(String),

    /// The application registry is full
    #[error("Application limit exceeded: {limit} applications already tracked")]
    ApplicationLimit {
        /// Configured maximum
        limit: usize,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The chart update channel closed unexpectedly
    #[error("Chart update channel closed")]
    ChannelClosed,

    /// Async task join errors
    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
}

/// Result type alias for glance operations
pub type Result<T> = std::result::Result<T, GlanceError>;

impl GlanceError {
    /// Creates a new malformed-record error
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedRecord(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new invalid-window error
    pub fn window<S: Into<String>>(msg: S) -> Self {
        Self::InvalidWindow(msg.into())
    }

    /// Returns true if ingest should skip the record and keep going
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::MalformedRecord(_)
                | Self::KindMismatch { .. }
                | Self::HistogramLayoutChanged { .. }
        )
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::MalformedRecord(_) | Self::KindMismatch { .. } => "ingest",
            Self::HistogramLayoutChanged { .. } => "data_integrity",
            Self::InvalidPercentile(_) | Self::InvalidWindow(_) => "query",
            Self::ApplicationLimit { .. } => "resource",
            Self::Config(_) => "config",
            Self::ChannelClosed => "channel",
            Self::Join(_) => "async",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}
