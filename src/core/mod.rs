//! Core configuration and error types for glance.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{ChartConfig, EngineConfig, IngestConfig};
pub use error::{GlanceError, Result};
