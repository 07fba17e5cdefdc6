//! Configuration for the charting engine.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Validation and defaults
//! - Human-readable durations ("5m", "200ms")

use crate::core::{GlanceError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete configuration for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Chart sampling and refresh configuration
    pub chart: ChartConfig,
    /// Ingest configuration
    pub ingest: IngestConfig,
}

/// Chart sampling and refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Sliding window covered by a chart
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Number of points drawn across the window
    pub point_count: usize,
    /// Percentiles computed for histogram instruments
    pub percentiles: Vec<f64>,
    /// Interval between refresh ticks
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Minimum interval between pushed chart updates
    #[serde(with = "humantime_serde")]
    pub update_throttle: Duration,
    /// Compensation for the delay between a process recording a
    /// measurement and the engine receiving it
    #[serde(with = "humantime_serde")]
    pub ingest_delay: Duration,
}

/// Ingest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum number of applications tracked before new resources are rejected
    pub max_applications: usize,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(180),
            point_count: 30,
            percentiles: vec![50.0, 90.0, 99.0],
            tick_interval: Duration::from_millis(200),
            update_throttle: Duration::from_millis(200),
            ingest_delay: Duration::from_secs(1),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_applications: 1000,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chart: ChartConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl ChartConfig {
    /// Width of one chart bucket
    pub fn bucket_width(&self) -> Duration {
        self.duration / self.point_count as u32
    }

    /// Validates the chart configuration
    pub fn validate(&self) -> Result<()> {
        if self.duration.is_zero() {
            return Err(GlanceError::config("chart duration must be non-zero"));
        }
        if self.point_count == 0 {
            return Err(GlanceError::config("chart point count must be non-zero"));
        }
        if self.bucket_width().is_zero() {
            return Err(GlanceError::config(
                "chart duration too short for the point count",
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(GlanceError::config("tick interval must be non-zero"));
        }
        for &p in &self.percentiles {
            if !(0.0..=100.0).contains(&p) {
                return Err(GlanceError::InvalidPercentile(p));
            }
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Loads configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the complete configuration
    pub fn validate(&self) -> Result<()> {
        self.chart.validate()?;
        if self.ingest.max_applications == 0 {
            return Err(GlanceError::config("max_applications must be non-zero"));
        }
        Ok(())
    }
}
