//! Instruments: named metric definitions with attribute-indexed series.
//!
//! An instrument owns one [`DimensionScope`] per distinct attribute set and
//! a denormalized index of every attribute value ever seen per key, which
//! feeds filter pickers. Ingest is the only mutation path; chart sampling
//! reads concurrently through the same maps.

use crate::core::{GlanceError, Result};
use crate::metrics::attributes::{AttributeScratch, AttributeSet, KeyValue};
use crate::metrics::filter::{DimensionFilter, FilterValue};
use crate::metrics::series::DimensionScope;
use crate::metrics::types::{MetricData, MetricRecord};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// The closed set of instrument kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    /// Point-in-time measurements
    Gauge,
    /// Monotonic or delta counters
    Sum,
    /// Cumulative histograms
    Histogram,
}

impl InstrumentKind {
    /// Derives the kind from a record's data variant
    pub fn of(data: &MetricData) -> Self {
        match data {
            MetricData::Gauge(_) => InstrumentKind::Gauge,
            MetricData::Sum(_) => InstrumentKind::Sum,
            MetricData::Histogram(_) => InstrumentKind::Histogram,
        }
    }

    /// Kind name for error messages
    pub fn name(&self) -> &'static str {
        match self {
            InstrumentKind::Gauge => "gauge",
            InstrumentKind::Sum => "sum",
            InstrumentKind::Histogram => "histogram",
        }
    }
}

/// A named, typed metric definition within a meter
#[derive(Debug)]
pub struct Instrument {
    name: String,
    description: String,
    unit: String,
    kind: InstrumentKind,
    meter_name: String,
    dimensions: DashMap<AttributeSet, Arc<DimensionScope>, ahash::RandomState>,
    known_values: DashMap<String, HashSet<String>, ahash::RandomState>,
    // Serializes dimension creation so the first-sight index update and the
    // empty-marker backfill stay consistent. The probe fast path never takes it.
    create_lock: Mutex<()>,
}

impl Instrument {
    /// Creates an instrument from the first record that referenced it
    pub fn new(record: &MetricRecord, meter_name: &str) -> Self {
        Self {
            name: record.name.clone(),
            description: record.description.clone(),
            unit: record.unit.clone(),
            kind: InstrumentKind::of(&record.data),
            meter_name: meter_name.to_string(),
            dimensions: DashMap::default(),
            known_values: DashMap::default(),
            create_lock: Mutex::new(()),
        }
    }

    /// Instrument name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Unit string as reported
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// The instrument kind
    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    /// Name of the owning meter
    pub fn meter_name(&self) -> &str {
        &self.meter_name
    }

    /// Appends every data point of a record to the right series.
    ///
    /// A record whose kind does not match the instrument is rejected whole;
    /// the caller counts it and continues with the rest of the batch.
    pub fn add_record(&self, record: &MetricRecord, scratch: &mut AttributeScratch) -> Result<()> {
        let actual = InstrumentKind::of(&record.data);
        if actual != self.kind {
            return Err(GlanceError::KindMismatch {
                instrument: self.name.clone(),
                expected: self.kind.name(),
                actual: actual.name(),
            });
        }

        match &record.data {
            MetricData::Gauge(points) | MetricData::Sum(points) => {
                for point in points {
                    self.find_scope(&point.attributes, scratch).append_point(point);
                }
            },
            MetricData::Histogram(points) => {
                for point in points {
                    self.find_scope(&point.attributes, scratch)
                        .append_histogram(point)?;
                }
            },
        }
        Ok(())
    }

    /// Resolves the series for a data point's attribute set, creating it on
    /// first sight.
    ///
    /// The scratch buffer holds the sorted pairs; the map is probed with
    /// that view, so the common case allocates nothing.
    fn find_scope(
        &self,
        attributes: &[KeyValue],
        scratch: &mut AttributeScratch,
    ) -> Arc<DimensionScope> {
        let sorted = scratch.normalize(attributes);
        if let Some(dimension) = self.dimensions.get(sorted) {
            return Arc::clone(&dimension);
        }
        self.add_dimension_scope(sorted)
    }

    fn add_dimension_scope(&self, sorted: &[KeyValue]) -> Arc<DimensionScope> {
        let _guard = self.create_lock.lock();

        // Another ingest caller may have won the race while we waited.
        if let Some(dimension) = self.dimensions.get(sorted) {
            return Arc::clone(&dimension);
        }

        let is_first = self.dimensions.is_empty();
        let durable = AttributeSet::from_sorted(sorted);
        let dimension = Arc::new(DimensionScope::new(durable.clone()));
        self.dimensions.insert(durable.clone(), Arc::clone(&dimension));

        // Update the known-value index. A key first seen now, after other
        // series already exist, gets an empty marker standing in for those
        // series' missing value.
        for (key, value) in durable.pairs() {
            let mut values = self.known_values.entry(key.clone()).or_insert_with(|| {
                let mut fresh = HashSet::new();
                if !is_first {
                    fresh.insert(String::new());
                }
                fresh
            });
            values.insert(value.clone());
        }

        // Known keys absent from the new series also gain the empty marker.
        for mut entry in self.known_values.iter_mut() {
            if durable.value_of(entry.key()).is_none() {
                entry.value_mut().insert(String::new());
            }
        }

        tracing::debug!(
            instrument = %self.name,
            attributes = ?durable.pairs(),
            "created dimension scope"
        );

        dimension
    }

    /// All series of this instrument
    pub fn dimensions(&self) -> Vec<Arc<DimensionScope>> {
        self.dimensions.iter().map(|d| Arc::clone(d.value())).collect()
    }

    /// Series matching the given filter set
    pub fn matched_dimensions(&self, filters: &[DimensionFilter]) -> Vec<Arc<DimensionScope>> {
        self.dimensions
            .iter()
            .filter(|d| crate::metrics::filter::matches_all(filters, d.key()))
            .map(|d| Arc::clone(d.value()))
            .collect()
    }

    /// The known-value index: sorted keys, each with its sorted value set
    pub fn known_attribute_values(&self) -> Vec<(String, Vec<String>)> {
        let mut index: Vec<(String, Vec<String>)> = self
            .known_values
            .iter()
            .map(|entry| {
                let mut values: Vec<String> = entry.value().iter().cloned().collect();
                values.sort();
                (entry.key().clone(), values)
            })
            .collect();
        index.sort_by(|a, b| a.0.cmp(&b.0));
        index
    }

    /// Builds the default filter set: one filter per known key with every
    /// value selected, the "(All)" sentinel first
    pub fn default_filters(&self) -> Vec<DimensionFilter> {
        self.known_attribute_values()
            .into_iter()
            .map(|(key, values)| {
                let mut selected = vec![FilterValue::All];
                selected.extend(values.into_iter().map(|v| {
                    if v.is_empty() {
                        FilterValue::Empty
                    } else {
                        FilterValue::Value(v)
                    }
                }));
                DimensionFilter::with_values(key, selected)
            })
            .collect()
    }

    /// Display label for the chart's y-axis.
    ///
    /// Falls back to well-known name suffixes for instruments reported
    /// without a unit.
    pub fn display_unit(&self) -> String {
        let trimmed = self.unit.trim_start_matches('{').trim_end_matches('}');
        if !trimmed.is_empty() {
            let mut chars = trimmed.chars();
            return match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            };
        }
        if self.name.ends_with(".count") {
            "Count".to_string()
        } else if self.name.ends_with(".length") {
            "Length".to_string()
        } else {
            "Value".to_string()
        }
    }
}
