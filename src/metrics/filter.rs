//! Attribute-value filtering for chart views.
//!
//! A chart view carries one filter per known attribute key. A series must
//! match every filter to contribute to the chart. The "(All)" sentinel
//! short-circuits its key to match-everything; "(Empty)" matches series
//! that lack the key or carry an empty value. An empty selection matches
//! nothing, which renders an empty chart rather than silently widening
//! the filter.

use crate::metrics::attributes::AttributeSet;

/// One selectable filter entry for an attribute key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// Matches every series regardless of this key
    All,
    /// Matches series lacking the key or carrying an empty value
    Empty,
    /// Matches series carrying exactly this value
    Value(String),
}

impl FilterValue {
    /// Display label for filter pickers
    pub fn label(&self) -> &str {
        match self {
            FilterValue::All => "(All)",
            FilterValue::Empty => "(Empty)",
            FilterValue::Value(v) => v,
        }
    }
}

/// The accepted-value selection for one attribute key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionFilter {
    /// Attribute key this filter applies to
    pub key: String,
    /// Currently selected values
    pub selected: Vec<FilterValue>,
}

impl DimensionFilter {
    /// Creates a filter that accepts every value for the key
    pub fn match_all<S: Into<String>>(key: S) -> Self {
        Self {
            key: key.into(),
            selected: vec![FilterValue::All],
        }
    }

    /// Creates a filter that accepts exactly the given values
    pub fn with_values<S: Into<String>>(key: S, values: Vec<FilterValue>) -> Self {
        Self {
            key: key.into(),
            selected: values,
        }
    }

    /// Tests one series' attributes against this filter
    pub fn matches(&self, attributes: &AttributeSet) -> bool {
        let value = attributes.value_of(&self.key);
        for item in &self.selected {
            match item {
                FilterValue::All => return true,
                FilterValue::Empty => {
                    if value.map_or(true, str::is_empty) {
                        return true;
                    }
                },
                FilterValue::Value(v) => {
                    if value == Some(v.as_str()) {
                        return true;
                    }
                },
            }
        }
        false
    }
}

/// Tests one series against a full filter set (intersection across keys)
pub fn matches_all(filters: &[DimensionFilter], attributes: &AttributeSet) -> bool {
    filters.iter().all(|f| f.matches(attributes))
}
