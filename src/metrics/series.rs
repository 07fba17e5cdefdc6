//! Per-attribute-set time series storage.
//!
//! A [`DimensionScope`] is the append-only record sequence for one
//! instrument + one attribute set. Appends take the write lock and publish
//! a whole record at a time; samplers scan under the read lock, so a
//! concurrent append is either fully visible or not visible at all.

use crate::core::{GlanceError, Result};
use crate::metrics::attributes::AttributeSet;
use crate::metrics::types::{
    HistogramPoint, HistogramSnapshot, MetricValue, NumberPoint, ValueRecord,
};
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;

/// The time series for one instrument + attribute-set combination
#[derive(Debug)]
pub struct DimensionScope {
    attributes: AttributeSet,
    values: RwLock<Vec<ValueRecord>>,
}

impl DimensionScope {
    /// Creates an empty series for the given attribute set
    pub fn new(attributes: AttributeSet) -> Self {
        Self {
            attributes,
            values: RwLock::new(Vec::new()),
        }
    }

    /// The attribute set identifying this series
    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    /// Appends a scalar data point
    pub fn append_point(&self, point: &NumberPoint) {
        let record = ValueRecord {
            start: point.start,
            end: point.end,
            value: MetricValue::Scalar(point.value),
        };
        self.values.write().push(record);
    }

    /// Appends a cumulative histogram snapshot.
    ///
    /// The bucket layout of a series is fixed by its first snapshot: a
    /// snapshot with a different bucket count is rejected, not absorbed.
    /// Bucket bounds are shared with the previous snapshot to avoid
    /// re-allocating an identical bounds array per point.
    pub fn append_histogram(&self, point: &HistogramPoint) -> Result<()> {
        if point.bounds.windows(2).any(|w| w[0] > w[1]) {
            return Err(GlanceError::malformed(format!(
                "histogram bounds not ascending for series {:?}",
                self.attributes.pairs()
            )));
        }

        let mut values = self.values.write();

        let bounds = match values.iter().rev().find_map(|r| match &r.value {
            MetricValue::Histogram(h) => Some(h),
            MetricValue::Scalar(_) => None,
        }) {
            Some(previous) => {
                if previous.counts.len() != point.counts.len() {
                    return Err(GlanceError::HistogramLayoutChanged {
                        expected: previous.counts.len(),
                        actual: point.counts.len(),
                    });
                }
                Arc::clone(&previous.bounds)
            },
            None => Arc::from(point.bounds.as_slice()),
        };

        values.push(ValueRecord {
            start: point.start,
            end: point.end,
            value: MetricValue::Histogram(HistogramSnapshot {
                bounds,
                counts: point.counts.clone().into_boxed_slice(),
                count: point.count,
                sum: point.sum,
            }),
        });
        Ok(())
    }

    /// Read access to the stored records, oldest first
    pub fn records(&self) -> RwLockReadGuard<'_, Vec<ValueRecord>> {
        self.values.read()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Returns true if no records have been appended
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::types::ScalarValue;
    use std::time::{Duration, SystemTime};

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn histogram_point(start: u64, end: u64, counts: Vec<u64>) -> HistogramPoint {
        HistogramPoint {
            attributes: vec![],
            start: at(start),
            end: at(end),
            bounds: vec![1.0, 5.0, 10.0],
            counts,
            count: 0,
            sum: 0.0,
        }
    }

    #[test]
    fn test_append_scalar() {
        let series = DimensionScope::new(AttributeSet::from_sorted(&[]));
        series.append_point(&NumberPoint {
            attributes: vec![],
            start: at(1),
            end: at(2),
            value: ScalarValue::Long(7),
        });
        assert_eq!(series.len(), 1);
        let records = series.records();
        match &records[0].value {
            MetricValue::Scalar(ScalarValue::Long(v)) => assert_eq!(*v, 7),
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn test_histogram_layout_change_rejected() {
        let series = DimensionScope::new(AttributeSet::from_sorted(&[]));
        series
            .append_histogram(&histogram_point(0, 1, vec![1, 2, 3, 4]))
            .unwrap();

        let err = series
            .append_histogram(&histogram_point(1, 2, vec![1, 2, 3]))
            .unwrap_err();
        assert!(matches!(
            err,
            GlanceError::HistogramLayoutChanged {
                expected: 4,
                actual: 3
            }
        ));
        // The bad snapshot was not stored.
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_histogram_bounds_shared() {
        let series = DimensionScope::new(AttributeSet::from_sorted(&[]));
        series
            .append_histogram(&histogram_point(0, 1, vec![1, 2, 3, 4]))
            .unwrap();
        series
            .append_histogram(&histogram_point(1, 2, vec![2, 3, 4, 5]))
            .unwrap();

        let records = series.records();
        let bounds: Vec<_> = records
            .iter()
            .map(|r| match &r.value {
                MetricValue::Histogram(h) => Arc::clone(&h.bounds),
                MetricValue::Scalar(_) => panic!("expected histogram"),
            })
            .collect();
        assert!(Arc::ptr_eq(&bounds[0], &bounds[1]));
    }

    #[test]
    fn test_unsorted_bounds_rejected() {
        let series = DimensionScope::new(AttributeSet::from_sorted(&[]));
        let mut point = histogram_point(0, 1, vec![1, 2, 3, 4]);
        point.bounds = vec![5.0, 1.0, 10.0];
        assert!(series.append_histogram(&point).is_err());
        assert!(series.is_empty());
    }
}
