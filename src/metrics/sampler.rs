//! Windowed chart sampling over raw series.
//!
//! The sampler is stateless: given a set of series and a chart window it
//! partitions the window into fixed-cadence buckets and aggregates every
//! record whose collection interval overlaps a bucket. Buckets are
//! generated newest to oldest from the window anchor, with two extra
//! trailing buckets so a chart draws all the way to its right edge, then
//! reversed to oldest-first for the caller. A bucket with no contributing
//! record is a gap (`None`), never zero.
//!
//! Histogram sampling additionally converts cumulative bucket counts into
//! incremental counts by subtracting consecutive snapshots, then
//! interpolates the requested percentiles from the combined distribution.

use crate::core::{GlanceError, Result};
use crate::metrics::series::DimensionScope;
use crate::metrics::types::{HistogramSnapshot, MetricValue, ValueRecord};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Tolerance pad applied to histogram bucket-overlap tests, absorbing
/// minor clock skew between producer flush intervals and bucket edges.
const HISTOGRAM_EDGE_TOLERANCE: Duration = Duration::from_secs(1);

/// The requested sampling window
#[derive(Debug, Clone, Copy)]
pub struct ChartWindow {
    /// Anchor the buckets walk backward from (the current data start time)
    pub anchor: SystemTime,
    /// Total duration covered by the window
    pub duration: Duration,
    /// Number of buckets the window is divided into
    pub point_count: usize,
}

impl ChartWindow {
    /// Width of one bucket
    pub fn bucket_width(&self) -> Duration {
        self.duration / self.point_count as u32
    }

    /// Rejects zero-length windows, zero point counts, and durations so
    /// short the bucket width truncates to zero
    pub fn validate(&self) -> Result<()> {
        if self.duration.is_zero() {
            return Err(GlanceError::window("duration must be non-zero"));
        }
        if self.point_count == 0 {
            return Err(GlanceError::window("point count must be non-zero"));
        }
        if self.bucket_width().is_zero() {
            return Err(GlanceError::window("duration too short for the point count"));
        }
        Ok(())
    }

    fn offset(&self, index: usize) -> SystemTime {
        self.anchor
            .checked_sub(self.bucket_width() * index as u32)
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

/// One named value series of a chart
#[derive(Debug, Clone, PartialEq)]
pub struct ChartTrace {
    /// Display label
    pub name: String,
    /// One value per timestamp; `None` renders as a gap
    pub values: Vec<Option<f64>>,
}

/// A sampled chart: shared timestamps plus one or more traces
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    /// Bucket end times, oldest first
    pub timestamps: Vec<SystemTime>,
    /// Sampled traces, all the same length as `timestamps`
    pub traces: Vec<ChartTrace>,
}

/// Samples a direct-value series (counters and gauges).
///
/// Each bucket sums every scalar record overlapping it across all given
/// series. When `tick` carries the in-progress data time, one extra point
/// covering the span from the newest full bucket to that time is appended
/// if it has data, letting a live chart extend without recomputing history.
pub fn compute_value_series(
    dimensions: &[Arc<DimensionScope>],
    window: &ChartWindow,
    label: &str,
    tick: Option<SystemTime>,
) -> Result<ChartSeries> {
    window.validate()?;

    let bucket_width = window.bucket_width();
    let mut timestamps = Vec::with_capacity(window.point_count + 3);
    let mut values = Vec::with_capacity(window.point_count + 3);
    let mut first_point_end = None;

    for index in 0..window.point_count + 2 {
        let start = window.offset(index);
        let end = start.checked_add(bucket_width).unwrap_or(start);
        if first_point_end.is_none() {
            first_point_end = Some(end);
        }
        timestamps.push(end);
        values.push(sum_scalar_point(dimensions, start, end));
    }

    values.reverse();
    timestamps.reverse();

    if let (Some(in_progress), Some(newest_end)) = (tick, first_point_end) {
        if let Some(value) = sum_scalar_point(dimensions, newest_end, in_progress) {
            values.push(Some(value));
            timestamps.push(in_progress);
        }
    }

    Ok(ChartSeries {
        timestamps,
        traces: vec![ChartTrace {
            name: label.to_string(),
            values,
        }],
    })
}

/// Samples a histogram series into one trace per requested percentile.
///
/// Bucket layouts must agree across every contributing snapshot; a layout
/// change mid-stream fails the whole query rather than producing a
/// numerically meaningless merge.
pub fn compute_histogram_series(
    dimensions: &[Arc<DimensionScope>],
    window: &ChartWindow,
    percentiles: &[f64],
    tick: Option<SystemTime>,
) -> Result<ChartSeries> {
    window.validate()?;
    for &percentile in percentiles {
        if !(0.0..=100.0).contains(&percentile) {
            return Err(GlanceError::InvalidPercentile(percentile));
        }
    }

    let bucket_width = window.bucket_width();
    let mut timestamps = Vec::with_capacity(window.point_count + 3);
    let mut traces: Vec<Vec<Option<f64>>> =
        vec![Vec::with_capacity(window.point_count + 3); percentiles.len()];
    let mut first_point_end = None;

    for index in 0..window.point_count + 2 {
        let start = window.offset(index);
        let end = start.checked_add(bucket_width).unwrap_or(start);
        if first_point_end.is_none() {
            first_point_end = Some(end);
        }
        timestamps.push(end);

        match combine_histogram_deltas(dimensions, start, end)? {
            Some((counts, bounds)) => {
                for (trace, &percentile) in traces.iter_mut().zip(percentiles) {
                    trace.push(Some(calculate_percentile(percentile, &counts, &bounds)?));
                }
            },
            None => {
                for trace in &mut traces {
                    trace.push(None);
                }
            },
        }
    }

    for trace in &mut traces {
        trace.reverse();
    }
    timestamps.reverse();

    if let (Some(in_progress), Some(newest_end)) = (tick, first_point_end) {
        if let Some((counts, bounds)) =
            combine_histogram_deltas(dimensions, newest_end, in_progress)?
        {
            for (trace, &percentile) in traces.iter_mut().zip(percentiles) {
                trace.push(Some(calculate_percentile(percentile, &counts, &bounds)?));
            }
            timestamps.push(in_progress);
        }
    }

    Ok(ChartSeries {
        timestamps,
        traces: traces
            .into_iter()
            .zip(percentiles)
            .map(|(values, &percentile)| ChartTrace {
                name: percentile_label(percentile),
                values,
            })
            .collect(),
    })
}

/// Sums scalar records overlapping `[start, end]` across all series.
/// Returns `None` when no record contributes, which is distinct from a
/// contributed sum of zero.
fn sum_scalar_point(
    dimensions: &[Arc<DimensionScope>],
    start: SystemTime,
    end: SystemTime,
) -> Option<f64> {
    let mut has_value = false;
    let mut point_value = 0.0;

    for dimension in dimensions {
        let records = dimension.records();
        for record in records.iter().rev() {
            if record.overlaps(start, end) {
                if let MetricValue::Scalar(value) = &record.value {
                    point_value += value.as_f64();
                    has_value = true;
                }
            }
        }
    }

    has_value.then_some(point_value)
}

/// Combines per-bucket incremental counts across every contributing series.
///
/// A snapshot contributes when a *previous* snapshot exists in its series
/// (the first snapshot has nothing to diff against) and its interval
/// overlaps the tolerance-padded bucket. Incremental counts are
/// `later.counts[i] - earlier.counts[i]` since reported counts are
/// cumulative.
fn combine_histogram_deltas(
    dimensions: &[Arc<DimensionScope>],
    start: SystemTime,
    end: SystemTime,
) -> Result<Option<(Vec<u64>, Arc<[f64]>)>> {
    let start = start
        .checked_sub(HISTOGRAM_EDGE_TOLERANCE)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let end = end.checked_add(HISTOGRAM_EDGE_TOLERANCE).unwrap_or(end);

    let mut combined: Option<Vec<u64>> = None;
    let mut bounds: Option<Arc<[f64]>> = None;

    for dimension in dimensions {
        let records = dimension.records();
        for index in (1..records.len()).rev() {
            let record = &records[index];
            if !record.overlaps(start, end) {
                continue;
            }

            let snapshot = as_histogram(record)?;
            let previous = as_histogram(&records[index - 1])?;
            if bounds.is_none() {
                bounds = Some(Arc::clone(&snapshot.bounds));
            }

            match &combined {
                Some(counts) if counts.len() != snapshot.counts.len() => {
                    return Err(GlanceError::HistogramLayoutChanged {
                        expected: counts.len(),
                        actual: snapshot.counts.len(),
                    });
                },
                Some(_) => {},
                None => combined = Some(vec![0; snapshot.counts.len()]),
            }
            let Some(counts) = combined.as_mut() else {
                continue;
            };

            for (slot, (&later, &earlier)) in counts
                .iter_mut()
                .zip(snapshot.counts.iter().zip(previous.counts.iter()))
            {
                // Counts are cumulative over the series' lifetime;
                // saturate rather than wrap if a producer resets.
                *slot += later.saturating_sub(earlier);
            }
        }
    }

    Ok(combined.zip(bounds))
}

fn as_histogram(record: &ValueRecord) -> Result<&HistogramSnapshot> {
    match &record.value {
        MetricValue::Histogram(snapshot) => Ok(snapshot),
        MetricValue::Scalar(_) => Err(GlanceError::malformed(
            "scalar record in a histogram series",
        )),
    }
}

/// Interpolates one percentile from incremental bucket counts.
///
/// Walks the bucket bounds accumulating counts and returns the bound of
/// the first bucket whose cumulative count reaches the target; when the
/// target exceeds every bucket, the last bound is returned.
pub fn calculate_percentile(percentile: f64, counts: &[u64], bounds: &[f64]) -> Result<f64> {
    if !(0.0..=100.0).contains(&percentile) {
        return Err(GlanceError::InvalidPercentile(percentile));
    }
    if bounds.is_empty() {
        return Err(GlanceError::malformed("histogram has no bucket bounds"));
    }

    let total_count: u64 = counts.iter().sum();
    let target_count = (percentile / 100.0) * total_count as f64;

    let mut accumulated: u64 = 0;
    for (index, &bound) in bounds.iter().enumerate() {
        accumulated += counts.get(index).copied().unwrap_or(0);
        if accumulated as f64 >= target_count {
            return Ok(bound);
        }
    }

    Ok(bounds[bounds.len() - 1])
}

fn percentile_label(percentile: f64) -> String {
    if percentile.fract() == 0.0 {
        format!("{}th Percentile", percentile as i64)
    } else {
        format!("{percentile}th Percentile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::attributes::AttributeSet;
    use crate::metrics::types::{HistogramPoint, NumberPoint, ScalarValue};
    use pretty_assertions::assert_eq;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn scalar_series(points: &[(u64, u64, i64)]) -> Arc<DimensionScope> {
        let series = Arc::new(DimensionScope::new(AttributeSet::from_sorted(&[])));
        for &(start, end, value) in points {
            series.append_point(&NumberPoint {
                attributes: vec![],
                start: at(start),
                end: at(end),
                value: ScalarValue::Long(value),
            });
        }
        series
    }

    fn histogram_series(snapshots: &[(u64, u64, [u64; 3])]) -> Arc<DimensionScope> {
        let series = Arc::new(DimensionScope::new(AttributeSet::from_sorted(&[])));
        for &(start, end, counts) in snapshots {
            series
                .append_histogram(&HistogramPoint {
                    attributes: vec![],
                    start: at(start),
                    end: at(end),
                    bounds: vec![1.0, 5.0, 10.0],
                    counts: counts.to_vec(),
                    count: counts.iter().sum(),
                    sum: 0.0,
                })
                .unwrap();
        }
        series
    }

    fn window(anchor_secs: u64, duration_secs: u64, point_count: usize) -> ChartWindow {
        ChartWindow {
            anchor: at(anchor_secs),
            duration: Duration::from_secs(duration_secs),
            point_count,
        }
    }

    #[test]
    fn test_value_series_shape() {
        let series = compute_value_series(&[], &window(1000, 100, 10), "Requests", None).unwrap();
        // point_count + 2 trailing buckets, all gaps with no data.
        assert_eq!(series.timestamps.len(), 12);
        assert_eq!(series.traces.len(), 1);
        assert_eq!(series.traces[0].name, "Requests");
        assert!(series.traces[0].values.iter().all(Option::is_none));
        // Oldest first.
        assert!(series.timestamps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*series.timestamps.last().unwrap(), at(1010));
    }

    #[test]
    fn test_value_series_buckets_and_gaps() {
        // Buckets are 10s wide, anchored at t=1000. The record [955, 958]
        // lands in the bucket (950, 960] only.
        let dims = vec![scalar_series(&[(955, 958, 7)])];
        let series = compute_value_series(&dims, &window(1000, 100, 10), "Requests", None).unwrap();

        let filled: Vec<_> = series
            .timestamps
            .iter()
            .zip(&series.traces[0].values)
            .filter(|(_, v)| v.is_some())
            .collect();
        assert_eq!(filled.len(), 1);
        assert_eq!(*filled[0].0, at(960));
        assert_eq!(*filled[0].1, Some(7.0));
    }

    #[test]
    fn test_value_series_sums_across_series() {
        let dims = vec![
            scalar_series(&[(955, 955, 3)]),
            scalar_series(&[(957, 957, 4)]),
        ];
        let series = compute_value_series(&dims, &window(1000, 100, 10), "Requests", None).unwrap();
        assert!(series.traces[0].values.contains(&Some(7.0)));
    }

    #[test]
    fn test_gap_distinct_from_zero() {
        let dims = vec![scalar_series(&[(955, 955, 0)])];
        let series = compute_value_series(&dims, &window(1000, 100, 10), "Requests", None).unwrap();
        let values = &series.traces[0].values;
        assert!(values.contains(&Some(0.0)));
        assert!(values.iter().any(Option::is_none));
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let dims = vec![scalar_series(&[(950, 960, 5), (970, 980, 2)])];
        let w = window(1000, 100, 10);
        let first = compute_value_series(&dims, &w, "Requests", None).unwrap();
        let second = compute_value_series(&dims, &w, "Requests", None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_tick_update_appends_in_progress_point() {
        // The in-progress interval starts at the newest bucket's end
        // (anchor + bucket width) and runs to the in-progress time.
        let dims = vec![scalar_series(&[(1012, 1013, 9)])];
        let with_data =
            compute_value_series(&dims, &window(1000, 100, 10), "Requests", Some(at(1014)))
                .unwrap();
        assert_eq!(with_data.timestamps.len(), 13);
        assert_eq!(*with_data.timestamps.last().unwrap(), at(1014));
        assert_eq!(*with_data.traces[0].values.last().unwrap(), Some(9.0));

        // Without data in the in-progress interval nothing is appended.
        let without_data =
            compute_value_series(&[], &window(1000, 100, 10), "Requests", Some(at(1014))).unwrap();
        assert_eq!(without_data.timestamps.len(), 12);
    }

    #[test]
    fn test_invalid_window_rejected() {
        let zero_duration = ChartWindow {
            anchor: at(1000),
            duration: Duration::ZERO,
            point_count: 10,
        };
        assert!(compute_value_series(&[], &zero_duration, "x", None).is_err());

        let zero_points = window(1000, 100, 0);
        assert!(compute_value_series(&[], &zero_points, "x", None).is_err());

        // 5ns across 30 points truncates to a zero bucket width.
        let zero_width = ChartWindow {
            anchor: at(1000),
            duration: Duration::from_nanos(5),
            point_count: 30,
        };
        assert!(compute_value_series(&[], &zero_width, "x", None).is_err());
    }

    #[test]
    fn test_histogram_diff_and_percentiles() {
        // Cumulative [1,3,4] then [2,5,5]: the interval's incremental
        // counts are [1,2,1] (total 4). p50 target 2 -> cumulative 3 at
        // bound 5; p99 target 3.96 -> cumulative 4 at bound 10.
        let dims = vec![histogram_series(&[
            (940, 950, [1, 3, 4]),
            (950, 958, [2, 5, 5]),
        ])];
        let series =
            compute_histogram_series(&dims, &window(1000, 100, 10), &[50.0, 99.0], None).unwrap();

        assert_eq!(series.traces[0].name, "50th Percentile");
        assert_eq!(series.traces[1].name, "99th Percentile");

        let p50_filled: Vec<_> = series.traces[0].values.iter().flatten().collect();
        let p99_filled: Vec<_> = series.traces[1].values.iter().flatten().collect();
        assert!(!p50_filled.is_empty());
        assert!(p50_filled.iter().all(|&&v| v == 5.0));
        assert!(p99_filled.iter().all(|&&v| v == 10.0));
    }

    #[test]
    fn test_first_snapshot_never_contributes() {
        // A single snapshot has nothing to diff against.
        let dims = vec![histogram_series(&[(950, 958, [1, 3, 4])])];
        let series =
            compute_histogram_series(&dims, &window(1000, 100, 10), &[50.0], None).unwrap();
        assert!(series.traces[0].values.iter().all(Option::is_none));
    }

    #[test]
    fn test_histogram_gap_yields_absent_for_every_percentile() {
        let series = compute_histogram_series(
            &[],
            &window(1000, 100, 10),
            &[50.0, 90.0, 99.0],
            None,
        )
        .unwrap();
        assert_eq!(series.traces.len(), 3);
        for trace in &series.traces {
            assert!(trace.values.iter().all(Option::is_none));
        }
    }

    #[test]
    fn test_layout_mismatch_across_series_fails_query() {
        let a = histogram_series(&[(940, 950, [1, 1, 1]), (950, 958, [2, 2, 2])]);
        let b = Arc::new(DimensionScope::new(AttributeSet::from_sorted(&[])));
        for (start, end, counts) in [(940u64, 950u64, vec![1u64, 1]), (950, 958, vec![2, 2])] {
            b.append_histogram(&HistogramPoint {
                attributes: vec![],
                start: at(start),
                end: at(end),
                bounds: vec![1.0, 5.0],
                counts,
                count: 0,
                sum: 0.0,
            })
            .unwrap();
        }

        let err = compute_histogram_series(&[a, b], &window(1000, 100, 10), &[50.0], None)
            .unwrap_err();
        assert!(matches!(err, GlanceError::HistogramLayoutChanged { .. }));
    }

    #[test]
    fn test_percentile_interpolation() {
        let bounds = [1.0, 5.0, 10.0];
        let counts = [1, 2, 1];
        assert_eq!(calculate_percentile(50.0, &counts, &bounds).unwrap(), 5.0);
        assert_eq!(calculate_percentile(99.0, &counts, &bounds).unwrap(), 10.0);
        assert_eq!(calculate_percentile(0.0, &counts, &bounds).unwrap(), 1.0);
        assert_eq!(calculate_percentile(100.0, &counts, &bounds).unwrap(), 10.0);
    }

    #[test]
    fn test_percentile_out_of_range() {
        let bounds = [1.0];
        assert!(calculate_percentile(-0.1, &[1], &bounds).is_err());
        assert!(calculate_percentile(100.1, &[1], &bounds).is_err());
    }

    #[test]
    fn test_percentile_overflow_bucket_counted_in_total() {
        // A trailing overflow count beyond the bounds raises the target
        // without ever being reachable, falling back to the last bound.
        let bounds = [1.0, 5.0];
        let counts = [1, 1, 10];
        assert_eq!(calculate_percentile(99.0, &counts, &bounds).unwrap(), 5.0);
    }

    #[test]
    fn test_percentile_labels() {
        assert_eq!(percentile_label(50.0), "50th Percentile");
        assert_eq!(percentile_label(99.9), "99.9th Percentile");
    }
}
