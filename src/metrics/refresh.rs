//! Timer-driven chart refresh.
//!
//! One [`ChartRefreshLoop`] runs per open chart view. It starts in
//! `Initializing`, pushes a full recompute as a `Replace` update, then in
//! `Steady` state recomputes incrementally on each tick and pushes
//! throttled `Extend` updates. A filter or duration change forces the next
//! tick back onto the full-recompute path.
//!
//! The loop anchors its buckets at a data start time that creeps forward
//! one bucket width at a time, so successive recomputes stay aligned to
//! stable bucket edges instead of drifting with wall-clock jitter.

use crate::core::{ChartConfig, Result};
use crate::metrics::filter::DimensionFilter;
use crate::metrics::instrument::{Instrument, InstrumentKind};
use crate::metrics::sampler::{
    compute_histogram_series, compute_value_series, ChartSeries, ChartWindow,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// A chart update pushed to the rendering sink
#[derive(Debug, Clone, PartialEq)]
pub enum ChartUpdate {
    /// Replace all rendered data (initial draw or parameter change)
    Replace(ChartSeries),
    /// Extend the rendered data with a recomputed window
    Extend(ChartSeries),
}

/// Lifecycle state of a refresh loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshState {
    Initializing,
    Steady,
}

/// View parameters shared between the loop task and its handle
#[derive(Debug)]
struct ViewControl {
    filters: RwLock<Vec<DimensionFilter>>,
    duration: RwLock<Duration>,
    params_changed: AtomicBool,
}

/// Handle to a running per-view refresh task
#[derive(Debug)]
pub struct ChartRefreshLoop {
    control: Arc<ViewControl>,
    point_count: usize,
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl ChartRefreshLoop {
    /// Spawns the refresh task for one chart view.
    ///
    /// Updates are pushed to `sink`; dropping the receiving side ends the
    /// loop on its next push.
    pub fn spawn(
        instrument: Arc<Instrument>,
        filters: Vec<DimensionFilter>,
        config: ChartConfig,
        sink: mpsc::UnboundedSender<ChartUpdate>,
    ) -> Result<Self> {
        config.validate()?;

        let control = Arc::new(ViewControl {
            filters: RwLock::new(filters),
            duration: RwLock::new(config.duration),
            params_changed: AtomicBool::new(false),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let point_count = config.point_count;
        let handle = tokio::spawn(run_loop(
            instrument,
            Arc::clone(&control),
            config,
            sink,
            shutdown_rx,
        ));

        Ok(Self {
            control,
            point_count,
            shutdown_tx,
            handle,
        })
    }

    /// Replaces the attribute filter selection; the next tick recomputes
    /// the whole window
    pub fn update_filters(&self, filters: Vec<DimensionFilter>) {
        *self.control.filters.write() = filters;
        self.control.params_changed.store(true, Ordering::Release);
    }

    /// Changes the window duration; the next tick recomputes the whole
    /// window
    pub fn update_duration(&self, duration: Duration) -> Result<()> {
        if duration.is_zero() {
            return Err(crate::core::GlanceError::window("duration must be non-zero"));
        }
        // A zero bucket width would stall the anchor creep in the loop.
        if (duration / self.point_count as u32).is_zero() {
            return Err(crate::core::GlanceError::window(
                "duration too short for the point count",
            ));
        }
        *self.control.duration.write() = duration;
        self.control.params_changed.store(true, Ordering::Release);
        Ok(())
    }

    /// Stops the recurring tick and waits for any in-flight recompute to
    /// finish
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.handle.await?;
        Ok(())
    }
}

/// The in-progress data time: now, minus compensation for the delay in
/// receiving metrics from the monitored services.
fn current_data_time(ingest_delay: Duration) -> SystemTime {
    SystemTime::now()
        .checked_sub(ingest_delay)
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

async fn run_loop(
    instrument: Arc<Instrument>,
    control: Arc<ViewControl>,
    config: ChartConfig,
    sink: mpsc::UnboundedSender<ChartUpdate>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut state = RefreshState::Initializing;
    let mut current_data_start = current_data_time(config.ingest_delay);
    let mut last_update: Option<Instant> = None;

    let mut ticker = tokio::time::interval(config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(instrument = %instrument.name(), "chart refresh loop started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {},
        }

        let duration = *control.duration.read();
        let bucket_width = duration / config.point_count as u32;
        let in_progress = current_data_time(config.ingest_delay);

        // Creep the anchor forward in whole bucket widths so bucket edges
        // stay stable between recomputes.
        while current_data_start + bucket_width < in_progress {
            current_data_start += bucket_width;
        }

        let window = ChartWindow {
            anchor: current_data_start,
            duration,
            point_count: config.point_count,
        };

        let force_full = state == RefreshState::Initializing
            || control.params_changed.swap(false, Ordering::AcqRel);
        let throttled = last_update
            .map_or(false, |at| at.elapsed() < config.update_throttle);
        if !force_full && throttled {
            continue;
        }

        let tick = if force_full { None } else { Some(in_progress) };
        let dimensions = {
            let filters = control.filters.read();
            instrument.matched_dimensions(&filters)
        };
        let computed = match instrument.kind() {
            InstrumentKind::Histogram => {
                compute_histogram_series(&dimensions, &window, &config.percentiles, tick)
            },
            InstrumentKind::Gauge | InstrumentKind::Sum => {
                compute_value_series(&dimensions, &window, &instrument.display_unit(), tick)
            },
        };

        let series = match computed {
            Ok(series) => series,
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    instrument = %instrument.name(),
                    "chart recompute failed, skipping tick"
                );
                continue;
            },
        };

        let update = if force_full {
            state = RefreshState::Steady;
            ChartUpdate::Replace(series)
        } else {
            ChartUpdate::Extend(series)
        };
        last_update = Some(Instant::now());

        if sink.send(update).is_err() {
            // The view is gone; nothing left to render to.
            break;
        }
    }

    tracing::debug!(instrument = %instrument.name(), "chart refresh loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::types::{MetricData, MetricRecord, NumberPoint, ScalarValue};
    use tokio::time::timeout;

    fn test_config() -> ChartConfig {
        ChartConfig {
            duration: Duration::from_secs(60),
            point_count: 30,
            percentiles: vec![50.0, 90.0, 99.0],
            tick_interval: Duration::from_millis(10),
            update_throttle: Duration::from_millis(0),
            ingest_delay: Duration::from_millis(0),
        }
    }

    fn counter_instrument() -> Arc<Instrument> {
        let record = MetricRecord {
            name: "requests".to_string(),
            description: String::new(),
            unit: String::new(),
            data: MetricData::Sum(vec![]),
        };
        Arc::new(Instrument::new(&record, "http"))
    }

    fn ingest_now(instrument: &Instrument, value: i64) {
        let now = SystemTime::now();
        let mut scratch = crate::metrics::attributes::AttributeScratch::new();
        instrument
            .add_record(
                &MetricRecord {
                    name: "requests".to_string(),
                    description: String::new(),
                    unit: String::new(),
                    data: MetricData::Sum(vec![NumberPoint {
                        attributes: vec![],
                        start: now - Duration::from_secs(1),
                        end: now,
                        value: ScalarValue::Long(value),
                    }]),
                },
                &mut scratch,
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_initial_update_replaces_all_data() {
        let instrument = counter_instrument();
        ingest_now(&instrument, 5);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let refresh =
            ChartRefreshLoop::spawn(Arc::clone(&instrument), vec![], test_config(), tx).unwrap();

        let first = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for first update")
            .expect("channel closed");
        match first {
            ChartUpdate::Replace(series) => {
                assert!(series.traces[0].values.iter().any(Option::is_some));
            },
            ChartUpdate::Extend(_) => panic!("first update must replace all data"),
        }

        refresh.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_steady_state_extends() {
        let instrument = counter_instrument();
        ingest_now(&instrument, 5);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let refresh =
            ChartRefreshLoop::spawn(Arc::clone(&instrument), vec![], test_config(), tx).unwrap();

        let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(first, ChartUpdate::Replace(_)));

        let second = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(second, ChartUpdate::Extend(_)));

        refresh.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_filter_change_forces_replace() {
        let instrument = counter_instrument();
        ingest_now(&instrument, 5);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let refresh =
            ChartRefreshLoop::spawn(Arc::clone(&instrument), vec![], test_config(), tx).unwrap();

        // Drain the initial replace and at least one extend.
        let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(first, ChartUpdate::Replace(_)));
        let _ = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();

        refresh.update_filters(vec![DimensionFilter::match_all("method")]);

        let mut saw_replace = false;
        for _ in 0..10 {
            let update = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
            if matches!(update, ChartUpdate::Replace(_)) {
                saw_replace = true;
                break;
            }
        }
        assert!(saw_replace, "filter change must force a full replace");

        refresh.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_updates() {
        let instrument = counter_instrument();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let refresh =
            ChartRefreshLoop::spawn(Arc::clone(&instrument), vec![], test_config(), tx).unwrap();

        refresh.shutdown().await.unwrap();

        // The task ended, so the sender is gone; after draining whatever
        // was pushed before shutdown the channel closes.
        while let Some(_update) = rx.recv().await {}
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let instrument = counter_instrument();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut config = test_config();
        config.point_count = 0;
        assert!(ChartRefreshLoop::spawn(instrument, vec![], config, tx).is_err());
    }

    #[tokio::test]
    async fn test_zero_bucket_width_rejected() {
        // A duration shorter than one unit per bucket truncates the bucket
        // width to zero, which would leave the anchor creep spinning and
        // the task unable to observe shutdown.
        let instrument = counter_instrument();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut config = test_config();
        config.duration = Duration::from_nanos(5);
        assert!(ChartRefreshLoop::spawn(Arc::clone(&instrument), vec![], config, tx).is_err());

        // The same window cannot be introduced onto a running view.
        let (tx, _rx) = mpsc::unbounded_channel();
        let refresh =
            ChartRefreshLoop::spawn(instrument, vec![], test_config(), tx).unwrap();
        assert!(refresh.update_duration(Duration::from_nanos(5)).is_err());
        timeout(Duration::from_secs(2), refresh.shutdown())
            .await
            .expect("shutdown must complete promptly")
            .unwrap();
    }
}
