//! Application, meter, and instrument registries plus the ingest path.
//!
//! Ownership is a strict tree: the store owns one [`Application`] per
//! reporting process instance, an application owns its meters, and a meter
//! owns its instruments. All registries grow monotonically during an ingest
//! session and support concurrent get-or-create from multiple ingest
//! callers; creation races converge on a single instance.

use crate::core::{GlanceError, Result};
use crate::metrics::attributes::{AttributeScratch, KeyValue};
use crate::metrics::instrument::Instrument;
use crate::metrics::types::{MetricRecord, ResourceInfo, ScopedMetrics};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Identity of one reporting process instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApplicationKey {
    /// Application (service) name
    pub name: String,
    /// Process instance id
    pub instance_id: String,
}

/// Per-batch ingest bookkeeping
#[derive(Debug, Default)]
pub struct IngestContext {
    /// Records skipped because they were malformed or mismatched
    pub failure_count: usize,
}

/// A named grouping of instruments reported by one process
#[derive(Debug)]
pub struct Meter {
    name: String,
    instruments: DashMap<String, Arc<Instrument>, ahash::RandomState>,
}

impl Meter {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            instruments: DashMap::default(),
        }
    }

    /// Meter (scope) name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up an instrument by name
    pub fn instrument(&self, name: &str) -> Option<Arc<Instrument>> {
        self.instruments.get(name).map(|i| Arc::clone(&i))
    }

    /// All instruments of this meter
    pub fn instruments(&self) -> Vec<Arc<Instrument>> {
        self.instruments.iter().map(|i| Arc::clone(i.value())).collect()
    }

    fn get_or_create_instrument(&self, record: &MetricRecord) -> Arc<Instrument> {
        if let Some(instrument) = self.instruments.get(record.name.as_str()) {
            return Arc::clone(&instrument);
        }
        let created = self
            .instruments
            .entry(record.name.clone())
            .or_insert_with(|| Arc::new(Instrument::new(record, &self.name)));
        Arc::clone(&created)
    }
}

/// All metrics reported by one process instance
#[derive(Debug)]
pub struct Application {
    name: String,
    instance_id: String,
    suffix: usize,
    properties: Vec<KeyValue>,
    meters: DashMap<String, Arc<Meter>, ahash::RandomState>,
}

impl Application {
    fn from_resource(resource: &ResourceInfo, suffix: usize) -> Self {
        let mut name = None;
        let mut instance_id = None;
        let mut properties = Vec::new();
        for (key, value) in &resource.attributes {
            match key.as_str() {
                ResourceInfo::SERVICE_NAME => name = Some(value.clone()),
                ResourceInfo::SERVICE_INSTANCE_ID => instance_id = Some(value.clone()),
                _ => properties.push((key.clone(), value.clone())),
            }
        }
        let name = name.filter(|n| !n.is_empty()).unwrap_or_else(|| "unknown".to_string());
        // The instance id is recommended but not required; fall back to the
        // application name.
        let instance_id = instance_id.filter(|i| !i.is_empty()).unwrap_or_else(|| name.clone());
        Self {
            name,
            instance_id,
            suffix,
            properties,
            meters: DashMap::default(),
        }
    }

    /// Application (service) name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process instance id
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Name disambiguated across instances of the same application
    pub fn unique_name(&self) -> String {
        format!("{}-{}", self.name, self.suffix)
    }

    /// Resource attributes other than name and instance id
    pub fn properties(&self) -> &[KeyValue] {
        &self.properties
    }

    /// Identity key for this application
    pub fn key(&self) -> ApplicationKey {
        ApplicationKey {
            name: self.name.clone(),
            instance_id: self.instance_id.clone(),
        }
    }

    /// Ingests a batch of scoped metric records.
    ///
    /// Meters, instruments, and series are created on first sight. A
    /// malformed or mismatched record is counted and skipped; it never
    /// aborts the rest of the batch.
    pub fn add_metrics(&self, context: &mut IngestContext, batch: &[ScopedMetrics]) {
        let mut scratch = AttributeScratch::new();
        for scoped in batch {
            let meter = self.get_or_create_meter(&scoped.scope_name);
            for record in &scoped.metrics {
                let instrument = meter.get_or_create_instrument(record);
                if let Err(error) = instrument.add_record(record, &mut scratch) {
                    context.failure_count += 1;
                    tracing::debug!(
                        error = %error,
                        category = error.category(),
                        instrument = %record.name,
                        "error adding metric record"
                    );
                }
            }
        }
    }

    fn get_or_create_meter(&self, scope_name: &str) -> Arc<Meter> {
        if let Some(meter) = self.meters.get(scope_name) {
            return Arc::clone(&meter);
        }
        let created = self
            .meters
            .entry(scope_name.to_string())
            .or_insert_with(|| Arc::new(Meter::new(scope_name)));
        Arc::clone(&created)
    }

    /// Looks up a meter by scope name
    pub fn meter(&self, scope_name: &str) -> Option<Arc<Meter>> {
        self.meters.get(scope_name).map(|m| Arc::clone(&m))
    }

    /// All meters of this application
    pub fn meters(&self) -> Vec<Arc<Meter>> {
        self.meters.iter().map(|m| Arc::clone(m.value())).collect()
    }

    /// All instruments across every meter
    pub fn instruments(&self) -> Vec<Arc<Instrument>> {
        self.meters
            .iter()
            .flat_map(|m| m.value().instruments())
            .collect()
    }

    /// Looks up an instrument by (meter name, instrument name)
    pub fn instrument(&self, meter_name: &str, instrument_name: &str) -> Option<Arc<Instrument>> {
        self.meter(meter_name)
            .and_then(|m| m.instrument(instrument_name))
    }
}

/// Top-level registry of applications keyed by resource identity
#[derive(Debug)]
pub struct MetricStore {
    applications: DashMap<ApplicationKey, Arc<Application>, ahash::RandomState>,
    max_applications: usize,
    // Serializes application creation so the capacity check and the
    // disambiguation suffix stay consistent under concurrent first-sight
    // batches. The lookup fast path never takes it.
    create_lock: Mutex<()>,
}

impl MetricStore {
    /// Creates a store tracking at most `max_applications` processes
    pub fn new(max_applications: usize) -> Self {
        Self {
            applications: DashMap::default(),
            max_applications,
            create_lock: Mutex::new(()),
        }
    }

    /// Ingests one decoded batch for the given resource, creating the
    /// application on first sight. Returns per-batch failure bookkeeping.
    pub fn add_metrics(
        &self,
        resource: &ResourceInfo,
        batch: &[ScopedMetrics],
    ) -> Result<IngestContext> {
        let application = self.get_or_create_application(resource)?;
        let mut context = IngestContext::default();
        application.add_metrics(&mut context, batch);
        Ok(context)
    }

    /// Resolves or creates the application for a resource
    pub fn get_or_create_application(&self, resource: &ResourceInfo) -> Result<Arc<Application>> {
        // Build the candidate identity without registering anything yet.
        let candidate = Application::from_resource(resource, 0);
        let key = candidate.key();

        if let Some(existing) = self.applications.get(&key) {
            return Ok(Arc::clone(&existing));
        }

        let _guard = self.create_lock.lock();

        // Another ingest caller may have registered it while we waited.
        if let Some(existing) = self.applications.get(&key) {
            return Ok(Arc::clone(&existing));
        }

        if self.applications.len() >= self.max_applications {
            return Err(GlanceError::ApplicationLimit {
                limit: self.max_applications,
            });
        }

        let suffix = self
            .applications
            .iter()
            .filter(|a| a.value().name() == key.name)
            .count();
        let created = Arc::new(Application::from_resource(resource, suffix));
        self.applications.insert(key, Arc::clone(&created));
        tracing::info!(
            application = %created.name(),
            instance = %created.instance_id(),
            "registered application"
        );
        Ok(created)
    }

    /// Looks up an application by identity
    pub fn application(&self, key: &ApplicationKey) -> Option<Arc<Application>> {
        self.applications.get(key).map(|a| Arc::clone(&a))
    }

    /// All registered applications
    pub fn applications(&self) -> Vec<Arc<Application>> {
        self.applications.iter().map(|a| Arc::clone(a.value())).collect()
    }
}
