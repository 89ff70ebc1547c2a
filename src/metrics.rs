//! Alert sink for recovery observability
//!
//! The engine reports named metrics with tags and never waits on, or
//! reacts to, the sink. Submission problems are logged and swallowed.

use dashmap::DashMap;
use parking_lot::Mutex;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::BTreeMap;
use tracing::warn;

pub const RECOVERY_STARTED: &str = "disaster_recovery_started";
pub const RECOVERY_COMPLETED: &str = "disaster_recovery_completed";
pub const RECOVERY_DURATION_MINUTES: &str = "disaster_recovery_duration_minutes";
pub const STEP_FAILED: &str = "disaster_recovery_step_failed";
pub const ROLLBACK_STEP: &str = "disaster_recovery_rollback_step";
pub const HEALTH_STATUS: &str = "disaster_recovery_health_status";
pub const FAILOVER_TRIGGERED: &str = "disaster_recovery_failover_triggered";
pub const INCIDENT_NOTIFICATION: &str = "disaster_recovery_notification";

/// Fire-and-forget metric submission
pub trait AlertSink: Send + Sync {
    fn submit_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAlertSink;

impl AlertSink for NoopAlertSink {
    fn submit_metric(&self, _name: &str, _value: f64, _tags: &[(&str, &str)]) {}
}

/// Event metrics. Every submission is one occurrence, so these are
/// exported as counters; the submitted value is ignored.
pub const EVENT_METRICS: [&str; 6] = [
    RECOVERY_STARTED,
    RECOVERY_COMPLETED,
    STEP_FAILED,
    ROLLBACK_STEP,
    FAILOVER_TRIGGERED,
    INCIDENT_NOTIFICATION,
];

pub fn is_event_metric(name: &str) -> bool {
    EVENT_METRICS.contains(&name)
}

#[derive(Clone)]
enum Family {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

impl Family {
    fn build(name: &str, label_names: &[&str]) -> prometheus::Result<Self> {
        let opts = Opts::new(name, format!("Recovery engine metric {}", name));
        if is_event_metric(name) {
            Ok(Family::Counter(CounterVec::new(opts, label_names)?))
        } else {
            Ok(Family::Gauge(GaugeVec::new(opts, label_names)?))
        }
    }

    fn collector(&self) -> Box<dyn prometheus::core::Collector> {
        match self {
            Family::Gauge(gauge) => Box::new(gauge.clone()),
            Family::Counter(counter) => Box::new(counter.clone()),
        }
    }

    fn record(&self, values: &[&str], value: f64) -> prometheus::Result<()> {
        match self {
            Family::Gauge(gauge) => gauge.get_metric_with_label_values(values)?.set(value),
            Family::Counter(counter) => counter.get_metric_with_label_values(values)?.inc(),
        }
        Ok(())
    }
}

/// Prometheus-backed sink. Event metrics become counters, everything else
/// a gauge. The label set of a family is fixed by its first submission.
pub struct PrometheusAlertSink {
    registry: Registry,
    families: DashMap<String, (Family, Vec<String>)>,
}

impl Default for PrometheusAlertSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusAlertSink {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            families: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format of everything submitted so far
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            warn!("Failed to encode recovery metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    fn family(&self, name: &str, label_names: &[&str]) -> Option<(Family, Vec<String>)> {
        if let Some(entry) = self.families.get(name) {
            return Some(entry.value().clone());
        }

        let family = match Family::build(name, label_names) {
            Ok(family) => family,
            Err(e) => {
                warn!(metric = name, "Invalid metric definition: {}", e);
                return None;
            }
        };

        let entry = self
            .families
            .entry(name.to_string())
            .or_insert_with(|| {
                if let Err(e) = self.registry.register(family.collector()) {
                    warn!(metric = name, "Failed to register metric: {}", e);
                }
                (family, label_names.iter().map(|l| l.to_string()).collect())
            });
        Some(entry.value().clone())
    }
}

impl AlertSink for PrometheusAlertSink {
    fn submit_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        let mut sorted: Vec<(&str, &str)> = tags.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let label_names: Vec<&str> = sorted.iter().map(|(k, _)| *k).collect();

        let Some((family, expected)) = self.family(name, &label_names) else {
            return;
        };
        if expected.iter().map(String::as_str).ne(label_names.iter().copied()) {
            warn!(
                metric = name,
                "Dropping metric with label set {:?}, expected {:?}", label_names, expected
            );
            return;
        }

        let values: Vec<&str> = sorted.iter().map(|(_, v)| *v).collect();
        if let Err(e) = family.record(&values, value) {
            warn!(metric = name, "Failed to record metric: {}", e);
        }
    }
}

/// A single recorded submission
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMetric {
    pub name: String,
    pub value: f64,
    pub tags: BTreeMap<String, String>,
}

/// Sink that keeps every submission in memory
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    metrics: Mutex<Vec<RecordedMetric>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Vec<RecordedMetric> {
        self.metrics.lock().clone()
    }

    pub fn named(&self, name: &str) -> Vec<RecordedMetric> {
        self.metrics
            .lock()
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }
}

impl AlertSink for MemoryAlertSink {
    fn submit_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.metrics.lock().push(RecordedMetric {
            name: name.to_string(),
            value,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }
}
