//! Built-in presentation sinks.

use faas_common::{LifecycleEvent, LogEntry, MetricsSnapshot, PresentationSink};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Everything a sink can be told, as a single serializable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkRecord {
    Lifecycle(LifecycleEvent),
    Metrics(MetricsSnapshot),
    Log(LogEntry),
    Reset,
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn on_lifecycle_event(&self, _event: &LifecycleEvent) {}
    fn on_metrics_updated(&self, _snapshot: &MetricsSnapshot) {}
    fn on_log_message(&self, _entry: &LogEntry) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl PresentationSink for TracingSink {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        info!(
            container = %event.container_id,
            from = event.from.map(|s| s.as_str()).unwrap_or("new"),
            to = %event.to,
            request_id = event.request_id.as_deref().unwrap_or("-"),
            at = %event.timestamp,
            "container transition"
        );
    }

    fn on_metrics_updated(&self, snapshot: &MetricsSnapshot) {
        debug!(
            active = snapshot.active_containers,
            requests = snapshot.total_requests,
            cold_starts = snapshot.cold_starts,
            avg_latency_ms = snapshot.average_latency_ms,
            "metrics updated"
        );
    }

    fn on_log_message(&self, entry: &LogEntry) {
        info!(category = entry.category.as_str(), at = %entry.at, "{}", entry.text);
    }

    fn on_reset(&self) {
        info!("simulation reset");
    }
}

/// Keeps every record in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<SinkRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.lock().clone()
    }

    pub fn lifecycle_events(&self) -> Vec<LifecycleEvent> {
        self.lock()
            .iter()
            .filter_map(|r| match r {
                SinkRecord::Lifecycle(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter_map(|r| match r {
                SinkRecord::Log(entry) => Some(entry.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_metrics(&self) -> Option<MetricsSnapshot> {
        self.lock().iter().rev().find_map(|r| match r {
            SinkRecord::Metrics(snapshot) => Some(*snapshot),
            _ => None,
        })
    }

    pub fn reset_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|r| matches!(r, SinkRecord::Reset))
            .count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn push(&self, record: SinkRecord) {
        self.lock().push(record);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SinkRecord>> {
        // A panicking reader cannot leave the Vec half-written.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PresentationSink for RecordingSink {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        self.push(SinkRecord::Lifecycle(event.clone()));
    }

    fn on_metrics_updated(&self, snapshot: &MetricsSnapshot) {
        self.push(SinkRecord::Metrics(*snapshot));
    }

    fn on_log_message(&self, entry: &LogEntry) {
        self.push(SinkRecord::Log(entry.clone()));
    }

    fn on_reset(&self) {
        self.push(SinkRecord::Reset);
    }
}

/// Writes one JSON object per record.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
    include_metrics: bool,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            include_metrics: true,
        }
    }

    /// Skip the (frequent) metrics records.
    pub fn without_metrics(mut self) -> Self {
        self.include_metrics = false;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self, record: &SinkRecord) {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = serde_json::to_writer(&mut *writer, record)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"));
        if let Err(e) = result {
            warn!("Failed to write sink record: {}", e);
        }
    }
}

impl<W: Write + Send> PresentationSink for JsonLinesSink<W> {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        self.write(&SinkRecord::Lifecycle(event.clone()));
    }

    fn on_metrics_updated(&self, snapshot: &MetricsSnapshot) {
        if self.include_metrics {
            self.write(&SinkRecord::Metrics(*snapshot));
        }
    }

    fn on_log_message(&self, entry: &LogEntry) {
        self.write(&SinkRecord::Log(entry.clone()));
    }

    fn on_reset(&self) {
        self.write(&SinkRecord::Reset);
    }
}

/// Broadcasts to several sinks in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn PresentationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn PresentationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl PresentationSink for FanoutSink {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        for sink in &self.sinks {
            sink.on_lifecycle_event(event);
        }
    }

    fn on_metrics_updated(&self, snapshot: &MetricsSnapshot) {
        for sink in &self.sinks {
            sink.on_metrics_updated(snapshot);
        }
    }

    fn on_log_message(&self, entry: &LogEntry) {
        for sink in &self.sinks {
            sink.on_log_message(entry);
        }
    }

    fn on_reset(&self) {
        for sink in &self.sinks {
            sink.on_reset();
        }
    }
}
