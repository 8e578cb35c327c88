//! Pipeline events and the sinks that receive them.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Level};

/// What a [`PipelineEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// An artifact was served from the store.
    #[serde(rename = "job.cache_hit")]
    CacheHit,
    /// A job began computing.
    #[serde(rename = "job.started")]
    JobStarted,
    /// A job computed and stored its artifact.
    #[serde(rename = "job.completed")]
    JobCompleted,
    /// A job failed.
    #[serde(rename = "job.failed")]
    JobFailed,
    /// A heatmap was assembled.
    #[serde(rename = "pipeline.completed")]
    PipelineCompleted,
}

impl EventKind {
    /// The dotted event name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CacheHit => "job.cache_hit",
            Self::JobStarted => "job.started",
            Self::JobCompleted => "job.completed",
            Self::JobFailed => "job.failed",
            Self::PipelineCompleted => "pipeline.completed",
        }
    }
}

/// One event with its JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineEvent {
    /// What happened.
    pub kind: EventKind,
    /// Event fields, e.g. `job`, `stage` and `key` for job events.
    pub data: serde_json::Value,
}

impl PipelineEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(kind: EventKind, data: serde_json::Value) -> Self {
        Self { kind, data }
    }

    /// The job name, for job events.
    #[must_use]
    pub fn job(&self) -> Option<&str> {
        self.data.get("job").and_then(serde_json::Value::as_str)
    }
}

/// Receives pipeline events.
///
/// Jobs emit from blocking worker threads, so `emit` must return quickly
/// and never wait on the async runtime.
pub trait EventSink: Send + Sync + std::fmt::Debug {
    /// Handles one event.
    fn emit(&self, event: &PipelineEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &PipelineEvent) {}
}

/// Writes events to `tracing` under the `signalflow::events` target.
///
/// Failures are always logged at WARN; everything else at the sink's level.
/// The job engine uses a DEBUG sink unless told otherwise.
#[derive(Debug, Clone, Copy)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingEventSink {
    /// A sink logging at `level`. DEBUG and TRACE log at DEBUG; every
    /// other level logs at INFO.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// A sink logging at INFO.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        let name = event.kind.as_str();
        let data = &event.data;
        if event.kind == EventKind::JobFailed {
            warn!(target: "signalflow::events", event = name, %data, "Pipeline event");
        } else if self.level >= Level::DEBUG {
            debug!(target: "signalflow::events", event = name, %data, "Pipeline event");
        } else {
            info!(target: "signalflow::events", event = name, %data, "Pipeline event");
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event received, in order.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Number of events of `kind`.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.read().iter().filter(|e| e.kind == kind).count()
    }

    /// Job names of the events of `kind`, in order.
    #[must_use]
    pub fn jobs(&self, kind: EventKind) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .filter_map(|e| e.job().map(str::to_string))
            .collect()
    }

    /// Number of events received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Forgets every event.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_collecting_sink_filters_by_kind() {
        let sink = CollectingEventSink::new();
        sink.emit(&PipelineEvent::new(EventKind::JobStarted, json!({ "job": "region" })));
        sink.emit(&PipelineEvent::new(EventKind::JobCompleted, json!({ "job": "region" })));
        sink.emit(&PipelineEvent::new(EventKind::JobStarted, json!({ "job": "smoothing:a" })));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.count(EventKind::JobStarted), 2);
        assert_eq!(sink.jobs(EventKind::JobStarted), vec!["region", "smoothing:a"]);
        assert_eq!(sink.events()[1].kind, EventKind::JobCompleted);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(EventKind::CacheHit.as_str(), "job.cache_hit");
        assert_eq!(
            serde_json::to_value(EventKind::PipelineCompleted).unwrap(),
            json!("pipeline.completed")
        );

        let event = PipelineEvent::new(EventKind::JobFailed, json!({ "code": "STORE" }));
        assert_eq!(event.job(), None);
        assert_eq!(serde_json::to_value(&event).unwrap()["kind"], "job.failed");
    }

    #[test]
    fn test_sinks_behind_trait_objects() {
        let collecting = Arc::new(CollectingEventSink::new());
        let sinks: Vec<Arc<dyn EventSink>> = vec![
            Arc::new(NoOpEventSink),
            Arc::new(LoggingEventSink::default()),
            Arc::new(LoggingEventSink::info()),
            collecting.clone(),
        ];

        let event = PipelineEvent::new(EventKind::CacheHit, json!({ "job": "ordering" }));
        for sink in &sinks {
            sink.emit(&event);
        }
        assert_eq!(collecting.events(), vec![event]);
    }
}
