//! Event emission for pipeline observability.
//!
//! The job engine and the driver report progress as [`PipelineEvent`]s
//! handed to an [`EventSink`]. Unless another sink is set, events are
//! logged at DEBUG by [`LoggingEventSink`].
//!
//! - `job.cache_hit`: an artifact was served from the store
//! - `job.started` / `job.completed` / `job.failed`: a job computation
//! - `pipeline.completed`: a heatmap was assembled

mod sink;

pub use sink::{CollectingEventSink, EventKind, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
