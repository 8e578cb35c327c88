//! The job engine: at-most-once computation per content key.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, error, info, warn};

use crate::cache::{ArtifactStore, ContentKey};
use crate::core::{Artifact, StageKind};
use crate::errors::{ErrorContext, ErrorKind, PipelineError};
use crate::events::{EventKind, EventSink, LoggingEventSink, PipelineEvent};
use crate::observability::SpanTimer;
use crate::strategies::StrategyIdentity;

/// Identity of one job: what it computes and under which key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Human-readable job name, e.g. `smoothing:sample1`.
    pub name: String,
    /// The stage the job belongs to.
    pub stage: StageKind,
    /// The strategy computing the artifact.
    pub strategy: StrategyIdentity,
    /// Content key of the artifact.
    pub key: ContentKey,
}

impl JobSpec {
    /// Creates a job spec.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        stage: StageKind,
        strategy: StrategyIdentity,
        key: ContentKey,
    ) -> Self {
        Self {
            name: name.into(),
            stage,
            strategy,
            key,
        }
    }

    /// Error context naming this job.
    #[must_use]
    pub fn context(&self) -> ErrorContext {
        ErrorContext::new()
            .with_stage(self.stage.as_str())
            .with_strategy(self.strategy.label())
            .with_key(self.key.short())
            .with_detail("job", self.name.clone())
    }
}

/// Per-stage and per-key computation counters.
#[derive(Debug, Default)]
pub struct ExecutionStats {
    by_stage: Mutex<HashMap<StageKind, u64>>,
    by_key: Mutex<HashMap<ContentKey, u64>>,
    hits: Mutex<HashMap<StageKind, u64>>,
}

impl ExecutionStats {
    fn record_execution(&self, stage: StageKind, key: &ContentKey) {
        *self.by_stage.lock().entry(stage).or_default() += 1;
        *self.by_key.lock().entry(key.clone()).or_default() += 1;
    }

    fn record_hit(&self, stage: StageKind) {
        *self.hits.lock().entry(stage).or_default() += 1;
    }

    /// Number of computations run for `stage`.
    #[must_use]
    pub fn executions(&self, stage: StageKind) -> u64 {
        self.by_stage.lock().get(&stage).copied().unwrap_or(0)
    }

    /// Number of computations run for `key`.
    #[must_use]
    pub fn executions_for(&self, key: &ContentKey) -> u64 {
        self.by_key.lock().get(key).copied().unwrap_or(0)
    }

    /// Number of computations across every stage.
    #[must_use]
    pub fn total_executions(&self) -> u64 {
        self.by_stage.lock().values().sum()
    }

    /// Number of store hits for `stage`.
    #[must_use]
    pub fn cache_hits(&self, stage: StageKind) -> u64 {
        self.hits.lock().get(&stage).copied().unwrap_or(0)
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        self.by_stage.lock().clear();
        self.by_key.lock().clear();
        self.hits.lock().clear();
    }
}

type JobOutcome = Result<Arc<Artifact>, PipelineError>;
type Slot = Arc<OnceCell<JobOutcome>>;

/// Runs job computations against an artifact store.
///
/// Concurrent requests for the same key share one in-flight slot: exactly
/// one caller computes and every other caller awaits the published result.
/// Successful slots are dropped once the artifact is in the store; failed
/// slots are kept so later callers receive the same error without
/// recomputing, until the key is evicted or failures are reset. Store
/// failures are the exception: a failed read is treated as a miss and a
/// failed write is returned but not remembered.
#[derive(Debug)]
pub struct JobEngine {
    store: Arc<dyn ArtifactStore>,
    permits: Arc<Semaphore>,
    max_workers: usize,
    slots: DashMap<ContentKey, Slot>,
    events: Arc<dyn EventSink>,
    stats: Arc<ExecutionStats>,
}

impl JobEngine {
    /// Creates an engine running at most `max_workers` computations at once.
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            store,
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            slots: DashMap::new(),
            events: Arc::new(LoggingEventSink::default()),
            stats: Arc::new(ExecutionStats::default()),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// The artifact store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// The event sink.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Computation counters.
    #[must_use]
    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    /// Size of the worker pool.
    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Returns the artifact for `spec.key`, computing it with `compute` on
    /// a miss.
    ///
    /// `compute` runs on the blocking pool while holding a worker permit.
    ///
    /// # Errors
    ///
    /// Returns the error of whichever caller computed the key, with the
    /// job's context attached.
    pub async fn get_or_compute<F>(&self, spec: &JobSpec, compute: F) -> JobOutcome
    where
        F: FnOnce() -> Result<Artifact, PipelineError> + Send + 'static,
    {
        let slot: Slot = Arc::clone(self.slots.entry(spec.key.clone()).or_default().value());
        let outcome = slot.get_or_init(|| self.run(spec, compute)).await.clone();

        // store failures are not remembered, so the next caller retries
        let retry = match &outcome {
            Ok(_) => true,
            Err(err) => err.kind() == ErrorKind::Store,
        };
        if retry {
            self.slots
                .remove_if(&spec.key, |_, current| Arc::ptr_eq(current, &slot));
        }
        outcome
    }

    /// Returns the remembered failure for `key`, if any.
    #[must_use]
    pub fn failure(&self, key: &ContentKey) -> Option<PipelineError> {
        self.slots
            .get(key)
            .and_then(|slot| slot.get().and_then(|outcome| outcome.clone().err()))
    }

    /// Forgets every remembered failure.
    pub fn reset_failures(&self) {
        self.slots
            .retain(|_, slot| !matches!(slot.get(), Some(Err(_))));
    }

    /// Drops the stored artifact and any remembered failure for `key`.
    ///
    /// # Errors
    ///
    /// Returns a store error if the backend cannot remove the entry.
    pub fn evict(&self, key: &ContentKey) -> Result<bool, PipelineError> {
        let forgotten = self.slots.remove(key).is_some();
        let removed = self.store.evict(key)?;
        Ok(removed || forgotten)
    }

    async fn run<F>(&self, spec: &JobSpec, compute: F) -> JobOutcome
    where
        F: FnOnce() -> Result<Artifact, PipelineError> + Send + 'static,
    {
        let outcome = self.run_blocking(spec, compute).await;
        if let Err(ref err) = outcome {
            error!(
                job = %spec.name,
                stage = %spec.stage,
                key = %spec.key.short(),
                error = %err,
                "Job failed"
            );
            self.events.emit(&PipelineEvent::new(
                EventKind::JobFailed,
                json!({
                    "job": spec.name,
                    "stage": spec.stage.as_str(),
                    "key": spec.key.as_str(),
                    "error": err.to_dict(),
                }),
            ));
        }
        outcome
    }

    async fn run_blocking<F>(&self, spec: &JobSpec, compute: F) -> JobOutcome
    where
        F: FnOnce() -> Result<Artifact, PipelineError> + Send + 'static,
    {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::internal("worker pool closed"))?;

        let store = Arc::clone(&self.store);
        let events = Arc::clone(&self.events);
        let stats = Arc::clone(&self.stats);
        let job = spec.clone();

        tokio::task::spawn_blocking(move || -> JobOutcome {
            let label = json!({
                "job": job.name,
                "stage": job.stage.as_str(),
                "strategy": job.strategy.label(),
                "key": job.key.as_str(),
            });

            match store.get(&job.key) {
                Ok(Some(found)) => {
                    stats.record_hit(job.stage);
                    debug!(job = %job.name, key = %job.key.short(), "Cache hit");
                    events.emit(&PipelineEvent::new(EventKind::CacheHit, label));
                    return Ok(found);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(job = %job.name, key = %job.key.short(), error = %err, "Store read failed, recomputing");
                }
            }

            stats.record_execution(job.stage, &job.key);
            events.emit(&PipelineEvent::new(EventKind::JobStarted, label));
            let timer = SpanTimer::start(job.name.clone());

            let artifact = Arc::new(compute()?);
            store.put(&job.key, Arc::clone(&artifact))?;

            let duration_ms = timer.finish();
            info!(
                job = %job.name,
                key = %job.key.short(),
                artifact = artifact.kind(),
                duration_ms,
                "Job completed"
            );
            events.emit(&PipelineEvent::new(
                EventKind::JobCompleted,
                json!({
                    "job": job.name,
                    "stage": job.stage.as_str(),
                    "key": job.key.as_str(),
                    "duration_ms": duration_ms,
                }),
            ));
            Ok(artifact)
        })
        .await
        .map_err(|e| PipelineError::internal(format!("job task failed: {e}")))?
        .map_err(|e| e.in_context(spec.context()))
    }
}
