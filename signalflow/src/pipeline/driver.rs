//! The pipeline driver: one job graph per request.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{HeatmapRequest, RenderBackend, RenderOptions, RenderedArtifact};
use crate::cache::{ArtifactStore, ContentKey, DiskArtifactStore, InMemoryArtifactStore, KeyBuilder};
use crate::config::PipelineConfig;
use crate::core::{Artifact, MatrixSet, RenderableHeatmap, StageKind, TrackRef};
use crate::errors::PipelineError;
use crate::events::{EventKind, EventSink, PipelineEvent};
use crate::jobs::{JobEngine, JobGraph, JobId, JobSpec};
use crate::observability::SpanTimer;
use crate::strategies::{
    NormalizationStrategy, OrderingInput, OrderingStrategy, RegionStrategy, SmoothingStrategy,
    Strategy,
};

/// Content keys of every job a request needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageKeys {
    /// The region job.
    pub region: ContentKey,
    /// One smoothing job per track, in track order.
    pub smoothing: Vec<ContentKey>,
    /// The normalization job.
    pub normalization: ContentKey,
    /// The ordering job.
    pub ordering: ContentKey,
}

impl StageKeys {
    /// Every key, upstream first.
    pub fn iter(&self) -> impl Iterator<Item = &ContentKey> {
        std::iter::once(&self.region)
            .chain(&self.smoothing)
            .chain([&self.normalization, &self.ordering])
    }

    /// Derives the keys of `request`.
    ///
    /// Each key covers the strategy identity and the keys of its inputs,
    /// so a change anywhere upstream yields new keys downstream only.
    #[must_use]
    pub fn for_request(request: &HeatmapRequest) -> Self {
        let region = KeyBuilder::new(StageKind::Region)
            .strategy(&request.region().identity())
            .input_value("features", request.features().digest())
            .input_value("width", request.width())
            .build();

        let smoothing_id = request.smoothing().identity();
        let smoothing: Vec<ContentKey> = request
            .tracks()
            .iter()
            .map(|track| {
                KeyBuilder::new(StageKind::Smoothing)
                    .strategy(&smoothing_id)
                    .input_key(&region)
                    .input_value("track", track.name())
                    .input_value("fingerprint", track.fingerprint())
                    .build()
            })
            .collect();

        let mut builder =
            KeyBuilder::new(StageKind::Normalization).strategy(&request.normalization().identity());
        for (track, key) in request.tracks().iter().zip(&smoothing) {
            builder = builder.input_value("track", track.name()).input_key(key);
        }
        let normalization = builder.build();

        let ordering = KeyBuilder::new(StageKind::Ordering)
            .strategy(&request.ordering().identity())
            .input_key(&region)
            .input_key(&normalization)
            .build();

        Self {
            region,
            smoothing,
            normalization,
            ordering,
        }
    }
}

struct PlannedGraph {
    graph: JobGraph,
    region: JobId,
    smoothing: Vec<JobId>,
    normalization: JobId,
    ordering: JobId,
}

/// Runs heatmap requests against a shared, content-addressed cache.
///
/// Every request becomes a fresh four-stage job graph; the job engine is
/// shared, so identical jobs from different requests (or concurrent runs
/// of the same request) are computed once.
#[derive(Debug)]
pub struct HeatmapPipeline {
    config: PipelineConfig,
    engine: Arc<JobEngine>,
    backend: Arc<dyn RenderBackend>,
}

impl HeatmapPipeline {
    /// Creates a pipeline, with a disk store when `config.cache_dir` is set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a bad config, or a store error if
    /// the cache directory cannot be created.
    pub fn new(config: PipelineConfig, backend: Arc<dyn RenderBackend>) -> Result<Self, PipelineError> {
        let store: Arc<dyn ArtifactStore> = match config.cache_dir {
            Some(ref dir) => Arc::new(DiskArtifactStore::open(dir)?),
            None => Arc::new(InMemoryArtifactStore::new()),
        };
        Self::with_store(config, store, backend)
    }

    /// Creates a pipeline over an explicit store.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a bad config.
    pub fn with_store(
        config: PipelineConfig,
        store: Arc<dyn ArtifactStore>,
        backend: Arc<dyn RenderBackend>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let engine = Arc::new(JobEngine::new(store, config.max_workers));
        Ok(Self {
            config,
            engine,
            backend,
        })
    }

    /// Routes job and pipeline events to `events`.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        let store = Arc::clone(self.engine.store());
        self.engine = Arc::new(JobEngine::new(store, self.config.max_workers).with_event_sink(events));
        self
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The shared job engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<JobEngine> {
        &self.engine
    }

    /// Drops every cached artifact and remembered failure `request` uses,
    /// returning how many keys had an entry.
    ///
    /// Artifacts shared with other requests are evicted too.
    ///
    /// # Errors
    ///
    /// Returns a store error if the backend cannot remove an entry.
    pub fn evict(&self, request: &HeatmapRequest) -> Result<usize, PipelineError> {
        let keys = StageKeys::for_request(request);
        let mut evicted = 0;
        for key in keys.iter() {
            if self.engine.evict(key)? {
                evicted += 1;
            }
        }
        debug!(evicted, ordering_key = %keys.ordering.short(), "Evicted request artifacts");
        Ok(evicted)
    }

    /// Computes the heatmap for `request` without rendering it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for bad options, `DependencyUnavailable`
    /// for an empty feature set, or the first stage error.
    pub async fn build(
        &self,
        request: &HeatmapRequest,
        options: &RenderOptions,
    ) -> Result<RenderableHeatmap, PipelineError> {
        options.validate()?;
        let display_names = options.display_names.resolve(request.tracks())?;

        let run_id = Uuid::new_v4();
        let timer = SpanTimer::start(format!("heatmap:{run_id}"));
        let keys = StageKeys::for_request(request);
        let planned = plan(request, &keys)?;
        debug!(
            %run_id,
            jobs = planned.graph.len(),
            ordering_key = %keys.ordering.short(),
            "Planned job graph"
        );

        let outputs = planned.graph.execute(Arc::clone(&self.engine)).await?;

        let windows = Arc::clone(outputs.get(planned.region)?.as_windows()?);
        let mut raw = MatrixSet::new();
        for (track, id) in request.tracks().iter().zip(&planned.smoothing) {
            raw.insert(track.name(), Arc::clone(outputs.get(*id)?.as_raw()?));
        }
        let normalized = outputs.get(planned.normalization)?.as_normalized()?.clone();
        let ordering = outputs.get(planned.ordering)?.as_ordering()?.clone();

        let heatmap = RenderableHeatmap {
            windows,
            tracks: request.tracks().to_vec(),
            raw,
            normalized,
            ordering,
            display_names,
        };

        let duration_ms = timer.finish();
        info!(
            %run_id,
            rows = heatmap.row_count(),
            tracks = heatmap.tracks.len(),
            duration_ms,
            "Heatmap built"
        );
        self.engine.events().emit(&PipelineEvent::new(
            EventKind::PipelineCompleted,
            json!({
                "run_id": run_id.to_string(),
                "rows": heatmap.row_count(),
                "tracks": heatmap.tracks.len(),
                "duration_ms": duration_ms,
            }),
        ));
        Ok(heatmap)
    }

    /// Computes the heatmap and hands it to the render backend.
    ///
    /// # Errors
    ///
    /// Everything [`build`](Self::build) returns, plus `Render` for
    /// backend failures.
    pub async fn render(
        &self,
        request: &HeatmapRequest,
        options: &RenderOptions,
    ) -> Result<RenderedArtifact, PipelineError> {
        let heatmap = self.build(request, options).await?;
        self.backend
            .render(&heatmap, options)
            .await
            .map_err(PipelineError::render)
    }
}

fn plan(request: &HeatmapRequest, keys: &StageKeys) -> Result<PlannedGraph, PipelineError> {
    if request.features().is_empty() {
        return Err(PipelineError::dependency_unavailable(
            "feature set has no intervals",
        ));
    }

    let mut graph = JobGraph::new();

    let region_spec = JobSpec::new(
        "region",
        StageKind::Region,
        request.region().identity(),
        keys.region.clone(),
    );
    let region = {
        let strategy = Arc::clone(request.region());
        let features = Arc::clone(request.features());
        let width = request.width();
        graph.add(region_spec, &[], move |_| {
            let windows = strategy.windows(&features, width)?;
            if windows.len() != features.len() {
                return Err(PipelineError::shape_mismatch(format!(
                    "region produced {} windows for {} features",
                    windows.len(),
                    features.len()
                )));
            }
            Ok(Artifact::Windows(Arc::new(windows)))
        })?
    };

    let mut smoothing = Vec::with_capacity(request.tracks().len());
    for (track, key) in request.tracks().iter().zip(&keys.smoothing) {
        let spec = JobSpec::new(
            format!("smoothing:{}", track.name()),
            StageKind::Smoothing,
            request.smoothing().identity(),
            key.clone(),
        );
        let strategy = Arc::clone(request.smoothing());
        let track = Arc::clone(track);
        let id = graph.add(spec, &[region], move |inputs| {
            let windows = inputs[0].as_windows()?;
            let matrix = strategy.smooth(windows, track.as_ref())?;
            if matrix.shape() != (windows.len(), windows.width()) {
                return Err(PipelineError::shape_mismatch(format!(
                    "smoothing produced shape {:?}, expected {:?}",
                    matrix.shape(),
                    (windows.len(), windows.width())
                )));
            }
            Ok(Artifact::Raw(Arc::new(matrix)))
        })?;
        smoothing.push(id);
    }

    let normalization = {
        let spec = JobSpec::new(
            "normalization",
            StageKind::Normalization,
            request.normalization().identity(),
            keys.normalization.clone(),
        );
        let strategy = Arc::clone(request.normalization());
        let tracks = request.tracks().to_vec();
        graph.add(spec, &smoothing, move |inputs| {
            let raw = collect_raw(&tracks, &inputs)?;
            Ok(Artifact::Normalized(strategy.normalize(&tracks, &raw)?))
        })?
    };

    let ordering = {
        let spec = JobSpec::new(
            "ordering",
            StageKind::Ordering,
            request.ordering().identity(),
            keys.ordering.clone(),
        );
        let strategy = Arc::clone(request.ordering());
        let tracks = request.tracks().to_vec();
        let feature_count = request.features().len();
        let mut parents = vec![region, normalization];
        parents.extend(&smoothing);
        graph.add(spec, &parents, move |inputs| {
            let windows = inputs[0].as_windows()?;
            let norm = inputs[1].as_normalized()?;
            let raw = collect_raw(&tracks, &inputs[2..])?;
            let result = strategy.order(&OrderingInput {
                windows,
                tracks: &tracks,
                raw: &raw,
                norm,
            })?;
            result.validate(windows.len(), feature_count)?;
            Ok(Artifact::Ordering(result))
        })?
    };

    Ok(PlannedGraph {
        graph,
        region,
        smoothing,
        normalization,
        ordering,
    })
}

fn collect_raw(tracks: &[TrackRef], inputs: &[Arc<Artifact>]) -> Result<MatrixSet, PipelineError> {
    let mut raw = MatrixSet::new();
    for (track, artifact) in tracks.iter().zip(inputs) {
        raw.insert(track.name(), Arc::clone(artifact.as_raw()?));
    }
    Ok(raw)
}
