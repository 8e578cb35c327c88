//! Synthetic inputs and a ready-made pipeline.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use super::RecordingRenderBackend;
use crate::config::PipelineConfig;
use crate::core::{FeatureSet, InMemoryTrack, Interval, Read, Strand};
use crate::errors::PipelineError;
use crate::events::CollectingEventSink;
use crate::pipeline::HeatmapPipeline;

/// `n` features of `length` bases spread along `chr1`, 10 kb apart.
///
/// # Errors
///
/// Never fails for non-negative `length`.
pub fn synthetic_features(n: usize, length: i64) -> Result<FeatureSet, PipelineError> {
    let intervals = (0_i64..)
        .take(n)
        .map(|i| {
            let start = i * 10_000 + 5_000;
            Interval::new("chr1", start, start + length)
        })
        .collect();
    FeatureSet::new(intervals)
}

/// A track with roughly `density` reads of `read_length` bases around every
/// feature, drawn from a seeded generator.
#[must_use]
pub fn synthetic_track(
    name: &str,
    features: &FeatureSet,
    density: usize,
    read_length: u32,
    seed: u64,
) -> InMemoryTrack {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut track = InMemoryTrack::new(name);

    for feature in features.iter() {
        let centre = feature.midpoint();
        let count = rng.gen_range(0..=density * 2);
        let reads = (0..count).map(|_| {
            let offset = rng.gen_range(-1_000..=1_000);
            let strand = if rng.gen_bool(0.5) {
                Strand::Plus
            } else {
                Strand::Minus
            };
            Read::new((centre + offset).max(0), read_length, strand)
        });
        track = track.with_reads(&feature.chrom, reads.collect::<Vec<_>>());
    }
    track
}

/// A pipeline wired to a recording backend and a collecting event sink.
#[derive(Debug)]
pub struct TestPipeline {
    /// The pipeline under test.
    pub pipeline: HeatmapPipeline,
    /// Everything rendered.
    pub backend: Arc<RecordingRenderBackend>,
    /// Every event emitted.
    pub events: Arc<CollectingEventSink>,
}

impl TestPipeline {
    /// Builds a pipeline from `config`.
    ///
    /// # Errors
    ///
    /// Returns the pipeline construction error.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let backend = Arc::new(RecordingRenderBackend::new());
        let events = Arc::new(CollectingEventSink::new());
        let pipeline = HeatmapPipeline::new(config, backend.clone())?.with_event_sink(events.clone());
        Ok(Self {
            pipeline,
            backend,
            events,
        })
    }

    /// An in-memory pipeline with four workers.
    ///
    /// # Errors
    ///
    /// Returns the pipeline construction error.
    pub fn in_memory() -> Result<Self, PipelineError> {
        Self::new(PipelineConfig::new().with_max_workers(4))
    }
}
