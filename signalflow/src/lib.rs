//! # Signalflow
//!
//! Staged, cache-aware signal extraction for genomic heatmaps.
//!
//! A heatmap request names a set of genomic intervals, a list of aligned-read
//! tracks and one strategy per stage. The pipeline turns it into a graph of
//! jobs:
//!
//! - **Region**: intervals to fixed-width windows
//! - **Smoothing**: one job per track, windows and reads to a signal matrix
//! - **Normalization**: one job over every track's matrix
//! - **Ordering**: a row permutation and optional cluster assignment
//!
//! Every job is addressed by a content key derived from its strategy,
//! parameters and upstream keys. Artifacts are computed at most once per
//! key and reused across requests, so changing only the ordering strategy
//! recomputes only the ordering.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use signalflow::prelude::*;
//!
//! let request = HeatmapRequest::builder()
//!     .features(features)
//!     .track(Arc::new(treated))
//!     .track(Arc::new(control))
//!     .width(500)
//!     .ordering(TrackStatistic::new(0, RowStatistic::Sum))
//!     .build()?;
//!
//! let pipeline = HeatmapPipeline::new(PipelineConfig::from_env()?, Arc::new(JsonRenderBackend::new()))?;
//! let rendered = pipeline.render(&request, &RenderOptions::default()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    missing_docs,
    rust_2018_idioms
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cache;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod jobs;
pub mod observability;
pub mod pipeline;
pub mod strategies;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{ArtifactStore, ContentKey, DiskArtifactStore, InMemoryArtifactStore};
    pub use crate::config::{LogConfig, PipelineConfig};
    pub use crate::core::{
        FeatureSet, InMemoryTrack, Interval, Matrix, MatrixSet, OrderingResult, Read,
        RenderableHeatmap, RowOrder, SampleTrack, StageKind, Strand, TrackRef, WindowSet,
    };
    pub use crate::errors::{ErrorContext, ErrorKind, PipelineError};
    pub use crate::events::{
        CollectingEventSink, EventKind, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent,
    };
    pub use crate::jobs::{JobEngine, JobGraph, JobSpec};
    pub use crate::observability::init_logging;
    pub use crate::pipeline::{
        DisplayNames, HeatmapPipeline, HeatmapRequest, JsonRenderBackend, RenderBackend,
        RenderOptions, RenderedArtifact,
    };
    pub use crate::strategies::{
        AnchoredRegion, AsIs, CenteredRegion, ClusterCount, Clustering, CountsPerMillion,
        ExtendedReads, ExternalOrder, IdentityNormalization, Log2, MatrixSource,
        NormalizationStrategy, OrderingStrategy, ReadCount, RegionStrategy, RowStatistic,
        ScaleToMeanTotal, SmoothingStrategy, Strategy, StrategyIdentity, TrackStatistic,
    };
}
