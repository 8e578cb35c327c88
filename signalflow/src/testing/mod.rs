//! Testing utilities for signalflow pipelines.
//!
//! This module provides:
//! - Track doubles that fail, stall or count their queries
//! - Render backends that record or fail
//! - An artifact store that fails on demand
//! - Synthetic feature sets and tracks

mod fixtures;
mod mocks;

pub use fixtures::{synthetic_features, synthetic_track, TestPipeline};
pub use mocks::{
    CountingTrack, FailingRenderBackend, FailingTrack, FlakyStore, RecordingRenderBackend, SlowTrack,
};
