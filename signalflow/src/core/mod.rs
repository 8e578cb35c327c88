//! Core domain model types for signalflow.
//!
//! This module contains the values that flow between pipeline stages:
//! - Intervals, feature sets and fixed-width window sets
//! - Signal matrices and per-track matrix sets
//! - The sample track boundary
//! - Row orderings and the renderable heatmap
//! - Stage kinds and the serialized artifact envelope

mod artifact;
mod heatmap;
mod interval;
mod matrix;
mod status;
mod track;

pub use artifact::Artifact;
pub use heatmap::{ClusterAssignment, OrderingResult, RenderableHeatmap, RowOrder};
pub use interval::{FeatureSet, Interval, WindowSet};
pub use matrix::{Matrix, MatrixSet};
pub use status::StageKind;
pub use track::{InMemoryTrack, Read, SampleTrack, Strand, TrackError, TrackRef};
