//! Artifact type for capturing stage outputs.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{Matrix, MatrixSet, OrderingResult, WindowSet};
use crate::errors::PipelineError;

/// An artifact produced by a pipeline job.
///
/// Artifacts are immutable once published; the store hands out shared
/// references so every downstream stage reads the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Artifact {
    /// Output of the region stage.
    Windows(Arc<WindowSet>),
    /// Output of one smoothing job.
    Raw(Arc<Matrix>),
    /// Output of the normalization stage.
    Normalized(MatrixSet),
    /// Output of the ordering stage.
    Ordering(OrderingResult),
}

impl Artifact {
    /// The artifact type name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Windows(_) => "windows",
            Self::Raw(_) => "raw",
            Self::Normalized(_) => "normalized",
            Self::Ordering(_) => "ordering",
        }
    }

    /// Returns the window set.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if this is a different artifact type.
    pub fn as_windows(&self) -> Result<&Arc<WindowSet>, PipelineError> {
        match self {
            Self::Windows(w) => Ok(w),
            other => Err(other.unexpected("windows")),
        }
    }

    /// Returns the raw matrix.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if this is a different artifact type.
    pub fn as_raw(&self) -> Result<&Arc<Matrix>, PipelineError> {
        match self {
            Self::Raw(m) => Ok(m),
            other => Err(other.unexpected("raw")),
        }
    }

    /// Returns the normalized matrix set.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if this is a different artifact type.
    pub fn as_normalized(&self) -> Result<&MatrixSet, PipelineError> {
        match self {
            Self::Normalized(set) => Ok(set),
            other => Err(other.unexpected("normalized")),
        }
    }

    /// Returns the ordering result.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if this is a different artifact type.
    pub fn as_ordering(&self) -> Result<&OrderingResult, PipelineError> {
        match self {
            Self::Ordering(o) => Ok(o),
            other => Err(other.unexpected("ordering")),
        }
    }

    fn unexpected(&self, wanted: &str) -> PipelineError {
        PipelineError::internal(format!(
            "expected a {wanted} artifact, found {}",
            self.kind()
        ))
    }
}
