//! Normalization strategies: one job over every track's raw matrix.

use serde_json::json;
use std::sync::Arc;

use super::{Strategy, StrategyIdentity};
use crate::core::{MatrixSet, TrackRef};
use crate::errors::PipelineError;

/// Jointly normalizes the raw matrices of every track.
pub trait NormalizationStrategy: Strategy {
    /// Produces one normalized matrix per raw matrix.
    ///
    /// Implementations may assume every raw matrix has the same row count.
    fn transform(&self, tracks: &[TrackRef], raw: &MatrixSet) -> Result<MatrixSet, PipelineError>;

    /// Checks the inputs, runs [`transform`](Self::transform) and checks
    /// the output keeps the input layout.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the raw matrices differ in row count or
    /// the output does not mirror the input.
    fn normalize(&self, tracks: &[TrackRef], raw: &MatrixSet) -> Result<MatrixSet, PipelineError> {
        raw.row_count()?;
        let normalized = self.transform(tracks, raw)?;
        raw.check_same_layout(&normalized)?;
        Ok(normalized)
    }
}

fn scale_each(raw: &MatrixSet, factor: impl Fn(f64) -> f64) -> MatrixSet {
    let mut out = MatrixSet::new();
    for (name, matrix) in raw.iter() {
        let total = matrix.total();
        if total.abs() < f64::EPSILON {
            out.insert(name, Arc::clone(matrix));
        } else {
            out.insert(name, Arc::new(matrix.scaled(factor(total))));
        }
    }
    out
}

/// Leaves raw signal unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNormalization;

impl Strategy for IdentityNormalization {
    fn identity(&self) -> StrategyIdentity {
        StrategyIdentity::new("identity", 1)
    }
}

impl NormalizationStrategy for IdentityNormalization {
    fn transform(&self, _tracks: &[TrackRef], raw: &MatrixSet) -> Result<MatrixSet, PipelineError> {
        Ok(raw.clone())
    }
}

/// Scales every track so its total equals the mean total across tracks.
///
/// Tracks with no signal stay zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaleToMeanTotal;

impl Strategy for ScaleToMeanTotal {
    fn identity(&self) -> StrategyIdentity {
        StrategyIdentity::new("scale_to_mean_total", 1)
    }
}

impl NormalizationStrategy for ScaleToMeanTotal {
    fn transform(&self, _tracks: &[TrackRef], raw: &MatrixSet) -> Result<MatrixSet, PipelineError> {
        if raw.is_empty() {
            return Ok(MatrixSet::new());
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = raw.iter().map(|(_, m)| m.total()).sum::<f64>() / raw.len() as f64;
        Ok(scale_each(raw, |total| mean / total))
    }
}

/// Scales every track to one million total signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountsPerMillion;

impl Strategy for CountsPerMillion {
    fn identity(&self) -> StrategyIdentity {
        StrategyIdentity::new("counts_per_million", 1)
    }
}

impl NormalizationStrategy for CountsPerMillion {
    fn transform(&self, _tracks: &[TrackRef], raw: &MatrixSet) -> Result<MatrixSet, PipelineError> {
        Ok(scale_each(raw, |total| 1_000_000.0 / total))
    }
}

/// `log2(x + pseudocount)` per cell.
#[derive(Debug, Clone, Copy)]
pub struct Log2 {
    pseudocount: f64,
}

impl Log2 {
    /// Creates the strategy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` unless `pseudocount` is finite and
    /// positive.
    pub fn new(pseudocount: f64) -> Result<Self, PipelineError> {
        if !(pseudocount.is_finite() && pseudocount > 0.0) {
            return Err(PipelineError::invalid_configuration(format!(
                "pseudocount must be positive, got {pseudocount}"
            )));
        }
        Ok(Self { pseudocount })
    }
}

impl Strategy for Log2 {
    fn identity(&self) -> StrategyIdentity {
        StrategyIdentity::new("log2", 1).with_params(json!({ "pseudocount": self.pseudocount }))
    }
}

impl NormalizationStrategy for Log2 {
    fn transform(&self, _tracks: &[TrackRef], raw: &MatrixSet) -> Result<MatrixSet, PipelineError> {
        let p = self.pseudocount;
        let mut out = MatrixSet::new();
        for (name, matrix) in raw.iter() {
            out.insert(name, Arc::new(matrix.map(|v| (v + p).log2())));
        }
        Ok(out)
    }
}
