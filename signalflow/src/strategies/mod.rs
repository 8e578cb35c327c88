//! Pluggable strategies for each pipeline stage.
//!
//! A strategy is an immutable value whose parameters are fixed at
//! construction. Its [`StrategyIdentity`] is hashed into every content key
//! the strategy produces, so changing a parameter or bumping the version
//! invalidates exactly the artifacts it computed.

mod clustering;
mod normalization;
mod ordering;
mod region;
mod smoothing;

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub use clustering::{ClusterCount, Clustering};
pub use normalization::{CountsPerMillion, IdentityNormalization, Log2, NormalizationStrategy, ScaleToMeanTotal};
pub use ordering::{
    AsIs, ExternalOrder, MatrixSource, OrderingInput, OrderingStrategy, RowStatistic,
    TrackStatistic,
};
pub use region::{AnchoredRegion, CenteredRegion, RegionStrategy};
pub use smoothing::{ExtendedReads, ReadCount, SmoothingStrategy};

/// Name, version and parameters of a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyIdentity {
    /// Stable strategy name.
    pub name: String,
    /// Algorithm version marker. Bump it when the output for the same
    /// parameters changes.
    pub version: u32,
    /// Parameters that affect the output.
    pub params: serde_json::Value,
}

impl StrategyIdentity {
    /// Creates an identity with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            params: serde_json::Value::Null,
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Short label used in logs and error context, e.g. `read_count@v1`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}@v{}", self.name, self.version)
    }
}

/// Common trait for every stage strategy.
pub trait Strategy: Send + Sync + Debug {
    /// Identity hashed into content keys.
    fn identity(&self) -> StrategyIdentity;
}
