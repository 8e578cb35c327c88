//! Stage kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four stages of the signal pipeline, in data-flow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Feature set to fixed-width windows.
    Region,
    /// Windows and one track to a raw signal matrix.
    Smoothing,
    /// All raw matrices to normalized matrices.
    Normalization,
    /// Matrices to a row order and optional clusters.
    Ordering,
}

impl StageKind {
    /// All stages in data-flow order.
    pub const ALL: [Self; 4] = [
        Self::Region,
        Self::Smoothing,
        Self::Normalization,
        Self::Ordering,
    ];

    /// Returns the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Smoothing => "smoothing",
            Self::Normalization => "normalization",
            Self::Ordering => "ordering",
        }
    }

    /// Returns true if this stage joins the outputs of every track.
    #[must_use]
    pub fn is_barrier(&self) -> bool {
        matches!(self, Self::Normalization | Self::Ordering)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
