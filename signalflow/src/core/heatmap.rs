//! Row orderings and the renderable heatmap.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{MatrixSet, TrackRef, WindowSet};
use crate::errors::PipelineError;

/// A permutation of `[0, N)` giving the display order of heatmap rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowOrder(Vec<usize>);

impl RowOrder {
    /// Wraps an order without checking it.
    ///
    /// Use [`RowOrder::validate`] before trusting it.
    #[must_use]
    pub fn new(order: Vec<usize>) -> Self {
        Self(order)
    }

    /// The identity permutation of length `n`.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self((0..n).collect())
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the order is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Original row indexes in display order.
    #[must_use]
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Checks the order is a bijection on `[0, n)`.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` on a wrong length, a duplicate or an
    /// out-of-range index.
    pub fn validate(&self, n: usize) -> Result<(), PipelineError> {
        if self.0.len() != n {
            return Err(PipelineError::shape_mismatch(format!(
                "row order has {} entries, expected {n}",
                self.0.len()
            )));
        }

        let mut seen = vec![false; n];
        for &row in &self.0 {
            match seen.get_mut(row) {
                None => {
                    return Err(PipelineError::shape_mismatch(format!(
                        "row order references row {row}, only {n} rows exist"
                    )));
                }
                Some(true) => {
                    return Err(PipelineError::shape_mismatch(format!(
                        "row order lists row {row} more than once"
                    )));
                }
                Some(slot) => *slot = true,
            }
        }

        Ok(())
    }
}

/// Cluster id per row, in original feature order.
pub type ClusterAssignment = Option<Vec<u32>>;

/// The atomic output of one ordering strategy invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingResult {
    /// Display order.
    pub row_order: RowOrder,
    /// Optional cluster id per original row.
    pub clusters: ClusterAssignment,
}

impl OrderingResult {
    /// An ordering without clusters.
    #[must_use]
    pub fn unclustered(row_order: RowOrder) -> Self {
        Self {
            row_order,
            clusters: None,
        }
    }

    /// An ordering with a cluster id per row.
    #[must_use]
    pub fn clustered(row_order: RowOrder, clusters: Vec<u32>) -> Self {
        Self {
            row_order,
            clusters: Some(clusters),
        }
    }

    /// Checks the result against `windows` rows and `features` features.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if either part has the wrong length or the
    /// order is not a permutation.
    pub fn validate(&self, windows: usize, features: usize) -> Result<(), PipelineError> {
        self.row_order.validate(windows)?;

        if let Some(ref clusters) = self.clusters {
            if clusters.len() != features {
                return Err(PipelineError::shape_mismatch(format!(
                    "cluster assignment has {} entries, expected {features}",
                    clusters.len()
                )));
            }
        }

        Ok(())
    }

    /// Row positions (in display order) where the cluster id changes.
    #[must_use]
    pub fn cluster_boundaries(&self) -> Vec<usize> {
        let Some(ref clusters) = self.clusters else {
            return Vec::new();
        };

        let order = self.row_order.as_slice();
        (1..order.len())
            .filter(|&i| clusters[order[i]] != clusters[order[i - 1]])
            .collect()
    }
}

/// Everything the render backend needs to draw one heatmap.
#[derive(Debug, Clone)]
pub struct RenderableHeatmap {
    /// The shared windows.
    pub windows: Arc<WindowSet>,
    /// The tracks, in request order.
    pub tracks: Vec<TrackRef>,
    /// Raw signal per track.
    pub raw: MatrixSet,
    /// Normalized signal per track.
    pub normalized: MatrixSet,
    /// Row order and clusters.
    pub ordering: OrderingResult,
    /// Display name per track.
    pub display_names: Vec<String>,
}

impl RenderableHeatmap {
    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.windows.len()
    }

    /// Rows of the normalized matrix for `track`, in display order.
    #[must_use]
    pub fn ordered_rows(&self, track: &str) -> Option<Vec<&[f64]>> {
        let matrix = self.normalized.get(track)?;
        Some(
            self.ordering
                .row_order
                .as_slice()
                .iter()
                .map(|&row| matrix.row(row))
                .collect(),
        )
    }

    /// Cluster ids in display order, if the ordering clustered rows.
    #[must_use]
    pub fn ordered_clusters(&self) -> Option<Vec<u32>> {
        let clusters = self.ordering.clusters.as_ref()?;
        Some(
            self.ordering
                .row_order
                .as_slice()
                .iter()
                .map(|&row| clusters[row])
                .collect(),
        )
    }

    /// Row positions where the displayed cluster id changes.
    #[must_use]
    pub fn cluster_boundaries(&self) -> Vec<usize> {
        self.ordering.cluster_boundaries()
    }
}
