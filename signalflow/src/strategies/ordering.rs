//! Ordering strategies: row order and optional clusters.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Strategy, StrategyIdentity};
use crate::cache::digest_json;
use crate::core::{MatrixSet, OrderingResult, RowOrder, TrackRef, WindowSet};
use crate::errors::PipelineError;

/// Everything an ordering strategy may read.
#[derive(Debug, Clone, Copy)]
pub struct OrderingInput<'a> {
    /// The shared windows.
    pub windows: &'a WindowSet,
    /// The tracks, in request order.
    pub tracks: &'a [TrackRef],
    /// Raw matrices by track.
    pub raw: &'a MatrixSet,
    /// Normalized matrices by track.
    pub norm: &'a MatrixSet,
}

impl OrderingInput<'_> {
    /// Per-row statistic of the track at `track`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `track` is out of range.
    pub fn row_statistics(
        &self,
        track: usize,
        statistic: RowStatistic,
        source: MatrixSource,
    ) -> Result<Vec<f64>, PipelineError> {
        let set = match source {
            MatrixSource::Raw => self.raw,
            MatrixSource::Normalized => self.norm,
        };
        let matrix = set.get_index(track).ok_or_else(|| {
            PipelineError::invalid_configuration(format!(
                "ordering track index {track} is out of range for {} tracks",
                set.len()
            ))
        })?;
        Ok(matrix.iter_rows().map(|row| statistic.apply(row)).collect())
    }
}

/// Reduces a row to a scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatistic {
    /// Sum over the row.
    #[default]
    Sum,
    /// Maximum over the row.
    Max,
}

impl RowStatistic {
    /// Applies the statistic to `row`.
    #[must_use]
    pub fn apply(self, row: &[f64]) -> f64 {
        match self {
            Self::Sum => row.iter().sum(),
            Self::Max => row.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Max => "max",
        }
    }
}

/// Which matrix a statistic is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixSource {
    /// The raw smoothing output.
    Raw,
    /// The normalization output.
    Normalized,
}

impl MatrixSource {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Normalized => "normalized",
        }
    }
}

/// Computes a row order for the heatmap.
pub trait OrderingStrategy: Strategy {
    /// Checks the strategy against the number of tracks in a request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the strategy cannot apply.
    fn validate(&self, _n_tracks: usize) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Computes the ordering.
    fn order(&self, input: &OrderingInput<'_>) -> Result<OrderingResult, PipelineError>;
}

pub(crate) fn check_track_index(track: usize, n_tracks: usize) -> Result<(), PipelineError> {
    if track >= n_tracks {
        return Err(PipelineError::invalid_configuration(format!(
            "ordering track index {track} is out of range for {n_tracks} tracks"
        )));
    }
    Ok(())
}

/// Sorts indexes ascending by `values`, ties kept in index order.
pub(crate) fn ascending_by(indexes: &mut [usize], values: &[f64]) {
    indexes.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
}

/// Keeps feature order.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsIs;

impl Strategy for AsIs {
    fn identity(&self) -> StrategyIdentity {
        StrategyIdentity::new("as_is", 1)
    }
}

impl OrderingStrategy for AsIs {
    fn order(&self, input: &OrderingInput<'_>) -> Result<OrderingResult, PipelineError> {
        Ok(OrderingResult::unclustered(RowOrder::identity(input.windows.len())))
    }
}

/// Sorts rows ascending by a statistic of one track.
#[derive(Debug, Clone, Copy)]
pub struct TrackStatistic {
    track: usize,
    statistic: RowStatistic,
    source: MatrixSource,
}

impl TrackStatistic {
    /// Sorts by `statistic` of the track at index `track`, read from the
    /// raw matrix.
    #[must_use]
    pub fn new(track: usize, statistic: RowStatistic) -> Self {
        Self {
            track,
            statistic,
            source: MatrixSource::Raw,
        }
    }

    /// Reads the statistic from `source` instead.
    #[must_use]
    pub fn with_source(mut self, source: MatrixSource) -> Self {
        self.source = source;
        self
    }
}

impl Strategy for TrackStatistic {
    fn identity(&self) -> StrategyIdentity {
        StrategyIdentity::new("track_statistic", 1).with_params(json!({
            "track": self.track,
            "statistic": self.statistic.as_str(),
            "source": self.source.as_str(),
        }))
    }
}

impl OrderingStrategy for TrackStatistic {
    fn validate(&self, n_tracks: usize) -> Result<(), PipelineError> {
        check_track_index(self.track, n_tracks)
    }

    fn order(&self, input: &OrderingInput<'_>) -> Result<OrderingResult, PipelineError> {
        let values = input.row_statistics(self.track, self.statistic, self.source)?;
        let mut order: Vec<usize> = (0..values.len()).collect();
        ascending_by(&mut order, &values);
        Ok(OrderingResult::unclustered(RowOrder::new(order)))
    }
}

/// Reuses a previously computed ordering verbatim.
#[derive(Debug, Clone)]
pub struct ExternalOrder {
    source: OrderingResult,
}

impl ExternalOrder {
    /// Wraps an existing ordering.
    #[must_use]
    pub fn new(source: OrderingResult) -> Self {
        Self { source }
    }
}

impl Strategy for ExternalOrder {
    fn identity(&self) -> StrategyIdentity {
        let digest = digest_json(&json!(self.source));
        StrategyIdentity::new("external_order", 1).with_params(json!({ "source": digest }))
    }
}

impl OrderingStrategy for ExternalOrder {
    fn order(&self, input: &OrderingInput<'_>) -> Result<OrderingResult, PipelineError> {
        let n = input.windows.len();
        if self.source.row_order.len() != n {
            return Err(PipelineError::shape_mismatch(format!(
                "external order has {} rows, window set has {n}",
                self.source.row_order.len()
            )));
        }
        Ok(self.source.clone())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::{Interval, Matrix};
    use crate::errors::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    pub(crate) struct Fixture {
        pub windows: WindowSet,
        pub raw: MatrixSet,
        pub norm: MatrixSet,
    }

    impl Fixture {
        /// One window per row; each track sees the given rows.
        pub fn new(tracks: &[Vec<Vec<f64>>]) -> Self {
            let n = tracks[0].len();
            let w = tracks[0][0].len();
            let windows = (0..n)
                .map(|i| {
                    let start = i64::try_from(i * 1000).unwrap();
                    Interval::new("chr1", start, start + i64::try_from(w).unwrap())
                })
                .collect();
            let mut raw = MatrixSet::new();
            for (i, rows) in tracks.iter().enumerate() {
                raw.insert(format!("t{i}"), Arc::new(Matrix::from_rows(rows.clone()).unwrap()));
            }
            Self {
                windows: WindowSet::new(w, windows).unwrap(),
                norm: raw.clone(),
                raw,
            }
        }

        pub fn input(&self) -> OrderingInput<'_> {
            OrderingInput {
                windows: &self.windows,
                tracks: &[],
                raw: &self.raw,
                norm: &self.norm,
            }
        }
    }

    #[test]
    fn test_as_is() {
        let fx = Fixture::new(&[vec![vec![3.0], vec![1.0], vec![2.0]]]);
        let result = AsIs.order(&fx.input()).unwrap();
        assert_eq!(result.row_order.as_slice(), &[0, 1, 2]);
        assert!(result.clusters.is_none());
    }

    #[test]
    fn test_track_statistic_sum_with_ties() {
        let fx = Fixture::new(&[vec![
            vec![2.0, 2.0],
            vec![0.0, 0.0],
            vec![1.0, 3.0],
            vec![0.0, 0.0],
        ]]);
        let result = TrackStatistic::new(0, RowStatistic::Sum)
            .order(&fx.input())
            .unwrap();
        assert_eq!(result.row_order.as_slice(), &[1, 3, 0, 2]);
    }

    #[test]
    fn test_track_statistic_max_on_second_track() {
        let fx = Fixture::new(&[
            vec![vec![9.0, 9.0], vec![0.0, 0.0]],
            vec![vec![1.0, 5.0], vec![4.0, 4.0]],
        ]);
        let result = TrackStatistic::new(1, RowStatistic::Max)
            .order(&fx.input())
            .unwrap();
        assert_eq!(result.row_order.as_slice(), &[1, 0]);
    }

    #[test]
    fn test_track_statistic_validate() {
        let strategy = TrackStatistic::new(2, RowStatistic::Sum);
        assert!(strategy.validate(3).is_ok());
        assert_eq!(
            strategy.validate(2).unwrap_err().kind(),
            ErrorKind::InvalidConfiguration
        );
    }

    #[test]
    fn test_external_order() {
        let fx = Fixture::new(&[vec![vec![0.0], vec![0.0], vec![0.0]]]);
        let prior = OrderingResult::clustered(RowOrder::new(vec![2, 0, 1]), vec![1, 0, 0]);

        let result = ExternalOrder::new(prior.clone()).order(&fx.input()).unwrap();
        assert_eq!(result, prior);

        let short = ExternalOrder::new(OrderingResult::unclustered(RowOrder::identity(2)));
        assert_eq!(
            short.order(&fx.input()).unwrap_err().kind(),
            ErrorKind::ShapeMismatch
        );
    }

    #[test]
    fn test_external_order_identity_tracks_source() {
        let a = ExternalOrder::new(OrderingResult::unclustered(RowOrder::new(vec![0, 1])));
        let b = ExternalOrder::new(OrderingResult::unclustered(RowOrder::new(vec![1, 0])));
        assert_ne!(a.identity(), b.identity());
    }
}
