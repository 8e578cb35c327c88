//! K-means clustering of rows.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::ordering::{ascending_by, check_track_index};
use super::{MatrixSource, OrderingInput, OrderingStrategy, RowStatistic, Strategy, StrategyIdentity};
use crate::core::{OrderingResult, RowOrder};
use crate::errors::{ErrorKind, PipelineError};

/// How many clusters to form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterCount {
    /// Exactly `k` clusters, reduced only on numeric failure.
    Fixed(usize),
    /// `round(sqrt(N / 2))` clusters, capped at `max_k`.
    Inferred {
        /// Upper bound on `k`.
        max_k: usize,
    },
}

impl ClusterCount {
    /// Resolves the requested `k` for `n` rows.
    #[must_use]
    pub fn resolve(self, n: usize) -> usize {
        match self {
            Self::Fixed(k) => k,
            Self::Inferred { max_k } => {
                #[allow(
                    clippy::cast_precision_loss,
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss
                )]
                let k = (n as f64 / 2.0).sqrt().round() as usize;
                k.clamp(1, max_k.max(1))
            }
        }
    }
}

/// Clusters rows by k-means over per-track row statistics.
///
/// Each row's feature vector holds one statistic per track. Clusters are
/// displayed in ascending order of the designated track's mean statistic,
/// and rows within a cluster ascend by that same statistic. Cluster ids
/// are relabeled so id 0 is the first cluster displayed.
#[derive(Debug, Clone, Copy)]
pub struct Clustering {
    count: ClusterCount,
    track: usize,
    statistic: RowStatistic,
    source: MatrixSource,
    seed: u64,
    max_iterations: usize,
}

impl Clustering {
    /// Creates a clustering strategy sorting by track 0.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a zero cluster count.
    pub fn new(count: ClusterCount) -> Result<Self, PipelineError> {
        let k = match count {
            ClusterCount::Fixed(k) => k,
            ClusterCount::Inferred { max_k } => max_k,
        };
        if k == 0 {
            return Err(PipelineError::invalid_configuration(
                "cluster count must be at least 1",
            ));
        }
        Ok(Self {
            count,
            track: 0,
            statistic: RowStatistic::Sum,
            source: MatrixSource::Normalized,
            seed: 0,
            max_iterations: 100,
        })
    }

    /// Sets the designated track index.
    #[must_use]
    pub fn with_track(mut self, track: usize) -> Self {
        self.track = track;
        self
    }

    /// Sets the row statistic.
    #[must_use]
    pub fn with_statistic(mut self, statistic: RowStatistic) -> Self {
        self.statistic = statistic;
        self
    }

    /// Sets the matrix the statistics are read from.
    #[must_use]
    pub fn with_source(mut self, source: MatrixSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the seed for centroid initialisation.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Caps Lloyd iterations.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    fn features(&self, input: &OrderingInput<'_>) -> Result<Vec<Vec<f64>>, PipelineError> {
        let set = match self.source {
            MatrixSource::Raw => input.raw,
            MatrixSource::Normalized => input.norm,
        };
        check_track_index(self.track, set.len())?;
        let columns = (0..set.len())
            .map(|t| input.row_statistics(t, self.statistic, self.source))
            .collect::<Result<Vec<_>, _>>()?;

        let n = columns.first().map_or(0, Vec::len);
        Ok((0..n)
            .map(|row| columns.iter().map(|col| col[row]).collect())
            .collect())
    }
}

impl Strategy for Clustering {
    fn identity(&self) -> StrategyIdentity {
        StrategyIdentity::new("kmeans", 1).with_params(json!({
            "count": self.count,
            "track": self.track,
            "statistic": self.statistic,
            "source": self.source,
            "seed": self.seed,
            "max_iterations": self.max_iterations,
        }))
    }
}

impl OrderingStrategy for Clustering {
    fn validate(&self, n_tracks: usize) -> Result<(), PipelineError> {
        check_track_index(self.track, n_tracks)
    }

    fn order(&self, input: &OrderingInput<'_>) -> Result<OrderingResult, PipelineError> {
        let points = self.features(input)?;
        let n = points.len();
        if n == 0 {
            return Ok(OrderingResult::clustered(RowOrder::identity(0), Vec::new()));
        }

        let requested = self.count.resolve(n);
        let mut k = requested;
        let labels = loop {
            match kmeans(&points, k, self.seed, self.max_iterations) {
                Ok(labels) => break labels,
                Err(err) if err.kind() == ErrorKind::NumericDegeneracy && k > 1 => {
                    warn!(k, error = %err, "Clustering failed, retrying with fewer clusters");
                    k -= 1;
                }
                Err(err) => return Err(err.with_detail("k", k.to_string())),
            }
        };
        debug!(requested, achieved = k, rows = n, "Clustered rows");

        let values: Vec<f64> = points.iter().map(|p| p[self.track]).collect();
        Ok(arrange(&labels, k, &values))
    }
}

/// Orders clusters by mean value, rows within each by value, and relabels.
fn arrange(labels: &[usize], k: usize, values: &[f64]) -> OrderingResult {
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (row, &label) in labels.iter().enumerate() {
        members[label].push(row);
    }

    #[allow(clippy::cast_precision_loss)]
    let means: Vec<f64> = members
        .iter()
        .map(|rows| rows.iter().map(|&r| values[r]).sum::<f64>() / rows.len().max(1) as f64)
        .collect();
    let mut cluster_order: Vec<usize> = (0..k).collect();
    ascending_by(&mut cluster_order, &means);

    let mut relabel = vec![0_u32; k];
    let mut order = Vec::with_capacity(labels.len());
    for (new_id, &old) in (0_u32..).zip(&cluster_order) {
        relabel[old] = new_id;
        let mut rows = members[old].clone();
        ascending_by(&mut rows, values);
        order.extend(rows);
    }

    let clusters = labels.iter().map(|&label| relabel[label]).collect();
    OrderingResult::clustered(RowOrder::new(order), clusters)
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(point: &[f64], centers: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, center) in centers.iter().enumerate() {
        let d = squared_distance(point, center);
        if d < best_d {
            best = i;
            best_d = d;
        }
    }
    best
}

fn distinct_points(points: &[Vec<f64>]) -> usize {
    let mut keys: Vec<Vec<u64>> = points
        .iter()
        .map(|p| p.iter().map(|v| v.to_bits()).collect())
        .collect();
    keys.sort_unstable();
    keys.dedup();
    keys.len()
}

/// Seeds `k` centers with k-means++ and runs Lloyd iterations.
fn kmeans(
    points: &[Vec<f64>],
    k: usize,
    seed: u64,
    max_iterations: usize,
) -> Result<Vec<usize>, PipelineError> {
    if points.iter().flatten().any(|v| !v.is_finite()) {
        return Err(PipelineError::numeric_degeneracy(
            "row statistics contain non-finite values",
        ));
    }
    let distinct = distinct_points(points);
    if distinct < k {
        return Err(PipelineError::numeric_degeneracy(format!(
            "{distinct} distinct rows cannot form {k} clusters"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut centers = vec![points[rng.gen_range(0..points.len())].clone()];
    while centers.len() < k {
        let weights: Vec<f64> = points
            .iter()
            .map(|p| squared_distance(p, &centers[nearest(p, &centers)]))
            .collect();
        let total: f64 = weights.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(PipelineError::numeric_degeneracy(
                "cannot seed further cluster centers",
            ));
        }

        let target = rng.gen::<f64>() * total;
        let mut acc = 0.0;
        let mut chosen = None;
        for (i, &w) in weights.iter().enumerate() {
            if w > 0.0 {
                acc += w;
                chosen = Some(i);
                if acc >= target {
                    break;
                }
            }
        }
        let Some(index) = chosen else {
            return Err(PipelineError::numeric_degeneracy(
                "cannot seed further cluster centers",
            ));
        };
        centers.push(points[index].clone());
    }

    let dims = points[0].len();
    let mut labels: Vec<usize> = points.iter().map(|p| nearest(p, &centers)).collect();
    for _ in 0..max_iterations {
        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0_usize; k];
        for (point, &label) in points.iter().zip(&labels) {
            counts[label] += 1;
            for (s, v) in sums[label].iter_mut().zip(point) {
                *s += v;
            }
        }
        if let Some(empty) = counts.iter().position(|&c| c == 0) {
            return Err(PipelineError::numeric_degeneracy(format!(
                "cluster {empty} of {k} became empty"
            )));
        }
        for ((center, sum), &count) in centers.iter_mut().zip(sums).zip(&counts) {
            #[allow(clippy::cast_precision_loss)]
            let count = count as f64;
            *center = sum.into_iter().map(|s| s / count).collect();
        }

        let next: Vec<usize> = points.iter().map(|p| nearest(p, &centers)).collect();
        if next == labels {
            break;
        }
        labels = next;
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::ordering::tests::Fixture;
    use pretty_assertions::assert_eq;

    fn single_track(sums: &[f64]) -> Fixture {
        Fixture::new(&[sums.iter().map(|&s| vec![s]).collect()])
    }

    #[test]
    fn test_two_separated_groups() {
        let fx = single_track(&[1.0, 1.0, 10.0, 10.0, 1.5, 11.0]);
        let strategy = Clustering::new(ClusterCount::Fixed(2)).unwrap();

        let result = strategy.order(&fx.input()).unwrap();
        assert_eq!(result.row_order.as_slice(), &[0, 1, 4, 2, 3, 5]);
        assert_eq!(result.clusters, Some(vec![0, 0, 1, 1, 0, 1]));
        assert!(result.validate(6, 6).is_ok());
    }

    #[test]
    fn test_retries_with_fewer_clusters() {
        let fx = single_track(&[1.0, 5.0, 1.0, 5.0]);
        let strategy = Clustering::new(ClusterCount::Fixed(3)).unwrap();

        let result = strategy.order(&fx.input()).unwrap();
        assert_eq!(result.clusters, Some(vec![0, 1, 0, 1]));
        assert_eq!(result.row_order.as_slice(), &[0, 2, 1, 3]);
    }

    #[test]
    fn test_identical_rows_collapse_to_one_cluster() {
        let fx = single_track(&[2.0, 2.0, 2.0]);
        let strategy = Clustering::new(ClusterCount::Fixed(2)).unwrap();

        let result = strategy.order(&fx.input()).unwrap();
        assert_eq!(result.clusters, Some(vec![0, 0, 0]));
        assert_eq!(result.row_order.as_slice(), &[0, 1, 2]);
    }

    #[test]
    fn test_non_finite_escalates() {
        let fx = single_track(&[1.0, f64::NAN, 3.0]);
        let strategy = Clustering::new(ClusterCount::Fixed(2)).unwrap();

        let err = strategy.order(&fx.input()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NumericDegeneracy);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let fx = Fixture::new(&[
            (0..20).map(|i| vec![f64::from(i % 7)]).collect(),
            (0..20).map(|i| vec![f64::from(i % 3)]).collect(),
        ]);
        let strategy = Clustering::new(ClusterCount::Fixed(3)).unwrap().with_seed(42);

        let a = strategy.order(&fx.input()).unwrap();
        let b = strategy.order(&fx.input()).unwrap();
        assert_eq!(a, b);
        assert!(a.validate(20, 20).is_ok());
    }

    #[test]
    fn test_inferred_count() {
        let inferred = ClusterCount::Inferred { max_k: 5 };
        assert_eq!(inferred.resolve(1), 1);
        assert_eq!(inferred.resolve(8), 2);
        assert_eq!(inferred.resolve(50), 5);
        assert_eq!(inferred.resolve(1000), 5);
        assert_eq!(ClusterCount::Fixed(4).resolve(2), 4);
    }

    #[test]
    fn test_zero_count_rejected() {
        assert!(Clustering::new(ClusterCount::Fixed(0)).is_err());
        assert!(Clustering::new(ClusterCount::Inferred { max_k: 0 }).is_err());
    }

    #[test]
    fn test_seed_changes_identity() {
        let a = Clustering::new(ClusterCount::Fixed(2)).unwrap();
        assert_ne!(a.identity(), a.with_seed(7).identity());
    }
}
