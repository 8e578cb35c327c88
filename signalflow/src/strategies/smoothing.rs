//! Smoothing strategies: reads in a window to a signal row.

use serde_json::json;

use super::{Strategy, StrategyIdentity};
use crate::core::{Interval, Matrix, Read, SampleTrack, Strand, WindowSet};
use crate::errors::PipelineError;

/// Produces a coverage row per window from a single track.
///
/// Row `i` depends only on window `i` and the reads returned for it.
pub trait SmoothingStrategy: Strategy {
    /// Genomic span `[start, stop)` a read contributes coverage to.
    fn read_span(&self, read: &Read) -> (i64, i64);

    /// Extra bases queried on both sides of a window so reads starting
    /// outside it can still reach into it.
    fn query_margin(&self) -> i64 {
        0
    }

    /// Computes the row for one window.
    ///
    /// # Errors
    ///
    /// Returns `DependencyUnavailable` if the track query fails.
    fn smooth_row(
        &self,
        window: &Interval,
        track: &dyn SampleTrack,
        row: &mut [f64],
    ) -> Result<(), PipelineError> {
        let margin = self.query_margin();
        let query_start = (window.start - margin).max(0);
        let query_stop = window.stop + margin;
        if query_stop <= query_start {
            return Ok(());
        }

        let reads = track.query(&window.chrom, query_start, query_stop)?;
        for read in &reads {
            let (start, stop) = self.read_span(read);
            let from = start.max(window.start);
            let to = stop.min(window.stop);
            if from >= to {
                continue;
            }
            // both bounds are inside the window, so offsets fit in the row
            let lo = usize::try_from(from - window.start).unwrap_or(0);
            let hi = usize::try_from(to - window.start).unwrap_or(0).min(row.len());
            for cell in &mut row[lo..hi] {
                *cell += 1.0;
            }
        }
        Ok(())
    }

    /// Computes the `[N, W]` matrix for every window.
    ///
    /// # Errors
    ///
    /// Returns `DependencyUnavailable` if any track query fails.
    fn smooth(&self, windows: &WindowSet, track: &dyn SampleTrack) -> Result<Matrix, PipelineError> {
        let mut matrix = Matrix::zeros(windows.len(), windows.width());
        for (i, window) in windows.iter().enumerate() {
            self.smooth_row(window, track, matrix.row_mut(i))?;
        }
        Ok(matrix)
    }
}

/// Counts the aligned span of every read, without extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadCount;

impl Strategy for ReadCount {
    fn identity(&self) -> StrategyIdentity {
        StrategyIdentity::new("read_count", 1)
    }
}

impl SmoothingStrategy for ReadCount {
    fn read_span(&self, read: &Read) -> (i64, i64) {
        (read.position, read.end())
    }
}

/// Extends reads 3' to `fragment_size` bases.
///
/// Reads already longer than the fragment keep their aligned length.
#[derive(Debug, Clone, Copy)]
pub struct ExtendedReads {
    fragment_size: u32,
}

impl ExtendedReads {
    /// Creates the strategy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a zero fragment size.
    pub fn new(fragment_size: u32) -> Result<Self, PipelineError> {
        if fragment_size == 0 {
            return Err(PipelineError::invalid_configuration(
                "fragment size must be positive",
            ));
        }
        Ok(Self { fragment_size })
    }

    /// The fragment size in bases.
    #[must_use]
    pub fn fragment_size(&self) -> u32 {
        self.fragment_size
    }
}

impl Strategy for ExtendedReads {
    fn identity(&self) -> StrategyIdentity {
        StrategyIdentity::new("extended_reads", 1)
            .with_params(json!({ "fragment_size": self.fragment_size }))
    }
}

impl SmoothingStrategy for ExtendedReads {
    fn read_span(&self, read: &Read) -> (i64, i64) {
        let fragment = i64::from(self.fragment_size.max(read.length));
        match read.strand {
            Strand::Plus => (read.position, read.position + fragment),
            Strand::Minus => (read.end() - fragment, read.end()),
        }
    }

    fn query_margin(&self) -> i64 {
        i64::from(self.fragment_size)
    }
}
