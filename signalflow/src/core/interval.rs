//! Genomic intervals, feature sets and window sets.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cache::digest_json;
use crate::errors::PipelineError;

/// A 0-based, half-open genomic interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    /// Chromosome name.
    pub chrom: String,
    /// First base (inclusive).
    pub start: i64,
    /// Last base (exclusive).
    pub stop: i64,
}

impl Interval {
    /// Creates a new interval.
    #[must_use]
    pub fn new(chrom: impl Into<String>, start: i64, stop: i64) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            stop,
        }
    }

    /// Returns the number of bases covered.
    #[must_use]
    pub fn width(&self) -> i64 {
        self.stop - self.start
    }

    /// Returns the midpoint, rounded toward negative infinity.
    #[must_use]
    pub fn midpoint(&self) -> i64 {
        (self.start + self.stop).div_euclid(2)
    }

    /// Returns true if the two intervals share at least one base.
    #[must_use]
    pub fn overlaps(&self, chrom: &str, start: i64, stop: i64) -> bool {
        self.chrom == chrom && self.start < stop && start < self.stop
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chrom, self.start, self.stop)
    }
}

/// An ordered, immutable sequence of caller-supplied intervals.
///
/// Order is significant: it is the default row order of the heatmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    intervals: Vec<Interval>,
}

impl FeatureSet {
    /// Creates a feature set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if an interval ends before it starts.
    pub fn new(intervals: Vec<Interval>) -> Result<Self, PipelineError> {
        if let Some((index, bad)) = intervals
            .iter()
            .enumerate()
            .find(|(_, iv)| iv.stop < iv.start)
        {
            return Err(PipelineError::invalid_configuration(format!(
                "interval {index} ({bad}) ends before it starts"
            )));
        }
        Ok(Self { intervals })
    }

    /// Returns the number of intervals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Returns true if there are no intervals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Returns the interval at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Interval> {
        self.intervals.get(index)
    }

    /// Iterates over the intervals in order.
    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    /// Returns the intervals as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Interval] {
        &self.intervals
    }

    /// Content digest identifying this exact sequence of intervals.
    #[must_use]
    pub fn digest(&self) -> String {
        digest_json(&serde_json::json!(self.intervals))
    }
}

/// Fixed-width windows, one per feature, all of the same width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSet {
    width: usize,
    windows: Vec<Interval>,
}

impl WindowSet {
    /// Creates a window set, checking every window has width `width`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a zero width and `ShapeMismatch`
    /// if any window has a different width.
    pub fn new(width: usize, windows: Vec<Interval>) -> Result<Self, PipelineError> {
        if width == 0 {
            return Err(PipelineError::invalid_configuration(
                "window width must be positive",
            ));
        }
        let expected = i64::try_from(width)
            .map_err(|_| PipelineError::invalid_configuration("window width is too large"))?;

        if let Some((index, bad)) = windows
            .iter()
            .enumerate()
            .find(|(_, w)| w.width() != expected)
        {
            return Err(PipelineError::shape_mismatch(format!(
                "window {index} ({bad}) has width {}, expected {width}",
                bad.width()
            )));
        }

        Ok(Self { width, windows })
    }

    /// The shared window width `W`.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the number of windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Returns true if there are no windows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Returns the window at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Interval> {
        self.windows.get(index)
    }

    /// Iterates over the windows in feature order.
    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.windows.iter()
    }
}
