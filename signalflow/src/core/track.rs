//! The sample track boundary.
//!
//! A track is an external source of aligned reads. The pipeline only ever
//! asks it for the reads overlapping an interval and never caches what it
//! returns; only derived matrices are cached.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Read orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    /// Forward strand.
    #[serde(rename = "+")]
    Plus,
    /// Reverse strand.
    #[serde(rename = "-")]
    Minus,
}

/// A single aligned read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Read {
    /// Leftmost aligned base, 0-based.
    pub position: i64,
    /// Aligned length in bases.
    pub length: u32,
    /// Orientation.
    pub strand: Strand,
}

impl Read {
    /// Creates a new read.
    #[must_use]
    pub fn new(position: i64, length: u32, strand: Strand) -> Self {
        Self {
            position,
            length,
            strand,
        }
    }

    /// One past the rightmost aligned base.
    #[must_use]
    pub fn end(&self) -> i64 {
        self.position + i64::from(self.length)
    }
}

/// Error raised by a track query.
#[derive(Debug, Clone, Error)]
#[error("Track '{track}' query failed: {message}")]
pub struct TrackError {
    /// The track name.
    pub track: String,
    /// What went wrong.
    pub message: String,
}

impl TrackError {
    /// Creates a new track error.
    #[must_use]
    pub fn new(track: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            track: track.into(),
            message: message.into(),
        }
    }
}

/// Trait for read sources queried by the smoothing stage.
///
/// Queries must be pure and idempotent. Implementations must be safe to
/// query from several worker threads at once.
pub trait SampleTrack: Send + Sync + Debug {
    /// Stable name identifying the track in content keys.
    fn name(&self) -> &str;

    /// Returns every read overlapping `[start, stop)` on `chrom`.
    fn query(&self, chrom: &str, start: i64, stop: i64) -> Result<Vec<Read>, TrackError>;

    /// Optional version marker, e.g. a file modification time.
    ///
    /// When it changes, every matrix derived from this track is recomputed.
    fn fingerprint(&self) -> Option<String> {
        None
    }
}

/// Shared handle to a track.
pub type TrackRef = Arc<dyn SampleTrack>;

/// A track holding its reads in memory, sorted by position.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTrack {
    name: String,
    reads: HashMap<String, Vec<Read>>,
    longest: u32,
    fingerprint: Option<String>,
}

impl InMemoryTrack {
    /// Creates an empty track.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a read on `chrom`.
    #[must_use]
    pub fn with_read(mut self, chrom: impl Into<String>, read: Read) -> Self {
        self.push(chrom, read);
        self
    }

    /// Adds several reads on `chrom`.
    #[must_use]
    pub fn with_reads(mut self, chrom: &str, reads: impl IntoIterator<Item = Read>) -> Self {
        for read in reads {
            self.push(chrom, read);
        }
        self
    }

    /// Sets the fingerprint.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Total number of reads held.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.values().map(Vec::len).sum()
    }

    fn push(&mut self, chrom: impl Into<String>, read: Read) {
        let reads = self.reads.entry(chrom.into()).or_default();
        let at = reads.partition_point(|r| r.position <= read.position);
        reads.insert(at, read);
        self.longest = self.longest.max(read.length);
    }
}

impl SampleTrack for InMemoryTrack {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, chrom: &str, start: i64, stop: i64) -> Result<Vec<Read>, TrackError> {
        let Some(reads) = self.reads.get(chrom) else {
            return Ok(Vec::new());
        };

        // no read starting before this can reach `start`
        let lower = start - i64::from(self.longest);
        let from = reads.partition_point(|r| r.position < lower);
        let to = reads.partition_point(|r| r.position < stop);

        Ok(reads[from..to]
            .iter()
            .filter(|r| r.end() > start)
            .copied()
            .collect())
    }

    fn fingerprint(&self) -> Option<String> {
        self.fingerprint.clone()
    }
}
