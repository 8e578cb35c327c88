//! Track and backend doubles.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{ArtifactStore, CacheStatistics, ContentKey, InMemoryArtifactStore, StoreError};
use crate::core::{Artifact, Read, RenderableHeatmap, SampleTrack, TrackError, TrackRef};
use crate::pipeline::{JsonRenderBackend, RenderBackend, RenderOptions, RenderedArtifact};

/// A track whose every query fails.
#[derive(Debug, Clone)]
pub struct FailingTrack {
    name: String,
    message: String,
}

impl FailingTrack {
    /// Creates a failing track.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl SampleTrack for FailingTrack {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, _chrom: &str, _start: i64, _stop: i64) -> Result<Vec<Read>, TrackError> {
        Err(TrackError::new(&self.name, &self.message))
    }
}

/// Wraps a track, counting queries.
#[derive(Debug)]
pub struct CountingTrack {
    inner: TrackRef,
    queries: AtomicUsize,
}

impl CountingTrack {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: TrackRef) -> Self {
        Self {
            inner,
            queries: AtomicUsize::new(0),
        }
    }

    /// Number of queries so far.
    #[must_use]
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl SampleTrack for CountingTrack {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn query(&self, chrom: &str, start: i64, stop: i64) -> Result<Vec<Read>, TrackError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(chrom, start, stop)
    }

    fn fingerprint(&self) -> Option<String> {
        self.inner.fingerprint()
    }
}

/// Wraps a track, sleeping before each query.
#[derive(Debug)]
pub struct SlowTrack {
    inner: TrackRef,
    delay: Duration,
}

impl SlowTrack {
    /// Wraps `inner` with a per-query delay.
    #[must_use]
    pub fn new(inner: TrackRef, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl SampleTrack for SlowTrack {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn query(&self, chrom: &str, start: i64, stop: i64) -> Result<Vec<Read>, TrackError> {
        std::thread::sleep(self.delay);
        self.inner.query(chrom, start, stop)
    }

    fn fingerprint(&self) -> Option<String> {
        self.inner.fingerprint()
    }
}

/// Records every heatmap it is asked to render.
#[derive(Debug, Default)]
pub struct RecordingRenderBackend {
    rendered: RwLock<Vec<RenderableHeatmap>>,
}

impl RecordingRenderBackend {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Heatmaps rendered so far.
    #[must_use]
    pub fn rendered(&self) -> Vec<RenderableHeatmap> {
        self.rendered.read().clone()
    }

    /// Number of render calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.rendered.read().len()
    }
}

#[async_trait]
impl RenderBackend for RecordingRenderBackend {
    async fn render(
        &self,
        heatmap: &RenderableHeatmap,
        options: &RenderOptions,
    ) -> anyhow::Result<RenderedArtifact> {
        self.rendered.write().push(heatmap.clone());
        Ok(RenderedArtifact::Bytes(JsonRenderBackend::encode(heatmap, options)?))
    }
}

/// A backend that always fails.
#[derive(Debug, Clone)]
pub struct FailingRenderBackend {
    message: String,
}

impl FailingRenderBackend {
    /// Creates a backend failing with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl RenderBackend for FailingRenderBackend {
    async fn render(
        &self,
        _heatmap: &RenderableHeatmap,
        _options: &RenderOptions,
    ) -> anyhow::Result<RenderedArtifact> {
        Err(anyhow::anyhow!("{}", self.message))
    }
}

/// An in-memory store whose next read or write can be made to fail once.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryArtifactStore,
    fail_read: AtomicBool,
    fail_write: AtomicBool,
}

impl FlakyStore {
    /// Creates a store that works until told otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `get` fail.
    pub fn fail_next_read(&self) {
        self.fail_read.store(true, Ordering::SeqCst);
    }

    /// Makes the next `put` fail.
    pub fn fail_next_write(&self) {
        self.fail_write.store(true, Ordering::SeqCst);
    }
}

impl ArtifactStore for FlakyStore {
    fn get(&self, key: &ContentKey) -> Result<Option<Arc<Artifact>>, StoreError> {
        if self.fail_read.swap(false, Ordering::SeqCst) {
            self.inner.stats().record_error();
            return Err(StoreError::new(key, "read timed out"));
        }
        self.inner.get(key)
    }

    fn put(&self, key: &ContentKey, artifact: Arc<Artifact>) -> Result<(), StoreError> {
        if self.fail_write.swap(false, Ordering::SeqCst) {
            self.inner.stats().record_error();
            return Err(StoreError::new(key, "no space left on device"));
        }
        self.inner.put(key, artifact)
    }

    fn contains(&self, key: &ContentKey) -> bool {
        self.inner.contains(key)
    }

    fn evict(&self, key: &ContentKey) -> Result<bool, StoreError> {
        self.inner.evict(key)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn stats(&self) -> &CacheStatistics {
        self.inner.stats()
    }
}
