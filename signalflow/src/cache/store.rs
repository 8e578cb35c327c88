//! Artifact store trait and the in-memory backend.

use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

use super::{CacheStatistics, ContentKey};
use crate::core::Artifact;

/// Error raised by an artifact store backend.
#[derive(Debug, Clone, Error)]
#[error("Artifact store error for key {key}: {message}")]
pub struct StoreError {
    /// The key being read or written.
    pub key: String,
    /// What went wrong.
    pub message: String,
}

impl StoreError {
    /// Creates a new store error.
    #[must_use]
    pub fn new(key: &ContentKey, message: impl Into<String>) -> Self {
        Self {
            key: key.short().to_string(),
            message: message.into(),
        }
    }
}

/// Protocol for artifact storage backends.
///
/// Entries are append-only: an artifact stored under a key is never
/// modified, only evicted. Concurrent computation of the same key is
/// prevented one level up, by the job engine.
pub trait ArtifactStore: Send + Sync + Debug {
    /// Loads the artifact stored under `key`.
    fn get(&self, key: &ContentKey) -> Result<Option<Arc<Artifact>>, StoreError>;

    /// Stores `artifact` under `key`.
    fn put(&self, key: &ContentKey, artifact: Arc<Artifact>) -> Result<(), StoreError>;

    /// Returns true if an entry exists for `key`.
    fn contains(&self, key: &ContentKey) -> bool;

    /// Removes the entry for `key`, returning whether one existed.
    fn evict(&self, key: &ContentKey) -> Result<bool, StoreError>;

    /// Removes every entry.
    fn clear(&self) -> Result<(), StoreError>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Returns true if nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit/miss counters.
    fn stats(&self) -> &CacheStatistics;
}

/// In-memory artifact store.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    entries: DashMap<ContentKey, Arc<Artifact>>,
    stats: CacheStatistics,
}

impl InMemoryArtifactStore {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn get(&self, key: &ContentKey) -> Result<Option<Arc<Artifact>>, StoreError> {
        let found = self.entries.get(key).map(|entry| Arc::clone(entry.value()));
        if found.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        Ok(found)
    }

    fn put(&self, key: &ContentKey, artifact: Arc<Artifact>) -> Result<(), StoreError> {
        if self.entries.insert(key.clone(), artifact).is_none() {
            self.stats.record_insertion();
        }
        Ok(())
    }

    fn contains(&self, key: &ContentKey) -> bool {
        self.entries.contains_key(key)
    }

    fn evict(&self, key: &ContentKey) -> Result<bool, StoreError> {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.stats.record_evictions(1);
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let count = self.entries.len() as u64;
        self.entries.clear();
        self.stats.record_evictions(count);
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stats(&self) -> &CacheStatistics {
        &self.stats
    }
}
