//! Directory-backed artifact store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ArtifactStore, CacheStatistics, ContentKey, StoreError, CACHE_FORMAT_VERSION};
use crate::core::Artifact;

/// On-disk wrapper around a stored artifact.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format: u32,
    key: ContentKey,
    kind: String,
    created_at: DateTime<Utc>,
    artifact: Artifact,
}

/// Stores each artifact as `<root>/<first two key chars>/<key>.json`.
///
/// Writes go to a temporary file that is renamed into place, so readers
/// never observe a partial blob. A blob that fails to parse, or that was
/// written under another format version, is reported as a miss.
#[derive(Debug)]
pub struct DiskArtifactStore {
    root: PathBuf,
    stats: CacheStatistics,
}

impl DiskArtifactStore {
    /// Opens (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError {
            key: String::new(),
            message: format!("cannot create cache directory {}: {e}", root.display()),
        })?;
        Ok(Self {
            root,
            stats: CacheStatistics::new(),
        })
    }

    /// The cache directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &ContentKey) -> PathBuf {
        let hex = key.as_str();
        self.root.join(&hex[..2]).join(format!("{hex}.json"))
    }

    fn blob_paths(&self) -> Vec<PathBuf> {
        let Ok(shards) = fs::read_dir(&self.root) else {
            return Vec::new();
        };

        shards
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|shard| fs::read_dir(shard.path()).ok())
            .flatten()
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }

    fn read_envelope(&self, key: &ContentKey, path: &Path) -> Result<Option<Envelope>, StoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                self.stats.record_error();
                return Err(StoreError::new(key, format!("read failed: {e}")));
            }
        };

        match serde_json::from_slice::<Envelope>(&bytes) {
            Ok(envelope) if envelope.format == CACHE_FORMAT_VERSION && envelope.key == *key => {
                Ok(Some(envelope))
            }
            Ok(envelope) => {
                warn!(
                    key = %key.short(),
                    format = envelope.format,
                    "Ignoring cached blob written under a different format"
                );
                Ok(None)
            }
            Err(e) => {
                self.stats.record_error();
                warn!(key = %key.short(), error = %e, "Ignoring unreadable cached blob");
                Ok(None)
            }
        }
    }
}

impl ArtifactStore for DiskArtifactStore {
    fn get(&self, key: &ContentKey) -> Result<Option<Arc<Artifact>>, StoreError> {
        let found = self
            .read_envelope(key, &self.path_for(key))?
            .map(|envelope| Arc::new(envelope.artifact));

        if found.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        Ok(found)
    }

    fn put(&self, key: &ContentKey, artifact: Arc<Artifact>) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let fail = |message: String| {
            self.stats.record_error();
            StoreError::new(key, message)
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| fail(format!("cannot create shard: {e}")))?;
        }

        let envelope = Envelope {
            format: CACHE_FORMAT_VERSION,
            key: key.clone(),
            kind: artifact.kind().to_string(),
            created_at: Utc::now(),
            artifact: (*artifact).clone(),
        };
        let bytes = serde_json::to_vec(&envelope).map_err(|e| fail(format!("encode failed: {e}")))?;

        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, &bytes).map_err(|e| fail(format!("write failed: {e}")))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(fail(format!("rename failed: {e}")));
        }

        self.stats.record_insertion();
        debug!(key = %key.short(), bytes = bytes.len(), "Wrote cached artifact");
        Ok(())
    }

    fn contains(&self, key: &ContentKey) -> bool {
        self.path_for(key).is_file()
    }

    fn evict(&self, key: &ContentKey) -> Result<bool, StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {
                self.stats.record_evictions(1);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => {
                self.stats.record_error();
                Err(StoreError::new(key, format!("remove failed: {e}")))
            }
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut removed = 0;
        for path in self.blob_paths() {
            fs::remove_file(&path).map_err(|e| StoreError {
                key: String::new(),
                message: format!("cannot remove {}: {e}", path.display()),
            })?;
            removed += 1;
        }
        self.stats.record_evictions(removed);
        Ok(())
    }

    fn len(&self) -> usize {
        self.blob_paths().len()
    }

    fn stats(&self) -> &CacheStatistics {
        &self.stats
    }
}
