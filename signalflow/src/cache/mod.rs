//! Content-addressed artifact caching.
//!
//! A [`ContentKey`] names a computation by the identity of its strategy,
//! its parameters and the keys of its inputs. Artifact stores map keys to
//! serialized artifacts; two backends are provided, an in-memory map and a
//! directory of JSON blobs that stays valid across process restarts.

mod disk;
mod key;
mod stats;
mod store;

pub use disk::DiskArtifactStore;
pub use key::{digest_json, ContentKey, KeyBuilder, CACHE_FORMAT_VERSION};
pub use stats::{CacheStatistics, CacheStatsSnapshot};
pub use store::{ArtifactStore, InMemoryArtifactStore, StoreError};
