//! Volatile in-memory tier.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use indexmap::IndexMap;

use fetcher_core::{
    Artifact, CacheError, CacheKey, CacheStorePort, CacheTier, PersistenceTier, Provenance,
};

/// In-memory store. Lost on restart.
///
/// With a capacity set, the least recently used entries are dropped once the
/// total payload size exceeds it. Payloads are shared [`bytes::Bytes`], so a
/// hit does not copy.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<Entries>,
    max_bytes: Option<u64>,
}

#[derive(Debug, Default)]
struct Entries {
    /// Least recently used first.
    map: IndexMap<CacheKey, Artifact>,
    bytes: u64,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the total payload size kept in memory.
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().map.is_empty()
    }

    /// Total payload bytes held.
    pub fn size_bytes(&self) -> u64 {
        self.lock().bytes
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheStorePort for MemoryCacheStore {
    async fn exists(&self, key: &CacheKey) -> bool {
        self.lock().map.contains_key(key)
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Artifact>, CacheError> {
        let mut entries = self.lock();
        let Some(index) = entries.map.get_index_of(key) else {
            return Ok(None);
        };
        let last = entries.map.len() - 1;
        entries.map.move_index(index, last);
        Ok(entries.map.get(key).map(|artifact| {
            artifact.clone().with_provenance(Provenance::Cache {
                tier: CacheTier::Memory,
            })
        }))
    }

    async fn put(&self, artifact: Artifact, _tier: PersistenceTier) -> Result<(), CacheError> {
        let size = artifact.size();
        if self.max_bytes.is_some_and(|max| size > max) {
            return Err(CacheError::InsufficientStorage {
                message: format!("{size} bytes exceeds the memory cache capacity"),
            });
        }

        let mut entries = self.lock();
        let key = artifact.key().clone();
        if let Some(previous) = entries.map.shift_remove(&key) {
            entries.bytes -= previous.size();
        }
        entries.bytes += size;
        entries.map.insert(key, artifact);

        if let Some(max) = self.max_bytes {
            while entries.bytes > max {
                let Some((evicted, artifact)) = entries.map.shift_remove_index(0) else {
                    break;
                };
                entries.bytes -= artifact.size();
                tracing::debug!(
                    target: "fetcher.store",
                    key = %evicted,
                    size = artifact.size(),
                    "Evicted from memory cache"
                );
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        let mut entries = self.lock();
        if let Some(artifact) = entries.map.shift_remove(key) {
            entries.bytes -= artifact.size();
        }
        Ok(())
    }
}
