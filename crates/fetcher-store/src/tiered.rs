//! Memory tier in front of the disk tier.

use std::path::PathBuf;

use async_trait::async_trait;

use fetcher_core::{
    Artifact, CacheError, CacheKey, CacheStorePort, ConfigError, FetcherConfig, PersistenceTier,
};

use crate::{DiskCacheStore, MemoryCacheStore};

/// Two-tier store.
///
/// - `get` answers from memory first; disk hits are promoted into memory and
///   reported with disk provenance.
/// - `put(Memory)` writes memory only; `put(Durable)` writes disk, then memory.
/// - `remove` clears both tiers.
#[derive(Debug)]
pub struct TieredCacheStore {
    memory: MemoryCacheStore,
    disk: DiskCacheStore,
}

impl TieredCacheStore {
    pub const fn new(memory: MemoryCacheStore, disk: DiskCacheStore) -> Self {
        Self { memory, disk }
    }

    /// Unbounded memory tier over a disk tier rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::new(MemoryCacheStore::new(), DiskCacheStore::new(root))
    }

    /// Store rooted at the configured (or platform default) cache directory.
    pub fn from_config(config: &FetcherConfig) -> Result<Self, ConfigError> {
        Ok(Self::open(config.resolved_cache_dir()?))
    }

    pub const fn memory(&self) -> &MemoryCacheStore {
        &self.memory
    }

    pub const fn disk(&self) -> &DiskCacheStore {
        &self.disk
    }
}

#[async_trait]
impl CacheStorePort for TieredCacheStore {
    async fn exists(&self, key: &CacheKey) -> bool {
        self.memory.exists(key).await || self.disk.exists(key).await
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Artifact>, CacheError> {
        if let Some(hit) = self.memory.get(key).await? {
            return Ok(Some(hit));
        }
        let Some(hit) = self.disk.get(key).await? else {
            return Ok(None);
        };
        if let Err(e) = self
            .memory
            .put(hit.clone(), PersistenceTier::Memory)
            .await
        {
            tracing::debug!(
                target: "fetcher.store",
                key = %key,
                error = %e,
                "Disk hit not promoted"
            );
        }
        Ok(Some(hit))
    }

    async fn put(&self, artifact: Artifact, tier: PersistenceTier) -> Result<(), CacheError> {
        if tier == PersistenceTier::Durable {
            self.disk.put(artifact.clone(), tier).await?;
            if let Err(e) = self.memory.put(artifact, PersistenceTier::Memory).await {
                tracing::debug!(
                    target: "fetcher.store",
                    error = %e,
                    "Durable artifact not kept in memory"
                );
            }
            return Ok(());
        }
        self.memory.put(artifact, tier).await
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.memory.remove(key).await?;
        self.disk.remove(key).await
    }
}
