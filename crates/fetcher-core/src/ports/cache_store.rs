//! Cache store port definition.
//!
//! The fetch core consumes the cache as a key/value-with-metadata store. It is
//! agnostic to the store's physical layout; adapters live in `fetcher-store`.
//!
//! # Contract
//!
//! - `get` returns artifacts with `Provenance::Cache { tier }` set.
//! - `put` is all-or-nothing: on error no partial artifact may remain under
//!   the key.
//! - `remove` of a missing key is not an error.

use async_trait::async_trait;

use crate::fetch::{Artifact, CacheError, CacheKey, PersistenceTier};

/// Port for the cache store.
#[async_trait]
pub trait CacheStorePort: Send + Sync {
    /// Whether an artifact is stored under `key`.
    async fn exists(&self, key: &CacheKey) -> bool;

    /// Look up an artifact. `Ok(None)` is a miss.
    async fn get(&self, key: &CacheKey) -> Result<Option<Artifact>, CacheError>;

    /// Persist an artifact into the given tier.
    async fn put(&self, artifact: Artifact, tier: PersistenceTier) -> Result<(), CacheError>;

    /// Drop whatever is stored under `key`.
    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError>;
}
