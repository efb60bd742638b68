//! Durable on-disk tier.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<format>/<sha256(key name)>.bin    payload
//! <root>/<format>/<sha256(key name)>.json   ArtifactMeta sidecar
//! ```
//!
//! Both files are written to a temporary name and renamed into place. The
//! sidecar is renamed last, so an entry only becomes visible once its payload
//! is complete.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};

use fetcher_core::{
    Artifact, ArtifactMeta, CacheError, CacheKey, CacheStorePort, CacheTier, PersistenceTier,
    Provenance,
};

/// Store backed by a directory tree.
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    root: PathBuf,
}

struct EntryPaths {
    payload: PathBuf,
    meta: PathBuf,
}

impl DiskCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the payload for `key` lives (whether or not it exists).
    pub fn payload_path(&self, key: &CacheKey) -> PathBuf {
        self.paths(key).payload
    }

    fn paths(&self, key: &CacheKey) -> EntryPaths {
        let digest = Sha256::digest(key.name().as_bytes());
        let stem = format!("{digest:x}");
        let dir = self.root.join(key.format().as_str());
        EntryPaths {
            payload: dir.join(format!("{stem}.bin")),
            meta: dir.join(format!("{stem}.json")),
        }
    }

    async fn read_meta(path: &Path) -> Result<Option<ArtifactMeta>, CacheError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::from_io_error(&e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| CacheError::serialization(format!("{}: {e}", path.display())))
    }

    async fn write_entry(
        &self,
        paths: &EntryPaths,
        payload: &Bytes,
        meta: &ArtifactMeta,
    ) -> Result<(), CacheError> {
        if let Some(dir) = paths.payload.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| CacheError::from_io_error(&e))?;
        }
        let sidecar =
            serde_json::to_vec_pretty(meta).map_err(|e| CacheError::serialization(e.to_string()))?;

        write_atomic(&paths.payload, payload).await?;
        write_atomic(&paths.meta, &sidecar).await
    }
}

/// Write `contents` to a sibling temporary file, then rename it over `path`.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    let written = match tokio::fs::write(&tmp, contents).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        remove_if_present(&tmp).await;
        return Err(CacheError::from_io_error(&e));
    }
    Ok(())
}

async fn remove_if_present(path: &Path) -> Option<std::io::Error> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => None,
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => Some(e),
    }
}

#[async_trait]
impl CacheStorePort for DiskCacheStore {
    async fn exists(&self, key: &CacheKey) -> bool {
        tokio::fs::try_exists(self.paths(key).meta)
            .await
            .unwrap_or(false)
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Artifact>, CacheError> {
        let paths = self.paths(key);
        let Some(meta) = Self::read_meta(&paths.meta).await? else {
            return Ok(None);
        };
        if &meta.key != key {
            // Digest collision or a foreign file; treat as a miss.
            tracing::warn!(
                target: "fetcher.store",
                key = %key,
                found = %meta.key,
                "Sidecar does not match requested key"
            );
            return Ok(None);
        }

        let payload = match tokio::fs::read(&paths.payload).await {
            Ok(payload) => Bytes::from(payload),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    target: "fetcher.store",
                    key = %key,
                    "Sidecar without payload, dropping entry"
                );
                remove_if_present(&paths.meta).await;
                return Ok(None);
            }
            Err(e) => return Err(CacheError::from_io_error(&e)),
        };

        Ok(Some(Artifact::new(
            meta,
            payload,
            Provenance::Cache {
                tier: CacheTier::Disk,
            },
        )))
    }

    /// Every entry is durable; the requested tier is not consulted.
    async fn put(&self, artifact: Artifact, _tier: PersistenceTier) -> Result<(), CacheError> {
        let paths = self.paths(artifact.key());
        let meta = artifact.meta.clone().with_local_path(paths.payload.clone());

        if let Err(error) = self.write_entry(&paths, &artifact.payload, &meta).await {
            tracing::warn!(
                target: "fetcher.store",
                key = %artifact.key(),
                error = %error,
                "Disk write failed, removing partial entry"
            );
            remove_if_present(&paths.meta).await;
            remove_if_present(&paths.payload).await;
            return Err(error);
        }

        tracing::debug!(
            target: "fetcher.store",
            key = %artifact.key(),
            size = artifact.size(),
            path = %paths.payload.display(),
            "Stored artifact on disk"
        );
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        let paths = self.paths(key);
        // Sidecar first so a half-removed entry is never visible.
        if let Some(e) = remove_if_present(&paths.meta).await {
            return Err(CacheError::from_io_error(&e));
        }
        if let Some(e) = remove_if_present(&paths.payload).await {
            return Err(CacheError::from_io_error(&e));
        }
        Ok(())
    }
}
