//! Completion pipeline.
//!
//! Turns a fully received payload into a persisted artifact:
//! read (and delete the temporary file) → validate → describe → persist.
//! Cleaning up after a failed write belongs to the store.
//! The terminal transition itself is made by the registry with the result.

use std::sync::Arc;

use bytes::Bytes;

use fetcher_core::{
    Artifact, ArtifactMeta, CacheStorePort, FetchError, PayloadLocation, PayloadValidator,
    PersistenceTier, Provenance, TransportError,
};

use crate::registry::CompletionJob;

/// Read a delivered payload, removing the temporary file whatever happens.
pub async fn read_payload(payload: PayloadLocation) -> Result<Bytes, FetchError> {
    match payload {
        PayloadLocation::Memory(bytes) => Ok(bytes),
        PayloadLocation::File(path) => {
            let read = tokio::fs::read(&path).await;
            discard_payload_file(&path).await;
            read.map(Bytes::from)
                .map_err(|e| TransportError::from_io_error(&e).into())
        }
    }
}

/// Delete a temporary payload file; a file that is already gone is fine.
pub async fn discard_payload_file(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(
                target: "fetcher.workstation",
                path = %path.display(),
                error = %e,
                "Failed to remove temporary payload"
            );
        }
    }
}

/// Validates and persists finished transfers.
pub struct CompletionPipeline {
    cache: Arc<dyn CacheStorePort>,
    validator: Arc<dyn PayloadValidator>,
}

impl CompletionPipeline {
    pub fn new(cache: Arc<dyn CacheStorePort>, validator: Arc<dyn PayloadValidator>) -> Self {
        Self { cache, validator }
    }

    /// Run the pipeline for one transfer, persisting into `tier`.
    ///
    /// A failed write is left to the store to clean up; entries written
    /// earlier under the same key are not touched.
    pub async fn process(
        &self,
        job: &CompletionJob,
        payload: PayloadLocation,
        tier: PersistenceTier,
    ) -> Result<Artifact, FetchError> {
        let bytes = read_payload(payload).await?;

        if let Err(error) = self.validator.validate(job.format, &bytes) {
            tracing::warn!(
                target: "fetcher.workstation",
                request = %job.request,
                format = %job.format,
                size = bytes.len(),
                error = %error,
                "Payload failed validation"
            );
            return Err(error);
        }

        let meta = ArtifactMeta::describe(
            job.key.clone(),
            job.request.url().clone(),
            job.format,
            bytes.len() as u64,
            job.metadata.clone(),
        );
        let artifact = Artifact::new(meta, bytes, Provenance::Network);
        self.persist(&artifact, tier).await?;
        Ok(artifact)
    }

    /// Write an artifact into `tier`. Also used to move an artifact into a
    /// more durable tier requested after the first write.
    pub async fn persist(
        &self,
        artifact: &Artifact,
        tier: PersistenceTier,
    ) -> Result<(), FetchError> {
        if let Err(error) = self.cache.put(artifact.clone(), tier).await {
            tracing::warn!(
                target: "fetcher.workstation",
                key = %artifact.key(),
                tier = %tier,
                error = %error,
                "Failed to persist artifact"
            );
            return Err(error.into());
        }

        tracing::debug!(
            target: "fetcher.workstation",
            key = %artifact.key(),
            tier = %tier,
            size = artifact.size(),
            "Artifact persisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fetcher_core::{
        CacheError, CacheKey, ItemMetadata, LeaseId, RequestId, ResourceFormat,
        SignatureValidator, TransferKind, TransportErrorKind,
    };
    use mockall::mock;
    use mockall::predicate::{always, eq};
    use std::io::Write;
    use url::Url;

    mock! {
        Cache {}

        #[async_trait]
        impl CacheStorePort for Cache {
            async fn exists(&self, key: &CacheKey) -> bool;
            async fn get(&self, key: &CacheKey) -> Result<Option<Artifact>, CacheError>;
            async fn put(&self, artifact: Artifact, tier: PersistenceTier) -> Result<(), CacheError>;
            async fn remove(&self, key: &CacheKey) -> Result<(), CacheError>;
        }
    }

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn job(format: ResourceFormat) -> CompletionJob {
        let url = Url::parse("https://x/cover.png").unwrap();
        CompletionJob {
            request: RequestId::new(url.clone(), LeaseId::new(1)),
            kind: TransferKind::Download,
            key: CacheKey::for_url(format, &url),
            format,
            tier: PersistenceTier::Memory,
            metadata: ItemMetadata::new().with_title("Cover"),
        }
    }

    fn pipeline(cache: MockCache) -> CompletionPipeline {
        CompletionPipeline::new(Arc::new(cache), Arc::new(SignatureValidator::new()))
    }

    #[tokio::test]
    async fn test_persists_valid_payload_into_requested_tier() {
        let mut cache = MockCache::new();
        cache
            .expect_put()
            .withf(|artifact, tier| {
                *tier == PersistenceTier::Memory
                    && artifact.meta.metadata.title.as_deref() == Some("Cover")
                    && artifact.meta.extension.as_deref() == Some("png")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        cache.expect_remove().never();

        let artifact = pipeline(cache)
            .process(
                &job(ResourceFormat::Image),
                PayloadLocation::Memory(Bytes::from_static(PNG)),
                PersistenceTier::Memory,
            )
            .await
            .unwrap();

        assert_eq!(artifact.size(), PNG.len() as u64);
        assert_eq!(artifact.provenance, Provenance::Network);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_not_persisted() {
        let mut cache = MockCache::new();
        cache.expect_put().never();

        let err = pipeline(cache)
            .process(
                &job(ResourceFormat::Image),
                PayloadLocation::Memory(Bytes::from_static(b"<html>not found</html>")),
                PersistenceTier::Memory,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::InvalidPayload { .. }));
    }

    #[tokio::test]
    async fn test_put_failure_leaves_existing_entries_alone() {
        let job = job(ResourceFormat::File);
        let mut cache = MockCache::new();
        cache
            .expect_put()
            .times(1)
            .returning(|_, _| Err(CacheError::InsufficientStorage {
                message: "disk full".into(),
            }));
        cache.expect_remove().never();

        let err = pipeline(cache)
            .process(
                &job,
                PayloadLocation::Memory(Bytes::from_static(b"data")),
                PersistenceTier::Memory,
            )
            .await
            .unwrap_err();

        assert!(err.is_insufficient_storage());
        assert!(matches!(
            err,
            FetchError::Transport {
                kind: TransportErrorKind::InsufficientStorage,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_persists_into_tier_given_by_caller() {
        let mut cache = MockCache::new();
        cache
            .expect_put()
            .with(always(), eq(PersistenceTier::Durable))
            .times(1)
            .returning(|_, _| Ok(()));

        pipeline(cache)
            .process(
                &job(ResourceFormat::File),
                PayloadLocation::Memory(Bytes::from_static(b"data")),
                PersistenceTier::Durable,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_temporary_file_is_removed_after_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.part");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"bytes")
            .unwrap();

        let bytes = read_payload(PayloadLocation::File(path.clone()))
            .await
            .unwrap();

        assert_eq!(bytes, Bytes::from_static(b"bytes"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_temporary_file_is_a_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_payload(PayloadLocation::File(dir.path().join("gone")))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Transport { .. }));
    }
}
