//! Artifacts produced by the completion pipeline or served from the cache.

use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::types::{CacheKey, CorrelationToken, ItemMetadata, Provenance, ResourceFormat};

/// Descriptive metadata persisted alongside an artifact's payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Storage key.
    pub key: CacheKey,
    /// Where the payload was fetched from.
    pub remote_url: Url,
    /// Where the store keeps the payload, when it lives on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// Payload size in bytes.
    pub size: u64,
    /// Declared payload kind.
    pub format: ResourceFormat,
    /// File extension taken from the remote URL path, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Caller-supplied domain metadata.
    #[serde(default, skip_serializing_if = "ItemMetadata::is_empty")]
    pub metadata: ItemMetadata,
    /// When the payload was received.
    pub fetched_at: DateTime<Utc>,
}

impl ArtifactMeta {
    /// Describe a freshly received payload.
    pub fn describe(
        key: CacheKey,
        remote_url: Url,
        format: ResourceFormat,
        size: u64,
        metadata: ItemMetadata,
    ) -> Self {
        let extension = url_extension(&remote_url);
        Self {
            key,
            remote_url,
            local_path: None,
            size,
            format,
            extension,
            metadata,
            fetched_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_local_path(mut self, path: PathBuf) -> Self {
        self.local_path = Some(path);
        self
    }
}

fn url_extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (stem, ext) = last.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// A validated payload plus its metadata.
///
/// The payload is reference-counted, so fanning one artifact out to many
/// listeners does not copy the bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub meta: ArtifactMeta,
    pub payload: Bytes,
    pub provenance: Provenance,
}

impl Artifact {
    pub const fn new(meta: ArtifactMeta, payload: Bytes, provenance: Provenance) -> Self {
        Self {
            meta,
            payload,
            provenance,
        }
    }

    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.meta.key
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.meta.size
    }

    #[must_use]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }
}

/// Successful terminal result delivered to one caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutput {
    pub token: CorrelationToken,
    pub artifact: Artifact,
}

impl FetchOutput {
    pub const fn new(token: CorrelationToken, artifact: Artifact) -> Self {
        Self { token, artifact }
    }

    #[must_use]
    pub const fn provenance(&self) -> Provenance {
        self.artifact.provenance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_extension_from_url() {
        assert_eq!(url_extension(&url("https://x/y.BIN")), Some("bin".into()));
        assert_eq!(url_extension(&url("https://x/a/b.tar.gz")), Some("gz".into()));
        assert_eq!(url_extension(&url("https://x/")), None);
        assert_eq!(url_extension(&url("https://x/.hidden")), None);
        assert_eq!(url_extension(&url("https://x/noext")), None);
    }

    #[test]
    fn test_describe_fills_size_and_extension() {
        let remote = url("https://x/cover.png");
        let meta = ArtifactMeta::describe(
            CacheKey::for_url(ResourceFormat::Image, &remote),
            remote,
            ResourceFormat::Image,
            42,
            ItemMetadata::new().with_title("Cover"),
        );

        assert_eq!(meta.size, 42);
        assert_eq!(meta.extension.as_deref(), Some("png"));
        assert_eq!(meta.metadata.title.as_deref(), Some("Cover"));
        assert!(meta.local_path.is_none());
    }
}
