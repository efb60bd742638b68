//! Core domain types for fetches.
//!
//! Pure data types with no I/O dependencies.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use uuid::Uuid;

/// Identifier issued to each logical caller request.
///
/// Generated by the caller and passed into `fetch`/`cancel`/`toggle`. Several
/// tokens may share one transfer; each receives exactly one terminal result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationToken(Uuid);

impl CorrelationToken {
    /// Mint a fresh random token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    #[default]
    Download,
    Upload,
}

impl TransferKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational class of the transport session a transfer runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionClass {
    /// Interactive work the user is waiting on.
    #[default]
    Foreground,
    /// Long-running work that may outlive the foreground.
    Background,
}

impl SessionClass {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Foreground => "foreground",
            Self::Background => "background",
        }
    }
}

impl fmt::Display for SessionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durability classification of the cache store.
///
/// Variants are ordered from least to most durable, so `max` picks the more
/// durable of two tiers.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceTier {
    /// Volatile, in-memory only.
    Memory,
    /// Survives restarts (on disk).
    #[default]
    Durable,
}

impl PersistenceTier {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Durable => "durable",
        }
    }

    /// Parse from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "volatile" => Some(Self::Memory),
            "durable" | "disk" => Some(Self::Durable),
            _ => None,
        }
    }

    /// Tie-break between two requested tiers: the more durable one wins.
    #[must_use]
    pub fn most_durable(self, other: Self) -> Self {
        self.max(other)
    }
}

impl fmt::Display for PersistenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared kind of a payload; drives validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResourceFormat {
    Image,
    Audio,
    Video,
    /// Opaque bytes, never rejected by validation.
    #[default]
    File,
}

impl ResourceFormat {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::File => "file",
        }
    }

    /// Parse from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key under which an artifact lives in the cache store.
///
/// Formatted as `format:name`; the name is usually the absolute remote URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    format: ResourceFormat,
    name: String,
}

impl CacheKey {
    pub fn new(format: ResourceFormat, name: impl Into<String>) -> Self {
        Self {
            format,
            name: name.into(),
        }
    }

    /// Key for a remote resource, named by its absolute URL.
    #[must_use]
    pub fn for_url(format: ResourceFormat, url: &Url) -> Self {
        Self::new(format, url.as_str())
    }

    #[must_use]
    pub const fn format(&self) -> ResourceFormat {
        self.format
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.format, self.name)
    }
}

/// Domain metadata used only to enrich a persisted artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ItemMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Reference to a thumbnail resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Url>,
}

impl ItemMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    #[must_use]
    pub fn with_thumbnail(mut self, thumbnail: Url) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.subtitle.is_none() && self.thumbnail.is_none()
    }

    /// Fill fields that are still missing from `other`; present fields are kept.
    pub fn fill_missing(&mut self, other: &Self) {
        if self.title.is_none() {
            self.title.clone_from(&other.title);
        }
        if self.subtitle.is_none() {
            self.subtitle.clone_from(&other.subtitle);
        }
        if self.thumbnail.is_none() {
            self.thumbnail.clone_from(&other.thumbnail);
        }
    }
}

/// How a fetch consults the cache before touching the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Look up the cache; fetch from the network on a miss.
    #[default]
    CacheFirst,
    /// Only resolve from the cache; a miss is an error.
    CacheOnly,
    /// Skip the lookup and always join or start a transfer.
    NetworkOnly,
}

impl CachePolicy {
    #[must_use]
    pub const fn consults_cache(&self) -> bool {
        matches!(self, Self::CacheFirst | Self::CacheOnly)
    }

    #[must_use]
    pub const fn may_fetch(&self) -> bool {
        matches!(self, Self::CacheFirst | Self::NetworkOnly)
    }
}

/// Physical tier a cache hit was served from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Memory,
    Disk,
}

/// Whether a resolved artifact came from the cache or a fresh network fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    Cache { tier: CacheTier },
    Network,
}

impl Provenance {
    #[must_use]
    pub const fn is_cache(&self) -> bool {
        matches!(self, Self::Cache { .. })
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("NETWORK"),
            Self::Cache {
                tier: CacheTier::Disk,
            } => f.write_str("DISK"),
            Self::Cache {
                tier: CacheTier::Memory,
            } => f.write_str("MEMORY"),
        }
    }
}

/// Lease minted for each admitted transfer.
///
/// A URL that is evicted and admitted again gets a new lease, so callbacks
/// from the previous transport operation can be told apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseId(u64);

impl LeaseId {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity a transport echoes back in every callback.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId {
    url: Url,
    lease: LeaseId,
}

impl RequestId {
    #[must_use]
    pub const fn new(url: Url, lease: LeaseId) -> Self {
        Self { url, lease }
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub const fn lease(&self) -> LeaseId {
        self.lease
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.url, self.lease)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_durable_tier_wins() {
        assert_eq!(
            PersistenceTier::Memory.most_durable(PersistenceTier::Durable),
            PersistenceTier::Durable
        );
        assert_eq!(
            PersistenceTier::Durable.most_durable(PersistenceTier::Memory),
            PersistenceTier::Durable
        );
        assert_eq!(
            PersistenceTier::Memory.most_durable(PersistenceTier::Memory),
            PersistenceTier::Memory
        );
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!(PersistenceTier::parse("Memory"), Some(PersistenceTier::Memory));
        assert_eq!(PersistenceTier::parse(" disk "), Some(PersistenceTier::Durable));
        assert_eq!(PersistenceTier::parse("weekly"), None);
    }

    #[test]
    fn test_cache_key_display() {
        let url = Url::parse("https://x.test/y.bin").unwrap();
        let key = CacheKey::for_url(ResourceFormat::File, &url);
        assert_eq!(key.to_string(), "file:https://x.test/y.bin");
        assert_eq!(key.name(), "https://x.test/y.bin");
    }

    #[test]
    fn test_metadata_fill_missing_keeps_present_fields() {
        let mut first = ItemMetadata::new().with_title("first");
        let second = ItemMetadata::new()
            .with_title("second")
            .with_subtitle("sub");

        first.fill_missing(&second);

        assert_eq!(first.title.as_deref(), Some("first"));
        assert_eq!(first.subtitle.as_deref(), Some("sub"));
        assert!(!first.is_empty());
    }

    #[test]
    fn test_cache_policy_flags() {
        assert!(CachePolicy::CacheFirst.consults_cache());
        assert!(CachePolicy::CacheFirst.may_fetch());
        assert!(!CachePolicy::CacheOnly.may_fetch());
        assert!(!CachePolicy::NetworkOnly.consults_cache());
    }

    #[test]
    fn test_provenance_display() {
        assert_eq!(Provenance::Network.to_string(), "NETWORK");
        assert_eq!(
            Provenance::Cache {
                tier: CacheTier::Memory
            }
            .to_string(),
            "MEMORY"
        );
    }

    #[test]
    fn test_request_id_includes_lease() {
        let url = Url::parse("https://x.test/a").unwrap();
        let a = RequestId::new(url.clone(), LeaseId::new(1));
        let b = RequestId::new(url, LeaseId::new(2));
        assert_ne!(a, b);
        assert_eq!(a.url(), b.url());
    }
}
