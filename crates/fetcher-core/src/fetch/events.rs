//! Transfer events - discriminated union for diagnostic state changes.
//!
//! These are emitted for observers that list transfers (dashboards, debug
//! panes). Callers of `fetch` are notified through their own listener
//! instead; nothing here is needed to receive a result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::progress::Progress;
use super::types::{ItemMetadata, PersistenceTier, ResourceFormat, SessionClass, TransferKind};

/// A summary of an in-flight transfer (for listings and status queries).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferSummary {
    /// Remote resource URL (the dedup key).
    pub url: Url,
    /// Lease of the current transport operation.
    pub lease: u64,
    pub kind: TransferKind,
    pub session: SessionClass,
    pub format: ResourceFormat,
    /// Tier the artifact will be persisted into.
    pub tier: PersistenceTier,
    /// Current progress (never terminal for an active transfer).
    pub progress: Progress,
    /// Number of callers currently attached.
    pub listeners: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "ItemMetadata::is_empty")]
    pub metadata: ItemMetadata,
}

/// Answer to "where is this resource right now?".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchStatus {
    /// Neither cached nor being fetched.
    Missing,
    /// Present in the cache store.
    Cached,
    /// A transfer is in flight.
    Fetching { transfer: TransferSummary },
}

/// Single discriminated union for all transfer events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferEvent {
    /// A new transport operation was started.
    TransferStarted {
        url: Url,
        kind: TransferKind,
        session: SessionClass,
    },

    /// A caller joined a transfer that was already in flight.
    TransferJoined { url: Url, listeners: u32 },

    /// Rate-limited progress update.
    TransferProgress {
        url: Url,
        /// Progress percentage (0.0 - 100.0).
        percentage: f64,
        paused: bool,
    },

    /// The artifact was validated and persisted.
    TransferCompleted {
        url: Url,
        key: String,
        size: u64,
        listeners: u32,
    },

    /// The transfer failed.
    TransferFailed { url: Url, error: String },

    /// The transfer was cancelled.
    TransferCancelled { url: Url },

    /// The background session finished draining its queued work.
    BackgroundDrained,
}

impl TransferEvent {
    pub const fn started(url: Url, kind: TransferKind, session: SessionClass) -> Self {
        Self::TransferStarted { url, kind, session }
    }

    /// Progress event from a fraction in `[0.0, 1.0]`.
    pub fn progress(url: Url, fraction: f64, paused: bool) -> Self {
        Self::TransferProgress {
            url,
            percentage: fraction * 100.0,
            paused,
        }
    }

    pub fn failed(url: Url, error: impl Into<String>) -> Self {
        Self::TransferFailed {
            url,
            error: error.into(),
        }
    }

    pub const fn cancelled(url: Url) -> Self {
        Self::TransferCancelled { url }
    }

    /// Event for a transfer that reached `progress`; `None` unless it is
    /// terminal.
    pub fn concluded(url: Url, progress: &Progress, listeners: u32) -> Option<Self> {
        match progress {
            Progress::Finished { artifact } => Some(Self::TransferCompleted {
                url,
                key: artifact.key().to_string(),
                size: artifact.size(),
                listeners,
            }),
            Progress::Failed { error } => Some(Self::failed(url, error.to_string())),
            Progress::Cancelled => Some(Self::cancelled(url)),
            _ => None,
        }
    }

    /// Get the URL from any event type.
    #[must_use]
    pub const fn url(&self) -> Option<&Url> {
        match self {
            Self::BackgroundDrained => None,
            Self::TransferStarted { url, .. }
            | Self::TransferJoined { url, .. }
            | Self::TransferProgress { url, .. }
            | Self::TransferCompleted { url, .. }
            | Self::TransferFailed { url, .. }
            | Self::TransferCancelled { url } => Some(url),
        }
    }

    /// Get the event name for wire protocols.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::TransferStarted { .. } => "transfer:started",
            Self::TransferJoined { .. } => "transfer:joined",
            Self::TransferProgress { .. } => "transfer:progress",
            Self::TransferCompleted { .. } => "transfer:completed",
            Self::TransferFailed { .. } => "transfer:failed",
            Self::TransferCancelled { .. } => "transfer:cancelled",
            Self::BackgroundDrained => "transfer:background_drained",
        }
    }
}
