//! One logical in-flight transfer and the callers attached to it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use url::Url;

use fetcher_core::{
    CacheKey, CorrelationToken, FetchListener, ItemMetadata, PersistenceTier, Progress,
    RequestId, ResourceFormat, SessionClass, TransferEvent, TransferKind, TransferSummary,
    TransportHandle,
};

use super::count_u32;
use crate::progress::ProgressThrottle;

/// What a caller asks for when it is admitted.
///
/// Several callers may describe the same URL differently; see
/// [`Transfer::merge_plan`] for how their settings are combined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferPlan {
    pub url: Url,
    pub kind: TransferKind,
    pub format: ResourceFormat,
    pub tier: PersistenceTier,
    pub session: SessionClass,
    pub metadata: ItemMetadata,
}

impl TransferPlan {
    pub fn download(url: Url, format: ResourceFormat) -> Self {
        Self {
            url,
            kind: TransferKind::Download,
            format,
            tier: PersistenceTier::default(),
            session: SessionClass::default(),
            metadata: ItemMetadata::default(),
        }
    }

    #[must_use]
    pub const fn with_kind(mut self, kind: TransferKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub const fn with_tier(mut self, tier: PersistenceTier) -> Self {
        self.tier = tier;
        self
    }

    #[must_use]
    pub const fn with_session(mut self, session: SessionClass) -> Self {
        self.session = session;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: ItemMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::for_url(self.format, &self.url)
    }
}

/// Everything the completion pipeline needs, snapshotted when the transport
/// reports that all bytes arrived.
///
/// `tier` is only the starting point: callers may still join while the
/// artifact is written, see [`TransferRegistry::finish_persisted`].
///
/// [`TransferRegistry::finish_persisted`]: super::TransferRegistry::finish_persisted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionJob {
    pub request: RequestId,
    pub kind: TransferKind,
    pub key: CacheKey,
    pub format: ResourceFormat,
    pub tier: PersistenceTier,
    pub metadata: ItemMetadata,
}

/// A transfer owned by the registry while in flight.
pub struct Transfer {
    pub(super) request: RequestId,
    pub(super) kind: TransferKind,
    pub(super) session: SessionClass,
    pub(super) key: CacheKey,
    pub(super) format: ResourceFormat,
    pub(super) tier: PersistenceTier,
    pub(super) metadata: ItemMetadata,
    pub(super) progress: Progress,
    pub(super) created_at: DateTime<Utc>,
    /// Attached callers in attach order.
    pub(super) listeners: IndexMap<CorrelationToken, Arc<dyn FetchListener>>,
    /// Set once the transport accepted the operation.
    pub(super) handle: Option<TransportHandle>,
    /// Payload handed to the completion pipeline; progress and pause no
    /// longer apply.
    pub(super) completing: bool,
    pub(super) throttle: ProgressThrottle,
}

impl Transfer {
    pub(super) fn new(request: RequestId, plan: TransferPlan, progress_interval: Duration) -> Self {
        Self {
            key: plan.cache_key(),
            request,
            kind: plan.kind,
            session: plan.session,
            format: plan.format,
            tier: plan.tier,
            metadata: plan.metadata,
            progress: Progress::Loading,
            created_at: Utc::now(),
            listeners: IndexMap::new(),
            handle: None,
            completing: false,
            throttle: ProgressThrottle::new(progress_interval),
        }
    }

    /// Fold a joining caller's plan into this transfer.
    ///
    /// - persistence tier: the most durable request wins
    /// - session class: fixed by the first admission, which started the
    ///   transport
    /// - metadata: fields already present are kept, missing ones are filled
    pub(super) fn merge_plan(&mut self, plan: &TransferPlan) {
        self.tier = self.tier.most_durable(plan.tier);
        self.metadata.fill_missing(&plan.metadata);
    }

    /// Transport handle and session when the operation can still be signalled.
    pub(super) fn running_handle(&self) -> Option<(SessionClass, TransportHandle)> {
        self.handle.clone().map(|handle| (self.session, handle))
    }

    pub(super) fn completion_job(&self) -> CompletionJob {
        CompletionJob {
            request: self.request.clone(),
            kind: self.kind,
            key: self.key.clone(),
            format: self.format,
            tier: self.tier,
            metadata: self.metadata.clone(),
        }
    }

    /// Take the terminal transition and describe it for observers.
    ///
    /// Returns `None` when the transfer already concluded.
    pub(super) fn conclude(&mut self, outcome: Progress) -> Option<TransferEvent> {
        self.progress = self.progress.terminate(outcome)?;
        TransferEvent::concluded(
            self.request.url().clone(),
            &self.progress,
            count_u32(self.listeners.len()),
        )
    }

    pub fn summary(&self) -> TransferSummary {
        TransferSummary {
            url: self.request.url().clone(),
            lease: self.request.lease().get(),
            kind: self.kind,
            session: self.session,
            format: self.format,
            tier: self.tier,
            progress: self.progress.clone(),
            listeners: count_u32(self.listeners.len()),
            created_at: self.created_at,
            metadata: self.metadata.clone(),
        }
    }
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("request", &self.request)
            .field("kind", &self.kind)
            .field("progress", &self.progress.name())
            .field("listeners", &self.listeners.len())
            .field("completing", &self.completing)
            .finish_non_exhaustive()
    }
}
