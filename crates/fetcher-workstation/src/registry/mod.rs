//! Transfer registry.
//!
//! The registry is the only shared mutable state in the workstation. It maps
//! each remote URL to at most one in-flight [`Transfer`], tracks which
//! correlation token is attached where, and performs every progress
//! transition together with its fan-out while holding a single lock.
//!
//! # Concurrency Model
//!
//! - One `std::sync::Mutex` guards the whole state; no method awaits or calls
//!   into a transport while holding it
//! - Fan-out is enqueued on the [`Dispatcher`] under the lock, so every
//!   listener observes a transfer's transitions in the same order
//! - Every transfer carries a fresh lease; transport callbacks naming another
//!   lease (or an evicted URL) are ignored
//! - The API is total: lock poisoning is recovered, misses return
//!   `None`/`false`

mod transfer;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use url::Url;

use fetcher_core::{
    Artifact, CorrelationToken, FetchError, FetchListener, FetchOutput, LeaseId, PersistenceTier,
    Progress, RequestId, SessionClass, TransferEvent, TransferEventEmitterPort, TransferKind,
    TransferSummary, TransportHandle,
};

use crate::dispatch::Dispatcher;

pub use transfer::{CompletionJob, Transfer, TransferPlan};

/// A caller registered with the registry whose cache lookup has not
/// resolved yet.
struct Pending {
    url: Url,
    listener: Arc<dyn FetchListener>,
}

#[derive(Default)]
struct RegistryState {
    /// In-flight transfers keyed by remote URL (the dedup key).
    transfers: HashMap<Url, Transfer>,
    /// Which URL each attached token is waiting on.
    tokens: HashMap<CorrelationToken, Url>,
    /// Tokens still resolving from the cache.
    pending: HashMap<CorrelationToken, Pending>,
    /// Counter for generating lease IDs.
    next_lease: u64,
    /// Set by `shutdown`; no further callers are accepted.
    closed: bool,
}

impl RegistryState {
    /// Transfer for `request`, only if its lease is current.
    fn current(&mut self, request: &RequestId) -> Option<&mut Transfer> {
        self.transfers
            .get_mut(request.url())
            .filter(|transfer| transfer.request.lease() == request.lease())
    }

    /// Remove a transfer together with its token index entries.
    fn evict(&mut self, url: &Url) -> Option<Transfer> {
        let transfer = self.transfers.remove(url)?;
        for token in transfer.listeners.keys() {
            self.tokens.remove(token);
        }
        Some(transfer)
    }
}

/// Outcome of [`TransferRegistry::admit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    /// A new transfer was created; the caller must start the transport
    /// operation for this request.
    Started(RequestId),
    /// The caller joined a transfer that was already in flight.
    Joined { listeners: usize },
    /// The caller detached before it could be admitted.
    Detached,
    /// The caller was refused; its listener has already been resolved.
    Rejected,
}

/// A transfer removed from the registry before it finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evicted {
    pub request: RequestId,
    /// Transport operation to cancel, if one was accepted.
    pub running: Option<(SessionClass, TransportHandle)>,
}

/// Outcome of [`TransferRegistry::cancel_listener`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Detached {
    /// Set when the detached caller was the last one and the transfer was
    /// cancelled with it.
    pub evicted: Option<Evicted>,
}

/// What the facade must tell the transport after a toggle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Toggle {
    Pause(SessionClass, TransportHandle),
    Resume {
        session: SessionClass,
        handle: TransportHandle,
        request: RequestId,
    },
    Ignored,
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Thread-safe registry of in-flight transfers.
pub struct TransferRegistry {
    state: Mutex<RegistryState>,
    dispatcher: Dispatcher,
    emitter: Arc<dyn TransferEventEmitterPort>,
    progress_interval: Duration,
}

impl TransferRegistry {
    pub fn new(
        dispatcher: Dispatcher,
        emitter: Arc<dyn TransferEventEmitterPort>,
        progress_interval: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            dispatcher,
            emitter,
            progress_interval,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Register a caller before its cache lookup.
    ///
    /// Returns `false` (after resolving the listener) if the token is
    /// already in use or the registry has shut down.
    pub fn register(
        &self,
        token: CorrelationToken,
        url: Url,
        listener: Arc<dyn FetchListener>,
    ) -> bool {
        let mut state = self.lock();
        if state.closed {
            self.dispatcher.complete(listener, Err(FetchError::Cancelled));
            return false;
        }
        if state.pending.contains_key(&token) || state.tokens.contains_key(&token) {
            tracing::warn!(
                target: "fetcher.workstation",
                token = %token,
                url = %url,
                "Rejected fetch with a correlation token already in use"
            );
            self.dispatcher.complete(
                listener,
                Err(FetchError::explicit(format!(
                    "correlation token {token} is already in use"
                ))),
            );
            return false;
        }
        state.pending.insert(token, Pending { url, listener });
        true
    }

    /// Resolve a registered caller without a transfer (cache hit, cache-only
    /// miss, lookup error).
    ///
    /// Returns `false` when the caller detached meanwhile; the result is then
    /// stale and dropped.
    pub fn resolve(&self, token: CorrelationToken, result: Result<Artifact, FetchError>) -> bool {
        let mut state = self.lock();
        let Some(pending) = state.pending.remove(&token) else {
            tracing::debug!(
                target: "fetcher.workstation",
                token = %token,
                error = %FetchError::StaleResult,
                "Suppressed result for detached caller"
            );
            return false;
        };
        tracing::debug!(
            target: "fetcher.workstation",
            token = %token,
            url = %pending.url,
            ok = result.is_ok(),
            "Resolved without transfer"
        );
        self.dispatcher.complete(
            pending.listener,
            result.map(|artifact| FetchOutput::new(token, artifact)),
        );
        true
    }

    /// Attach a registered caller to the transfer for `plan.url`.
    ///
    /// Creates the transfer (returning [`Admission::Started`]) only if none is
    /// in flight; otherwise joins the existing one and folds `plan` into it.
    /// Either way the caller's listener first receives the transfer's current
    /// progress.
    pub fn admit(&self, token: CorrelationToken, plan: TransferPlan) -> Admission {
        let mut guard = self.lock();
        let state = &mut *guard;

        let Some(Pending { listener, .. }) = state.pending.remove(&token) else {
            tracing::debug!(
                target: "fetcher.workstation",
                token = %token,
                url = %plan.url,
                "Caller detached before admission"
            );
            return Admission::Detached;
        };

        if let Some(transfer) = state.transfers.get_mut(&plan.url) {
            if transfer.kind != plan.kind {
                self.dispatcher.complete(
                    listener,
                    Err(FetchError::explicit(format!(
                        "{} already in flight for {}",
                        transfer.kind, plan.url
                    ))),
                );
                return Admission::Rejected;
            }

            transfer.merge_plan(&plan);
            self.dispatcher.progress(&listener, transfer.progress.clone());
            transfer.listeners.insert(token, listener);
            state.tokens.insert(token, plan.url.clone());

            let listeners = transfer.listeners.len();
            tracing::debug!(
                target: "fetcher.workstation",
                token = %token,
                url = %plan.url,
                listeners,
                "Joined in-flight transfer"
            );
            self.emitter.emit(TransferEvent::TransferJoined {
                url: plan.url,
                listeners: count_u32(listeners),
            });
            return Admission::Joined { listeners };
        }

        state.next_lease += 1;
        let request = RequestId::new(plan.url.clone(), LeaseId::new(state.next_lease));
        let url = plan.url.clone();
        let (kind, session) = (plan.kind, plan.session);

        let mut transfer = Transfer::new(request.clone(), plan, self.progress_interval);
        self.dispatcher.progress(&listener, Progress::Loading);
        transfer.listeners.insert(token, listener);
        state.tokens.insert(token, url.clone());
        state.transfers.insert(url.clone(), transfer);

        tracing::info!(
            target: "fetcher.workstation",
            token = %token,
            url = %url,
            lease = %request.lease(),
            kind = %kind,
            session = %session,
            "Transfer admitted"
        );
        self.emitter.emit(TransferEvent::started(url, kind, session));
        Admission::Started(request)
    }

    // =========================================================================
    // Transport-driven transitions
    // =========================================================================

    /// Fan `next` out to every attached listener and make it current.
    fn publish(&self, transfer: &mut Transfer, next: Progress) {
        for listener in transfer.listeners.values() {
            self.dispatcher.progress(listener, next.clone());
        }
        if let Some(fraction) = next.fraction() {
            let paused = next.is_paused();
            if paused {
                transfer.throttle.reset();
            }
            if paused || transfer.throttle.admit(fraction) {
                self.emitter.emit(TransferEvent::progress(
                    transfer.request.url().clone(),
                    fraction,
                    paused,
                ));
            }
        }
        transfer.progress = next;
    }

    /// Record the transport handle once the operation was accepted
    /// (`loading → downloading(0.0)`).
    ///
    /// Returns `false` if the transfer is gone; the caller must then cancel
    /// the handle.
    pub fn attach_handle(&self, request: &RequestId, handle: TransportHandle) -> bool {
        let mut state = self.lock();
        let Some(transfer) = state.current(request) else {
            tracing::debug!(
                target: "fetcher.workstation",
                request = %request,
                "Transport accepted a transfer that is no longer registered"
            );
            return false;
        };
        transfer.handle = Some(handle);
        if let Some(next) = transfer.progress.accept(transfer.kind) {
            self.publish(transfer, next);
        }
        true
    }

    /// Byte-level progress. Lower fractions, stale leases and reports for the
    /// other direction are ignored.
    pub fn report(&self, request: &RequestId, kind: TransferKind, fraction: f64) -> bool {
        let mut state = self.lock();
        let Some(transfer) = state.current(request) else {
            tracing::trace!(
                target: "fetcher.workstation",
                request = %request,
                "Ignored progress for unknown transfer"
            );
            return false;
        };
        if transfer.completing || transfer.kind != kind {
            return false;
        }
        match transfer.progress.report(kind, fraction) {
            Some(next) => {
                self.publish(transfer, next);
                true
            }
            None => false,
        }
    }

    /// The transport resumed at `fraction` (or at the paused fraction when
    /// the transport does not know).
    pub fn resumed(&self, request: &RequestId, fraction: Option<f64>) -> bool {
        let mut state = self.lock();
        let Some(transfer) = state.current(request) else {
            return false;
        };
        if transfer.completing {
            return false;
        }
        let fraction = fraction
            .or_else(|| transfer.progress.fraction())
            .unwrap_or(0.0);
        match transfer.progress.resume(transfer.kind, fraction) {
            Some(next) => {
                tracing::debug!(
                    target: "fetcher.workstation",
                    request = %request,
                    fraction,
                    "Transfer resumed"
                );
                self.publish(transfer, next);
                true
            }
            None => false,
        }
    }

    /// Pause a running transfer, or report that a paused one should resume.
    pub fn toggle(&self, token: CorrelationToken) -> Toggle {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(transfer) = state
            .tokens
            .get(&token)
            .and_then(|url| state.transfers.get_mut(url))
        else {
            return Toggle::Ignored;
        };
        if transfer.completing {
            return Toggle::Ignored;
        }
        let Some((session, handle)) = transfer.running_handle() else {
            return Toggle::Ignored;
        };

        if transfer.progress.is_paused() {
            return Toggle::Resume {
                session,
                handle,
                request: transfer.request.clone(),
            };
        }
        match transfer.progress.pause() {
            Some(next) => {
                tracing::debug!(
                    target: "fetcher.workstation",
                    token = %token,
                    request = %transfer.request,
                    "Transfer paused"
                );
                self.publish(transfer, next);
                Toggle::Pause(session, handle)
            }
            None => Toggle::Ignored,
        }
    }

    /// Hand a fully received transfer to the completion pipeline.
    ///
    /// Returns `None` for stale leases and duplicate completion callbacks.
    pub fn begin_completion(&self, request: &RequestId) -> Option<CompletionJob> {
        let mut state = self.lock();
        let transfer = state.current(request)?;
        if transfer.completing {
            return None;
        }
        transfer.completing = true;
        Some(transfer.completion_job())
    }

    /// Transport-level failure. Ignored once the completion pipeline owns the
    /// outcome.
    pub fn fail_transport(&self, request: &RequestId, error: FetchError) -> bool {
        let mut state = self.lock();
        match state.current(request) {
            Some(transfer) if !transfer.completing => {}
            _ => return false,
        }
        self.finish_locked(&mut state, request, Err(error))
    }

    /// Terminal transition: fan the result out to the listeners attached at
    /// this moment, then evict. Later callers start a fresh transfer.
    pub fn finish(&self, request: &RequestId, result: Result<Artifact, FetchError>) -> bool {
        let mut state = self.lock();
        self.finish_locked(&mut state, request, result)
    }

    /// Finish a transfer whose artifact was persisted into `tier`.
    ///
    /// A caller that joined during persistence may have asked for a more
    /// durable tier. The transfer then stays in flight and that tier is
    /// returned so the artifact can be written again; otherwise the result is
    /// fanned out as by [`finish`](Self::finish) and `None` is returned.
    pub fn finish_persisted(
        &self,
        request: &RequestId,
        tier: PersistenceTier,
        artifact: Artifact,
    ) -> Option<PersistenceTier> {
        let mut state = self.lock();
        if let Some(transfer) = state.current(request) {
            if transfer.tier > tier {
                tracing::debug!(
                    target: "fetcher.workstation",
                    request = %request,
                    persisted = %tier,
                    requested = %transfer.tier,
                    "Tier raised while persisting"
                );
                return Some(transfer.tier);
            }
        }
        self.finish_locked(&mut state, request, Ok(artifact));
        None
    }

    fn finish_locked(
        &self,
        state: &mut RegistryState,
        request: &RequestId,
        result: Result<Artifact, FetchError>,
    ) -> bool {
        if state.current(request).is_none() {
            tracing::debug!(
                target: "fetcher.workstation",
                request = %request,
                "Ignored result for evicted transfer"
            );
            return false;
        }
        let Some(mut transfer) = state.evict(request.url()) else {
            return false;
        };
        let url = request.url().clone();
        let listeners = transfer.listeners.len();

        match result {
            Ok(artifact) => {
                tracing::info!(
                    target: "fetcher.workstation",
                    url = %url,
                    key = %artifact.key(),
                    size = artifact.size(),
                    listeners,
                    "Transfer finished"
                );
                if let Some(event) = transfer.conclude(Progress::Finished {
                    artifact: Box::new(artifact.clone()),
                }) {
                    self.emitter.emit(event);
                }
                for (token, listener) in transfer.listeners {
                    self.dispatcher
                        .complete(listener, Ok(FetchOutput::new(token, artifact.clone())));
                }
            }
            Err(error) => {
                tracing::warn!(
                    target: "fetcher.workstation",
                    url = %url,
                    error = %error,
                    listeners,
                    "Transfer failed"
                );
                if let Some(event) = transfer.conclude(Progress::Failed {
                    error: error.clone(),
                }) {
                    self.emitter.emit(event);
                }
                for listener in transfer.listeners.into_values() {
                    self.dispatcher.complete(listener, Err(error.clone()));
                }
            }
        }
        true
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    fn cancel_transfer(&self, mut transfer: Transfer) -> Evicted {
        let running = transfer.running_handle();
        tracing::info!(
            target: "fetcher.workstation",
            request = %transfer.request,
            listeners = transfer.listeners.len(),
            "Transfer cancelled"
        );
        if let Some(event) = transfer.conclude(Progress::Cancelled) {
            self.emitter.emit(event);
        }
        for listener in transfer.listeners.into_values() {
            self.dispatcher.complete(listener, Err(FetchError::Cancelled));
        }
        Evicted {
            request: transfer.request,
            running,
        }
    }

    /// Detach one caller, resolving it as cancelled. Other callers of the same
    /// transfer are unaffected.
    ///
    /// When it was the last caller and `cancel_when_unobserved` is set, the
    /// transfer is cancelled and evicted too.
    pub fn cancel_listener(
        &self,
        token: CorrelationToken,
        cancel_when_unobserved: bool,
    ) -> Option<Detached> {
        let mut guard = self.lock();
        let state = &mut *guard;

        if let Some(pending) = state.pending.remove(&token) {
            tracing::debug!(
                target: "fetcher.workstation",
                token = %token,
                url = %pending.url,
                "Caller detached during cache lookup"
            );
            self.dispatcher
                .complete(pending.listener, Err(FetchError::Cancelled));
            return Some(Detached { evicted: None });
        }

        let url = state.tokens.remove(&token)?;
        let transfer = state.transfers.get_mut(&url)?;
        let listener = transfer.listeners.shift_remove(&token)?;
        self.dispatcher.complete(listener, Err(FetchError::Cancelled));
        tracing::debug!(
            target: "fetcher.workstation",
            token = %token,
            url = %url,
            remaining = transfer.listeners.len(),
            "Caller detached"
        );

        if transfer.listeners.is_empty() && cancel_when_unobserved {
            let evicted = state
                .evict(&url)
                .map(|transfer| self.cancel_transfer(transfer));
            return Some(Detached { evicted });
        }
        Some(Detached { evicted: None })
    }

    /// Remove the transfer for `url`, resolving every attached caller as
    /// cancelled. Idempotent: a second call returns `None`.
    pub fn evict(&self, url: &Url) -> Option<Evicted> {
        let mut state = self.lock();
        let transfer = state.evict(url)?;
        Some(self.cancel_transfer(transfer))
    }

    /// Stop accepting callers and cancel everything in flight.
    pub fn shutdown(&self) -> Vec<Evicted> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.closed = true;

        for (_, pending) in state.pending.drain() {
            self.dispatcher
                .complete(pending.listener, Err(FetchError::Cancelled));
        }
        state.tokens.clear();
        state
            .transfers
            .drain()
            .map(|(_, transfer)| self.cancel_transfer(transfer))
            .collect()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Tokens attached to the transfer for `url`, in attach order.
    pub fn listeners(&self, url: &Url) -> Vec<CorrelationToken> {
        self.lock()
            .transfers
            .get(url)
            .map(|transfer| transfer.listeners.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn summary(&self, url: &Url) -> Option<TransferSummary> {
        self.lock().transfers.get(url).map(Transfer::summary)
    }

    /// Summaries of every in-flight transfer, oldest first.
    pub fn summaries(&self) -> Vec<TransferSummary> {
        let mut summaries: Vec<_> = self
            .lock()
            .transfers
            .values()
            .map(Transfer::summary)
            .collect();
        summaries.sort_by_key(|summary| (summary.created_at, summary.lease));
        summaries
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.lock().transfers.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.lock().transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl std::fmt::Debug for TransferRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("TransferRegistry")
            .field("transfers", &state.transfers.len())
            .field("pending", &state.pending.len())
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}
