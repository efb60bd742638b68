//! Fetch facade.
//!
//! [`Workstation`] is the explicitly constructed, long-lived service that
//! callers use: `fetch`, `upload`, `cancel`, `toggle` and the diagnostic
//! queries. It owns the registry, the session pool, the event router and the
//! sequential dispatcher, and has an explicit `start`/`shutdown` lifecycle.
//!
//! # Flow
//!
//! ```text
//! fetch ─► register token ─► cache lookup ─► hit: resolve(provenance = cache)
//!                                         └► miss: admit ─► started? start transport
//! transport events ─► router ─► registry transitions ─► dispatcher ─► listeners
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use fetcher_core::{
    CacheKey, CachePolicy, CacheStorePort, ChannelListener, CorrelationToken, FetchError,
    FetchListener, FetchOutput, FetchStatus, FetcherConfig, ItemMetadata, PayloadValidator,
    PersistenceTier, ResourceFormat, SessionClass, TransferEventEmitterPort, TransferKind,
    TransferSummary, TransportEvent, TransportEventSender, TransportPort, wait_for_result,
};

use crate::completion::CompletionPipeline;
use crate::dispatch::{DispatchQueue, Dispatcher, run_dispatch_loop};
use crate::registry::{Admission, Detached, Evicted, Toggle, TransferPlan, TransferRegistry};
use crate::router::EventRouter;
use crate::session::SessionPool;

// =============================================================================
// Requests
// =============================================================================

/// One caller's request for a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    pub token: CorrelationToken,
    pub policy: CachePolicy,
    pub format: ResourceFormat,
    /// Tier to persist into; `None` uses the configured default.
    pub tier: Option<PersistenceTier>,
    pub session: SessionClass,
    pub metadata: ItemMetadata,
}

impl FetchRequest {
    pub fn new(url: Url, token: CorrelationToken) -> Self {
        Self {
            url,
            token,
            policy: CachePolicy::default(),
            format: ResourceFormat::default(),
            tier: None,
            session: SessionClass::default(),
            metadata: ItemMetadata::default(),
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn with_format(mut self, format: ResourceFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub const fn with_tier(mut self, tier: PersistenceTier) -> Self {
        self.tier = Some(tier);
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

    fn plan(&self, kind: TransferKind, default_tier: PersistenceTier) -> TransferPlan {
        TransferPlan::download(self.url.clone(), self.format)
            .with_kind(kind)
            .with_tier(self.tier.unwrap_or(default_tier))
            .with_session(self.session)
            .with_metadata(self.metadata.clone())
    }
}

// =============================================================================
// Construction
// =============================================================================

/// Dependencies for creating a workstation.
///
/// This struct bundles all the ports and configuration needed to construct
/// a [`Workstation`].
pub struct WorkstationDeps<C, F, B, E>
where
    C: CacheStorePort + 'static,
    F: TransportPort + 'static,
    B: TransportPort + 'static,
    E: TransferEventEmitterPort + 'static,
{
    /// Cache store consulted before and written after every transfer.
    pub cache: Arc<C>,
    /// Interactive transport session.
    pub foreground: Arc<F>,
    /// Long-running transport session.
    pub background: Arc<B>,
    /// Port for emitting diagnostic transfer events.
    pub event_emitter: Arc<E>,
    /// Payload check run before persisting.
    pub validator: Arc<dyn PayloadValidator>,
    pub config: FetcherConfig,
}

/// Build a workstation from its dependencies.
///
/// The returned workstation is idle until [`Workstation::start`] (or the
/// first `fetch`) runs inside a Tokio runtime. Transports must send their
/// events through the sender passed to each `start_*` call.
pub fn build_workstation<C, F, B, E>(deps: WorkstationDeps<C, F, B, E>) -> Workstation
where
    C: CacheStorePort + 'static,
    F: TransportPort + 'static,
    B: TransportPort + 'static,
    E: TransferEventEmitterPort + 'static,
{
    let WorkstationDeps {
        cache,
        foreground,
        background,
        event_emitter,
        validator,
        config,
    } = deps;

    let cache: Arc<dyn CacheStorePort> = cache;
    let emitter: Arc<dyn TransferEventEmitterPort> = event_emitter;
    let (dispatcher, queue) = Dispatcher::channel();
    let (events, events_rx) = TransportEventSender::channel();

    let registry = Arc::new(TransferRegistry::new(
        dispatcher.clone(),
        Arc::clone(&emitter),
        config.progress_event_interval,
    ));
    let sessions = Arc::new(SessionPool::new(foreground, background, events));
    let pipeline = Arc::new(CompletionPipeline::new(Arc::clone(&cache), validator));
    let workers = Arc::new(Semaphore::new(config.interactive_workers.max(1)));

    let router = EventRouter::new(
        Arc::clone(&registry),
        Arc::clone(&sessions),
        pipeline,
        Arc::clone(&workers),
        dispatcher,
        emitter,
    );

    Workstation {
        inner: Arc::new(Inner {
            registry,
            sessions,
            cache,
            workers,
            config,
            runtime: OnceLock::new(),
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            idle: Mutex::new(Some(Idle {
                router,
                events: events_rx,
                queue,
            })),
            tasks: Mutex::new(Vec::new()),
        }),
    }
}

/// Background parts waiting for `start`.
struct Idle {
    router: EventRouter,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    queue: DispatchQueue,
}

struct Inner {
    registry: Arc<TransferRegistry>,
    sessions: Arc<SessionPool>,
    cache: Arc<dyn CacheStorePort>,
    /// Bounds concurrent cache lookups and completion pipelines.
    workers: Arc<Semaphore>,
    config: FetcherConfig,
    runtime: OnceLock<Handle>,
    /// Whether the router and dispatcher were spawned (never reset).
    started: AtomicBool,
    shutdown: CancellationToken,
    idle: Mutex<Option<Idle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

// =============================================================================
// Facade
// =============================================================================

/// The fetch facade. Cheap to clone; clones share one workstation.
#[derive(Clone)]
pub struct Workstation {
    inner: Arc<Inner>,
}

impl Workstation {
    /// Spawn the event router and the sequential dispatcher.
    ///
    /// Idempotent. The first successful call must happen within a Tokio
    /// runtime, which the workstation then keeps using; afterwards the facade
    /// may be used from any thread. Without a runtime nothing is consumed and
    /// a later call can still start the workstation.
    pub fn start(&self) -> Result<(), FetchError> {
        self.ensure_started().map(drop)
    }

    /// Start if needed and return the runtime the workstation runs on.
    fn ensure_started(&self) -> Result<Handle, FetchError> {
        let runtime = match self.inner.runtime.get() {
            Some(runtime) => runtime.clone(),
            None => {
                let current = Handle::try_current().map_err(|_| {
                    FetchError::explicit("the workstation must be started inside a Tokio runtime")
                })?;
                self.inner.runtime.get_or_init(|| current).clone()
            }
        };

        // The runtime is recorded before `started` flips, so any caller that
        // observes a started workstation can spawn onto it.
        if self
            .inner
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(runtime);
        }
        let Some(idle) = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Ok(runtime);
        };

        let router = runtime.spawn(
            idle.router
                .run(idle.events, self.inner.shutdown.child_token()),
        );
        let dispatch = runtime.spawn(run_dispatch_loop(
            idle.queue,
            self.inner.shutdown.child_token(),
        ));
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([router, dispatch]);

        tracing::info!(
            target: "fetcher.workstation",
            interactive_workers = self.inner.config.interactive_workers,
            default_tier = %self.inner.config.default_tier,
            "Workstation started"
        );
        Ok(runtime)
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Cancel everything in flight and stop the background tasks.
    ///
    /// Every attached caller receives `Cancelled`; later `fetch` calls resolve
    /// to `Cancelled` immediately.
    pub async fn shutdown(&self) {
        let evicted = self.inner.registry.shutdown();
        tracing::info!(
            target: "fetcher.workstation",
            cancelled = evicted.len(),
            "Workstation shutting down"
        );
        for transfer in evicted {
            self.inner.cancel_running(transfer);
        }
        self.inner.workers.close();
        self.inner.shutdown.cancel();

        // Never started: deliver whatever was queued before returning.
        let idle = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(idle) = idle {
            run_dispatch_loop(idle.queue, self.inner.shutdown.clone()).await;
        }

        let tasks: Vec<_> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(target: "fetcher.workstation", error = %e, "Background task failed");
            }
        }
    }

    /// Resolve `request`, notifying `listener` with progress and exactly one
    /// terminal result.
    ///
    /// Returns immediately; all work happens on the workstation's tasks.
    pub fn fetch(&self, request: FetchRequest, listener: impl FetchListener + 'static) {
        self.fetch_shared(request, Arc::new(listener));
    }

    /// [`fetch`](Self::fetch) for an already shared listener.
    pub fn fetch_shared(&self, request: FetchRequest, listener: Arc<dyn FetchListener>) {
        let runtime = match self.ensure_started() {
            Ok(runtime) => runtime,
            Err(error) => {
                refuse(&request, listener.as_ref(), error);
                return;
            }
        };
        let inner = &self.inner;
        if !inner
            .registry
            .register(request.token, request.url.clone(), listener)
        {
            return;
        }

        let plan = request.plan(TransferKind::Download, inner.config.default_tier);
        if !request.policy.consults_cache() {
            inner.admit_and_start(request.token, plan, None);
            return;
        }

        let task = Arc::clone(inner);
        runtime.spawn(async move {
            task.lookup_then_admit(&request, plan).await;
        });
    }

    /// Fetch and wait for the terminal result, ignoring progress.
    pub async fn fetch_and_wait(&self, request: FetchRequest) -> Result<FetchOutput, FetchError> {
        let (listener, mut rx) = ChannelListener::new();
        self.fetch(request, listener);
        wait_for_result(&mut rx)
            .await
            .unwrap_or(Err(FetchError::Cancelled))
    }

    /// Upload `body` to `request.url`; the response body becomes the artifact.
    ///
    /// Uploads never consult the cache. Concurrent uploads to the same URL
    /// share one transport operation like downloads do.
    pub fn upload(
        &self,
        request: FetchRequest,
        body: Bytes,
        listener: impl FetchListener + 'static,
    ) {
        if let Err(error) = self.ensure_started() {
            refuse(&request, &listener, error);
            return;
        }
        let inner = &self.inner;
        if !inner
            .registry
            .register(request.token, request.url.clone(), Arc::new(listener))
        {
            return;
        }
        let plan = request.plan(TransferKind::Upload, inner.config.default_tier);
        inner.admit_and_start(request.token, plan, Some(body));
    }

    /// Detach one caller. It receives `Cancelled`; other callers of the same
    /// transfer keep going. The transport is cancelled only when no caller
    /// remains and `cancel_when_unobserved` is set.
    pub fn cancel(&self, token: CorrelationToken) {
        let inner = &self.inner;
        match inner
            .registry
            .cancel_listener(token, inner.config.cancel_when_unobserved)
        {
            Some(Detached {
                evicted: Some(evicted),
            }) => inner.cancel_running(evicted),
            Some(Detached { evicted: None }) => {}
            None => {
                tracing::debug!(
                    target: "fetcher.workstation",
                    token = %token,
                    "Cancel for unknown token"
                );
            }
        }
    }

    /// Cancel the whole transfer for `url`, for every caller attached to it.
    pub fn cancel_url(&self, url: &Url) -> bool {
        match self.inner.registry.evict(url) {
            Some(evicted) => {
                self.inner.cancel_running(evicted);
                true
            }
            None => false,
        }
    }

    /// Pause the transfer `token` is attached to, or resume it if paused.
    pub fn toggle(&self, token: CorrelationToken) {
        let inner = &self.inner;
        match inner.registry.toggle(token) {
            Toggle::Pause(session, handle) => inner.sessions.pause(session, &handle),
            Toggle::Resume {
                session,
                handle,
                request,
            } => {
                let fraction = inner.sessions.resume(session, &handle);
                inner.registry.resumed(&request, fraction);
            }
            Toggle::Ignored => {}
        }
    }

    /// Summaries of every in-flight transfer, oldest first.
    pub fn active_transfers(&self) -> Vec<TransferSummary> {
        self.inner.registry.summaries()
    }

    /// Where a resource is right now.
    pub async fn status(&self, url: &Url, format: ResourceFormat) -> FetchStatus {
        if let Some(transfer) = self.inner.registry.summary(url) {
            return FetchStatus::Fetching { transfer };
        }
        if self
            .inner
            .cache
            .exists(&CacheKey::for_url(format, url))
            .await
        {
            FetchStatus::Cached
        } else {
            FetchStatus::Missing
        }
    }

    /// Register the handler run once after the next background drain cycle.
    pub fn set_background_completion(&self, handler: impl FnOnce() + Send + 'static) {
        self.inner
            .sessions
            .set_background_completion(Box::new(handler));
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Workstation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workstation")
            .field("registry", &self.inner.registry)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Internals
// =============================================================================

/// Resolve a caller that could not be accepted. Nothing else knows about it,
/// so the result is delivered on the calling thread.
fn refuse(request: &FetchRequest, listener: &dyn FetchListener, error: FetchError) {
    tracing::warn!(
        target: "fetcher.workstation",
        token = %request.token,
        url = %request.url,
        error = %error,
        "Refused request"
    );
    listener.on_complete(Err(error));
}

impl Inner {
    async fn lookup_then_admit(&self, request: &FetchRequest, plan: TransferPlan) {
        let token = request.token;
        let lookup = {
            let Ok(_permit) = self.workers.acquire().await else {
                self.registry.resolve(token, Err(FetchError::Cancelled));
                return;
            };
            self.cache.get(&request.cache_key()).await
        };

        match lookup {
            Ok(Some(artifact)) => {
                tracing::debug!(
                    target: "fetcher.workstation",
                    token = %token,
                    key = %artifact.key(),
                    provenance = %artifact.provenance,
                    "Cache hit"
                );
                self.registry.resolve(token, Ok(artifact));
            }
            Ok(None) if !request.policy.may_fetch() => {
                self.registry.resolve(token, Err(FetchError::NotCached));
            }
            Ok(None) => self.admit_and_start(token, plan, None),
            Err(error) if request.policy.may_fetch() => {
                tracing::warn!(
                    target: "fetcher.workstation",
                    token = %token,
                    url = %request.url,
                    error = %error,
                    "Cache lookup failed, fetching from network"
                );
                self.admit_and_start(token, plan, None);
            }
            Err(error) => {
                self.registry.resolve(token, Err(error.into()));
            }
        }
    }

    fn admit_and_start(&self, token: CorrelationToken, plan: TransferPlan, body: Option<Bytes>) {
        let (session, kind) = (plan.session, plan.kind);
        let Admission::Started(request) = self.registry.admit(token, plan) else {
            return;
        };

        match self.sessions.start(request.clone(), session, kind, body) {
            Ok(handle) => {
                if !self.registry.attach_handle(&request, handle.clone()) {
                    self.sessions.cancel(session, &handle);
                }
            }
            Err(error) => {
                tracing::warn!(
                    target: "fetcher.workstation",
                    request = %request,
                    error = %error,
                    "Transport refused to start"
                );
                self.registry.finish(&request, Err(error.into()));
            }
        }
    }

    fn cancel_running(&self, evicted: Evicted) {
        if let Some((session, handle)) = evicted.running {
            self.sessions.cancel(session, &handle);
        }
    }
}
