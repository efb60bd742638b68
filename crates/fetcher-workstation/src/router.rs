//! Transport event router.
//!
//! Consumes the typed [`TransportEvent`] stream shared by every session and
//! drives the matching transfer through the registry. Events are matched by
//! [`RequestId`](fetcher_core::RequestId), so callbacks for evicted or
//! re-admitted URLs fall through as no-ops.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use fetcher_core::{
    FetchError, PayloadLocation, TransferEvent, TransferEventEmitterPort, TransferKind,
    TransportEvent,
};

use crate::completion::{CompletionPipeline, discard_payload_file};
use crate::dispatch::Dispatcher;
use crate::registry::{CompletionJob, TransferRegistry};
use crate::session::SessionPool;

/// Routes transport callbacks onto transfers.
pub struct EventRouter {
    registry: Arc<TransferRegistry>,
    sessions: Arc<SessionPool>,
    pipeline: Arc<CompletionPipeline>,
    workers: Arc<Semaphore>,
    dispatcher: Dispatcher,
    emitter: Arc<dyn TransferEventEmitterPort>,
}

impl EventRouter {
    pub fn new(
        registry: Arc<TransferRegistry>,
        sessions: Arc<SessionPool>,
        pipeline: Arc<CompletionPipeline>,
        workers: Arc<Semaphore>,
        dispatcher: Dispatcher,
        emitter: Arc<dyn TransferEventEmitterPort>,
    ) -> Self {
        Self {
            registry,
            sessions,
            pipeline,
            workers,
            dispatcher,
            emitter,
        }
    }

    /// Apply one transport event. Must be called within a Tokio runtime.
    pub fn handle(&self, event: TransportEvent) {
        match event {
            TransportEvent::BytesProgress { request, fraction } => {
                self.registry
                    .report(&request, TransferKind::Download, fraction);
            }
            TransportEvent::UploadProgress { request, fraction } => {
                self.registry.report(&request, TransferKind::Upload, fraction);
            }
            TransportEvent::Resumed { request, fraction } => {
                self.registry.resumed(&request, Some(fraction));
            }
            TransportEvent::Completed { request, payload } => {
                match self.registry.begin_completion(&request) {
                    Some(job) => self.spawn_completion(job, payload),
                    None => {
                        tracing::debug!(
                            target: "fetcher.workstation",
                            request = %request,
                            "Dropped completion for unknown transfer"
                        );
                        if let PayloadLocation::File(path) = payload {
                            tokio::spawn(async move { discard_payload_file(&path).await });
                        }
                    }
                }
            }
            TransportEvent::Failed { request, error } => {
                tracing::debug!(
                    target: "fetcher.workstation",
                    request = %request,
                    kind = %error.kind,
                    error = %error.message,
                    "Transport reported failure"
                );
                self.registry
                    .fail_transport(&request, FetchError::from(error));
            }
            TransportEvent::BackgroundDrainCompleted => self.drain_background(),
        }
    }

    /// Hand the registered completion handler to the sequential context.
    /// The slot is cleared before the handler runs, so each drain invokes it
    /// at most once.
    fn drain_background(&self) {
        self.emitter.emit(TransferEvent::BackgroundDrained);
        match self.sessions.take_background_completion() {
            Some(handler) => {
                tracing::info!(
                    target: "fetcher.workstation",
                    "Background session drained, running completion handler"
                );
                self.dispatcher.task(handler);
            }
            None => {
                tracing::debug!(
                    target: "fetcher.workstation",
                    "Background session drained with no handler registered"
                );
            }
        }
    }

    fn spawn_completion(&self, job: CompletionJob, payload: PayloadLocation) {
        let registry = Arc::clone(&self.registry);
        let pipeline = Arc::clone(&self.pipeline);
        let workers = Arc::clone(&self.workers);

        tokio::spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                if let PayloadLocation::File(path) = payload {
                    discard_payload_file(&path).await;
                }
                registry.finish(&job.request, Err(FetchError::Cancelled));
                return;
            };

            let mut tier = job.tier;
            let mut written = pipeline.process(&job, payload, tier).await;
            loop {
                let artifact = match written {
                    Ok(artifact) => artifact,
                    Err(error) => {
                        registry.finish(&job.request, Err(error));
                        return;
                    }
                };
                // Callers joining during the write may raise the tier.
                let Some(raised) = registry.finish_persisted(&job.request, tier, artifact.clone())
                else {
                    return;
                };
                tier = raised;
                written = pipeline.persist(&artifact, tier).await.map(|()| artifact);
            }
        });
    }

    /// Route events until `shutdown` fires or every sender is gone.
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break,

                next = events.recv() => match next {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }
        tracing::debug!(target: "fetcher.workstation", "Event router stopped");
    }
}
