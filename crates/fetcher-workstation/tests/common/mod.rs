//! Shared fakes for fetcher-workstation integration tests.

// Each test binary uses a different subset of the helpers.
#![allow(dead_code)]

pub mod cache;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use fetcher_core::{
    ChannelListener, CorrelationToken, FetchError, FetchOutput, FetcherConfig,
    NoopTransferEmitter, Notification, SignatureValidator,
};
use fetcher_workstation::{FetchRequest, Workstation, WorkstationDeps, build_workstation};
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

use cache::MemoryCache;
use transport::FakeTransport;

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// A workstation wired to in-memory fakes.
pub struct Harness {
    pub workstation: Workstation,
    pub cache: Arc<MemoryCache>,
    pub foreground: Arc<FakeTransport>,
    pub background: Arc<FakeTransport>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_cache(MemoryCache::new(), FetcherConfig::new())
    }

    pub fn with_config(config: FetcherConfig) -> Self {
        Self::with_cache(MemoryCache::new(), config)
    }

    pub fn with_cache(cache: MemoryCache, config: FetcherConfig) -> Self {
        let harness = Self::idle(cache, config);
        harness.workstation.start().unwrap();
        harness
    }

    /// A harness whose workstation has not been started.
    pub fn idle(cache: MemoryCache, config: FetcherConfig) -> Self {
        let cache = Arc::new(cache);
        let foreground = Arc::new(FakeTransport::new());
        let background = Arc::new(FakeTransport::new());
        let workstation = build_workstation(WorkstationDeps {
            cache: Arc::clone(&cache),
            foreground: Arc::clone(&foreground),
            background: Arc::clone(&background),
            event_emitter: Arc::new(NoopTransferEmitter::new()),
            validator: Arc::new(SignatureValidator::new()),
            config: config.with_progress_event_interval(Duration::ZERO),
        });
        Self {
            workstation,
            cache,
            foreground,
            background,
        }
    }

    /// Issue a fetch with a channel listener.
    pub fn fetch(&self, request: FetchRequest) -> UnboundedReceiver<Notification> {
        let (listener, rx) = ChannelListener::new();
        self.workstation.fetch(request, listener);
        rx
    }
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

pub fn request(url: &Url) -> FetchRequest {
    FetchRequest::new(url.clone(), CorrelationToken::new())
}

/// Wait for the terminal notification, failing the test on timeout.
pub async fn terminal(rx: &mut UnboundedReceiver<Notification>) -> Result<FetchOutput, FetchError> {
    tokio::time::timeout(WAIT, fetcher_core::wait_for_result(rx))
        .await
        .expect("timed out waiting for a terminal result")
        .expect("listener dropped without a terminal result")
}

/// Collect every notification until the terminal one.
pub async fn notifications(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut seen = Vec::new();
    loop {
        let next = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for a notification")
            .expect("listener dropped without a terminal result");
        let done = next.is_terminal();
        seen.push(next);
        if done {
            return seen;
        }
    }
}

/// Give the workstation's tasks a moment to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

/// Wait until the transfer for `url` satisfies `ready`.
pub async fn wait_for_transfer(
    workstation: &Workstation,
    url: &Url,
    ready: impl Fn(&fetcher_core::TransferSummary) -> bool,
) {
    let poll = async {
        loop {
            let found = workstation
                .active_transfers()
                .into_iter()
                .any(|summary| &summary.url == url && ready(&summary));
            if found {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(WAIT, poll)
        .await
        .expect("transfer never reached the expected state");
}

/// Wait until the transport accepted the transfer for `url`.
pub async fn wait_running(workstation: &Workstation, url: &Url) {
    wait_for_transfer(workstation, url, |s| s.progress.fraction().is_some()).await;
}

/// Wait until `n` callers are attached to the transfer for `url`.
pub async fn wait_for_listeners(workstation: &Workstation, url: &Url, n: u32) {
    wait_for_transfer(workstation, url, |s| s.listeners == n).await;
}
