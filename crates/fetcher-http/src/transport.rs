//! `reqwest`-backed transport session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use fetcher_core::{
    PayloadLocation, RequestId, TransportError, TransportErrorKind, TransportEventSender,
    TransportHandle, TransportPort,
};
use fetcher_workstation::ProgressThrottle;

use crate::config::HttpTransportConfig;
use crate::error::{HttpTransportError, map_reqwest_error, status_error};

// =============================================================================
// Operation control
// =============================================================================

/// Shared between the transport and the task running one operation.
#[derive(Clone)]
struct Control {
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
    /// Last reported fraction, as `f64` bits.
    fraction: Arc<AtomicU64>,
}

impl Control {
    fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            paused,
            fraction: Arc::new(AtomicU64::new(0f64.to_bits())),
        }
    }

    fn fraction(&self) -> f64 {
        f64::from_bits(self.fraction.load(Ordering::SeqCst))
    }
}

/// Task-side view of a [`Control`].
struct Operation {
    request: RequestId,
    events: TransportEventSender,
    paused: watch::Receiver<bool>,
    fraction: Arc<AtomicU64>,
    throttle: ProgressThrottle,
}

impl Operation {
    /// Hold the operation while it is paused.
    async fn wait_while_paused(&mut self) {
        while *self.paused.borrow_and_update() {
            if self.paused.changed().await.is_err() {
                return;
            }
        }
    }

    fn report(&mut self, fraction: f64, upload: bool) {
        self.fraction.store(fraction.to_bits(), Ordering::SeqCst);
        if self.throttle.admit(fraction) {
            if upload {
                self.events.upload_progress(&self.request, fraction);
            } else {
                self.events.progress(&self.request, fraction);
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (done as f64 / total as f64).min(1.0)
}

fn cancelled() -> TransportError {
    TransportError::new(TransportErrorKind::Cancelled, "operation cancelled")
}

// =============================================================================
// Transport
// =============================================================================

/// One HTTP session.
///
/// Operations are spawned on the runtime the transport was created in, so
/// `start_*` never blocks and may be called from any thread.
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
    runtime: Handle,
    operations: Arc<Mutex<HashMap<u64, Control>>>,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Build a session. Must be called from within a Tokio runtime.
    pub fn new(config: HttpTransportConfig) -> Result<Self, HttpTransportError> {
        let runtime = Handle::try_current().map_err(|_| HttpTransportError::NoRuntime)?;
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            config,
            runtime,
            operations: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        })
    }

    pub const fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    /// Operations currently running (including paused ones).
    pub fn running(&self) -> usize {
        lock(&self.operations).len()
    }

    fn register(
        &self,
        request: RequestId,
        events: TransportEventSender,
    ) -> (TransportHandle, Operation, Finish) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let control = Control::new();
        let operation = Operation {
            request: request.clone(),
            events,
            paused: control.paused.subscribe(),
            fraction: Arc::clone(&control.fraction),
            throttle: ProgressThrottle::new(self.config.progress_interval),
        };
        let finish = Finish {
            id,
            cancel: control.cancel.clone(),
            operations: Arc::clone(&self.operations),
            report_drain: self.config.report_drain,
        };
        lock(&self.operations).insert(id, control);
        (TransportHandle::new(id, request), operation, finish)
    }

    fn control(&self, handle: &TransportHandle) -> Option<Control> {
        lock(&self.operations).get(&handle.id()).cloned()
    }
}

fn lock(operations: &Mutex<HashMap<u64, Control>>) -> MutexGuard<'_, HashMap<u64, Control>> {
    operations.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bookkeeping run when an operation's task ends.
struct Finish {
    id: u64,
    cancel: CancellationToken,
    operations: Arc<Mutex<HashMap<u64, Control>>>,
    report_drain: bool,
}

impl Finish {
    /// Forget the operation. Returns whether a drain should be reported
    /// once the terminal event is out.
    fn done(self) -> bool {
        let mut operations = lock(&self.operations);
        operations.remove(&self.id);
        self.report_drain && operations.is_empty()
    }
}

fn report_drained(events: &TransportEventSender) {
    tracing::debug!(target: "fetcher.http", "All background operations finished");
    events.background_drained();
}

impl TransportPort for HttpTransport {
    fn start_download(
        &self,
        request: RequestId,
        events: TransportEventSender,
    ) -> Result<TransportHandle, TransportError> {
        let path = self
            .config
            .download_dir
            .join(format!("fetcher-{}.part", uuid::Uuid::new_v4().simple()));
        let (handle, operation, finish) = self.register(request, events);
        let client = self.client.clone();

        tracing::debug!(
            target: "fetcher.http",
            request = %handle.request(),
            id = handle.id(),
            path = %path.display(),
            "Starting download"
        );
        self.runtime
            .spawn(run_download(client, operation, finish, path));
        Ok(handle)
    }

    fn start_upload(
        &self,
        request: RequestId,
        body: Bytes,
        events: TransportEventSender,
    ) -> Result<TransportHandle, TransportError> {
        let (handle, operation, finish) = self.register(request, events);
        let builder = self
            .client
            .request(self.config.upload_method.as_reqwest(), handle.request().url().as_str());

        tracing::debug!(
            target: "fetcher.http",
            request = %handle.request(),
            id = handle.id(),
            size = body.len(),
            "Starting upload"
        );
        self.runtime.spawn(run_upload(
            builder,
            operation,
            finish,
            body,
            self.config.upload_chunk_size,
        ));
        Ok(handle)
    }

    fn pause(&self, handle: &TransportHandle) {
        if let Some(control) = self.control(handle) {
            control.paused.send_replace(true);
        }
    }

    fn resume(&self, handle: &TransportHandle) -> Option<f64> {
        let control = self.control(handle)?;
        control.paused.send_replace(false);
        Some(control.fraction())
    }

    fn cancel(&self, handle: &TransportHandle) {
        if let Some(control) = self.control(handle) {
            control.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("config", &self.config)
            .field("running", &self.running())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Operation tasks
// =============================================================================

async fn run_download(
    client: reqwest::Client,
    mut operation: Operation,
    finish: Finish,
    path: PathBuf,
) {
    let request = operation.request.clone();
    let events = operation.events.clone();

    let result = tokio::select! {
        biased;
        () = finish.cancel.cancelled() => Err(cancelled()),
        result = download(&client, &mut operation, &path) => result,
    };
    let drained = finish.done();

    match result {
        Ok(()) => {
            tracing::debug!(target: "fetcher.http", request = %request, "Download finished");
            events.completed(&request, PayloadLocation::File(path));
        }
        Err(error) => {
            discard(&path).await;
            tracing::debug!(
                target: "fetcher.http",
                request = %request,
                error = %error,
                "Download failed"
            );
            events.failed(&request, error);
        }
    }
    if drained {
        report_drained(&events);
    }
}

async fn download(
    client: &reqwest::Client,
    operation: &mut Operation,
    path: &Path,
) -> Result<(), TransportError> {
    let response = client
        .get(operation.request.url().as_str())
        .send()
        .await
        .map_err(|e| map_reqwest_error(&e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status));
    }

    let total = response.content_length().unwrap_or(0);
    let io = |e: std::io::Error| TransportError::from_io_error(&e);
    let mut file = tokio::fs::File::create(path).await.map_err(io)?;
    let mut stream = response.bytes_stream();
    let mut received = 0u64;

    while let Some(chunk) = stream.next().await {
        operation.wait_while_paused().await;
        let chunk = chunk.map_err(|e| map_reqwest_error(&e))?;
        file.write_all(&chunk).await.map_err(io)?;
        received += chunk.len() as u64;
        if total > 0 {
            operation.report(ratio(received, total), false);
        }
    }
    file.flush().await.map_err(io)?;
    Ok(())
}

async fn run_upload(
    builder: reqwest::RequestBuilder,
    operation: Operation,
    finish: Finish,
    body: Bytes,
    chunk_size: usize,
) {
    let request = operation.request.clone();
    let events = operation.events.clone();

    let result = tokio::select! {
        biased;
        () = finish.cancel.cancelled() => Err(cancelled()),
        result = upload(builder, operation, body, chunk_size) => result,
    };
    let drained = finish.done();

    match result {
        Ok(response) => {
            tracing::debug!(
                target: "fetcher.http",
                request = %request,
                size = response.len(),
                "Upload finished"
            );
            events.completed(&request, PayloadLocation::Memory(response));
        }
        Err(error) => {
            tracing::debug!(
                target: "fetcher.http",
                request = %request,
                error = %error,
                "Upload failed"
            );
            events.failed(&request, error);
        }
    }
    if drained {
        report_drained(&events);
    }
}

async fn upload(
    builder: reqwest::RequestBuilder,
    mut operation: Operation,
    body: Bytes,
    chunk_size: usize,
) -> Result<Bytes, TransportError> {
    let total = body.len() as u64;
    let chunk_size = chunk_size.max(1);
    let mut sent = 0u64;

    // The body cannot be held mid-request; a paused upload keeps sending and
    // only picks its progress reports up again on resume.
    let chunks: Vec<Bytes> = (0..body.len())
        .step_by(chunk_size)
        .map(|start| body.slice(start..(start + chunk_size).min(body.len())))
        .collect();
    let chunks = futures_util::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        if !*operation.paused.borrow() {
            operation.report(ratio(sent, total), true);
        }
        Ok::<_, std::io::Error>(chunk)
    });

    let response = builder
        .header(reqwest::header::CONTENT_LENGTH, total)
        .body(reqwest::Body::wrap_stream(chunks))
        .send()
        .await
        .map_err(|e| map_reqwest_error(&e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status));
    }
    response.bytes().await.map_err(|e| map_reqwest_error(&e))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(
                target: "fetcher.http",
                path = %path.display(),
                error = %e,
                "Failed to remove partial download"
            );
        }
    }
}
