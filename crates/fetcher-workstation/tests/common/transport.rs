//! Scriptable transport session.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use fetcher_core::{
    PayloadLocation, RequestId, TransferKind, TransportError, TransportEventSender,
    TransportHandle, TransportPort,
};
use url::Url;

use super::WAIT;

/// One operation the workstation started.
#[derive(Clone, Debug)]
pub struct Operation {
    pub handle: TransportHandle,
    pub kind: TransferKind,
    pub body: Option<Bytes>,
    pub events: TransportEventSender,
}

impl Operation {
    pub fn request(&self) -> &RequestId {
        self.handle.request()
    }

    pub fn progress(&self, fraction: f64) {
        match self.kind {
            TransferKind::Download => self.events.progress(self.request(), fraction),
            TransferKind::Upload => self.events.upload_progress(self.request(), fraction),
        };
    }

    pub fn complete(&self, payload: &'static [u8]) {
        self.events
            .completed(self.request(), PayloadLocation::Memory(Bytes::from_static(payload)));
    }

    pub fn fail(&self, error: TransportError) {
        self.events.failed(self.request(), error);
    }
}

/// Transport that records operations and lets the test drive their events.
#[derive(Default)]
pub struct FakeTransport {
    operations: Mutex<Vec<Operation>>,
    paused: Mutex<Vec<TransportHandle>>,
    resumed: Mutex<Vec<TransportHandle>>,
    cancelled: Mutex<Vec<TransportHandle>>,
    next_id: AtomicU64,
    refuse: AtomicBool,
    resume_fraction: Mutex<Option<f64>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `start_*` fail.
    pub fn refuse_starts(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn set_resume_fraction(&self, fraction: f64) {
        *self.resume_fraction.lock().unwrap() = Some(fraction);
    }

    pub fn starts(&self) -> usize {
        self.operations.lock().unwrap().len()
    }

    pub fn starts_for(&self, url: &Url) -> usize {
        self.operations
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.request().url() == url)
            .count()
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.operations.lock().unwrap().clone()
    }

    pub fn paused(&self) -> usize {
        self.paused.lock().unwrap().len()
    }

    pub fn resumed(&self) -> usize {
        self.resumed.lock().unwrap().len()
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.lock().unwrap().len()
    }

    /// Wait until the `n`th operation for `url` (1-based) has started.
    pub async fn started(&self, url: &Url, n: usize) -> Operation {
        let poll = async {
            loop {
                let found = self
                    .operations
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|op| op.request().url() == url)
                    .nth(n - 1)
                    .cloned();
                if let Some(op) = found {
                    return op;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(WAIT, poll)
            .await
            .expect("transport operation never started")
    }

    fn record(
        &self,
        request: RequestId,
        kind: TransferKind,
        body: Option<Bytes>,
        events: TransportEventSender,
    ) -> Result<TransportHandle, TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::connectivity("offline"));
        }
        let handle = TransportHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst), request);
        self.operations.lock().unwrap().push(Operation {
            handle: handle.clone(),
            kind,
            body,
            events,
        });
        Ok(handle)
    }
}

impl TransportPort for FakeTransport {
    fn start_download(
        &self,
        request: RequestId,
        events: TransportEventSender,
    ) -> Result<TransportHandle, TransportError> {
        self.record(request, TransferKind::Download, None, events)
    }

    fn start_upload(
        &self,
        request: RequestId,
        body: Bytes,
        events: TransportEventSender,
    ) -> Result<TransportHandle, TransportError> {
        self.record(request, TransferKind::Upload, Some(body), events)
    }

    fn pause(&self, handle: &TransportHandle) {
        self.paused.lock().unwrap().push(handle.clone());
    }

    fn resume(&self, handle: &TransportHandle) -> Option<f64> {
        self.resumed.lock().unwrap().push(handle.clone());
        *self.resume_fraction.lock().unwrap()
    }

    fn cancel(&self, handle: &TransportHandle) {
        self.cancelled.lock().unwrap().push(handle.clone());
    }
}
