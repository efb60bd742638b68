//! Transport port definition.
//!
//! A transport performs the actual bytes-on-the-wire work for one session
//! class and reports what happens through typed [`TransportEvent`]s instead of
//! delegate callbacks. Every event names the [`RequestId`] it was started with,
//! so the event router can match it to the transfer that owns it.
//!
//! # Design
//!
//! - Methods never block: `start_*` hands the work off and returns a handle.
//! - Sessions are long-lived and safe for concurrent submission; the core adds
//!   no locking around them.
//! - Pause/resume/cancel are cooperative signals to the running operation.

use std::path::PathBuf;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::fetch::{RequestId, TransportError};

/// Opaque handle to a running transport operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransportHandle {
    id: u64,
    request: RequestId,
}

impl TransportHandle {
    pub const fn new(id: u64, request: RequestId) -> Self {
        Self { id, request }
    }

    /// Transport-local operation number.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn request(&self) -> &RequestId {
        &self.request
    }
}

/// Where a completed transfer left its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayloadLocation {
    /// Payload held in memory (typically small responses, uploads).
    Memory(Bytes),
    /// Payload written to a temporary file the consumer must delete.
    File(PathBuf),
}

/// Low-level transport callback, decoupled from any particular HTTP stack.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// Bytes received for a download, as a fraction of the expected total.
    BytesProgress { request: RequestId, fraction: f64 },
    /// Bytes sent for an upload.
    UploadProgress { request: RequestId, fraction: f64 },
    /// The operation resumed at the given fraction.
    Resumed { request: RequestId, fraction: f64 },
    /// All bytes were received.
    Completed {
        request: RequestId,
        payload: PayloadLocation,
    },
    /// The operation failed.
    Failed {
        request: RequestId,
        error: TransportError,
    },
    /// Every queued background operation has been flushed.
    BackgroundDrainCompleted,
}

impl TransportEvent {
    /// The request an event belongs to, if any.
    #[must_use]
    pub const fn request(&self) -> Option<&RequestId> {
        match self {
            Self::BytesProgress { request, .. }
            | Self::UploadProgress { request, .. }
            | Self::Resumed { request, .. }
            | Self::Completed { request, .. }
            | Self::Failed { request, .. } => Some(request),
            Self::BackgroundDrainCompleted => None,
        }
    }
}

/// Sending side of the event stream consumed by the event router.
///
/// Cloned into every transport operation. Sending never blocks; once the
/// router has shut down, events are dropped.
#[derive(Clone, Debug)]
pub struct TransportEventSender {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportEventSender {
    /// Create a connected sender/receiver pair.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Send an event. Returns `false` if the router is gone.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn progress(&self, request: &RequestId, fraction: f64) -> bool {
        self.send(TransportEvent::BytesProgress {
            request: request.clone(),
            fraction,
        })
    }

    pub fn upload_progress(&self, request: &RequestId, fraction: f64) -> bool {
        self.send(TransportEvent::UploadProgress {
            request: request.clone(),
            fraction,
        })
    }

    pub fn resumed(&self, request: &RequestId, fraction: f64) -> bool {
        self.send(TransportEvent::Resumed {
            request: request.clone(),
            fraction,
        })
    }

    pub fn completed(&self, request: &RequestId, payload: PayloadLocation) -> bool {
        self.send(TransportEvent::Completed {
            request: request.clone(),
            payload,
        })
    }

    pub fn failed(&self, request: &RequestId, error: TransportError) -> bool {
        self.send(TransportEvent::Failed {
            request: request.clone(),
            error,
        })
    }

    pub fn background_drained(&self) -> bool {
        self.send(TransportEvent::BackgroundDrainCompleted)
    }

    /// Whether the router is still receiving.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Port for one transport session.
///
/// The session pool owns one implementation per [`SessionClass`]
/// (interactive and background) and routes each transfer to the matching one.
///
/// [`SessionClass`]: crate::fetch::SessionClass
pub trait TransportPort: Send + Sync {
    /// Begin downloading `request.url()`.
    fn start_download(
        &self,
        request: RequestId,
        events: TransportEventSender,
    ) -> Result<TransportHandle, TransportError>;

    /// Begin uploading `body` to `request.url()`.
    fn start_upload(
        &self,
        request: RequestId,
        body: Bytes,
        events: TransportEventSender,
    ) -> Result<TransportHandle, TransportError>;

    /// Suspend a running operation.
    fn pause(&self, handle: &TransportHandle);

    /// Resume a suspended operation, returning the fraction completed so far
    /// when the transport knows it.
    fn resume(&self, handle: &TransportHandle) -> Option<f64>;

    /// Cancel an operation. Further events for it may still arrive.
    fn cancel(&self, handle: &TransportHandle);
}
