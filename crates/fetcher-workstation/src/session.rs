//! Session pool.
//!
//! Owns one transport per [`SessionClass`] and routes each transfer to the
//! session it asked for. Also holds the single background-completion handler
//! that the router runs after a drain cycle.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;

use fetcher_core::{
    RequestId, SessionClass, TransferKind, TransportError, TransportEventSender, TransportHandle,
    TransportPort,
};

/// Handler invoked once after the background session drains.
pub type BackgroundCompletion = Box<dyn FnOnce() + Send + 'static>;

/// Routes transport work by session class.
pub struct SessionPool {
    foreground: Arc<dyn TransportPort>,
    background: Arc<dyn TransportPort>,
    events: TransportEventSender,
    background_completion: Mutex<Option<BackgroundCompletion>>,
}

impl SessionPool {
    pub fn new(
        foreground: Arc<dyn TransportPort>,
        background: Arc<dyn TransportPort>,
        events: TransportEventSender,
    ) -> Self {
        Self {
            foreground,
            background,
            events,
            background_completion: Mutex::new(None),
        }
    }

    /// Both classes served by the same transport.
    #[cfg(test)]
    pub fn single(transport: Arc<dyn TransportPort>, events: TransportEventSender) -> Self {
        Self::new(Arc::clone(&transport), transport, events)
    }

    pub fn session(&self, class: SessionClass) -> &Arc<dyn TransportPort> {
        match class {
            SessionClass::Foreground => &self.foreground,
            SessionClass::Background => &self.background,
        }
    }

    /// Start the transport operation for a freshly admitted transfer.
    pub fn start(
        &self,
        request: RequestId,
        class: SessionClass,
        kind: TransferKind,
        body: Option<Bytes>,
    ) -> Result<TransportHandle, TransportError> {
        let session = self.session(class);
        tracing::debug!(
            target: "fetcher.workstation",
            request = %request,
            session = %class,
            kind = %kind,
            "Starting transport operation"
        );
        match kind {
            TransferKind::Download => session.start_download(request, self.events.clone()),
            TransferKind::Upload => {
                session.start_upload(request, body.unwrap_or_default(), self.events.clone())
            }
        }
    }

    pub fn pause(&self, class: SessionClass, handle: &TransportHandle) {
        self.session(class).pause(handle);
    }

    pub fn resume(&self, class: SessionClass, handle: &TransportHandle) -> Option<f64> {
        self.session(class).resume(handle)
    }

    pub fn cancel(&self, class: SessionClass, handle: &TransportHandle) {
        tracing::debug!(
            target: "fetcher.workstation",
            request = %handle.request(),
            session = %class,
            "Cancelling transport operation"
        );
        self.session(class).cancel(handle);
    }

    /// Register the handler for the next drain cycle, replacing any earlier
    /// one that has not run yet.
    pub fn set_background_completion(&self, handler: BackgroundCompletion) {
        let mut slot = self
            .background_completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.replace(handler).is_some() {
            tracing::debug!(
                target: "fetcher.workstation",
                "Replaced pending background completion handler"
            );
        }
    }

    /// Take the handler, leaving the slot empty.
    pub fn take_background_completion(&self) -> Option<BackgroundCompletion> {
        self.background_completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn has_background_completion(&self) -> bool {
        self.background_completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("background_completion", &self.has_background_completion())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetcher_core::LeaseId;
    use std::sync::atomic::{AtomicU64, Ordering};
    use url::Url;

    /// Transport that only counts what it is asked to do.
    #[derive(Default)]
    struct Counting {
        downloads: AtomicU64,
        uploads: AtomicU64,
        cancels: AtomicU64,
    }

    impl TransportPort for Counting {
        fn start_download(
            &self,
            request: RequestId,
            _events: TransportEventSender,
        ) -> Result<TransportHandle, TransportError> {
            let id = self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(TransportHandle::new(id, request))
        }

        fn start_upload(
            &self,
            request: RequestId,
            _body: Bytes,
            _events: TransportEventSender,
        ) -> Result<TransportHandle, TransportError> {
            let id = self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(TransportHandle::new(id, request))
        }

        fn pause(&self, _handle: &TransportHandle) {}

        fn resume(&self, _handle: &TransportHandle) -> Option<f64> {
            Some(0.5)
        }

        fn cancel(&self, _handle: &TransportHandle) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn request() -> RequestId {
        RequestId::new(Url::parse("https://x/y.bin").unwrap(), LeaseId::new(1))
    }

    #[test]
    fn test_routes_by_session_class() {
        let foreground = Arc::new(Counting::default());
        let background = Arc::new(Counting::default());
        let (events, _rx) = TransportEventSender::channel();
        let pool = SessionPool::new(foreground.clone(), background.clone(), events);

        pool.start(request(), SessionClass::Foreground, TransferKind::Download, None)
            .unwrap();
        let handle = pool
            .start(
                request(),
                SessionClass::Background,
                TransferKind::Upload,
                Some(Bytes::from_static(b"body")),
            )
            .unwrap();
        pool.cancel(SessionClass::Background, &handle);

        assert_eq!(foreground.downloads.load(Ordering::SeqCst), 1);
        assert_eq!(background.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(background.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(foreground.cancels.load(Ordering::SeqCst), 0);
        assert_eq!(pool.resume(SessionClass::Foreground, &handle), Some(0.5));
    }

    #[test]
    fn test_background_completion_is_taken_once() {
        let (events, _rx) = TransportEventSender::channel();
        let pool = SessionPool::single(Arc::new(Counting::default()), events);

        pool.set_background_completion(Box::new(|| {}));
        assert!(pool.has_background_completion());
        assert!(pool.take_background_completion().is_some());
        assert!(pool.take_background_completion().is_none());
    }
}
