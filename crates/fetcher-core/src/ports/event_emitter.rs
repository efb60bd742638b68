//! Transfer event emitter port.
//!
//! This port abstracts diagnostic event emission, allowing the workstation to
//! publish transfer activity without coupling to a transport (channels, SSE,
//! UI bindings).

use crate::fetch::TransferEvent;

/// Port for emitting transfer events.
///
/// Implementations handle the actual event delivery.
pub trait TransferEventEmitterPort: Send + Sync {
    /// Emit a transfer event.
    ///
    /// Called while the registry lock is held; implementations must not block
    /// and must not call back into the workstation.
    fn emit(&self, event: TransferEvent);

    /// Clone this emitter into a boxed trait object.
    fn clone_box(&self) -> Box<dyn TransferEventEmitterPort>;
}

/// A no-op transfer event emitter for tests and CLI contexts.
#[derive(Debug, Clone, Default)]
pub struct NoopTransferEmitter;

impl NoopTransferEmitter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TransferEventEmitterPort for NoopTransferEmitter {
    fn emit(&self, _event: TransferEvent) {
        // Intentionally do nothing
    }

    fn clone_box(&self) -> Box<dyn TransferEventEmitterPort> {
        Box::new(self.clone())
    }
}

/// Emitter that forwards events into a `tokio` broadcast channel.
///
/// Slow subscribers lag and lose events rather than block the workstation.
#[derive(Debug, Clone)]
pub struct BroadcastTransferEmitter {
    tx: tokio::sync::broadcast::Sender<TransferEvent>,
}

impl BroadcastTransferEmitter {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TransferEvent> {
        self.tx.subscribe()
    }
}

impl TransferEventEmitterPort for BroadcastTransferEmitter {
    fn emit(&self, event: TransferEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    fn clone_box(&self) -> Box<dyn TransferEventEmitterPort> {
        Box::new(self.clone())
    }
}
