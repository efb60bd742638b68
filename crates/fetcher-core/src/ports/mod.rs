//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the fetch core expects from
//! infrastructure. They contain no implementation details and use only domain
//! types.
//!
//! # Design Rules
//!
//! - No HTTP client types in any signature
//! - Transport methods never block; results come back as events
//! - The cache store is async and all-or-nothing per key

pub mod cache_store;
pub mod event_emitter;
pub mod listener;
pub mod transport;

pub use cache_store::CacheStorePort;
pub use event_emitter::{BroadcastTransferEmitter, NoopTransferEmitter, TransferEventEmitterPort};
pub use listener::{
    CallbackListener, ChannelListener, FetchListener, Notification, listener_fn, wait_for_result,
};
pub use transport::{
    PayloadLocation, TransportEvent, TransportEventSender, TransportHandle, TransportPort,
};
