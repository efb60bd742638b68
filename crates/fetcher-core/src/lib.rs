//! Core domain types and port definitions for the fetcher.
//!
//! This crate has no I/O of its own. It defines what a fetch is (tokens,
//! cache keys, progress, artifacts, errors) and the ports the workstation
//! talks to: the cache store, the transport sessions, caller listeners and
//! the diagnostic event emitter.
#![deny(unused_crate_dependencies)]

pub mod config;
pub mod fetch;
pub mod ports;

// Re-export commonly used types for convenience
pub use config::{ConfigError, FetcherConfig};
pub use fetch::{
    Artifact, ArtifactMeta, CacheError, CacheKey, CachePolicy, CacheTier, CorrelationToken,
    FetchError, FetchOutput, FetchResult, FetchStatus, ItemMetadata, LeaseId, PayloadValidator,
    PersistenceTier, Progress, Provenance, RequestId, ResourceFormat, SessionClass,
    SignatureValidator, TransferEvent, TransferKind, TransferSummary, TransportError,
    TransportErrorKind,
};
pub use ports::{
    BroadcastTransferEmitter, CacheStorePort, CallbackListener, ChannelListener, FetchListener,
    NoopTransferEmitter, Notification, PayloadLocation, TransferEventEmitterPort, TransportEvent,
    TransportEventSender, TransportHandle, TransportPort, listener_fn, wait_for_result,
};

