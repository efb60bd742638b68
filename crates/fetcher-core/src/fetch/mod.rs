//! Fetch domain types, progress, errors, and validation.
//!
//! This module contains pure data types and trait definitions for the fetch
//! system. No I/O, networking, or runtime dependencies allowed.
//!
//! # Structure
//!
//! - `types` - Identifiers and configuration selectors (`CorrelationToken`, `CacheKey`, tiers)
//! - `progress` - The `Progress` state machine
//! - `artifact` - Persisted payloads and results (`Artifact`, `FetchOutput`)
//! - `errors` - Error taxonomy (`FetchError`, `TransportError`, `CacheError`)
//! - `events` - Diagnostic transfer events and summaries
//! - `validate` - Payload validation (`PayloadValidator`, `SignatureValidator`)

pub mod artifact;
pub mod errors;
pub mod events;
pub mod progress;
pub mod types;
pub mod validate;

// Re-export commonly used types
pub use artifact::{Artifact, ArtifactMeta, FetchOutput};
pub use errors::{CacheError, FetchError, FetchResult, TransportError, TransportErrorKind};
pub use events::{FetchStatus, TransferEvent, TransferSummary};
pub use progress::Progress;
pub use types::{
    CacheKey, CachePolicy, CacheTier, CorrelationToken, ItemMetadata, LeaseId, PersistenceTier,
    Provenance, RequestId, ResourceFormat, SessionClass, TransferKind,
};
pub use validate::{PayloadValidator, SignatureValidator};
