//! Fetch workstation: deduplicated transfers, fan-out and completion.
//!
//! - `registry` - In-flight transfers keyed by URL, with their listeners
//! - `session` - Foreground/background transport routing
//! - `router` - Transport events onto registry transitions
//! - `completion` - Validate and persist finished payloads
//! - `dispatch` - The sequential context every listener is called on
//! - `workstation` - The public facade (`fetch`, `cancel`, `toggle`, ...)

// Re-export core types for convenience
pub use fetcher_core::{
    Artifact, CachePolicy, CorrelationToken, FetchError, FetchListener, FetchOutput, FetchStatus,
    FetcherConfig, PersistenceTier, Progress, Provenance, ResourceFormat, SessionClass,
    TransferEvent, TransferSummary,
};

pub(crate) mod completion;
pub mod dispatch;
pub(crate) mod progress;
pub(crate) mod router;
pub(crate) mod session;

pub mod registry;
mod workstation;

// Re-export progress throttle for adapters that rate-limit their own events
pub use progress::ProgressThrottle;

pub use dispatch::{Dispatcher, run_dispatch_loop};
pub use registry::{TransferPlan, TransferRegistry};
pub use session::BackgroundCompletion;
pub use workstation::{FetchRequest, Workstation, WorkstationDeps, build_workstation};
