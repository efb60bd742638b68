//! Progress throttling for diagnostic transfer events.
//!
//! Listener fan-out is never throttled; only the `TransferEvent` stream
//! published through the emitter port is rate-limited.

mod throttle;

pub use throttle::ProgressThrottle;
