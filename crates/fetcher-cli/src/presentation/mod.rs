//! Terminal presentation.

pub mod progress;

pub use progress::{BarListener, Completion, ProgressBoard};
