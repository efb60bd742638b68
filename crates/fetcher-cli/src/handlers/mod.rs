//! Command handlers.
//!
//! Each handler is a thin `execute` over the workstation: translate arguments
//! into requests, then format the results for the terminal.

pub mod config;
pub mod get;
pub mod status;
pub mod upload;
