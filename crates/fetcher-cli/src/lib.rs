//! Command-line front end for the fetch workstation.
//!
//! - `parser` - Root CLI and global options
//! - `commands` - Subcommands
//! - `bootstrap` - Wires cache, transports and workstation from options
//! - `handlers` - One handler per subcommand
//! - `presentation` - Progress bars
#![deny(unused_crate_dependencies)]

pub mod bootstrap;
pub mod commands;
pub mod handlers;
pub mod parser;
pub mod presentation;

pub use bootstrap::{CliContext, bootstrap};
pub use commands::Commands;
pub use parser::Cli;

// Used by the binary only.
use tracing_subscriber as _;
#[cfg(test)]
use tempfile as _;
