//! HTTP transport adapter.
//!
//! [`HttpTransport`] implements [`TransportPort`] on top of `reqwest`.
//! Downloads stream into a temporary file with byte-level progress; uploads
//! stream the request body and deliver the response in memory. Each
//! operation runs on its own task and honors pause, resume and cancel.
//!
//! [`TransportPort`]: fetcher_core::TransportPort

mod config;
mod error;
mod transport;

pub use config::{HttpTransportConfig, UploadMethod};
pub use error::{HttpTransportError, map_reqwest_error};
pub use transport::HttpTransport;
