//! Error types and mapping from `reqwest`.

use thiserror::Error;

use fetcher_core::{TransportError, TransportErrorKind};

/// Failure to construct a transport.
#[derive(Debug, Error)]
pub enum HttpTransportError {
    #[error("HTTP transport must be created inside a Tokio runtime")]
    NoRuntime,

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Classify a `reqwest` failure.
pub fn map_reqwest_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::timeout(err.to_string());
    }
    if err.is_connect() {
        return TransportError::connectivity(err.to_string());
    }
    if let Some(status) = err.status() {
        return TransportError::http(status.as_u16(), err.to_string());
    }
    if err.is_request() || err.is_body() {
        return TransportError::connectivity(err.to_string());
    }
    TransportError::new(TransportErrorKind::Other, err.to_string())
}

/// Non-success status as a transport error.
pub(crate) fn status_error(status: reqwest::StatusCode) -> TransportError {
    TransportError::http(
        status.as_u16(),
        status.canonical_reason().unwrap_or("unexpected status"),
    )
}
