//! Error types for sprig-core

use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias for sprig operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the sprig HTTP server
#[derive(Debug, Error)]
pub enum Error {
    /// Listen address could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Listener startup failed
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request or response body failure
    #[error("Body error: {0}")]
    Body(String),

    /// Response body was already ended or the client went away
    #[error("Response already closed")]
    ResponseClosed,

    /// Handler failed after the response started streaming
    #[error("Response aborted")]
    ResponseAborted,

    /// Client stopped accepting response data within the write timeout
    #[error("Response write timed out")]
    WriteTimeout,

    /// Admission gate no longer hands out permits
    #[error("Admission gate closed")]
    GateClosed,

    /// Bounded wait for an admission slot elapsed
    #[error("Timed out waiting for an admission slot")]
    AdmissionTimeout,

    /// Error raised by handler code
    #[error("Handler error: {0}")]
    Handler(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience for handlers mapping their own failures
    pub fn handler(message: impl std::fmt::Display) -> Self {
        Error::Handler(message.to_string())
    }
}
