//! Server error types.

use thiserror::Error;

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The bound listener has no local address.
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
    /// The global metrics recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
