//! TLS error type.

use thiserror::Error;

/// Errors from TLS setup and handshake.
#[derive(Debug, Error)]
pub enum TlsError {
    /// Client configuration could not be built.
    #[error("TLS configuration error: {0}")]
    Configuration(String),

    /// The server name is not a valid SNI name.
    #[error("invalid server name for SNI: {0}")]
    InvalidServerName(String),

    /// The handshake failed.
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),
}
