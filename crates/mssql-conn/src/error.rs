//! Session error taxonomy.
//!
//! One error type covers everything a federated query can hit: bad
//! configuration, authentication, I/O, protocol violations, server-raised
//! errors, pool exhaustion and cancellation. Lower-layer errors fold into
//! these kinds at the conversion boundary.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the session layer and everything above it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Invalid option, connection string, or filter.
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential or token failure. Never retried.
    #[error("authentication error: {0}")]
    Auth(#[from] mssql_auth::AuthError),

    /// Socket, TLS, or timeout failure.
    #[error("I/O error during {context}: {source}. Check connectivity to the remote server")]
    Io {
        /// What the connection was doing.
        context: &'static str,
        /// Underlying error, shared for Clone.
        source: Arc<std::io::Error>,
    },

    /// The byte stream violated the protocol; the connection is poisoned.
    #[error("protocol error: {0}. The connection will be discarded")]
    Protocol(String),

    /// SQL Server raised an error; text preserved verbatim.
    #[error("remote error {number} (severity {class}, state {state}): {message}")]
    Remote {
        /// Server message number.
        number: i32,
        /// Message state.
        state: u8,
        /// Severity class.
        class: u8,
        /// Server message text.
        message: String,
        /// Reporting server name.
        server: String,
        /// Originating procedure, empty for batches.
        procedure: String,
        /// Line number.
        line: i32,
    },

    /// No pooled connection became available in time.
    #[error("pool timeout: no connection available within {0:?}. Raise connection_limit or acquire_timeout")]
    PoolTimeout(Duration),

    /// The host engine cancelled the operation.
    #[error("cancelled")]
    Cancelled,
}

/// Session-layer result alias.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an I/O error with phase context.
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io {
            context,
            source: Arc::new(source),
        }
    }

    /// A timeout expressed as an I/O error, per the taxonomy.
    pub fn timeout(context: &'static str) -> Self {
        Self::io(
            context,
            std::io::Error::new(std::io::ErrorKind::TimedOut, "operation timed out"),
        )
    }

    /// Build a remote error from a server message token.
    #[must_use]
    pub fn from_server_message(msg: &tds_wire::ServerMessage) -> Self {
        Self::Remote {
            number: msg.number,
            state: msg.state,
            class: msg.class,
            message: msg.message.clone(),
            server: msg.server.clone(),
            procedure: msg.procedure.clone(),
            line: msg.line,
        }
    }

    /// Transient errors justify one retry of connection establishment.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
            ),
            _ => false,
        }
    }
}

impl From<mssql_framing::FramingError> for Error {
    fn from(e: mssql_framing::FramingError) -> Self {
        match e {
            mssql_framing::FramingError::Io(io) => Self::io("socket", io),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<tds_wire::WireError> for Error {
    fn from(e: tds_wire::WireError) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl From<mssql_values::ValueError> for Error {
    fn from(e: mssql_values::ValueError) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl From<mssql_tls::TlsError> for Error {
    fn from(e: mssql_tls::TlsError) -> Self {
        Self::io(
            "tls handshake",
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let reset = Error::io(
            "socket",
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
        );
        assert!(reset.is_transient());

        assert!(Error::timeout("connect").is_transient());
        assert!(!Error::Config("bad".into()).is_transient());
        assert!(!Error::Cancelled.is_transient());
    }

    #[test]
    fn messages_carry_suggestions() {
        let e = Error::PoolTimeout(Duration::from_secs(30));
        assert!(e.to_string().contains("connection_limit"));
    }
}
