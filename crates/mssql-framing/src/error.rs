//! Framing error type.

use thiserror::Error;

/// Errors from the packet framing layer.
#[derive(Debug, Error)]
pub enum FramingError {
    /// Header failed to parse.
    #[error("invalid packet header: {0}")]
    InvalidHeader(#[from] tds_wire::WireError),

    /// A packet exceeded the negotiated size.
    #[error("packet of {size} bytes exceeds limit of {max}")]
    PacketTooLarge {
        /// Observed size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Transport closed mid-message.
    #[error("connection closed mid-message")]
    ClosedMidMessage,

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
