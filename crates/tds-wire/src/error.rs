//! Wire protocol error type.

use thiserror::Error;

/// Errors raised while encoding or decoding TDS structures.
#[derive(Debug, Error)]
pub enum WireError {
    /// Unknown packet type byte.
    #[error("unknown packet type 0x{0:02X}")]
    UnknownPacketKind(u8),

    /// Packet status byte carries undefined bits.
    #[error("invalid packet status 0x{0:02X}")]
    InvalidPacketFlags(u8),

    /// Unknown PRELOGIN option byte.
    #[error("unknown PRELOGIN option 0x{0:02X}")]
    UnknownPreloginOption(u8),

    /// Unknown response token byte.
    #[error("unknown token 0x{0:02X}")]
    UnknownToken(u8),

    /// Unknown TDS type id in column metadata.
    #[error("unknown TDS type 0x{0:02X}")]
    UnknownType(u8),

    /// Buffer ended before a complete structure was read.
    ///
    /// Streaming readers treat this as "pull another packet"; message-level
    /// decoders treat it as corruption.
    #[error("truncated input: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the decoder needed.
        needed: usize,
        /// Bytes that were available.
        available: usize,
    },

    /// A structurally invalid field value.
    #[error("malformed {context}: {detail}")]
    Malformed {
        /// What was being decoded.
        context: &'static str,
        /// What was wrong with it.
        detail: String,
    },
}

impl WireError {
    /// Shorthand used by decoders before fixed-size reads.
    pub(crate) fn truncated(needed: usize, available: usize) -> Self {
        Self::Truncated { needed, available }
    }

    /// True when the error only signals that more bytes must arrive.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}
