//! Value layer error type.

use thiserror::Error;

/// Errors decoding wire values.
#[derive(Debug, Error)]
pub enum ValueError {
    /// Buffer ended before the value did; streaming readers pull another
    /// packet and retry.
    #[error("truncated value: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes needed.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// A length prefix that is invalid for the type.
    #[error("invalid length {len} for {type_name}")]
    InvalidLength {
        /// Type being decoded.
        type_name: &'static str,
        /// Offending length.
        len: usize,
    },

    /// A temporal value outside the representable range.
    #[error("invalid temporal value: {0}")]
    InvalidTemporal(String),

    /// A type the federation core does not decode.
    #[error("unsupported TDS type 0x{0:02X}")]
    Unsupported(u8),
}

impl ValueError {
    pub(crate) fn truncated(needed: usize, available: usize) -> Self {
        Self::Truncated { needed, available }
    }

    /// True when the error only signals that more bytes must arrive.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}
