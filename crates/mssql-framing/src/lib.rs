//! # mssql-framing
//!
//! Async TDS packet framing over any `AsyncRead + AsyncWrite` transport:
//! fragmenting outgoing messages by negotiated packet size, reassembling
//! end-of-message-delimited responses, and the split-I/O [`Link`] that can
//! deliver an out-of-band attention packet while a read is in flight.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod error;
pub mod link;
pub mod message;

pub use codec::{Packet, PacketCodec};
pub use error::FramingError;
pub use link::{AttentionHandle, Link};
pub use message::{Message, MessageJoiner};
