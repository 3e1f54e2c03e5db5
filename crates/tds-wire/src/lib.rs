//! # tds-wire
//!
//! Pure implementation of the MS-TDS (Tabular Data Stream) wire protocol
//! subset used by the SQL Server federation core: packet framing structures,
//! PRELOGIN/LOGIN7/FEDAUTH handshake messages, SQL batch and RPC request
//! encoding, and response token parsing.
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic
//! and makes no assumptions about the async runtime. Higher-level crates
//! build upon this foundation to provide async I/O.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod batch;
pub mod codec;
pub mod collation;
pub mod error;
pub mod fedauth;
pub mod login7;
pub mod packet;
pub mod prelogin;
pub mod rpc;
pub mod token;
pub mod types;

pub use batch::encode_sql_batch;
pub use collation::Collation;
pub use error::WireError;
pub use fedauth::{FedAuthExt, encode_fedauth_token};
pub use login7::Login7;
pub use packet::{
    DEFAULT_PACKET_SIZE, HEADER_LEN, MAX_PACKET_SIZE, PacketFlags, PacketHeader, PacketKind,
};
pub use prelogin::{EncryptionLevel, PreLogin};
pub use rpc::encode_sp_executesql;
pub use token::{
    ColMetaData, ColumnDesc, Done, DoneFlags, EnvChange, FedAuthInfo, LoginAck, OrderToken,
    ServerMessage, TokenKind,
};
pub use types::TypeId;
