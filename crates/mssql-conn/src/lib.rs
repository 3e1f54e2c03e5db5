//! # mssql-conn
//!
//! The session layer of the federation core: dialing and authenticating a
//! connection (PRELOGIN, optional TLS-in-PRELOGIN, LOGIN7, FEDAUTH token
//! exchange), the per-connection state machine, batch execution, and the
//! back-pressured [`ResultStream`] that surfaces rows one engine-sized
//! batch at a time.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod result;
pub mod row;

pub use config::{ConnectInfo, EncryptionPolicy};
pub use connection::{Connection, SessionState};
pub use error::{Error, Result};
pub use result::ResultStream;
pub use row::{ColumnMeta, RowBatch, TypeClass, type_class};
