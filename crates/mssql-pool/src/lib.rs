//! # mssql-pool
//!
//! Purpose-built connection pool for the federation core. Each attachment
//! owns one pool; acquisitions reuse the most-recently-used idle
//! connection after a health probe, create new connections under the size
//! cap (with a single retry on transient dial failures), and otherwise
//! wait for a release until the acquire deadline.
//!
//! Connection state is reset between acquisitions the TDS way: the first
//! batch after a flagged acquisition carries the RESETCONNECTION status
//! bit, so no extra round trip is spent.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod pool;

pub use config::PoolConfig;
pub use pool::{Pool, PoolStatus, PooledConn};
