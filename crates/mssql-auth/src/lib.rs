//! # mssql-auth
//!
//! Authentication strategies for the federation core: SQL Server
//! authentication (credentials in LOGIN7) and federated authentication via
//! bearer tokens, either caller-supplied or produced by a programmatic
//! provider with background refresh.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod acquirer;
#[cfg(feature = "azure-identity")]
pub mod azure;
pub mod error;
pub mod strategy;
pub mod token;

pub use acquirer::TokenAcquirer;
pub use error::AuthError;
pub use strategy::{AuthStrategy, TokenProvider};
pub use token::AccessToken;
