//! # mssql-tls
//!
//! TLS for TDS 7.x connections. The handshake records travel inside TDS
//! PRELOGIN packets ([`PreloginChannel`]); once the session is established
//! the channel switches to pass-through and TLS records flow directly on
//! the socket.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connector;
pub mod error;
pub mod prelogin_channel;

pub use config::TlsSettings;
pub use connector::TlsConnector;
pub use error::TlsError;
pub use prelogin_channel::PreloginChannel;

/// A TLS session over the PRELOGIN-wrapped transport.
pub type TlsStream<S> = tokio_rustls::client::TlsStream<PreloginChannel<S>>;
