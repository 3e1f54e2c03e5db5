//! Authentication error type.

use thiserror::Error;

/// Errors from credential handling and token acquisition.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Required credentials were not supplied.
    #[error("missing credentials: {0}. Provide user/password or an access token")]
    MissingCredentials(String),

    /// A manually supplied token is past its expiry.
    #[error("token expired at {expired_at}. Supply a fresh access_token")]
    TokenExpired {
        /// ISO-8601 expiry of the rejected token.
        expired_at: String,
    },

    /// The token provider failed.
    #[error("token acquisition failed: {0}")]
    Provider(String),

    /// FEDAUTH negotiation with the server failed.
    #[error("federated authentication negotiation failed: {0}")]
    Negotiation(String),

    /// Strategy configuration is inconsistent.
    #[error("authentication configuration error: {0}")]
    Configuration(String),
}
