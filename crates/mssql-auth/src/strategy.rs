//! Authentication strategies.
//!
//! A closed sum of variants sharing a small capability set: decorate the
//! LOGIN7 request, report whether the FEDAUTH exchange is needed, and
//! produce a token. The programmatic variant holds a token provider as a
//! boxed async closure, keeping this crate (and the pool above it) unaware
//! of any particular identity ecosystem.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tds_wire::fedauth::{FEATURE_ID_FEDAUTH, FedAuthExt};
use tds_wire::login7::Login7;

use crate::acquirer::TokenAcquirer;
use crate::error::AuthError;
use crate::token::AccessToken;

/// Default remaining-lifetime threshold that triggers a refresh.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Boxed async closure producing fresh tokens.
pub type TokenProvider = Arc<
    dyn Fn() -> Pin<Box<dyn Future<Output = Result<AccessToken, AuthError>> + Send>> + Send + Sync,
>;

/// How a connection authenticates.
#[derive(Clone)]
pub enum AuthStrategy {
    /// SQL Server authentication: user and password ride in LOGIN7.
    SqlAuth {
        /// Login name.
        username: String,
        /// Password, obfuscated by the LOGIN7 encoder.
        password: String,
    },
    /// Federated authentication with a caller-supplied token.
    FedAuthManual {
        /// The fixed token.
        token: AccessToken,
    },
    /// Federated authentication with a programmatic provider and refresh.
    FedAuthProvider {
        /// Caching token acquirer.
        acquirer: Arc<TokenAcquirer>,
    },
}

impl AuthStrategy {
    /// SQL authentication from credentials.
    #[must_use]
    pub fn sql(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::SqlAuth {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Federated authentication from a fixed token.
    #[must_use]
    pub fn manual_token(token: AccessToken) -> Self {
        Self::FedAuthManual { token }
    }

    /// Federated authentication from a provider closure.
    #[must_use]
    pub fn provider(provider: TokenProvider, margin: Duration) -> Self {
        Self::FedAuthProvider {
            acquirer: Arc::new(TokenAcquirer::new(provider, margin)),
        }
    }

    /// Decorate the LOGIN7 request for this strategy.
    ///
    /// `fedauth_echo` must carry the server's FEDAUTHREQUIRED answer from
    /// PRELOGIN; the FEDAUTH extension echoes it back.
    pub fn apply_to_login7(&self, login: &mut Login7, fedauth_echo: bool) {
        match self {
            Self::SqlAuth { username, password } => {
                login.username = username.clone();
                login.password = password.clone();
            }
            Self::FedAuthManual { .. } | Self::FedAuthProvider { .. } => {
                let ext = FedAuthExt {
                    echo: fedauth_echo,
                };
                login.add_feature(FEATURE_ID_FEDAUTH, ext.encode());
            }
        }
    }

    /// True when the FEDAUTHINFO / token-message exchange follows LOGIN7.
    #[must_use]
    pub fn needs_fedauth(&self) -> bool {
        !matches!(self, Self::SqlAuth { .. })
    }

    /// Produce the bearer token for the FEDAUTH exchange.
    ///
    /// Manual tokens are returned as-is while valid and fail permanently
    /// once expired. Provider tokens are fetched/refreshed through the
    /// acquirer.
    pub async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        match self {
            Self::SqlAuth { .. } => Err(AuthError::Configuration(
                "SQL authentication does not use tokens".into(),
            )),
            Self::FedAuthManual { token } => {
                if token.is_expired(Utc::now()) {
                    return Err(AuthError::TokenExpired {
                        expired_at: token.expiry_display(),
                    });
                }
                Ok(token.clone())
            }
            Self::FedAuthProvider { acquirer } => acquirer.token().await,
        }
    }

    /// Remaining-lifetime threshold below which tokens refresh.
    #[must_use]
    pub fn refresh_margin(&self) -> Duration {
        match self {
            Self::FedAuthProvider { acquirer } => acquirer.margin(),
            _ => DEFAULT_REFRESH_MARGIN,
        }
    }
}

impl std::fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SqlAuth { username, .. } => f
                .debug_struct("SqlAuth")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::FedAuthManual { token } => f
                .debug_struct("FedAuthManual")
                .field("token", token)
                .finish(),
            Self::FedAuthProvider { .. } => f.debug_struct("FedAuthProvider").finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sql_auth_fills_login7() {
        let strategy = AuthStrategy::sql("reader", "pw");
        let mut login = Login7::new();
        strategy.apply_to_login7(&mut login, false);

        assert_eq!(login.username, "reader");
        assert_eq!(login.password, "pw");
        assert!(login.features.is_empty());
        assert!(!strategy.needs_fedauth());
    }

    #[test]
    fn fedauth_adds_feature_extension() {
        let strategy = AuthStrategy::manual_token(AccessToken::manual("tok", None));
        let mut login = Login7::new();
        strategy.apply_to_login7(&mut login, true);

        assert!(strategy.needs_fedauth());
        assert_eq!(login.features.len(), 1);
        assert_eq!(login.features[0].0, FEATURE_ID_FEDAUTH);
    }

    #[tokio::test]
    async fn expired_manual_token_fails_with_timestamp() {
        let past = Utc::now() - chrono::Duration::hours(1);
        let strategy = AuthStrategy::manual_token(AccessToken::manual("tok", Some(past)));

        let err = strategy.fetch_token().await.unwrap_err();
        match err {
            AuthError::TokenExpired { expired_at } => {
                assert!(expired_at.contains('T'), "expected ISO-8601: {expired_at}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn valid_manual_token_is_returned() {
        let future = Utc::now() + chrono::Duration::hours(1);
        let strategy = AuthStrategy::manual_token(AccessToken::manual("tok", Some(future)));
        assert_eq!(strategy.fetch_token().await.unwrap().secret, "tok");
    }
}
