//! Caching token acquirer with margin-based refresh.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::AuthError;
use crate::strategy::TokenProvider;
use crate::token::AccessToken;

/// Holds the current token and refreshes it through the provider when its
/// remaining lifetime drops to the margin.
///
/// Refreshes are serialized: concurrent callers block on the same mutex, so
/// a burst of acquisitions near expiry issues exactly one provider call.
pub struct TokenAcquirer {
    provider: TokenProvider,
    margin: Duration,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenAcquirer {
    /// New acquirer with an empty cache.
    #[must_use]
    pub fn new(provider: TokenProvider, margin: Duration) -> Self {
        Self {
            provider,
            margin,
            cached: Mutex::new(None),
        }
    }

    /// Refresh margin.
    #[must_use]
    pub fn margin(&self) -> Duration {
        self.margin
    }

    /// Current token, refreshed if missing or inside the margin.
    pub async fn token(&self) -> Result<AccessToken, AuthError> {
        let mut slot = self.cached.lock().await;

        let now = Utc::now();
        let needs_fetch = match slot.as_ref() {
            None => true,
            Some(token) => token
                .remaining_secs(now)
                .is_some_and(|secs| secs <= self.margin.as_secs() as i64),
        };

        if needs_fetch {
            tracing::debug!(margin_secs = self.margin.as_secs(), "refreshing access token");
            let fresh = (self.provider)().await?;
            *slot = Some(fresh);
        }

        slot.clone().ok_or_else(|| {
            AuthError::Provider("token provider returned no token".into())
        })
    }

    /// Drop the cached token so the next call re-fetches.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }
}

impl std::fmt::Debug for TokenAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAcquirer")
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn counting_provider(
        counter: Arc<AtomicU32>,
        lifetime: chrono::Duration,
    ) -> TokenProvider {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Ok(AccessToken::issued(
                    format!("token-{n}"),
                    Utc::now() + lifetime,
                    "db",
                ))
            })
        })
    }

    #[tokio::test]
    async fn long_lived_token_fetched_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let acquirer = TokenAcquirer::new(
            counting_provider(Arc::clone(&counter), chrono::Duration::hours(1)),
            Duration::from_secs(300),
        );

        let first = acquirer.token().await.unwrap();
        let second = acquirer.token().await.unwrap();
        assert_eq!(first.secret, second.secret);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_inside_margin_refreshes_once() {
        let counter = Arc::new(AtomicU32::new(0));
        // Lifetime below the margin: every cached copy is already stale.
        let acquirer = TokenAcquirer::new(
            counting_provider(Arc::clone(&counter), chrono::Duration::seconds(10)),
            Duration::from_secs(300),
        );

        acquirer.token().await.unwrap();
        acquirer.token().await.unwrap();
        // Initial fetch plus one refresh on the second call.
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let counter = Arc::new(AtomicU32::new(0));
        let acquirer = TokenAcquirer::new(
            counting_provider(Arc::clone(&counter), chrono::Duration::hours(1)),
            Duration::from_secs(300),
        );

        acquirer.token().await.unwrap();
        acquirer.invalidate().await;
        acquirer.token().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provider_errors_surface() {
        let provider: TokenProvider = Arc::new(|| {
            Box::pin(async { Err(AuthError::Provider("sts unreachable".into())) })
        });
        let acquirer = TokenAcquirer::new(provider, Duration::from_secs(300));
        assert!(acquirer.token().await.is_err());
    }
}
