//! Bearer token representation.

use chrono::{DateTime, SecondsFormat, Utc};

/// An access token for federated authentication.
#[derive(Clone)]
pub struct AccessToken {
    /// The raw token string.
    pub secret: String,
    /// Expiry, absent for tokens without expiry metadata.
    pub expires_at: Option<DateTime<Utc>>,
    /// Audience the token was issued for.
    pub audience: String,
    /// Whether the owning strategy may refresh this token. Manually
    /// supplied tokens are not refreshable.
    pub refreshable: bool,
}

impl AccessToken {
    /// A caller-supplied token; never refreshed.
    #[must_use]
    pub fn manual(secret: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
            audience: String::new(),
            refreshable: false,
        }
    }

    /// A provider-issued token; eligible for refresh.
    #[must_use]
    pub fn issued(
        secret: impl Into<String>,
        expires_at: DateTime<Utc>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            secret: secret.into(),
            expires_at: Some(expires_at),
            audience: audience.into(),
            refreshable: true,
        }
    }

    /// Seconds of lifetime left; `None` when the token has no expiry.
    #[must_use]
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|at| (at - now).num_seconds())
    }

    /// True once past expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Expiry formatted for error messages.
    #[must_use]
    pub fn expiry_display(&self) -> String {
        match self.expires_at {
            Some(at) => at.to_rfc3339_opts(SecondsFormat::Secs, true),
            None => "never".to_string(),
        }
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the token material in logs.
        f.debug_struct("AccessToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("audience", &self.audience)
            .field("refreshable", &self.refreshable)
            .finish()
    }
}
