//! Pool tuning knobs.

use std::time::Duration;

use mssql_conn::{Error, Result};

/// Pool configuration for one attachment.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on idle + active connections.
    pub max_size: usize,
    /// Idle connections older than this are swept.
    pub idle_timeout: Duration,
    /// How long an acquisition may wait for a slot.
    pub acquire_timeout: Duration,
    /// Reset server-side session state on the first request after each
    /// acquisition.
    pub reset_on_acquire: bool,
    /// Deadline for the `SELECT 1` probe on reused connections.
    pub probe_timeout: Duration,
    /// Cadence of the idle sweeper.
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(30),
            reset_on_acquire: true,
            probe_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// Defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection cap.
    #[must_use]
    pub fn max_size(mut self, max: usize) -> Self {
        self.max_size = max;
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the acquisition deadline.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Enable or disable reset-on-acquire.
    #[must_use]
    pub fn reset_on_acquire(mut self, enabled: bool) -> Self {
        self.reset_on_acquire = enabled;
        self
    }

    /// Reject nonsensical settings.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::Config(
                "connection_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
