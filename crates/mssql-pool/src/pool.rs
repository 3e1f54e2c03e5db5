//! The pool proper.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use mssql_conn::{ConnectInfo, Connection, Error, Result, SessionState};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::config::PoolConfig;

/// Connection pool for one attachment.
///
/// Invariant: `idle + active <= max_size`, with disjoint membership;
/// `active` counts connections currently surrendered to callers.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    info: ConnectInfo,
    config: PoolConfig,
    state: Mutex<PoolState>,
    released: Notify,
    next_epoch: AtomicU64,
    closed: AtomicBool,
}

struct PoolState {
    /// Idle connections, most recently used at the front.
    idle: VecDeque<Connection>,
    /// Count of connections currently checked out.
    active: usize,
}

/// Counters for observation and invariant checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Idle connections ready for reuse.
    pub idle: usize,
    /// Connections checked out.
    pub active: usize,
    /// The configured cap.
    pub max_size: usize,
}

impl Pool {
    /// Create a pool. No connection is dialed until the first acquire.
    pub fn new(info: ConnectInfo, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let pool = Self {
            inner: Arc::new(PoolInner {
                info,
                config,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    active: 0,
                }),
                released: Notify::new(),
                next_epoch: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        };
        pool.spawn_sweeper();
        Ok(pool)
    }

    /// Current counters.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            idle: state.idle.len(),
            active: state.active,
            max_size: self.inner.config.max_size,
        }
    }

    /// Acquire a connection within the configured deadline.
    ///
    /// Reused connections are probed with `SELECT 1` first; probe failures
    /// discard the connection and the search continues. A fresh dial is
    /// retried once on a transient I/O error.
    pub async fn acquire(&self) -> Result<PooledConn> {
        let deadline = Instant::now() + self.inner.config.acquire_timeout;

        loop {
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(Error::Config("pool is closed".into()));
            }

            enum Plan {
                Reuse(Connection),
                Dial,
                Wait,
            }

            let plan = {
                let mut state = self.inner.state.lock();
                if let Some(conn) = state.idle.pop_front() {
                    state.active += 1;
                    Plan::Reuse(conn)
                } else if state.active + state.idle.len() < self.inner.config.max_size {
                    state.active += 1;
                    Plan::Dial
                } else {
                    Plan::Wait
                }
            };

            match plan {
                Plan::Reuse(mut conn) => {
                    match conn.ping(self.inner.config.probe_timeout).await {
                        Ok(()) => {
                            tracing::trace!(id = conn.id(), "reusing pooled connection");
                            return Ok(self.hand_out(conn));
                        }
                        Err(e) => {
                            tracing::debug!(id = conn.id(), error = %e, "probe failed, discarding");
                            self.inner.forget_active();
                        }
                    }
                }
                Plan::Dial => match self.dial_with_retry().await {
                    Ok(conn) => return Ok(self.hand_out(conn)),
                    Err(e) => {
                        self.inner.forget_active();
                        return Err(e);
                    }
                },
                Plan::Wait => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(Error::PoolTimeout(self.inner.config.acquire_timeout));
                    }
                    let notified = self.inner.released.notified();
                    tokio::select! {
                        () = notified => {}
                        () = tokio::time::sleep(remaining) => {
                            return Err(Error::PoolTimeout(self.inner.config.acquire_timeout));
                        }
                    }
                }
            }
        }
    }

    fn hand_out(&self, mut conn: Connection) -> PooledConn {
        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
        conn.begin_epoch(epoch);
        PooledConn {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Dial a new connection, retrying once on a transient failure.
    async fn dial_with_retry(&self) -> Result<Connection> {
        match Connection::connect(&self.inner.info).await {
            Ok(conn) => Ok(conn),
            Err(first) if first.is_transient() => {
                tracing::debug!(error = %first, "transient dial failure, retrying once");
                Connection::connect(&self.inner.info).await
            }
            Err(e) => Err(e),
        }
    }

    /// Close the pool: idle connections drop, future acquisitions fail.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let mut state = self.inner.state.lock();
        for mut conn in state.idle.drain(..) {
            conn.close();
        }
        self.inner.released.notify_waiters();
    }

    fn spawn_sweeper(&self) {
        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.config.sweep_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.closed.load(Ordering::Acquire) {
                    return;
                }
                let cutoff = inner.config.idle_timeout;
                let mut state = inner.state.lock();
                let before = state.idle.len();
                state.idle.retain(|conn| conn.last_used().elapsed() <= cutoff);
                let swept = before - state.idle.len();
                drop(state);
                if swept > 0 {
                    tracing::debug!(swept, "idle sweep removed connections");
                    // Capacity opened up for waiters.
                    inner.released.notify_waiters();
                }
            }
        });
    }
}

impl PoolInner {
    /// An active connection vanished (probe failure, dial failure, or
    /// discard at release).
    fn forget_active(&self) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        drop(state);
        self.released.notify_waiters();
    }

    fn take_back(&self, mut conn: Connection, reset_on_acquire: bool) {
        if self.closed.load(Ordering::Acquire) || !conn.is_usable() {
            tracing::debug!(id = conn.id(), state = ?conn.state(), "discarding connection");
            conn.close();
            self.forget_active();
            return;
        }

        if reset_on_acquire {
            conn.schedule_reset();
        }

        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        state.idle.push_front(conn);
        drop(state);
        self.released.notify_waiters();
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("Pool")
            .field("idle", &status.idle)
            .field("active", &status.active)
            .field("max_size", &status.max_size)
            .finish()
    }
}

/// A checked-out connection; returns to the pool on drop.
///
/// A guard dropped while its connection is still `Executing` (an abandoned
/// stream) is discarded rather than recycled; use
/// [`PooledConn::drain_and_release`] to attempt an orderly return first.
pub struct PooledConn {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
}

// The connection is always present until drop.
#[allow(clippy::expect_used)]
impl PooledConn {
    /// Permanently remove the connection from the pool.
    #[must_use]
    pub fn detach(mut self) -> Connection {
        let conn = self.conn.take().expect("connection present until drop");
        self.pool.forget_active();
        conn
    }

    /// Cancel whatever is executing and return the connection in `Idle`
    /// state; discards it when draining exceeds `bound`.
    pub async fn drain_and_release(mut self, bound: Duration) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        if conn.state() == SessionState::Executing {
            let attention = conn.attention_handle();
            let drained = tokio::time::timeout(bound, async {
                if attention.send().await.is_err() {
                    return false;
                }
                loop {
                    match conn.recv_result_packet().await {
                        Ok(Some(packet)) => {
                            if packet
                                .payload
                                .windows(3)
                                .any(|w| w[0] == 0xFD && w[1] & 0x20 != 0)
                            {
                                return true;
                            }
                        }
                        _ => return false,
                    }
                }
            })
            .await
            .unwrap_or(false);

            if drained {
                attention.acknowledge();
                conn.finish_execution();
            } else {
                conn.mark_failed();
            }
        }
        // Drop returns or discards based on the final state.
    }
}

impl std::ops::Deref for PooledConn {
    type Target = Connection;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl std::ops::DerefMut for PooledConn {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.take_back(conn, self.pool.config.reset_on_acquire);
        }
    }
}

impl std::fmt::Debug for PooledConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConn")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}
