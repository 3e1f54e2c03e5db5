//! Scan plans and bind-time stream handoff.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use mssql_conn::ResultStream;
use mssql_pool::PooledConn;
use parking_lot::Mutex;

use crate::cache::TableSnapshot;
use crate::expr::{FilterExpr, SortKey};

/// Bind artifact for one table scan.
///
/// Created when the host binds a query; carries everything needed to
/// materialize the remote SELECT at init time. The optimizer callback
/// mutates `order_by` / `top_n` in place after the built-in optimizer ran.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    /// Target table metadata snapshot.
    pub table: TableSnapshot,
    /// Projected column ordinals, in output order.
    pub projection: Vec<usize>,
    /// Filter predicates; pushed where renderable, re-applied by the host
    /// either way.
    pub filters: Vec<FilterExpr>,
    /// Requested ordering, when the optimizer moved it into the scan.
    pub order_by: Vec<SortKey>,
    /// TOP N, when a limit sits directly over a fully-pushed ordering.
    pub top_n: Option<u64>,
    /// Project row identity (primary key columns).
    pub include_rowid: bool,
    /// Handle into the [`ScanRegistry`] when a stream was already opened
    /// at bind time.
    pub bound_stream: Option<u64>,
}

impl ScanPlan {
    /// A plan projecting the given ordinals with no pushdown extras.
    #[must_use]
    pub fn new(table: TableSnapshot, projection: Vec<usize>) -> Self {
        Self {
            table,
            projection,
            filters: Vec::new(),
            order_by: Vec::new(),
            top_n: None,
            include_rowid: false,
            bound_stream: None,
        }
    }
}

/// An executing scan: the stream plus its pushdown report.
pub struct ScanExec {
    /// The row stream, pinned to one pooled connection.
    pub stream: ResultStream<PooledConn>,
    /// The SQL that was sent.
    pub sql: String,
    /// Indices of plan filters that were pushed (host re-applies all).
    pub pushed_filters: Vec<usize>,
    /// Pushed ORDER BY prefix length.
    pub pushed_sort_keys: usize,
    /// Whether TOP N was emitted.
    pub top_applied: bool,
}

impl std::fmt::Debug for ScanExec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanExec")
            .field("sql", &self.sql)
            .field("pushed_filters", &self.pushed_filters)
            .field("pushed_sort_keys", &self.pushed_sort_keys)
            .field("top_applied", &self.top_applied)
            .finish_non_exhaustive()
    }
}

/// Registry carrying bind-time scans to init time.
///
/// When binding must already execute the query (metadata-only scans whose
/// result the planner inspects), the opened stream parks here and the plan
/// carries its handle; the scan init callback retrieves it instead of
/// re-executing. Streams are single-use.
#[derive(Default)]
pub struct ScanRegistry {
    next: AtomicU64,
    parked: Mutex<HashMap<u64, ScanExec>>,
}

impl ScanRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park an executing scan; returns its retrieval handle.
    pub fn park(&self, exec: ScanExec) -> u64 {
        let handle = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        self.parked.lock().insert(handle, exec);
        handle
    }

    /// Retrieve a parked scan. Each handle redeems once.
    pub fn take(&self, handle: u64) -> Option<ScanExec> {
        self.parked.lock().remove(&handle)
    }

    /// Number of parked scans (diagnostics).
    #[must_use]
    pub fn len(&self) -> usize {
        self.parked.lock().len()
    }

    /// True when nothing is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parked.lock().is_empty()
    }
}

impl std::fmt::Debug for ScanRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanRegistry")
            .field("parked", &self.len())
            .finish()
    }
}
