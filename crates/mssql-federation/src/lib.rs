//! # mssql-federation
//!
//! The catalog-facing half of the federation core: per-attachment settings
//! and lifecycle, the three-level lazy metadata cache over `sys.*` views,
//! scan query synthesis with projection/filter/ORDER BY/TOP-N pushdown,
//! and the plan rewriter that moves ordering and limits into the remote
//! query when that is provably safe.
//!
//! The host engine talks to this crate through [`Catalog`] (entity
//! discovery, exec/scan passthrough) and [`ScanPlan`] (bind artifact for
//! table scans). Everything below rides on `mssql-pool` / `mssql-conn`.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cache;
pub mod catalog;
pub mod expr;
pub mod optimizer;
pub mod scan;
pub mod settings;
pub mod sqlgen;

pub use cache::{ColumnInfo, EntityKind, LoadState, LogicalType, MetadataCache, TableSnapshot};
pub use catalog::{Catalog, SecretResolver};
pub use expr::{CompareOp, FilterExpr, ScalarExpr, ScalarFunc, SortKey};
pub use optimizer::{PlanNode, push_down};
pub use scan::{ScanExec, ScanPlan, ScanRegistry};
pub use settings::AttachmentSettings;
pub use sqlgen::{QueryGen, RenderedScan, escape_ident};

/// The federation layer shares the session error taxonomy.
pub use mssql_conn::{Error, Result};
