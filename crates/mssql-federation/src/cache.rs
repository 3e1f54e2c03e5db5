//! Three-level lazy metadata cache: schemas, tables, columns.
//!
//! Each level carries a load state and refresh stamp. Loads are lazy and
//! serialized per entry: the schema map, each schema's table list, and
//! each table's column set have their own async load guard, so parallel
//! schemas load without contention while concurrent readers of one entry
//! either see fresh data or wait for the single in-flight load.
//!
//! Point invalidation flips the relevant state back to `NotLoaded` without
//! clearing data; stale reads stay available until the next access
//! triggers a reload.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mssql_conn::{Error, ResultStream, Result};
use mssql_pool::Pool;
use mssql_values::SqlValue;
use parking_lot::Mutex;
use regex::Regex;

/// Load state of one cache level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Never loaded (or invalidated).
    #[default]
    NotLoaded,
    /// A load is in flight.
    Loading,
    /// Loaded; fresh until the TTL says otherwise.
    Loaded,
}

/// Table or view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A base table.
    Table,
    /// A view; scans work, writes are refused.
    View,
}

/// Host-side logical type a remote column maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalType {
    /// BIT.
    Boolean,
    /// TINYINT.
    TinyInt,
    /// SMALLINT.
    SmallInt,
    /// INT.
    Integer,
    /// BIGINT.
    BigInt,
    /// REAL.
    Float,
    /// FLOAT.
    Double,
    /// DECIMAL / NUMERIC / MONEY.
    Decimal,
    /// Character data.
    Varchar,
    /// Binary data.
    Binary,
    /// UNIQUEIDENTIFIER.
    Uuid,
    /// DATE.
    Date,
    /// TIME.
    Time,
    /// DATETIME / DATETIME2 / SMALLDATETIME.
    Timestamp,
    /// DATETIMEOFFSET.
    TimestampTz,
    /// XML.
    Xml,
}

impl LogicalType {
    /// Map a `sys.types` name.
    #[must_use]
    pub fn from_type_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "bit" => Self::Boolean,
            "tinyint" => Self::TinyInt,
            "smallint" => Self::SmallInt,
            "int" => Self::Integer,
            "bigint" => Self::BigInt,
            "real" => Self::Float,
            "float" => Self::Double,
            "decimal" | "numeric" | "money" | "smallmoney" => Self::Decimal,
            "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => Self::Binary,
            "uniqueidentifier" => Self::Uuid,
            "date" => Self::Date,
            "time" => Self::Time,
            "datetime" | "datetime2" | "smalldatetime" => Self::Timestamp,
            "datetimeoffset" => Self::TimestampTz,
            "xml" => Self::Xml,
            _ => Self::Varchar,
        }
    }
}

/// One remote column as the catalog presents it.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Dense ordinal, 0-based.
    pub ordinal: usize,
    /// Column name, case preserved.
    pub name: String,
    /// SQL Server type name.
    pub type_name: String,
    /// Host-side logical type.
    pub logical: LogicalType,
    /// Nullability.
    pub nullable: bool,
    /// Declared max length in bytes; -1 for MAX types.
    pub max_length: i32,
    /// Numeric precision.
    pub precision: u8,
    /// Numeric/temporal scale.
    pub scale: u8,
    /// Collation name for character columns.
    pub collation_name: Option<String>,
    /// Identity column.
    pub is_identity: bool,
}

impl ColumnInfo {
    /// True for CHAR/VARCHAR (non-unicode character) columns.
    #[must_use]
    pub fn is_single_byte_char(&self) -> bool {
        matches!(
            self.type_name.to_ascii_lowercase().as_str(),
            "char" | "varchar" | "text"
        )
    }

    /// True when the column's collation folds case.
    #[must_use]
    pub fn collation_is_case_insensitive(&self) -> bool {
        self.collation_name
            .as_deref()
            .is_some_and(|name| name.to_ascii_uppercase().contains("_CI"))
    }

    /// True when the collation stores UTF-8.
    #[must_use]
    pub fn collation_is_utf8(&self) -> bool {
        self.collation_name
            .as_deref()
            .is_some_and(|name| name.to_ascii_uppercase().ends_with("_UTF8"))
    }
}

/// Immutable table metadata snapshot handed to scan binding.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    /// Owning schema name.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Table or view.
    pub kind: EntityKind,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnInfo>,
    /// Primary key column names, possibly empty or composite.
    pub primary_key: Vec<String>,
    /// Default collation observed on the table's character columns.
    pub default_collation: Option<String>,
    /// Row-count estimate from `sys.partitions`, when preloaded.
    pub row_count: Option<u64>,
}

impl TableSnapshot {
    /// Find a column by exact name (SQL Server identifiers are compared
    /// per collation; the catalog keeps the server's casing).
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Counters returned by the bulk preload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadSummary {
    /// Schemas cached.
    pub schemas: usize,
    /// Tables and views cached.
    pub tables: usize,
    /// Columns cached.
    pub columns: usize,
}

struct Level<T> {
    state: LoadState,
    stamp: Option<Instant>,
    entries: T,
}

impl<T: Default> Default for Level<T> {
    fn default() -> Self {
        Self {
            state: LoadState::NotLoaded,
            stamp: None,
            entries: T::default(),
        }
    }
}

struct SchemaEntry {
    name: String,
    tables: Mutex<Level<BTreeMap<String, Arc<TableEntry>>>>,
    guard: tokio::sync::Mutex<()>,
}

struct TableEntry {
    schema: String,
    name: String,
    kind: EntityKind,
    columns: Mutex<Level<ColumnsSlot>>,
    guard: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct ColumnsSlot {
    columns: Vec<ColumnInfo>,
    primary_key: Vec<String>,
    row_count: Option<u64>,
}

/// The cache proper.
pub struct MetadataCache {
    ttl: Option<Duration>,
    schema_filter: Option<Regex>,
    table_filter: Option<Regex>,
    root: Mutex<Level<BTreeMap<String, Arc<SchemaEntry>>>>,
    root_guard: tokio::sync::Mutex<()>,
}

impl MetadataCache {
    /// Empty cache with the attachment's filters and TTL.
    #[must_use]
    pub fn new(
        schema_filter: Option<Regex>,
        table_filter: Option<Regex>,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            ttl,
            schema_filter,
            table_filter,
            root: Mutex::new(Level::default()),
            root_guard: tokio::sync::Mutex::new(()),
        }
    }

    fn fresh(&self, state: LoadState, stamp: Option<Instant>) -> bool {
        if state != LoadState::Loaded {
            return false;
        }
        match (self.ttl, stamp) {
            (Some(ttl), Some(at)) => at.elapsed() <= ttl,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    fn schema_passes(&self, name: &str) -> bool {
        self.schema_filter.as_ref().is_none_or(|r| r.is_match(name))
    }

    fn table_passes(&self, name: &str) -> bool {
        self.table_filter.as_ref().is_none_or(|r| r.is_match(name))
    }

    /// Schema names, loading from `sys.schemas` on miss or TTL expiry.
    pub async fn schema_names(&self, pool: &Pool) -> Result<Vec<String>> {
        self.ensure_schemas(pool).await?;
        let root = self.root.lock();
        Ok(root.entries.keys().cloned().collect())
    }

    /// Table names of one schema, loading from `sys.objects` on demand.
    pub async fn table_names(&self, pool: &Pool, schema: &str) -> Result<Vec<String>> {
        let entry = self.schema_entry(pool, schema).await?;
        self.ensure_tables(pool, &entry).await?;
        let tables = entry.tables.lock();
        Ok(tables.entries.keys().cloned().collect())
    }

    /// Full table metadata, loading columns and primary key on demand.
    pub async fn table_snapshot(
        &self,
        pool: &Pool,
        schema: &str,
        table: &str,
    ) -> Result<TableSnapshot> {
        let schema_entry = self.schema_entry(pool, schema).await?;
        self.ensure_tables(pool, &schema_entry).await?;

        let table_entry = {
            let tables = schema_entry.tables.lock();
            tables.entries.get(table).cloned()
        }
        .ok_or_else(|| {
            Error::Config(format!(
                "unknown table {schema}.{table}. Check the table_filter and remote permissions"
            ))
        })?;

        self.ensure_columns(pool, &table_entry).await?;

        let slot = table_entry.columns.lock();
        let default_collation = slot
            .entries
            .columns
            .iter()
            .find_map(|c| c.collation_name.clone());
        Ok(TableSnapshot {
            schema: table_entry.schema.clone(),
            name: table_entry.name.clone(),
            kind: table_entry.kind,
            columns: slot.entries.columns.clone(),
            primary_key: slot.entries.primary_key.clone(),
            default_collation,
            row_count: slot.entries.row_count,
        })
    }

    /// Invalidate the whole cache; data stays for stale reads until the
    /// next access reloads.
    pub fn invalidate_all(&self) {
        let mut root = self.root.lock();
        root.state = LoadState::NotLoaded;
        for schema in root.entries.values() {
            schema.tables.lock().state = LoadState::NotLoaded;
        }
    }

    /// Invalidate one schema's table list.
    pub fn invalidate_schema(&self, schema: &str) {
        let root = self.root.lock();
        if let Some(entry) = root.entries.get(schema) {
            entry.tables.lock().state = LoadState::NotLoaded;
        }
    }

    /// Invalidate one table's column set.
    pub fn invalidate_table(&self, schema: &str, table: &str) {
        let root = self.root.lock();
        let Some(schema_entry) = root.entries.get(schema) else {
            return;
        };
        let tables = schema_entry.tables.lock();
        if let Some(table_entry) = tables.entries.get(table) {
            table_entry.columns.lock().state = LoadState::NotLoaded;
        }
    }

    async fn schema_entry(&self, pool: &Pool, schema: &str) -> Result<Arc<SchemaEntry>> {
        self.ensure_schemas(pool).await?;
        let root = self.root.lock();
        root.entries.get(schema).cloned().ok_or_else(|| {
            Error::Config(format!(
                "unknown schema {schema}. Check the schema_filter option"
            ))
        })
    }

    async fn ensure_schemas(&self, pool: &Pool) -> Result<()> {
        {
            let root = self.root.lock();
            if self.fresh(root.state, root.stamp) {
                return Ok(());
            }
        }

        let _guard = self.root_guard.lock().await;
        {
            let mut root = self.root.lock();
            if self.fresh(root.state, root.stamp) {
                return Ok(());
            }
            root.state = LoadState::Loading;
        }

        let rows = query_rows(pool, "SELECT name FROM sys.schemas ORDER BY name", &[]).await;
        let mut root = self.root.lock();
        match rows {
            Ok(rows) => {
                let mut entries = BTreeMap::new();
                for row in rows {
                    let name = str_of(&row[0])?;
                    if !self.schema_passes(&name) {
                        continue;
                    }
                    // Keep existing entries so loaded tables survive refresh.
                    let entry = root.entries.remove(&name).unwrap_or_else(|| {
                        Arc::new(SchemaEntry {
                            name: name.clone(),
                            tables: Mutex::new(Level::default()),
                            guard: tokio::sync::Mutex::new(()),
                        })
                    });
                    entries.insert(name, entry);
                }
                root.entries = entries;
                root.state = LoadState::Loaded;
                root.stamp = Some(Instant::now());
                tracing::debug!(schemas = root.entries.len(), "schema list loaded");
                Ok(())
            }
            Err(e) => {
                root.state = LoadState::NotLoaded;
                Err(e)
            }
        }
    }

    async fn ensure_tables(&self, pool: &Pool, schema: &Arc<SchemaEntry>) -> Result<()> {
        {
            let tables = schema.tables.lock();
            if self.fresh(tables.state, tables.stamp) {
                return Ok(());
            }
        }

        let _guard = schema.guard.lock().await;
        {
            let mut tables = schema.tables.lock();
            if self.fresh(tables.state, tables.stamp) {
                return Ok(());
            }
            tables.state = LoadState::Loading;
        }

        let rows = query_rows(
            pool,
            "SELECT o.name, o.type FROM sys.objects o \
             JOIN sys.schemas s ON o.schema_id = s.schema_id \
             WHERE s.name = @schema AND o.type IN ('U', 'V') ORDER BY o.name",
            &[("@schema", &schema.name)],
        )
        .await;

        let mut tables = schema.tables.lock();
        match rows {
            Ok(rows) => {
                let mut entries = BTreeMap::new();
                for row in rows {
                    let name = str_of(&row[0])?;
                    if !self.table_passes(&name) {
                        continue;
                    }
                    let kind = match str_of(&row[1])?.trim() {
                        "V" => EntityKind::View,
                        _ => EntityKind::Table,
                    };
                    let entry = tables.entries.remove(&name).unwrap_or_else(|| {
                        Arc::new(TableEntry {
                            schema: schema.name.clone(),
                            name: name.clone(),
                            kind,
                            columns: Mutex::new(Level::default()),
                            guard: tokio::sync::Mutex::new(()),
                        })
                    });
                    entries.insert(name, entry);
                }
                tables.entries = entries;
                tables.state = LoadState::Loaded;
                tables.stamp = Some(Instant::now());
                tracing::debug!(
                    schema = %schema.name,
                    tables = tables.entries.len(),
                    "table list loaded"
                );
                Ok(())
            }
            Err(e) => {
                tables.state = LoadState::NotLoaded;
                Err(e)
            }
        }
    }

    async fn ensure_columns(&self, pool: &Pool, table: &Arc<TableEntry>) -> Result<()> {
        {
            let columns = table.columns.lock();
            if self.fresh(columns.state, columns.stamp) {
                return Ok(());
            }
        }

        let _guard = table.guard.lock().await;
        {
            let mut columns = table.columns.lock();
            if self.fresh(columns.state, columns.stamp) {
                return Ok(());
            }
            columns.state = LoadState::Loading;
        }

        let loaded = self.load_columns(pool, table).await;
        let mut columns = table.columns.lock();
        match loaded {
            Ok(slot) => {
                columns.entries = slot;
                columns.state = LoadState::Loaded;
                columns.stamp = Some(Instant::now());
                Ok(())
            }
            Err(e) => {
                columns.state = LoadState::NotLoaded;
                Err(e)
            }
        }
    }

    /// One round trip loads columns and primary-key membership together:
    /// the key-constraint join rides along as a nullable `key_ordinal`.
    async fn load_columns(&self, pool: &Pool, table: &TableEntry) -> Result<ColumnsSlot> {
        let rows = query_rows(
            pool,
            "SELECT c.column_id, c.name, t.name, c.max_length, c.precision, c.scale, \
             c.is_nullable, c.is_identity, c.collation_name, pk.key_ordinal \
             FROM sys.columns c \
             JOIN sys.types t ON c.user_type_id = t.user_type_id \
             JOIN sys.objects o ON c.object_id = o.object_id \
             JOIN sys.schemas s ON o.schema_id = s.schema_id \
             LEFT JOIN (SELECT ic.object_id, ic.column_id, ic.key_ordinal \
                        FROM sys.key_constraints kc \
                        JOIN sys.index_columns ic ON kc.parent_object_id = ic.object_id \
                        AND kc.unique_index_id = ic.index_id \
                        WHERE kc.type = 'PK') pk \
             ON pk.object_id = c.object_id AND pk.column_id = c.column_id \
             WHERE s.name = @schema AND o.name = @table ORDER BY c.column_id",
            &[("@schema", &table.schema), ("@table", &table.name)],
        )
        .await?;

        if rows.is_empty() {
            return Err(Error::Config(format!(
                "table {}.{} has no visible columns. Check remote permissions",
                table.schema, table.name
            )));
        }

        let mut columns = Vec::with_capacity(rows.len());
        let mut keyed: Vec<(i64, String)> = Vec::new();
        for (ordinal, row) in rows.into_iter().enumerate() {
            let column = column_from_row(ordinal, &row)?;
            if let Some(ordinal) = row[9].as_i64() {
                keyed.push((ordinal, column.name.clone()));
            }
            columns.push(column);
        }
        keyed.sort_by_key(|(ordinal, _)| *ordinal);
        let primary_key: Vec<String> = keyed.into_iter().map(|(_, name)| name).collect();

        tracing::debug!(
            schema = %table.schema,
            table = %table.name,
            columns = columns.len(),
            pk = primary_key.len(),
            "column metadata loaded"
        );

        Ok(ColumnsSlot {
            columns,
            primary_key,
            row_count: None,
        })
    }

    /// Bulk preload: one joined round trip fills all three levels.
    pub async fn preload(&self, pool: &Pool, only_schema: Option<&str>) -> Result<PreloadSummary> {
        let _root_guard = self.root_guard.lock().await;

        let statement = "SELECT s.name, o.name, o.type, c.column_id, c.name, t.name, \
             c.max_length, c.precision, c.scale, c.is_nullable, c.is_identity, \
             c.collation_name, p.rows \
             FROM sys.schemas s \
             JOIN sys.objects o ON o.schema_id = s.schema_id \
             JOIN sys.columns c ON c.object_id = o.object_id \
             JOIN sys.types t ON t.user_type_id = c.user_type_id \
             LEFT JOIN (SELECT object_id, SUM(rows) AS rows FROM sys.partitions \
                        WHERE index_id IN (0, 1) GROUP BY object_id) p \
             ON p.object_id = o.object_id \
             WHERE o.type IN ('U', 'V') AND (@schema IS NULL OR s.name = @schema) \
             ORDER BY s.name, o.name, c.column_id";
        let schema_arg = only_schema.unwrap_or("");
        let rows = if only_schema.is_some() {
            query_rows(pool, statement, &[("@schema", schema_arg)]).await?
        } else {
            query_rows(
                pool,
                &statement.replace("(@schema IS NULL OR s.name = @schema)", "1 = 1"),
                &[],
            )
            .await?
        };

        let mut summary = PreloadSummary::default();
        let mut root = self.root.lock();

        // Group rows by (schema, table); rows arrive ordered.
        let mut current: Option<(String, String, EntityKind, Option<u64>, Vec<ColumnInfo>)> = None;
        let flush = |root: &mut Level<BTreeMap<String, Arc<SchemaEntry>>>,
                         group: (String, String, EntityKind, Option<u64>, Vec<ColumnInfo>),
                         summary: &mut PreloadSummary| {
            let (schema_name, table_name, kind, row_count, columns) = group;
            let schema = root
                .entries
                .entry(schema_name.clone())
                .or_insert_with(|| {
                    Arc::new(SchemaEntry {
                        name: schema_name.clone(),
                        tables: Mutex::new(Level::default()),
                        guard: tokio::sync::Mutex::new(()),
                    })
                })
                .clone();

            summary.tables += 1;
            summary.columns += columns.len();

            let mut tables = schema.tables.lock();
            let entry = Arc::new(TableEntry {
                schema: schema_name,
                name: table_name.clone(),
                kind,
                columns: Mutex::new(Level {
                    state: LoadState::Loaded,
                    stamp: Some(Instant::now()),
                    entries: ColumnsSlot {
                        columns,
                        primary_key: Vec::new(),
                        row_count,
                    },
                }),
                guard: tokio::sync::Mutex::new(()),
            });
            tables.entries.insert(table_name, entry);
            tables.state = LoadState::Loaded;
            tables.stamp = Some(Instant::now());
        };

        for row in rows {
            let schema_name = str_of(&row[0])?;
            if !self.schema_passes(&schema_name) {
                continue;
            }
            let table_name = str_of(&row[1])?;
            if !self.table_passes(&table_name) {
                continue;
            }
            let kind = match str_of(&row[2])?.trim() {
                "V" => EntityKind::View,
                _ => EntityKind::Table,
            };
            let row_count = match &row[12] {
                SqlValue::Null => None,
                value => value.as_i64().map(|v| v.max(0) as u64),
            };

            let starts_new_group = current
                .as_ref()
                .is_none_or(|(s, t, ..)| s != &schema_name || t != &table_name);
            if starts_new_group {
                if let Some(group) = current.take() {
                    flush(&mut root, group, &mut summary);
                }
                current = Some((schema_name, table_name, kind, row_count, Vec::new()));
            }

            if let Some((.., columns)) = current.as_mut() {
                let ordinal = columns.len();
                columns.push(column_from_row(ordinal, &row[3..])?);
            }
        }
        if let Some(group) = current.take() {
            flush(&mut root, group, &mut summary);
        }

        summary.schemas = root.entries.len();
        root.state = LoadState::Loaded;
        root.stamp = Some(Instant::now());

        tracing::info!(
            schemas = summary.schemas,
            tables = summary.tables,
            columns = summary.columns,
            "catalog preloaded"
        );
        Ok(summary)
    }
}

/// Build a [`ColumnInfo`] from a metadata row slice starting at column_id.
fn column_from_row(ordinal: usize, row: &[SqlValue]) -> Result<ColumnInfo> {
    let name = str_of(&row[1])?;
    let type_name = str_of(&row[2])?;
    Ok(ColumnInfo {
        ordinal,
        logical: LogicalType::from_type_name(&type_name),
        nullable: bool_of(&row[6]),
        max_length: int_of(&row[3])? as i32,
        precision: int_of(&row[4])? as u8,
        scale: int_of(&row[5])? as u8,
        is_identity: bool_of(&row[7]),
        collation_name: match &row[8] {
            SqlValue::Null => None,
            value => Some(str_of(value)?),
        },
        name,
        type_name,
    })
}

/// Run a metadata query and collect all rows. Parameterized statements go
/// out as `sp_executesql` RPCs; parameterless ones as plain batches.
async fn query_rows(
    pool: &Pool,
    statement: &str,
    params: &[(&str, &str)],
) -> Result<Vec<Vec<SqlValue>>> {
    let mut conn = pool.acquire().await?;
    if params.is_empty() {
        conn.begin_batch(statement).await?;
    } else {
        conn.begin_rpc(statement, params).await?;
    }

    let mut stream = ResultStream::new(conn, None, false);
    let mut rows = Vec::new();
    while let Some(batch) = stream.next_batch(1024).await? {
        for i in 0..batch.len() {
            rows.push(batch.row(i));
        }
    }
    Ok(rows)
}

fn str_of(value: &SqlValue) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Protocol(format!("expected string in catalog row, got {value:?}")))
}

fn int_of(value: &SqlValue) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| Error::Protocol(format!("expected integer in catalog row, got {value:?}")))
}

fn bool_of(value: &SqlValue) -> bool {
    match value {
        SqlValue::Bool(b) => *b,
        other => other.as_i64().is_some_and(|v| v != 0),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn logical_type_mapping() {
        assert_eq!(LogicalType::from_type_name("INT"), LogicalType::Integer);
        assert_eq!(LogicalType::from_type_name("nvarchar"), LogicalType::Varchar);
        assert_eq!(
            LogicalType::from_type_name("datetimeoffset"),
            LogicalType::TimestampTz
        );
        assert_eq!(LogicalType::from_type_name("sysname"), LogicalType::Varchar);
    }

    #[test]
    fn collation_predicates() {
        let col = ColumnInfo {
            ordinal: 0,
            name: "n".into(),
            type_name: "varchar".into(),
            logical: LogicalType::Varchar,
            nullable: true,
            max_length: 20,
            precision: 0,
            scale: 0,
            collation_name: Some("SQL_Latin1_General_CP1_CI_AS".into()),
            is_identity: false,
        };
        assert!(col.collation_is_case_insensitive());
        assert!(!col.collation_is_utf8());
        assert!(col.is_single_byte_char());

        let cs = ColumnInfo {
            collation_name: Some("Latin1_General_CS_AS".into()),
            ..col.clone()
        };
        assert!(!cs.collation_is_case_insensitive());

        let utf8 = ColumnInfo {
            collation_name: Some("Latin1_General_100_CI_AS_SC_UTF8".into()),
            ..col
        };
        assert!(utf8.collation_is_utf8());
    }
}
