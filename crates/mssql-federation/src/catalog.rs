//! Per-attachment catalog: lifecycle, entity discovery, and the
//! host-facing operations (`preload_catalog`, `refresh_catalog`, `exec`,
//! `scan`).

use std::time::Duration;

use mssql_conn::{ColumnMeta, Error, ResultStream, Result};
use mssql_pool::Pool;
use tds_wire::TypeId;

use crate::cache::{
    ColumnInfo, EntityKind, LogicalType, MetadataCache, PreloadSummary, TableSnapshot,
};
use crate::scan::{ScanExec, ScanPlan, ScanRegistry};
use crate::settings::AttachmentSettings;
use crate::sqlgen::QueryGen;

/// Host-provided secret lookup.
///
/// The core never stores secrets: they are resolved through this callback
/// each time an attachment materializes, and the payload is a plain option
/// list layered below ATTACH options and the connection string.
pub trait SecretResolver: Send + Sync {
    /// Option pairs stored under `name`, or `None` when unknown.
    fn resolve(&self, name: &str) -> Option<Vec<(String, String)>>;
}

/// One attached SQL Server catalog.
pub struct Catalog {
    name: String,
    settings: AttachmentSettings,
    pool: Pool,
    cache: MetadataCache,
    registry: ScanRegistry,
}

impl Catalog {
    /// Attach a catalog.
    ///
    /// Options are layered with precedence ATTACH > connection string >
    /// secret: the `connection_string` option is split into pairs, and the
    /// `secret` option names a payload from `secrets`. Filters are
    /// validated here; no connection is opened.
    pub fn attach(
        name: impl Into<String>,
        options: &[(String, String)],
        secrets: Option<&dyn SecretResolver>,
    ) -> Result<Self> {
        let name = name.into();

        let conn_string_pairs = options
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("connection_string"))
            .map(|(_, v)| split_option_pairs(v))
            .unwrap_or_default();

        let secret_pairs = match options
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("secret"))
        {
            Some((_, secret_name)) => {
                let resolver = secrets.ok_or_else(|| {
                    Error::Config(format!(
                        "attachment {name} references secret '{secret_name}' but no secret \
                         manager is available"
                    ))
                })?;
                resolver.resolve(secret_name).ok_or_else(|| {
                    Error::Config(format!("unknown secret '{secret_name}'"))
                })?
            }
            None => Vec::new(),
        };

        let attach_pairs: Vec<(String, String)> = options
            .iter()
            .filter(|(k, _)| {
                !k.eq_ignore_ascii_case("connection_string") && !k.eq_ignore_ascii_case("secret")
            })
            .cloned()
            .collect();

        let settings =
            AttachmentSettings::resolve(&[&attach_pairs, &conn_string_pairs, &secret_pairs])?;

        let pool = Pool::new(settings.connect.clone(), settings.pool.clone())?;
        let cache = MetadataCache::new(
            settings.schema_filter.clone(),
            settings.table_filter.clone(),
            settings.cache_ttl,
        );

        tracing::info!(
            attachment = %name,
            host = %settings.connect.host,
            "attached"
        );

        Ok(Self {
            name,
            settings,
            pool,
            cache,
            registry: ScanRegistry::new(),
        })
    }

    /// Attachment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective settings.
    #[must_use]
    pub fn settings(&self) -> &AttachmentSettings {
        &self.settings
    }

    /// The bind-time stream registry.
    #[must_use]
    pub fn registry(&self) -> &ScanRegistry {
        &self.registry
    }

    /// Detach: close the pool; cached metadata drops with the catalog.
    pub fn detach(self) {
        tracing::info!(attachment = %self.name, "detached");
        self.pool.close();
    }

    /// Schema names visible through the filter.
    pub async fn schema_names(&self) -> Result<Vec<String>> {
        self.cache.schema_names(&self.pool).await
    }

    /// Table and view names of a schema.
    pub async fn table_names(&self, schema: &str) -> Result<Vec<String>> {
        self.cache.table_names(&self.pool, schema).await
    }

    /// Full metadata of one table or view.
    pub async fn table(&self, schema: &str, table: &str) -> Result<TableSnapshot> {
        self.cache.table_snapshot(&self.pool, schema, table).await
    }

    /// Views scan like tables but refuse DDL/DML.
    pub fn check_writable(&self, snapshot: &TableSnapshot) -> Result<()> {
        if snapshot.kind == EntityKind::View {
            return Err(Error::Config(format!(
                "{}.{} is a view and read-only through this attachment",
                snapshot.schema, snapshot.name
            )));
        }
        Ok(())
    }

    /// Drop one table's cached columns; next access reloads them.
    pub fn invalidate_table(&self, schema: &str, table: &str) {
        self.cache.invalidate_table(schema, table);
    }

    /// Drop one schema's cached table list.
    pub fn invalidate_schema(&self, schema: &str) {
        self.cache.invalidate_schema(schema);
    }

    /// Bulk-load the catalog; returns a textual summary for the host.
    pub async fn preload_catalog(&self, schema: Option<&str>) -> Result<String> {
        let summary = self.cache.preload(&self.pool, schema).await?;
        Ok(render_summary(&self.name, summary))
    }

    /// Full invalidation followed by a bulk reload.
    pub async fn refresh_catalog(&self) -> Result<String> {
        self.cache.invalidate_all();
        let summary = self.cache.preload(&self.pool, None).await?;
        Ok(render_summary(&self.name, summary))
    }

    /// Run a statement and return the affected-row count.
    pub async fn exec(&self, sql: &str) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        conn.exec(sql).await
    }

    /// Run an arbitrary SELECT, streaming rows with inferred schema.
    pub async fn scan_sql(&self, sql: &str) -> Result<ScanExec> {
        let mut conn = self.pool.acquire().await?;
        conn.begin_batch(sql).await?;
        Ok(ScanExec {
            stream: ResultStream::new(conn, None, true),
            sql: sql.to_string(),
            pushed_filters: Vec::new(),
            pushed_sort_keys: 0,
            top_applied: false,
        })
    }

    /// Start executing a bound table scan.
    ///
    /// Renders the pushdown SELECT, pins a pooled connection, and returns
    /// the stream together with the pushdown report. When the plan carries
    /// a bind-time stream handle, that stream is redeemed instead of
    /// re-executing the query.
    pub async fn start_scan(&self, plan: &ScanPlan) -> Result<ScanExec> {
        if let Some(handle) = plan.bound_stream {
            if let Some(exec) = self.registry.take(handle) {
                tracing::debug!(handle, "redeeming bind-time scan stream");
                return Ok(exec);
            }
        }

        let generator = QueryGen::new(
            &plan.table,
            self.settings.varchar_to_nvarchar,
            self.settings.order_pushdown,
        );
        let rendered = generator.render(plan);
        tracing::debug!(attachment = %self.name, sql = %rendered.sql, "scan");

        let expected = expected_columns(&plan.table, &rendered.projected_columns);

        let mut conn = self.pool.acquire().await?;
        conn.begin_batch(&rendered.sql).await?;

        Ok(ScanExec {
            stream: ResultStream::new(conn, expected, false),
            sql: rendered.sql,
            pushed_filters: rendered.pushed_filters,
            pushed_sort_keys: rendered.pushed_sort_keys,
            top_applied: rendered.top_applied,
        })
    }

    /// Execute a scan at bind time and park its stream for init.
    pub async fn bind_scan_eager(&self, plan: &mut ScanPlan) -> Result<()> {
        let exec = self.start_scan(plan).await?;
        plan.bound_stream = Some(self.registry.park(exec));
        Ok(())
    }

    /// Probe one connection end to end (diagnostics).
    pub async fn check_connection(&self, deadline: Duration) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        conn.ping(deadline).await
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("name", &self.name)
            .field("host", &self.settings.connect.host)
            .finish_non_exhaustive()
    }
}

fn render_summary(name: &str, summary: PreloadSummary) -> String {
    format!(
        "attachment {name}: {} schemas, {} tables, {} columns cached",
        summary.schemas, summary.tables, summary.columns
    )
}

/// Split a `key=value;key=value` option string into pairs.
fn split_option_pairs(s: &str) -> Vec<(String, String)> {
    s.split(';')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let (key, value) = part.split_once('=')?;
            Some((key.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// Bind-time column snapshot for the projected output, in result order.
fn expected_columns(table: &TableSnapshot, projected: &[String]) -> Option<Vec<ColumnMeta>> {
    if projected.is_empty() {
        return None; // SELECT 1 projection has no cataloged shape
    }

    let metas = projected
        .iter()
        .enumerate()
        .filter_map(|(ordinal, name)| {
            table.column(name).map(|info| ColumnMeta {
                ordinal,
                name: info.name.clone(),
                type_id: representative_type(info),
                nullable: info.nullable,
                max_length: info.max_length.max(0) as u32,
                precision: Some(info.precision),
                scale: Some(info.scale),
                collation: None,
                is_identity: info.is_identity,
            })
        })
        .collect::<Vec<_>>();

    (metas.len() == projected.len()).then_some(metas)
}

/// A wire type in the right comparison class for a cataloged column.
fn representative_type(info: &ColumnInfo) -> TypeId {
    match info.logical {
        LogicalType::Boolean => TypeId::BitN,
        LogicalType::TinyInt
        | LogicalType::SmallInt
        | LogicalType::Integer
        | LogicalType::BigInt => TypeId::IntN,
        LogicalType::Float | LogicalType::Double => TypeId::FltN,
        LogicalType::Decimal => TypeId::NumericN,
        LogicalType::Varchar => TypeId::NVarChar,
        LogicalType::Binary => TypeId::BigVarBinary,
        LogicalType::Uuid => TypeId::Guid,
        LogicalType::Date => TypeId::Date,
        LogicalType::Time => TypeId::Time,
        LogicalType::Timestamp => TypeId::DateTime2,
        LogicalType::TimestampTz => TypeId::DateTimeOffset,
        LogicalType::Xml => TypeId::Xml,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn option_pair_splitting() {
        let pairs = split_option_pairs("Host=h; Database=db;;order_pushdown=true");
        assert_eq!(
            pairs,
            vec![
                ("host".to_string(), "h".to_string()),
                ("database".to_string(), "db".to_string()),
                ("order_pushdown".to_string(), "true".to_string()),
            ]
        );
    }

    struct MapSecrets;

    impl SecretResolver for MapSecrets {
        fn resolve(&self, name: &str) -> Option<Vec<(String, String)>> {
            (name == "prod").then(|| {
                vec![
                    ("host".to_string(), "secret-host".to_string()),
                    ("database".to_string(), "secret-db".to_string()),
                ]
            })
        }
    }

    fn opts(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn attach_layers_secret_under_options() {
        let options = opts(&[("secret", "prod"), ("database", "override")]);
        let catalog = Catalog::attach("db", &options, Some(&MapSecrets)).unwrap();

        assert_eq!(catalog.settings().connect.host, "secret-host");
        assert_eq!(catalog.settings().connect.database, "override");
        catalog.detach();
    }

    #[tokio::test]
    async fn attach_rejects_unknown_secret() {
        let options = opts(&[("secret", "missing")]);
        assert!(matches!(
            Catalog::attach("db", &options, Some(&MapSecrets)),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn attach_validates_filters() {
        let options = opts(&[("host", "h"), ("schema_filter", "(bad")]);
        assert!(Catalog::attach("db", &options, None).is_err());
    }
}
