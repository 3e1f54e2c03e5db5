//! Attachment settings.
//!
//! Every option is recognized wherever an attachment is defined: ATTACH
//! options, connection-string entries, and secret payloads, with that
//! precedence (first definition wins walking ATTACH > connection string >
//! secret).

use std::time::Duration;

use mssql_conn::{ConnectInfo, Error, Result};
use mssql_pool::PoolConfig;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Effective settings of one attachment.
#[derive(Debug, Clone)]
pub struct AttachmentSettings {
    /// Connection coordinates and credentials.
    pub connect: ConnectInfo,
    /// Pool tuning.
    pub pool: PoolConfig,
    /// Schema filter, case-insensitive partial match.
    pub schema_filter: Option<Regex>,
    /// Table filter, case-insensitive partial match.
    pub table_filter: Option<Regex>,
    /// Catalog cache TTL; `None` disables expiry.
    pub cache_ttl: Option<Duration>,
    /// Allow ORDER BY pushdown.
    pub order_pushdown: bool,
    /// Cast non-UTF-8 VARCHAR/CHAR projections to NVARCHAR.
    pub varchar_to_nvarchar: bool,
}

/// Settings snapshot for diagnostics output (secrets omitted).
#[derive(Debug, Serialize)]
pub struct SettingsSummary {
    host: String,
    port: u16,
    database: String,
    connection_limit: usize,
    schema_filter: Option<String>,
    table_filter: Option<String>,
    cache_ttl_seconds: Option<u64>,
    order_pushdown: bool,
    varchar_to_nvarchar: bool,
}

impl AttachmentSettings {
    /// Resolve settings from layered option lists.
    ///
    /// `layers` is ordered by precedence: an option found in an earlier
    /// layer shadows later ones. Filters are validated here so a bad regex
    /// fails the ATTACH rather than the first query.
    pub fn resolve(layers: &[&[(String, String)]]) -> Result<Self> {
        let lookup = |key: &str| -> Option<String> {
            layers.iter().find_map(|layer| {
                layer
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v.clone())
            })
        };

        // Connection coordinates rebuild a connection string so the
        // session-layer parser stays the single source of truth.
        let mut conn_str = String::new();
        for key in [
            "host",
            "server",
            "port",
            "database",
            "user",
            "password",
            "encrypt",
            "trustservercertificate",
            "access_token",
            "application name",
            "language",
            "packet size",
            "connect timeout",
            "applicationintent",
        ] {
            if let Some(value) = lookup(key) {
                conn_str.push_str(key);
                conn_str.push('=');
                conn_str.push_str(&value);
                conn_str.push(';');
            }
        }
        let (connect, _extras) = ConnectInfo::from_connection_string(&conn_str)?;

        let mut pool = PoolConfig::default();
        if let Some(value) = lookup("connection_limit") {
            pool.max_size = parse_number(&value, "connection_limit")?;
        }
        if let Some(value) = lookup("idle_timeout") {
            pool.idle_timeout = Duration::from_secs(parse_number(&value, "idle_timeout")?);
        }
        if let Some(value) = lookup("acquire_timeout") {
            pool.acquire_timeout = Duration::from_secs(parse_number(&value, "acquire_timeout")?);
        }
        pool.validate()?;

        let cache_ttl = match lookup("catalog_cache_ttl_seconds") {
            Some(value) => {
                let secs: u64 = parse_number(&value, "catalog_cache_ttl_seconds")?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            connect,
            pool,
            schema_filter: lookup("schema_filter")
                .map(|p| compile_filter(&p, "schema_filter"))
                .transpose()?,
            table_filter: lookup("table_filter")
                .map(|p| compile_filter(&p, "table_filter"))
                .transpose()?,
            cache_ttl,
            order_pushdown: lookup("order_pushdown").is_some_and(|v| parse_bool(&v)),
            varchar_to_nvarchar: lookup("varchar_to_nvarchar").is_some_and(|v| parse_bool(&v)),
        })
    }

    /// Diagnostics view with secrets stripped.
    #[must_use]
    pub fn summary(&self) -> SettingsSummary {
        SettingsSummary {
            host: self.connect.host.clone(),
            port: self.connect.port,
            database: self.connect.database.clone(),
            connection_limit: self.pool.max_size,
            schema_filter: self.schema_filter.as_ref().map(|r| r.as_str().to_string()),
            table_filter: self.table_filter.as_ref().map(|r| r.as_str().to_string()),
            cache_ttl_seconds: self.cache_ttl.map(|d| d.as_secs()),
            order_pushdown: self.order_pushdown,
            varchar_to_nvarchar: self.varchar_to_nvarchar,
        }
    }

    /// Apply the schema filter (partial, case-insensitive match).
    #[must_use]
    pub fn schema_visible(&self, name: &str) -> bool {
        self.schema_filter.as_ref().is_none_or(|r| r.is_match(name))
    }

    /// Apply the table filter (partial, case-insensitive match).
    #[must_use]
    pub fn table_visible(&self, name: &str) -> bool {
        self.table_filter.as_ref().is_none_or(|r| r.is_match(name))
    }
}

fn compile_filter(pattern: &str, option: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::Config(format!("invalid {option} regex '{pattern}': {e}")))
}

fn parse_number<T: std::str::FromStr>(value: &str, option: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid {option} value: {value}")))
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") || value == "1"
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn opts(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn attach_shadows_connection_string() {
        let attach = opts(&[("database", "attach_db"), ("order_pushdown", "true")]);
        let conn = opts(&[("host", "h"), ("database", "conn_db")]);

        let settings = AttachmentSettings::resolve(&[&attach, &conn]).unwrap();
        assert_eq!(settings.connect.database, "attach_db");
        assert_eq!(settings.connect.host, "h");
        assert!(settings.order_pushdown);
    }

    #[test]
    fn filters_match_partially_and_case_insensitively() {
        let attach = opts(&[("host", "h"), ("schema_filter", "sales")]);
        let settings = AttachmentSettings::resolve(&[&attach]).unwrap();

        assert!(settings.schema_visible("SalesHistory"));
        assert!(settings.schema_visible("presales"));
        assert!(!settings.schema_visible("hr"));
        assert!(settings.table_visible("anything"));
    }

    #[test]
    fn invalid_regex_fails_attach() {
        let attach = opts(&[("host", "h"), ("table_filter", "(unclosed")]);
        assert!(matches!(
            AttachmentSettings::resolve(&[&attach]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn ttl_zero_disables_expiry() {
        let attach = opts(&[("host", "h"), ("catalog_cache_ttl_seconds", "0")]);
        let settings = AttachmentSettings::resolve(&[&attach]).unwrap();
        assert!(settings.cache_ttl.is_none());

        let attach = opts(&[("host", "h"), ("catalog_cache_ttl_seconds", "90")]);
        let settings = AttachmentSettings::resolve(&[&attach]).unwrap();
        assert_eq!(settings.cache_ttl, Some(Duration::from_secs(90)));
    }

    #[test]
    fn pool_options_apply() {
        let attach = opts(&[
            ("host", "h"),
            ("connection_limit", "3"),
            ("acquire_timeout", "7"),
        ]);
        let settings = AttachmentSettings::resolve(&[&attach]).unwrap();
        assert_eq!(settings.pool.max_size, 3);
        assert_eq!(settings.pool.acquire_timeout, Duration::from_secs(7));
    }
}
