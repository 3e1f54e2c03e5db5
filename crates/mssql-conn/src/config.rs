//! Connection parameters.

use std::time::Duration;

use mssql_auth::AuthStrategy;

use crate::error::{Error, Result};

/// TLS policy for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionPolicy {
    /// No TLS; refuse servers that demand it.
    Off,
    /// TLS when the server supports it, plaintext otherwise.
    Preferred,
    /// TLS or fail.
    #[default]
    Required,
}

impl EncryptionPolicy {
    /// Parse the `encrypt` option value.
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "off" | "false" | "no" | "0" => Ok(Self::Off),
            "preferred" => Ok(Self::Preferred),
            "required" | "true" | "yes" | "1" => Ok(Self::Required),
            other => Err(Error::Config(format!(
                "invalid encrypt value '{other}'. Use off, preferred, or required"
            ))),
        }
    }
}

/// Immutable parameters for dialing one SQL Server endpoint.
#[derive(Debug, Clone)]
pub struct ConnectInfo {
    /// Server hostname or address.
    pub host: String,
    /// TCP port, 1433 by default.
    pub port: u16,
    /// Initial database; empty for the login default.
    pub database: String,
    /// Authentication strategy.
    pub auth: AuthStrategy,
    /// TLS policy.
    pub encryption: EncryptionPolicy,
    /// Skip server certificate verification.
    pub trust_server_certificate: bool,
    /// Application name reported to the server.
    pub app_name: String,
    /// Session language; empty for server default.
    pub language: String,
    /// Requested packet size.
    pub packet_size: u32,
    /// Read-only application intent.
    pub read_only_intent: bool,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// LOGIN sequence timeout (TLS + LOGIN7 + FEDAUTH).
    pub login_timeout: Duration,
}

impl Default for ConnectInfo {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1433,
            database: String::new(),
            auth: AuthStrategy::sql("", ""),
            encryption: EncryptionPolicy::Required,
            trust_server_certificate: false,
            app_name: "mssql-federation".into(),
            language: String::new(),
            packet_size: 4096,
            read_only_intent: false,
            connect_timeout: Duration::from_secs(15),
            login_timeout: Duration::from_secs(30),
        }
    }
}

impl ConnectInfo {
    /// Parameters with defaults for one host.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Parse an ADO.NET-style connection string.
    ///
    /// Recognized keys (case-insensitive): `server`/`data source`/`host`
    /// (with `host,port` form), `port`, `database`/`initial catalog`,
    /// `user id`/`uid`/`user`, `password`/`pwd`, `encrypt`,
    /// `trustservercertificate`, `application name`/`app`, `language`,
    /// `packet size`, `connect timeout`, `applicationintent`,
    /// `access_token`. Unrecognized keys are returned to the caller, which
    /// lets attachment options ride in the same string.
    pub fn from_connection_string(conn_str: &str) -> Result<(Self, Vec<(String, String)>)> {
        let mut info = Self::default();
        let mut username = String::new();
        let mut password = String::new();
        let mut access_token = None;
        let mut extras = Vec::new();

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("invalid connection string entry: {part}")))?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "server" | "data source" | "host" => {
                    if let Some((host, port)) = value.split_once(',') {
                        info.host = host.trim().to_string();
                        info.port = port.trim().parse().map_err(|_| {
                            Error::Config(format!("invalid port in server value: {value}"))
                        })?;
                    } else {
                        info.host = value.to_string();
                    }
                }
                "port" => {
                    info.port = value
                        .parse()
                        .map_err(|_| Error::Config(format!("invalid port: {value}")))?;
                }
                "database" | "initial catalog" => info.database = value.to_string(),
                "user id" | "uid" | "user" => username = value.to_string(),
                "password" | "pwd" => password = value.to_string(),
                "encrypt" => info.encryption = EncryptionPolicy::parse(value)?,
                "trustservercertificate" | "trust server certificate" => {
                    info.trust_server_certificate = parse_bool(value);
                }
                "application name" | "app" => info.app_name = value.to_string(),
                "language" => info.language = value.to_string(),
                "packet size" => {
                    info.packet_size = value
                        .parse()
                        .map_err(|_| Error::Config(format!("invalid packet size: {value}")))?;
                }
                "connect timeout" | "connection timeout" => {
                    let secs: u64 = value
                        .parse()
                        .map_err(|_| Error::Config(format!("invalid timeout: {value}")))?;
                    info.connect_timeout = Duration::from_secs(secs);
                }
                "applicationintent" | "application intent" => {
                    info.read_only_intent = value.eq_ignore_ascii_case("readonly");
                }
                "access_token" | "accesstoken" => {
                    access_token = Some(value.to_string());
                }
                _ => extras.push((key, value.to_string())),
            }
        }

        info.auth = match access_token {
            Some(token) => {
                AuthStrategy::manual_token(mssql_auth::AccessToken::manual(token, None))
            }
            None if !username.is_empty() => AuthStrategy::sql(username, password),
            None => AuthStrategy::sql("", ""),
        };

        Ok((info, extras))
    }
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") || value == "1"
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_core_keys() {
        let (info, extras) = ConnectInfo::from_connection_string(
            "Server=db.example.test,1444;Database=sales;User Id=reader;Password=pw;\
             Encrypt=required;TrustServerCertificate=yes;Application Name=fed",
        )
        .unwrap();

        assert_eq!(info.host, "db.example.test");
        assert_eq!(info.port, 1444);
        assert_eq!(info.database, "sales");
        assert_eq!(info.encryption, EncryptionPolicy::Required);
        assert!(info.trust_server_certificate);
        assert_eq!(info.app_name, "fed");
        assert!(extras.is_empty());
        assert!(matches!(info.auth, AuthStrategy::SqlAuth { .. }));
    }

    #[test]
    fn unknown_keys_pass_through() {
        let (_, extras) =
            ConnectInfo::from_connection_string("host=h;schema_filter=^dbo$;order_pushdown=true")
                .unwrap();
        assert_eq!(
            extras,
            vec![
                ("schema_filter".to_string(), "^dbo$".to_string()),
                ("order_pushdown".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn access_token_selects_fedauth() {
        let (info, _) =
            ConnectInfo::from_connection_string("host=h;access_token=eyJ0...").unwrap();
        assert!(info.auth.needs_fedauth());
    }

    #[test]
    fn encryption_values() {
        assert_eq!(
            EncryptionPolicy::parse("preferred").unwrap(),
            EncryptionPolicy::Preferred
        );
        assert_eq!(EncryptionPolicy::parse("off").unwrap(), EncryptionPolicy::Off);
        assert!(EncryptionPolicy::parse("sometimes").is_err());
    }

    #[test]
    fn malformed_entry_is_config_error() {
        assert!(matches!(
            ConnectInfo::from_connection_string("no-equals-sign"),
            Err(Error::Config(_))
        ));
    }
}
