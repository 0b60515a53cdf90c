use anyhow::{Context, Result};
use postgres_native_tls::MakeTlsConnector;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_postgres::{Client, NoTls};

use super::postgres::PgStatement;
use super::{Connection, DataAccessError, Statement};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
    /// Skip certificate verification in `prefer`/`require` modes.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Optional path to a PEM bundle of CA certificates.
    #[serde(default)]
    pub ca_cert_path: Option<String>,
}

/// SSL/TLS connection modes, matching libpq's `sslmode`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

impl ConnectionConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={} sslmode={} connect_timeout=10 application_name=rsview",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.database),
            quote_conn_value(&self.username),
            quote_conn_value(&self.password),
            self.ssl_mode.as_str()
        )
    }

    pub fn display_string(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            name: String::from("Local PostgreSQL"),
            host: String::from("localhost"),
            port: 5432,
            database: String::from("postgres"),
            username: String::from("postgres"),
            password: String::new(),
            ssl_mode: SslMode::default(),
            accept_invalid_certs: false,
            ca_cert_path: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SavedConnections {
    #[serde(default)]
    connections: Vec<ConnectionConfig>,
}

/// Saved connection profiles under the user's config directory.
pub struct ConnectionStore;

impl ConnectionStore {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rsview")
    }

    pub fn connections_path() -> PathBuf {
        Self::config_dir().join("connections.toml")
    }

    pub fn load() -> Result<Vec<ConnectionConfig>> {
        let path = Self::connections_path();
        if !path.exists() {
            return Ok(vec![]);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        parse_saved_connections(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn find(name: &str) -> Result<Option<ConnectionConfig>> {
        Ok(Self::load()?
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    pub fn save_last_connection(name: &str) -> Result<()> {
        let path = Self::config_dir().join("last_connection");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, name)?;
        Ok(())
    }

    pub fn load_last_connection() -> Option<String> {
        std::fs::read_to_string(Self::config_dir().join("last_connection"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

fn parse_saved_connections(content: &str) -> Result<Vec<ConnectionConfig>> {
    let saved: SavedConnections = toml::from_str(content)?;
    Ok(saved.connections)
}

/// Client plus the private runtime that drives it.
///
/// The runtime is current-thread: the connection task only makes progress
/// while a call is blocked on it, which is the only time it needs to.
pub(crate) struct PgSession {
    runtime: Runtime,
    client: Client,
}

impl PgSession {
    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Synchronous PostgreSQL connection.
pub struct PgConnection {
    config: ConnectionConfig,
    session: Arc<PgSession>,
}

impl PgConnection {
    pub fn connect(config: ConnectionConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start database runtime")?;
        let client = runtime.block_on(create_client(&config))?;
        tracing::info!("connected to {}", config.display_string());
        Ok(Self {
            config,
            session: Arc::new(PgSession { runtime, client }),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl Connection for PgConnection {
    fn create_statement(&self) -> Result<Box<dyn Statement>, DataAccessError> {
        if self.session.client.is_closed() {
            return Err(DataAccessError::closed("connection"));
        }
        Ok(Box::new(PgStatement::new(Arc::clone(&self.session))))
    }

    fn describe(&self) -> String {
        self.config.display_string()
    }
}

async fn create_client(config: &ConnectionConfig) -> Result<Client> {
    let conn_string = config.connection_string();
    let timeout_msg = || anyhow::anyhow!("Connection timed out after {}s", CONNECT_TIMEOUT.as_secs());

    let client = match config.ssl_mode {
        SslMode::Disable => {
            let (client, connection) =
                tokio::time::timeout(CONNECT_TIMEOUT, tokio_postgres::connect(&conn_string, NoTls))
                    .await
                    .map_err(|_| timeout_msg())?
                    .context("Failed to connect to PostgreSQL")?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!("connection error: {}", e);
                }
            });
            client
        }
        SslMode::Prefer | SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
            let strict = matches!(config.ssl_mode, SslMode::VerifyCa | SslMode::VerifyFull);
            let tls = build_tls_connector(config, strict)?;
            let (client, connection) =
                tokio::time::timeout(CONNECT_TIMEOUT, tokio_postgres::connect(&conn_string, tls))
                    .await
                    .map_err(|_| timeout_msg())?
                    .context("Failed to connect to PostgreSQL")?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!("connection error: {}", e);
                }
            });
            client
        }
    };

    Ok(client)
}

/// Build a TLS connector. `strict_verify` forces certificate verification
/// (verify-ca / verify-full) regardless of `accept_invalid_certs`.
fn build_tls_connector(config: &ConnectionConfig, strict_verify: bool) -> Result<MakeTlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();

    if config.accept_invalid_certs && !strict_verify {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    } else if let Some(ca_path) = &config.ca_cert_path {
        let pem = std::fs::read(ca_path)
            .with_context(|| format!("Failed to read CA certificate file: {}", ca_path))?;
        for cert in parse_pem_bundle(&pem)? {
            builder.add_root_certificate(cert);
        }
    }

    let connector = builder.build().context("Failed to build TLS connector")?;
    Ok(MakeTlsConnector::new(connector))
}

/// Split a PEM bundle into certificates.
fn parse_pem_bundle(pem: &[u8]) -> Result<Vec<native_tls::Certificate>> {
    const END: &str = "-----END CERTIFICATE-----";
    let text = std::str::from_utf8(pem).context("CA certificate file is not valid UTF-8")?;

    let certs = text
        .split_inclusive(END)
        .filter(|block| block.contains(END))
        .map(|block| {
            native_tls::Certificate::from_pem(block.trim_start().as_bytes())
                .context("Failed to parse certificate")
        })
        .collect::<Result<Vec<_>>>()?;

    if certs.is_empty() {
        anyhow::bail!("No certificates found in PEM data");
    }
    Ok(certs)
}

/// Quote a value for a libpq key=value connection string.
fn quote_conn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_quotes_values() {
        let config = ConnectionConfig {
            password: "it's a \\secret".to_string(),
            ssl_mode: SslMode::Disable,
            ..ConnectionConfig::default()
        };
        let s = config.connection_string();
        assert!(s.contains("host='localhost'"));
        assert!(s.contains("port=5432"));
        assert!(s.contains("password='it\\'s a \\\\secret'"));
        assert!(s.contains("sslmode=disable"));
    }

    #[test]
    fn test_display_string() {
        assert_eq!(
            ConnectionConfig::default().display_string(),
            "postgres@localhost:5432/postgres"
        );
    }

    #[test]
    fn test_parse_saved_connections() {
        let toml = r#"
            [[connections]]
            name = "prod"
            host = "db.example.com"
            port = 6432
            database = "app"
            username = "reader"
            ssl_mode = "verify-full"
        "#;
        let saved = parse_saved_connections(toml).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].name, "prod");
        assert_eq!(saved[0].ssl_mode, SslMode::VerifyFull);
        assert!(saved[0].password.is_empty());
        assert!(!saved[0].accept_invalid_certs);
    }

    #[test]
    fn test_parse_empty_file() {
        assert!(parse_saved_connections("").unwrap().is_empty());
    }

    #[test]
    fn test_pem_bundle_without_certificates() {
        assert!(parse_pem_bundle(b"not a certificate").is_err());
    }
}
