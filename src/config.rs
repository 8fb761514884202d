//! Configuration handling for db-pipeline.
//!
//! Settings are read once at startup from a YAML/TOML/JSON file (format picked
//! by extension) or from a Consul KV key holding YAML, layered with
//! `DB_PIPELINE__*` environment overrides, then tweaked by command-line flags.
//! Everything is immutable afterwards.

use crate::error::{DbError, DbResult};
use crate::logging::LogConfig;
use clap::Parser;
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Prefix for environment overrides, e.g. `DB_PIPELINE__DATABASE__HOST`.
pub const ENV_PREFIX: &str = "DB_PIPELINE";
pub const ENV_SEPARATOR: &str = "__";

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[serde(alias = "postgres")]
    PostgreSQL,
    /// Includes MariaDB
    #[serde(alias = "mariadb")]
    MySQL,
    #[serde(alias = "sqlite3")]
    SQLite,
}

impl DatabaseType {
    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }

    /// Positional placeholder syntax understood by this backend (1-based).
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            Self::MySQL => "?".to_string(),
            Self::PostgreSQL | Self::SQLite => format!("${position}"),
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Connection parameters and pool tuning for one relational backend.
///
/// camelCase keys (`dbName`, `maxOpenConnections`, ...) are accepted as
/// aliases so existing configuration files load unchanged.
///
/// Pool tuning fields use `0` for "unset": no explicit bound, no lifetime or
/// idle limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub driver: DatabaseType,
    #[serde(default = "default_host")]
    pub host: String,
    /// Falls back to the driver's default port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name; for SQLite the file path (or `:memory:`).
    #[serde(alias = "dbName", alias = "dbname")]
    pub db_name: String,
    #[serde(default)]
    pub user: String,
    /// Sensitive - never logged or serialized.
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Driver-specific TLS mode, e.g. `disable`/`require` (PostgreSQL) or
    /// `disabled`/`required` (MySQL). Ignored by SQLite.
    #[serde(default, alias = "sslMode", alias = "sslmode")]
    pub ssl_mode: Option<String>,
    #[serde(default, alias = "maxOpenConnections", alias = "maxopenconnections")]
    pub max_open_connections: u32,
    #[serde(default, alias = "maxIdleConnections", alias = "maxidleconnections")]
    pub max_idle_connections: u32,
    /// Seconds.
    #[serde(default, alias = "maxLifeTimeConnection", alias = "maxlifetimeconnection")]
    pub max_lifetime_connection: u64,
    /// Seconds.
    #[serde(default, alias = "maxIdleTimeConnection", alias = "maxidletimeconnection")]
    pub max_idle_time_connection: u64,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

impl DatabaseConfig {
    /// Create a configuration with default host and no pool tuning.
    pub fn new(driver: DatabaseType, db_name: impl Into<String>) -> Self {
        Self {
            driver,
            host: default_host(),
            port: None,
            db_name: db_name.into(),
            user: String::new(),
            password: String::new(),
            ssl_mode: None,
            max_open_connections: 0,
            max_idle_connections: 0,
            max_lifetime_connection: 0,
            max_idle_time_connection: 0,
        }
    }

    /// SQLite database stored at `path`.
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self::new(DatabaseType::SQLite, path.as_ref().to_string_lossy())
    }

    /// Port to connect to, falling back to the driver default.
    pub fn port_or_default(&self) -> Option<u16> {
        self.port.or_else(|| self.driver.default_port())
    }

    /// Upper bound on open connections, if configured.
    pub fn max_connections(&self) -> Option<u32> {
        (self.max_open_connections > 0).then_some(self.max_open_connections)
    }

    /// Connections kept warm in the pool, never above the open-connection bound.
    pub fn warm_connections(&self) -> u32 {
        match self.max_connections() {
            Some(max) => self.max_idle_connections.min(max),
            None => self.max_idle_connections,
        }
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        (self.max_lifetime_connection > 0)
            .then(|| Duration::from_secs(self.max_lifetime_connection))
    }

    pub fn max_idle_time(&self) -> Option<Duration> {
        (self.max_idle_time_connection > 0)
            .then(|| Duration::from_secs(self.max_idle_time_connection))
    }

    /// Validate the configuration before any connection is attempted.
    pub fn validate(&self) -> DbResult<()> {
        if self.db_name.trim().is_empty() {
            return Err(DbError::config(match self.driver {
                DatabaseType::SQLite => "db_name must be a file path or ':memory:' for SQLite",
                _ => "db_name must not be empty",
            }));
        }
        if self.driver != DatabaseType::SQLite && self.host.trim().is_empty() {
            return Err(DbError::config("host must not be empty"));
        }
        if self.port == Some(0) {
            return Err(DbError::config("port must be greater than 0"));
        }
        Ok(())
    }
}

/// Key-value cache settings.
///
/// Connection fields are only read by the Redis driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub driver: CacheDriver,
    /// URL scheme of the server, `redis` or `rediss`.
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Sensitive - never logged or serialized.
    #[serde(skip_serializing)]
    pub password: String,
    /// Logical database index.
    pub database: i64,
    /// Prepended to every key as `"{prefix}:{key}"`.
    pub prefix: String,
    /// TTL applied when a call passes none. `0` keeps entries until deleted.
    #[serde(alias = "defaultTtlSecs", alias = "defaultttlsecs")]
    pub default_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    #[default]
    Memory,
    Redis,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::Memory,
            scheme: "redis".to_string(),
            host: default_host(),
            port: 6379,
            username: String::new(),
            password: String::new(),
            database: 0,
            prefix: String::new(),
            default_ttl_secs: 0,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl_secs > 0).then(|| Duration::from_secs(self.default_ttl_secs))
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Load configuration from `path`, layered with environment overrides.
    pub fn load(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DbError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Self::build(File::from(path))
    }

    /// Load YAML configuration stored under `key` in the Consul KV store at
    /// `endpoint` (`host:port` or a full URL), layered with environment
    /// overrides.
    pub async fn load_consul(endpoint: &str, key: &str) -> DbResult<Self> {
        let base = if endpoint.contains("://") {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", endpoint.trim_end_matches('/'))
        };
        let url = format!("{}/v1/kv/{}?raw", base, key.trim_start_matches('/'));

        let response = reqwest::get(&url)
            .await
            .map_err(|e| DbError::config(format!("consul request to {url} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DbError::config(format!(
                "consul key '{key}' not available: HTTP {status}"
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| DbError::config(format!("consul response unreadable: {e}")))?;

        Self::from_yaml(&body)
    }

    /// Load configuration from YAML text, layered with environment overrides.
    pub fn from_yaml(content: &str) -> DbResult<Self> {
        Self::build(File::from_str(content, FileFormat::Yaml))
    }

    fn build<S>(source: S) -> DbResult<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(source)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| DbError::config(e.to_string()))?;

        let app: AppConfig = settings
            .try_deserialize()
            .map_err(|e| DbError::config(e.to_string()))?;
        app.database.validate()?;
        Ok(app)
    }
}

/// Command-line interface of the demo binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-pipeline",
    about = "Run statement pipelines against a SQL database",
    version
)]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = DEFAULT_CONFIG_FILE,
        env = "DB_PIPELINE_CONFIG"
    )]
    pub config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, env = "DB_PIPELINE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Enable JSON logging format
    #[arg(long, env = "DB_PIPELINE_JSON_LOGS")]
    pub json_logs: bool,

    /// Consul agent to read the configuration from instead of the file
    #[arg(long, value_name = "HOST:PORT", env = "DB_PIPELINE_CONSUL_ADDR", requires = "consul_key")]
    pub consul_addr: Option<String>,

    /// Consul KV key holding the YAML configuration
    #[arg(long, value_name = "KEY", env = "DB_PIPELINE_CONSUL_KEY", requires = "consul_addr")]
    pub consul_key: Option<String>,
}

impl Cli {
    /// Load the configuration from Consul when configured, else from the file.
    pub async fn load_config(&self) -> DbResult<AppConfig> {
        match (&self.consul_addr, &self.consul_key) {
            (Some(addr), Some(key)) => AppConfig::load_consul(addr, key).await,
            _ => AppConfig::load(&self.config),
        }
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if self.json_logs {
            config.log.json = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer one HTTP request with `status` and `body`; the handle yields
    /// the raw request.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (addr.to_string(), handle)
    }

    const POSTGRES_YAML: &str = r#"
log:
  level: debug
database:
  driver: postgres
  host: db.internal
  db_name: orders
  user: app
  password: secret
  ssl_mode: disable
  max_open_connections: 20
  max_idle_connections: 5
  max_lifetime_connection: 300
  max_idle_time_connection: 60
cache:
  prefix: orders
  default_ttl_secs: 30
"#;

    #[test]
    fn test_from_yaml_full() {
        let config = AppConfig::from_yaml(POSTGRES_YAML).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.database.driver, DatabaseType::PostgreSQL);
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port_or_default(), Some(5432));
        assert_eq!(config.database.ssl_mode.as_deref(), Some("disable"));
        assert_eq!(config.database.max_connections(), Some(20));
        assert_eq!(config.database.warm_connections(), 5);
        assert_eq!(
            config.database.max_lifetime(),
            Some(Duration::from_secs(300))
        );
        assert_eq!(config.database.max_idle_time(), Some(Duration::from_secs(60)));
        assert_eq!(config.cache.prefix, "orders");
        assert_eq!(config.cache.default_ttl(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_from_yaml_defaults() {
        let config = AppConfig::from_yaml("database:\n  driver: sqlite\n  db_name: local.db\n")
            .unwrap();
        assert_eq!(config.database.driver, DatabaseType::SQLite);
        assert_eq!(config.database.host, DEFAULT_HOST);
        assert_eq!(config.database.port_or_default(), None);
        assert_eq!(config.database.max_connections(), None);
        assert_eq!(config.database.max_lifetime(), None);
        assert_eq!(config.cache.driver, CacheDriver::Memory);
        assert!(config.cache.default_ttl().is_none());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_driver_aliases() {
        for (name, expected) in [
            ("postgresql", DatabaseType::PostgreSQL),
            ("mariadb", DatabaseType::MySQL),
            ("mysql", DatabaseType::MySQL),
            ("sqlite3", DatabaseType::SQLite),
        ] {
            let yaml = format!("database:\n  driver: {name}\n  db_name: app\n");
            let config = AppConfig::from_yaml(&yaml).unwrap();
            assert_eq!(config.database.driver, expected, "driver {name}");
        }
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let result = AppConfig::from_yaml("database:\n  driver: oracle\n  db_name: app\n");
        assert!(matches!(result, Err(DbError::Config { .. })));
    }

    #[test]
    fn test_empty_db_name_rejected() {
        let result = AppConfig::from_yaml("database:\n  driver: mysql\n  db_name: \"\"\n");
        assert!(matches!(result, Err(DbError::Config { .. })));
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = DatabaseConfig::new(DatabaseType::PostgreSQL, "app");
        config.port = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_warm_connections_capped_by_max_open() {
        let mut config = DatabaseConfig::new(DatabaseType::MySQL, "app");
        config.max_open_connections = 4;
        config.max_idle_connections = 10;
        assert_eq!(config.warm_connections(), 4);

        config.max_open_connections = 0;
        assert_eq!(config.warm_connections(), 10);
    }

    #[test]
    fn test_camel_case_keys_accepted() {
        let yaml = r#"
database:
  driver: mysql
  host: db.internal
  port: 3307
  dbName: orders
  user: app
  sslMode: required
  maxOpenConnections: 8
  maxIdleConnections: 2
  maxLifeTimeConnection: 120
  maxIdleTimeConnection: 30
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.database.db_name, "orders");
        assert_eq!(config.database.port_or_default(), Some(3307));
        assert_eq!(config.database.ssl_mode.as_deref(), Some("required"));
        assert_eq!(config.database.max_connections(), Some(8));
        assert_eq!(config.database.warm_connections(), 2);
        assert_eq!(config.database.max_lifetime(), Some(Duration::from_secs(120)));
        assert_eq!(config.database.max_idle_time(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_redis_cache_section() {
        let yaml = r#"
database:
  driver: sqlite
  db_name: app.db
cache:
  driver: redis
  host: cache.internal
  port: 6380
  username: app
  password: secret
  database: 3
  prefix: svc
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.cache.driver, CacheDriver::Redis);
        assert_eq!(config.cache.scheme, "redis");
        assert_eq!(config.cache.host, "cache.internal");
        assert_eq!(config.cache.port, 6380);
        assert_eq!(config.cache.username, "app");
        assert_eq!(config.cache.database, 3);
        assert_eq!(config.cache.prefix, "svc");
        assert!(!serde_json::to_string(&config.cache).unwrap().contains("secret"));
    }

    #[tokio::test]
    async fn test_load_consul_reads_raw_key() {
        let (addr, server) = serve_once("200 OK", POSTGRES_YAML).await;

        let config = AppConfig::load_consul(&addr, "services/orders").await.unwrap();
        assert_eq!(config.database.driver, DatabaseType::PostgreSQL);
        assert_eq!(config.database.db_name, "orders");
        assert_eq!(config.cache.prefix, "orders");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /v1/kv/services/orders?raw HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_load_consul_missing_key_is_config_error() {
        let (addr, _server) = serve_once("404 Not Found", "").await;

        let result = AppConfig::load_consul(&format!("http://{addr}/"), "/missing").await;
        let err = result.unwrap_err();
        assert!(matches!(err, DbError::Config { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_cli_consul_flags_require_each_other() {
        assert!(Cli::try_parse_from(["db-pipeline", "--consul-addr", "127.0.0.1:8500"]).is_err());
        let cli = Cli::parse_from([
            "db-pipeline",
            "--consul-addr",
            "127.0.0.1:8500",
            "--consul-key",
            "services/orders",
        ]);
        assert_eq!(cli.consul_key.as_deref(), Some("services/orders"));
    }

    #[test]
    fn test_password_not_serialized() {
        let mut config = DatabaseConfig::new(DatabaseType::PostgreSQL, "app");
        config.password = "hunter2".to_string();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = AppConfig::load("/nonexistent/db-pipeline.yaml");
        assert!(matches!(result, Err(DbError::Config { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, POSTGRES_YAML).unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.database.db_name, "orders");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(DatabaseType::PostgreSQL.placeholder(2), "$2");
        assert_eq!(DatabaseType::SQLite.placeholder(1), "$1");
        assert_eq!(DatabaseType::MySQL.placeholder(3), "?");
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["db-pipeline", "--log-level", "trace", "--json-logs"]);
        let mut config = AppConfig::from_yaml(POSTGRES_YAML).unwrap();
        cli.apply(&mut config);
        assert_eq!(config.log.level, "trace");
        assert!(config.log.json);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }
}
