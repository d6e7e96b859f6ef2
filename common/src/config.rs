//! Application configuration.
//!
//! Loaded from a TOML file (`$CONFIG_PATH`, or `config/config.<ENV>.toml`)
//! with every section defaulted, then overridden by a few environment
//! variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{AppError, AppResult};
use crate::models::database::{ConnectionStatus, Database, Vendor};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pool: PoolConfig,
    pub adapters: AdapterConfig,
    pub logging: LoggingConfig,
    pub databases: Vec<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_secs: 5,
            request_timeout_secs: 30,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl ServerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Pool limits applied to every connection the registry opens.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_open: u32,
    pub min_idle: u32,
    pub max_lifetime_secs: u64,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub close_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: 25,
            min_idle: 0,
            max_lifetime_secs: 300,
            idle_timeout_secs: 600,
            acquire_timeout_secs: 10,
            close_timeout_secs: 5,
        }
    }
}

/// Per-vendor health probe bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub postgres_probe_timeout_secs: u64,
    pub mariadb_probe_timeout_secs: u64,
    pub oracle_probe_timeout_secs: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            postgres_probe_timeout_secs: 5,
            mariadb_probe_timeout_secs: 5,
            oracle_probe_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// A database registered at startup.
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", alias = "vendor")]
    pub vendor: String,
    pub host: String,
    #[serde(default)]
    pub port: Option<i32>,
    #[serde(default)]
    pub schema: Option<String>,
    pub username: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub connect_on_startup: bool,
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_connection_timeout_secs() -> u64 {
    60
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("id", &self.id)
            .field("vendor", &self.vendor)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connect_on_startup", &self.connect_on_startup)
            .finish_non_exhaustive()
    }
}

impl DatabaseConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Converts the entry into a disconnected [`Database`].
    pub fn to_database(&self) -> AppResult<Database> {
        let vendor: Vendor = self.vendor.parse()?;
        Ok(Database {
            id: self.id.clone(),
            name: self.name.clone(),
            vendor,
            host: self.host.clone(),
            port: self.port.unwrap_or_else(|| i32::from(vendor.default_port())),
            schema: self.schema.clone().filter(|s| !s.trim().is_empty()),
            username: self.username.clone(),
            password: self.password.clone(),
            status: ConnectionStatus::Disconnected,
        })
    }
}

impl AppConfig {
    /// Resolves the configuration file path from the environment.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(path);
        }
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());
        PathBuf::from(format!("config/config.{env}.toml"))
    }

    /// Loads configuration from `path` and applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parses configuration from TOML text without touching the environment.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("invalid config: {e}")))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = std::env::var("SERVER_PORT").ok().and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
port = 9090
allowed_origins = ["http://localhost:3000"]

[pool]
max_open = 10

[[databases]]
id = "pg1"
name = "app"
type = "postgresql"
host = "db.local"
port = 5432
username = "u"
password = "p"

[[databases]]
id = "ora"
name = "ORCL"
type = "oracle19c"
host = "10.0.0.2"
schema = "XE"
username = "scott"
password = "tiger"
connect_on_startup = false
connection_timeout_secs = 15
"#;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.pool.max_open, 25);
        assert_eq!(config.adapters.oracle_probe_timeout_secs, 10);
        assert_eq!(config.logging.level, "info");
        assert!(config.databases.is_empty());
    }

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.pool.max_open, 10);
        assert_eq!(config.pool.max_lifetime_secs, 300);
        assert_eq!(config.databases.len(), 2);

        let pg = &config.databases[0];
        assert!(pg.connect_on_startup);
        assert_eq!(pg.connection_timeout(), Duration::from_secs(60));
        assert_eq!(pg.to_database().unwrap().vendor, Vendor::Postgres);

        let ora = config.databases[1].to_database().unwrap();
        assert_eq!(ora.port, 1521);
        assert_eq!(ora.schema(), Some("XE"));
        assert!(!config.databases[1].connect_on_startup);
    }

    #[test]
    fn test_unknown_type_fails_conversion() {
        let mut entry = AppConfig::from_toml_str(SAMPLE).unwrap().databases.remove(0);
        entry.vendor = "mongodb".into();
        assert!(matches!(
            entry.to_database(),
            Err(AppError::InvalidDatabaseType(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.databases[0].id, "pg1");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = AppConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert!(config.databases.is_empty());
        assert_eq!(config.pool.close_timeout_secs, 5);
    }

    #[test]
    fn test_debug_hides_password() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert!(!format!("{:?}", config.databases[1]).contains("tiger"));
    }
}
