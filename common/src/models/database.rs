//! Database entity models.
//!
//! A [`Database`] identifies one connection target. It is built by callers
//! (configuration or a registration request) in the `Disconnected` state; only
//! the connection registry ever moves it to another status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::AppError;

/// Mask returned in place of a stored password.
pub const PASSWORD_MASK: &str = "****";

/// Supported database products.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
pub enum Vendor {
    /// PostgreSQL 16.3.
    #[serde(rename = "postgres16.3")]
    Postgres,
    /// Oracle 11g.
    #[serde(rename = "oracle11g")]
    Oracle11g,
    /// Oracle 19c.
    #[serde(rename = "oracle19c")]
    Oracle19c,
    /// MariaDB 10.11.
    #[serde(rename = "mariadb10.11")]
    MariaDb,
}

impl Vendor {
    /// Every supported vendor tag.
    pub const ALL: [Vendor; 4] = [
        Vendor::Postgres,
        Vendor::Oracle11g,
        Vendor::Oracle19c,
        Vendor::MariaDb,
    ];

    /// Canonical tag for this vendor.
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Postgres => "postgres16.3",
            Vendor::Oracle11g => "oracle11g",
            Vendor::Oracle19c => "oracle19c",
            Vendor::MariaDb => "mariadb10.11",
        }
    }

    /// Returns the conventional port for this vendor.
    ///
    /// Only a suggestion: registration requests without a port get it, but
    /// any port in range is accepted.
    pub fn default_port(&self) -> u16 {
        match self {
            Vendor::Postgres => 5432,
            Vendor::Oracle11g | Vendor::Oracle19c => 1521,
            Vendor::MariaDb => 3306,
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres16.3" | "postgres" | "postgresql" => Ok(Vendor::Postgres),
            "oracle11g" => Ok(Vendor::Oracle11g),
            "oracle19c" | "oracle" => Ok(Vendor::Oracle19c),
            "mariadb10.11" | "mariadb" => Ok(Vendor::MariaDb),
            _ => Err(AppError::InvalidDatabaseType(s.to_string())),
        }
    }
}

/// Connection status of a registered database.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionStatus {
    #[default]
    Disconnected = 0,
    /// Declared for completeness, never produced by the registry.
    Connecting = 1,
    Connected = 2,
    /// Declared for completeness, never produced by the registry.
    Error = 3,
}

impl ConnectionStatus {
    /// Decodes the `repr(u8)` discriminant; unknown values read as `Error`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionStatus::Disconnected,
            1 => ConnectionStatus::Connecting,
            2 => ConnectionStatus::Connected,
            _ => ConnectionStatus::Error,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One database connection target.
#[derive(Clone, PartialEq, Eq, Validate)]
pub struct Database {
    #[validate(length(min = 1, message = "database id is required"))]
    pub id: String,
    #[validate(length(min = 1, message = "database name is required"))]
    pub name: String,
    pub vendor: Vendor,
    #[validate(length(min = 1, message = "host is required"))]
    pub host: String,
    #[validate(range(min = 1, max = 65535, message = "port must be 1-65535"))]
    pub port: i32,
    pub schema: Option<String>,
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
    pub status: ConnectionStatus,
}

impl Database {
    /// Creates a disconnected database target without a schema.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        vendor: Vendor,
        host: impl Into<String>,
        port: i32,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            vendor,
            host: host.into(),
            port,
            schema: None,
            username: username.into(),
            password: password.into(),
            status: ConnectionStatus::Disconnected,
        }
    }

    /// Sets the schema (SID or service name for Oracle, search schema for PostgreSQL).
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Returns the schema when one was given and is non-blank.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Whether the fields needed to open a network connection are present.
    ///
    /// Narrower than full validation; checked again right before connecting.
    pub fn can_connect(&self) -> bool {
        !self.host.is_empty()
            && self.port > 0
            && !self.username.is_empty()
            && !self.password.is_empty()
    }

    /// Fixed-length mask when a password is set, empty string otherwise.
    pub fn masked_password(&self) -> &'static str {
        if self.password.is_empty() {
            ""
        } else {
            PASSWORD_MASK
        }
    }

    /// Copy safe to hand to callers outside the registry.
    pub fn masked(mut self) -> Self {
        self.password = self.masked_password().to_string();
        self
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("vendor", &self.vendor)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("schema", &self.schema)
            .field("username", &self.username)
            .field("password", &self.masked_password())
            .field("status", &self.status)
            .finish()
    }
}

/// Database item for API responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DatabaseItem {
    pub id: String,
    pub name: String,
    pub vendor: Vendor,
    pub host: String,
    pub port: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub username: String,
    /// Always the mask, never the stored secret.
    pub password: String,
    pub status: ConnectionStatus,
}

impl From<Database> for DatabaseItem {
    fn from(db: Database) -> Self {
        let password = db.masked_password().to_string();
        Self {
            id: db.id,
            name: db.name,
            vendor: db.vendor,
            host: db.host,
            port: db.port,
            schema: db.schema,
            username: db.username,
            password,
            status: db.status,
        }
    }
}
