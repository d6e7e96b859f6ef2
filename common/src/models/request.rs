//! Request bodies accepted by the HTTP surface.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppResult;
use crate::models::database::{ConnectionStatus, Database, Vendor};

/// Request body for registering (and connecting) a database.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterDatabaseRequest {
    /// Unique database identifier chosen by the caller.
    pub id: String,
    /// Database name (also the SID / database to open when no schema is set).
    pub name: String,
    /// Vendor tag, e.g. `postgres16.3`, `oracle19c`, `mariadb10.11`.
    #[serde(alias = "type")]
    pub vendor: String,
    pub host: String,
    /// Uses the vendor's conventional port when omitted.
    #[serde(default)]
    pub port: Option<i32>,
    #[serde(default)]
    pub schema: Option<String>,
    pub username: String,
    pub password: String,
}

impl RegisterDatabaseRequest {
    /// Converts the request into a disconnected [`Database`].
    ///
    /// Fails with `InvalidDatabaseType` for an unknown vendor tag.
    pub fn into_database(self) -> AppResult<Database> {
        let vendor: Vendor = self.vendor.parse()?;
        Ok(Database {
            id: self.id,
            name: self.name,
            vendor,
            host: self.host,
            port: self.port.unwrap_or_else(|| i32::from(vendor.default_port())),
            schema: self.schema.filter(|s| !s.trim().is_empty()),
            username: self.username,
            password: self.password,
            status: ConnectionStatus::Disconnected,
        })
    }
}

/// Request body for executing a SQL statement.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExecuteQueryRequest {
    /// SQL statement to execute.
    pub query: String,
}
