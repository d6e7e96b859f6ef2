//! Vendor adapters.
//!
//! Each supported database product gets one [`VendorAdapter`]: an immutable
//! strategy object that knows how to open a pool for a [`Database`], run
//! statements on it and read its catalog. The pool itself is hidden behind
//! [`PoolHandle`] so the registry can own and close it without knowing the
//! driver. Adapters are picked through the [`AdapterRegistry`] map.

pub mod error;
pub mod mariadb;
pub mod oracle;
pub mod postgres;
pub mod sqlx_pool;

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::config::{AdapterConfig, PoolConfig};
use common::models::{Database, QueryResult, Vendor};
use common::OpContext;

pub use error::{DriverError, DriverResult};
pub use mariadb::MariaDbAdapter;
pub use oracle::OracleAdapter;
pub use postgres::PostgresAdapter;
pub use sqlx_pool::SqlxHandle;

/// An open connection pool owned by exactly one registry record.
#[async_trait]
pub trait PoolHandle: Send + Sync + 'static {
    /// Round-trips to the server on one pooled connection.
    async fn ping(&self) -> DriverResult<()>;

    /// Closes the pool. Calls still in flight fail with a driver error.
    async fn close(&self) -> DriverResult<()>;

    fn is_closed(&self) -> bool;

    /// Lets the owning adapter get its concrete handle back.
    fn as_any(&self) -> &dyn Any;
}

/// Capability contract every vendor implements.
#[async_trait]
pub trait VendorAdapter: Send + Sync {
    /// Short vendor name used in logs.
    fn name(&self) -> &'static str;

    /// Upper bound for one health probe.
    fn probe_timeout(&self) -> Duration;

    /// Opens a pool for `db` and checks it answers within [`Self::probe_timeout`].
    async fn connect(
        &self,
        ctx: &OpContext,
        db: &Database,
        settings: &PoolSettings,
    ) -> DriverResult<Arc<dyn PoolHandle>>;

    /// Runs one statement and materializes every row.
    async fn execute_query(
        &self,
        ctx: &OpContext,
        handle: &dyn PoolHandle,
        query: &str,
    ) -> DriverResult<QueryResult>;

    /// Table names visible in the connection's catalog schema, ordered by name.
    async fn get_tables(&self, ctx: &OpContext, handle: &dyn PoolHandle)
        -> DriverResult<Vec<String>>;

    /// Column names of `table`, in ordinal order.
    async fn get_columns(
        &self,
        ctx: &OpContext,
        handle: &dyn PoolHandle,
        table: &str,
    ) -> DriverResult<Vec<String>>;
}

/// Pool limits applied when an adapter opens a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_open: u32,
    pub min_idle: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from(&PoolConfig::default())
    }
}

impl From<&PoolConfig> for PoolSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            max_open: config.max_open.max(1),
            min_idle: config.min_idle.min(config.max_open),
            max_lifetime: Duration::from_secs(config.max_lifetime_secs),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
        }
    }
}

type AdapterFactory = Box<dyn Fn() -> Arc<dyn VendorAdapter> + Send + Sync>;

/// Maps a vendor tag to the constructor of its adapter.
#[derive(Default)]
pub struct AdapterRegistry {
    factories: HashMap<Vendor, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers PostgreSQL, MariaDB and both Oracle tags.
    pub fn with_defaults(config: &AdapterConfig) -> Self {
        let mut registry = Self::new();

        let probe = Duration::from_secs(config.postgres_probe_timeout_secs);
        registry.register(Vendor::Postgres, move || {
            Arc::new(PostgresAdapter::new(probe)) as Arc<dyn VendorAdapter>
        });

        let probe = Duration::from_secs(config.mariadb_probe_timeout_secs);
        registry.register(Vendor::MariaDb, move || {
            Arc::new(MariaDbAdapter::new(probe)) as Arc<dyn VendorAdapter>
        });

        let probe = Duration::from_secs(config.oracle_probe_timeout_secs);
        for vendor in [Vendor::Oracle11g, Vendor::Oracle19c] {
            registry.register(vendor, move || {
                Arc::new(OracleAdapter::new(probe)) as Arc<dyn VendorAdapter>
            });
        }

        registry
    }

    /// Adds or replaces the constructor for `vendor`.
    pub fn register<F>(&mut self, vendor: Vendor, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn VendorAdapter> + Send + Sync + 'static,
    {
        self.factories.insert(vendor, Box::new(factory));
        self
    }

    /// Builds a fresh adapter for `vendor`, if one is registered.
    pub fn create(&self, vendor: Vendor) -> Option<Arc<dyn VendorAdapter>> {
        self.factories.get(&vendor).map(|factory| factory())
    }

    pub fn supports(&self, vendor: Vendor) -> bool {
        self.factories.contains_key(&vendor)
    }

    /// Registered vendors in declaration order.
    pub fn vendors(&self) -> Vec<Vendor> {
        Vendor::ALL
            .into_iter()
            .filter(|vendor| self.supports(*vendor))
            .collect()
    }
}

/// Downcasts a handle to the concrete type an adapter created.
pub(crate) fn downcast_handle<'a, T: 'static>(
    handle: &'a dyn PoolHandle,
    adapter: &'static str,
) -> DriverResult<&'a T> {
    handle
        .as_any()
        .downcast_ref::<T>()
        .ok_or(DriverError::HandleMismatch(adapter))
}

/// Renders binary cells as `\x` followed by lowercase hex.
pub(crate) fn hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Cell for a column type without a dedicated decoding.
///
/// Printable UTF-8 is kept as text, anything else becomes a hex literal.
pub(crate) fn raw_value(bytes: &[u8]) -> serde_json::Value {
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.chars().any(|c| c.is_control() && !c.is_whitespace()) => {
            serde_json::Value::String(text.to_string())
        }
        _ => serde_json::Value::String(hex_literal(bytes)),
    }
}

/// Number cell for a float; NaN and infinities become `null`.
pub(crate) fn float_value(value: f64) -> serde_json::Value {
    serde_json::Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}
