//! Pool handle shared by the sqlx-backed adapters.

use std::any::Any;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::pool::PoolOptions;
use sqlx::{Connection, Pool};

use common::models::Database;
use common::OpContext;

use super::{DriverError, DriverResult, PoolHandle, PoolSettings};

/// A sqlx pool plus the schema its catalog queries read.
pub struct SqlxHandle<DB: sqlx::Database> {
    pool: Pool<DB>,
    catalog_schema: Option<String>,
}

impl<DB: sqlx::Database> SqlxHandle<DB> {
    pub fn new(pool: Pool<DB>, catalog_schema: Option<String>) -> Self {
        Self {
            pool,
            catalog_schema,
        }
    }

    pub fn pool(&self) -> &Pool<DB> {
        &self.pool
    }

    pub fn catalog_schema(&self) -> Option<&str> {
        self.catalog_schema.as_deref()
    }
}

/// Pool options carrying the registry's limits.
///
/// Connections open lazily; the first probe establishes one.
pub(crate) fn pool_options<DB: sqlx::Database>(settings: &PoolSettings) -> PoolOptions<DB> {
    PoolOptions::<DB>::new()
        .max_connections(settings.max_open)
        .min_connections(settings.min_idle)
        .max_lifetime(settings.max_lifetime)
        .idle_timeout(settings.idle_timeout)
        .acquire_timeout(settings.acquire_timeout)
}

/// TCP port of `db`, rejected as a configuration error when out of range.
pub(crate) fn port_of(db: &Database) -> DriverResult<u16> {
    u16::try_from(db.port)
        .ok()
        .filter(|port| *port > 0)
        .ok_or_else(|| {
            DriverError::Sqlx(sqlx::Error::Configuration(
                format!("port {} out of range", db.port).into(),
            ))
        })
}

/// Pings a freshly opened pool within `probe_timeout`, closing it on failure.
pub(crate) async fn probe_or_close<DB: sqlx::Database>(
    ctx: &OpContext,
    handle: &SqlxHandle<DB>,
    probe_timeout: Duration,
) -> DriverResult<()> {
    let probe = tokio::time::timeout(probe_timeout, handle.ping());
    let outcome = match ctx.guard(probe).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(DriverError::ProbeTimeout(probe_timeout)),
        Err(reason) => Err(reason.into()),
    };
    if outcome.is_err() {
        handle.pool.close().await;
    }
    outcome
}

#[async_trait]
impl<DB: sqlx::Database> PoolHandle for SqlxHandle<DB> {
    async fn ping(&self) -> DriverResult<()> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        self.pool.close().await;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
