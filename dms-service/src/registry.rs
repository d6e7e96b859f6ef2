//! Connection registry.
//!
//! Concurrency-safe directory of live connections keyed by database id. Each
//! entry owns the pool handle opened by its vendor adapter and the cached
//! connection status.
//!
//! Locking: registration holds the write lock for the whole connect so two
//! registrations of one id can never both reach the network. Removal takes the
//! write lock only to detach records; handles are closed after the lock is
//! released. Reads (queries, catalog lookups, probes) take the read lock for
//! the map lookup only and do their I/O on a cloned `Arc` of the record, so a
//! slow query never blocks the directory. A record detached while a query is
//! running stays alive until that query returns; the query itself fails once
//! its pool is closed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::RwLock;

use common::config::PoolConfig;
use common::errors::{AppError, AppResult, CloseFailures};
use common::models::{ConnectionStatus, Database, QueryResult, Vendor};
use common::OpContext;

use crate::adapters::{AdapterRegistry, DriverError, PoolHandle, PoolSettings, VendorAdapter};

/// One registered connection.
pub struct ConnectionRecord {
    database: Database,
    status: AtomicU8,
    handle: Arc<dyn PoolHandle>,
    adapter: Arc<dyn VendorAdapter>,
}

impl ConnectionRecord {
    fn new(database: Database, handle: Arc<dyn PoolHandle>, adapter: Arc<dyn VendorAdapter>) -> Self {
        Self {
            status: AtomicU8::new(ConnectionStatus::Disconnected as u8),
            database,
            handle,
            adapter,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Copy of the database with the current status filled in.
    pub fn snapshot(&self) -> Database {
        let mut database = self.database.clone();
        database.status = self.status();
        database
    }

    fn id(&self) -> &str {
        &self.database.id
    }

    fn ensure_connected(&self) -> AppResult<()> {
        if self.status() != ConnectionStatus::Connected || self.handle.is_closed() {
            return Err(AppError::NotConnected(self.id().to_string()));
        }
        Ok(())
    }

    /// Classifies a failed read operation.
    fn operation_error(&self, err: DriverError) -> AppError {
        if let Some(reason) = err.interruption() {
            return AppError::interrupted(self.id(), reason);
        }
        if self.handle.is_closed() {
            return AppError::NotConnected(self.id().to_string());
        }
        AppError::query_failed(self.id(), err)
    }
}

/// Directory of live connections.
pub struct ConnectionRegistry {
    adapters: AdapterRegistry,
    pool_settings: PoolSettings,
    close_timeout: Duration,
    connections: RwLock<HashMap<String, Arc<ConnectionRecord>>>,
}

impl ConnectionRegistry {
    pub fn new(adapters: AdapterRegistry, pool: &PoolConfig) -> Self {
        Self::with_settings(
            adapters,
            PoolSettings::from(pool),
            Duration::from_secs(pool.close_timeout_secs),
        )
    }

    pub fn with_settings(
        adapters: AdapterRegistry,
        pool_settings: PoolSettings,
        close_timeout: Duration,
    ) -> Self {
        Self {
            adapters,
            pool_settings,
            close_timeout,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Whether an adapter is registered for `vendor`.
    pub fn supports(&self, vendor: Vendor) -> bool {
        self.adapters.supports(vendor)
    }

    /// Opens a connection for `database` and registers it.
    ///
    /// Returns the stored snapshot with status `Connected`. On any failure
    /// the partially opened pool is released and nothing is registered.
    pub async fn connect(&self, ctx: &OpContext, mut database: Database) -> AppResult<Database> {
        let mut connections = self.connections.write().await;
        if connections.contains_key(&database.id) {
            return Err(AppError::AlreadyConnected(database.id));
        }
        let adapter = self
            .adapters
            .create(database.vendor)
            .ok_or_else(|| AppError::InvalidDatabaseType(database.vendor.to_string()))?;

        database.status = ConnectionStatus::Disconnected;
        tracing::info!(
            id = %database.id,
            vendor = %database.vendor,
            host = %database.host,
            port = database.port,
            "connecting to database"
        );

        let handle = adapter
            .connect(ctx, &database, &self.pool_settings)
            .await
            .map_err(|e| {
                tracing::warn!(id = %database.id, error = %e, "connection attempt failed");
                AppError::connection_failed(&database.id, e)
            })?;

        if let Err(e) = probe(ctx, adapter.as_ref(), handle.as_ref()).await {
            tracing::warn!(id = %database.id, error = %e, "health probe failed after connect");
            if let Err(close_err) = self.close_handle(ctx, handle.as_ref()).await {
                tracing::warn!(id = %database.id, error = %close_err, "failed to release pool");
            }
            return Err(AppError::connection_failed(&database.id, e));
        }

        let record = Arc::new(ConnectionRecord::new(database, handle, adapter));
        record.set_status(ConnectionStatus::Connected);
        let snapshot = record.snapshot();
        connections.insert(snapshot.id.clone(), record);

        tracing::info!(id = %snapshot.id, vendor = %snapshot.vendor, "database connected");
        Ok(snapshot)
    }

    /// Removes `id` and closes its pool.
    ///
    /// The entry is gone even when closing fails; the failure is still
    /// reported as `CloseFailed`.
    pub async fn disconnect(&self, ctx: &OpContext, id: &str) -> AppResult<()> {
        let record = self
            .connections
            .write()
            .await
            .remove(id)
            .ok_or_else(|| AppError::DatabaseNotFound(id.to_string()))?;

        let closed = self.close_handle(ctx, record.handle.as_ref()).await;
        record.set_status(ConnectionStatus::Disconnected);

        match closed {
            Ok(()) => {
                tracing::info!(id = %id, "database disconnected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "database removed but pool did not close cleanly");
                Err(AppError::close_failed(id, e))
            }
        }
    }

    /// Runs `query` on the connection registered as `id`.
    pub async fn execute_query(
        &self,
        ctx: &OpContext,
        id: &str,
        query: &str,
    ) -> AppResult<QueryResult> {
        let record = self.lookup(id).await?;
        record.ensure_connected()?;
        let result = record
            .adapter
            .execute_query(ctx, record.handle.as_ref(), query)
            .await
            .map_err(|e| record.operation_error(e))?;

        tracing::debug!(
            id = %id,
            rows = result.row_count(),
            elapsed_ms = result.execution_time().as_millis() as u64,
            "query executed"
        );
        Ok(result)
    }

    /// Table names of the connection's catalog schema.
    pub async fn get_tables(&self, ctx: &OpContext, id: &str) -> AppResult<Vec<String>> {
        let record = self.lookup(id).await?;
        record.ensure_connected()?;
        record
            .adapter
            .get_tables(ctx, record.handle.as_ref())
            .await
            .map_err(|e| record.operation_error(e))
    }

    /// Column names of `table`.
    pub async fn get_columns(
        &self,
        ctx: &OpContext,
        id: &str,
        table: &str,
    ) -> AppResult<Vec<String>> {
        let record = self.lookup(id).await?;
        record.ensure_connected()?;
        record
            .adapter
            .get_columns(ctx, record.handle.as_ref(), table)
            .await
            .map_err(|e| record.operation_error(e))
    }

    /// Probes the connection and reports whether it is usable.
    ///
    /// A failed probe marks the record `Disconnected`; it stays registered
    /// until disconnected explicitly. An interrupted probe changes nothing.
    pub async fn is_connected(&self, ctx: &OpContext, id: &str) -> bool {
        let Some(record) = self.find(id).await else {
            return false;
        };
        if record.handle.is_closed() {
            record.set_status(ConnectionStatus::Disconnected);
            return false;
        }

        match probe(ctx, record.adapter.as_ref(), record.handle.as_ref()).await {
            Ok(()) => record.status() == ConnectionStatus::Connected,
            Err(DriverError::Interrupted(_)) => false,
            Err(e) => {
                if record.status() == ConnectionStatus::Connected {
                    tracing::warn!(id = %id, error = %e, "health probe failed, marking disconnected");
                }
                record.set_status(ConnectionStatus::Disconnected);
                false
            }
        }
    }

    /// Snapshots of every registered database, ordered by id.
    ///
    /// Passwords are not masked here.
    pub async fn list_connections(&self) -> Vec<Database> {
        let mut databases: Vec<Database> = self
            .connections
            .read()
            .await
            .values()
            .map(|record| record.snapshot())
            .collect();
        databases.sort_by(|a, b| a.id.cmp(&b.id));
        databases
    }

    /// Snapshot of one registered database.
    pub async fn get(&self, id: &str) -> Option<Database> {
        self.find(id).await.map(|record| record.snapshot())
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Detaches every connection and closes all pools concurrently.
    ///
    /// The registry is empty afterwards whatever happens; every close failure
    /// is collected into one `ShutdownIncomplete` error.
    pub async fn disconnect_all(&self, ctx: &OpContext) -> AppResult<()> {
        let mut drained: Vec<Arc<ConnectionRecord>> = {
            let mut connections = self.connections.write().await;
            connections.drain().map(|(_, record)| record).collect()
        };
        drained.sort_by(|a, b| a.id().cmp(b.id()));
        if drained.is_empty() {
            return Ok(());
        }
        tracing::info!(count = drained.len(), "closing all connections");

        let outcomes = join_all(drained.iter().map(|record| async move {
            let closed = self.close_handle(ctx, record.handle.as_ref()).await;
            record.set_status(ConnectionStatus::Disconnected);
            (record.id(), closed)
        }))
        .await;

        let mut failures = CloseFailures::default();
        for (id, outcome) in outcomes {
            if let Err(e) = outcome {
                tracing::warn!(id = %id, error = %e, "failed to close connection");
                failures.push(id, e);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::ShutdownIncomplete(failures))
        }
    }

    async fn find(&self, id: &str) -> Option<Arc<ConnectionRecord>> {
        self.connections.read().await.get(id).cloned()
    }

    async fn lookup(&self, id: &str) -> AppResult<Arc<ConnectionRecord>> {
        self.find(id)
            .await
            .ok_or_else(|| AppError::DatabaseNotFound(id.to_string()))
    }

    /// Closes `handle`, bounded by `ctx` and the configured close timeout.
    ///
    /// A `ctx` that is already done still gets one attempt, bounded by the
    /// close timeout alone, so a detached pool is never left open.
    async fn close_handle(&self, ctx: &OpContext, handle: &dyn PoolHandle) -> Result<(), DriverError> {
        let bounded = match ctx.check() {
            Ok(()) => ctx.with_timeout(self.close_timeout),
            Err(_) => OpContext::background().with_timeout(self.close_timeout),
        };
        bounded.guard(handle.close()).await?
    }
}

/// One health probe bounded by the adapter's probe timeout and by `ctx`.
async fn probe(
    ctx: &OpContext,
    adapter: &dyn VendorAdapter,
    handle: &dyn PoolHandle,
) -> Result<(), DriverError> {
    let timeout = adapter.probe_timeout();
    match ctx.guard(tokio::time::timeout(timeout, handle.ping())).await? {
        Ok(result) => result,
        Err(_) => Err(DriverError::ProbeTimeout(timeout)),
    }
}
