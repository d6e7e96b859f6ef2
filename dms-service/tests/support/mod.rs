//! In-memory vendor adapter used by the integration tests.
#![allow(dead_code)]

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use common::models::{Database, QueryResult, Vendor};
use common::OpContext;
use dms_service::adapters::{
    AdapterRegistry, DriverError, DriverResult, PoolHandle, PoolSettings, VendorAdapter,
};
use dms_service::ConnectionRegistry;

/// Shared state behind every fake adapter and handle.
#[derive(Default)]
pub struct FakeBackend {
    handles: Mutex<HashMap<String, Arc<FakeHandle>>>,
    refuse_connect: Mutex<HashSet<String>>,
    fail_close: Mutex<HashSet<String>>,
    connect_delay: Mutex<Duration>,
    query_delay: Mutex<Duration>,
    connects: AtomicUsize,
}

impl FakeBackend {
    /// Latest handle opened for `id`.
    pub fn handle(&self, id: &str) -> Option<Arc<FakeHandle>> {
        self.handles.lock().unwrap().get(id).cloned()
    }

    /// Number of connect attempts that reached the adapter.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Closes the pool of `id` behind the registry's back.
    pub fn force_close(&self, id: &str) {
        if let Some(handle) = self.handle(id) {
            handle.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Makes pings on `id` fail while the pool stays open.
    pub fn break_ping(&self, id: &str) {
        if let Some(handle) = self.handle(id) {
            handle.ping_broken.store(true, Ordering::SeqCst);
        }
    }

    pub fn refuse_connect(&self, id: &str) {
        self.refuse_connect.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_close(&self, id: &str) {
        self.fail_close.lock().unwrap().insert(id.to_string());
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = delay;
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *self.query_delay.lock().unwrap() = delay;
    }
}

pub struct FakeHandle {
    id: String,
    closed: AtomicBool,
    ping_broken: AtomicBool,
    backend: Arc<FakeBackend>,
}

#[async_trait]
impl PoolHandle for FakeHandle {
    async fn ping(&self) -> DriverResult<()> {
        if self.closed.load(Ordering::SeqCst) || self.ping_broken.load(Ordering::SeqCst) {
            return Err(DriverError::Sqlx(sqlx::Error::PoolClosed));
        }
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.backend.fail_close.lock().unwrap().contains(&self.id) {
            return Err(DriverError::Sqlx(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "close refused",
            ))));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct FakeAdapter {
    backend: Arc<FakeBackend>,
}

impl FakeAdapter {
    fn handle<'a>(&self, handle: &'a dyn PoolHandle) -> DriverResult<&'a FakeHandle> {
        handle
            .as_any()
            .downcast_ref::<FakeHandle>()
            .ok_or(DriverError::HandleMismatch("fake"))
    }
}

#[async_trait]
impl VendorAdapter for FakeAdapter {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn connect(
        &self,
        ctx: &OpContext,
        db: &Database,
        _settings: &PoolSettings,
    ) -> DriverResult<Arc<dyn PoolHandle>> {
        self.backend.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.backend.connect_delay.lock().unwrap();
        ctx.guard(tokio::time::sleep(delay)).await?;

        if self.backend.refuse_connect.lock().unwrap().contains(&db.id) {
            return Err(DriverError::Sqlx(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))));
        }

        let handle = Arc::new(FakeHandle {
            id: db.id.clone(),
            closed: AtomicBool::new(false),
            ping_broken: AtomicBool::new(false),
            backend: Arc::clone(&self.backend),
        });
        self.backend
            .handles
            .lock()
            .unwrap()
            .insert(db.id.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    async fn execute_query(
        &self,
        ctx: &OpContext,
        handle: &dyn PoolHandle,
        query: &str,
    ) -> DriverResult<QueryResult> {
        let handle = self.handle(handle)?;
        let delay = *self.backend.query_delay.lock().unwrap();
        let started = tokio::time::Instant::now();
        ctx.guard(tokio::time::sleep(delay)).await?;
        if handle.is_closed() {
            return Err(DriverError::Sqlx(sqlx::Error::PoolClosed));
        }

        match query.trim() {
            "SELECT 1" => Ok(QueryResult::from_values(
                ["?column?"],
                vec![vec![json!(1)]],
                started.elapsed(),
            )),
            "SELECT id FROM empty" => Ok(QueryResult::from_values(
                ["id"],
                Vec::new(),
                started.elapsed(),
            )),
            _ => Err(DriverError::Sqlx(sqlx::Error::Protocol(format!(
                "syntax error at or near \"{query}\""
            )))),
        }
    }

    async fn get_tables(
        &self,
        ctx: &OpContext,
        handle: &dyn PoolHandle,
    ) -> DriverResult<Vec<String>> {
        self.handle(handle)?;
        ctx.check()?;
        Ok(vec!["orders".to_string(), "users".to_string()])
    }

    async fn get_columns(
        &self,
        ctx: &OpContext,
        handle: &dyn PoolHandle,
        table: &str,
    ) -> DriverResult<Vec<String>> {
        self.handle(handle)?;
        ctx.check()?;
        Ok(match table {
            "users" => vec!["id".to_string(), "name".to_string()],
            _ => Vec::new(),
        })
    }
}

/// Adapter map with the fake behind the PostgreSQL and MariaDB tags.
/// Oracle tags stay unregistered.
pub fn fake_adapters() -> (AdapterRegistry, Arc<FakeBackend>) {
    let backend = Arc::new(FakeBackend::default());
    let mut adapters = AdapterRegistry::new();
    for vendor in [Vendor::Postgres, Vendor::MariaDb] {
        let backend = Arc::clone(&backend);
        adapters.register(vendor, move || {
            Arc::new(FakeAdapter {
                backend: Arc::clone(&backend),
            }) as Arc<dyn VendorAdapter>
        });
    }
    (adapters, backend)
}

pub fn fake_registry() -> (Arc<ConnectionRegistry>, Arc<FakeBackend>) {
    let (adapters, backend) = fake_adapters();
    let registry =
        ConnectionRegistry::with_settings(adapters, PoolSettings::default(), Duration::from_secs(5));
    (Arc::new(registry), backend)
}

pub fn postgres(id: &str) -> Database {
    Database::new(id, "app", Vendor::Postgres, "db.local", 5432, "app_user", "s3cret")
}

pub fn ctx() -> OpContext {
    OpContext::background().with_timeout(Duration::from_secs(30))
}
