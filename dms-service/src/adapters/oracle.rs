//! Oracle adapter.
//!
//! Built on the ODPI-C session pool of the `oracle` crate. The driver is
//! blocking, so every call runs on tokio's blocking pool with an ODPI call
//! timeout taken from the operation context.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use oracle::pool::{CloseMode, GetMode, Pool, PoolBuilder};
use oracle::sql_type::{OracleType, Timestamp};
use oracle::{Connection, Row};
use serde_json::Value;

use common::models::{Database, QueryResult};
use common::OpContext;

use super::{
    downcast_handle, float_value, hex_literal, DriverError, DriverResult, PoolHandle,
    PoolSettings, VendorAdapter,
};

const NAME: &str = "oracle";

/// Session pool shared with blocking tasks.
pub struct OracleHandle {
    pool: Arc<Pool>,
    probe_timeout: Duration,
    closed: AtomicBool,
}

impl OracleHandle {
    fn new(pool: Pool, probe_timeout: Duration) -> Self {
        Self {
            pool: Arc::new(pool),
            probe_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Runs `f` on a pooled session inside the blocking pool.
    async fn with_session<T, F>(&self, call_timeout: Option<Duration>, f: F) -> DriverResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> DriverResult<T> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            conn.set_call_timeout(call_timeout.map(|t| t.max(Duration::from_millis(1))))?;
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl PoolHandle for OracleHandle {
    async fn ping(&self) -> DriverResult<()> {
        // The call timeout stops the blocking thread, not just the awaiting task.
        self.with_session(Some(self.probe_timeout), |conn| Ok(conn.ping()?))
            .await
    }

    async fn close(&self) -> DriverResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            // Busy sessions block a default close; force them shut.
            if pool.close(&CloseMode::Default).is_err() {
                pool.close(&CloseMode::Force)?;
            }
            Ok::<_, DriverError>(())
        })
        .await?
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct OracleAdapter {
    probe_timeout: Duration,
}

impl OracleAdapter {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    /// EZConnect string; the schema, when set, names the SID/service.
    pub fn connect_string(db: &Database) -> String {
        format!(
            "//{}:{}/{}",
            db.host,
            db.port,
            db.schema().unwrap_or(&db.name)
        )
    }

    /// Pool builder carrying the registry's limits.
    ///
    /// Session checkout waits at most `acquire_timeout`.
    pub fn pool_builder(db: &Database, settings: &PoolSettings) -> oracle::Result<PoolBuilder> {
        let mut builder = PoolBuilder::new(
            db.username.clone(),
            db.password.clone(),
            Self::connect_string(db),
        );
        builder
            .min_connections(settings.min_idle)
            .max_connections(settings.max_open)
            .get_mode(GetMode::TimedWait(settings.acquire_timeout));
        builder
            .max_lifetime_connection(settings.max_lifetime)?
            .timeout(settings.idle_timeout)?;
        Ok(builder)
    }

    fn handle<'a>(&self, handle: &'a dyn PoolHandle) -> DriverResult<&'a OracleHandle> {
        downcast_handle::<OracleHandle>(handle, NAME)
    }
}

#[async_trait]
impl VendorAdapter for OracleAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    async fn connect(
        &self,
        ctx: &OpContext,
        db: &Database,
        settings: &PoolSettings,
    ) -> DriverResult<Arc<dyn PoolHandle>> {
        let target = db.clone();
        let settings = settings.clone();

        let build = tokio::task::spawn_blocking(move || {
            Self::pool_builder(&target, &settings)?.build()
        });
        let pool = ctx.guard(build).await???;
        let probe_timeout = self.probe_timeout;
        let handle = Arc::new(OracleHandle::new(pool, probe_timeout));

        let probe = handle.ping();
        let outcome = match ctx.guard(tokio::time::timeout(probe_timeout, probe)).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DriverError::ProbeTimeout(probe_timeout)),
            Err(reason) => Err(reason.into()),
        };
        if let Err(e) = outcome {
            if let Err(close_err) = handle.close().await {
                tracing::warn!(id = %db.id, error = %close_err, "failed to release oracle pool");
            }
            return Err(e);
        }

        tracing::debug!(id = %db.id, connect = %Self::connect_string(db), "oracle pool opened");
        Ok(handle)
    }

    async fn execute_query(
        &self,
        ctx: &OpContext,
        handle: &dyn PoolHandle,
        query: &str,
    ) -> DriverResult<QueryResult> {
        let handle = self.handle(handle)?;
        let sql = normalize_statement(query);
        ctx.guard(handle.with_session(ctx.remaining(), move |conn| run_query(conn, &sql)))
            .await?
    }

    async fn get_tables(
        &self,
        ctx: &OpContext,
        handle: &dyn PoolHandle,
    ) -> DriverResult<Vec<String>> {
        let handle = self.handle(handle)?;
        ctx.guard(handle.with_session(ctx.remaining(), |conn| {
            let rows =
                conn.query_as::<String>("SELECT table_name FROM user_tables ORDER BY table_name", &[])?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        }))
        .await?
    }

    async fn get_columns(
        &self,
        ctx: &OpContext,
        handle: &dyn PoolHandle,
        table: &str,
    ) -> DriverResult<Vec<String>> {
        let handle = self.handle(handle)?;
        let table = table.to_string();
        ctx.guard(handle.with_session(ctx.remaining(), move |conn| {
            let rows = conn.query_as::<String>(
                "SELECT column_name FROM user_tab_columns WHERE table_name = :1 ORDER BY column_id",
                &[&table],
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        }))
        .await?
    }
}

/// Drops the trailing `;` Oracle rejects on plain SQL. PL/SQL blocks keep it.
fn normalize_statement(query: &str) -> String {
    let trimmed = query.trim();
    let head = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    if head == "BEGIN" || head == "DECLARE" {
        return trimmed.to_string();
    }
    trimmed.trim_end_matches(';').trim_end().to_string()
}

fn run_query(conn: &Connection, sql: &str) -> DriverResult<QueryResult> {
    let start = Instant::now();
    let mut stmt = conn.statement(sql).build()?;
    if !stmt.is_query() {
        stmt.execute(&[])?;
        conn.commit()?;
        return Ok(QueryResult::empty(start.elapsed()));
    }

    let rows = stmt.query(&[])?;
    let columns: Vec<String> = rows
        .column_info()
        .iter()
        .map(|info| info.name().to_string())
        .collect();
    let types: Vec<OracleType> = rows
        .column_info()
        .iter()
        .map(|info| info.oracle_type().clone())
        .collect();

    let mut values = Vec::new();
    for row in rows {
        let row = row?;
        let cells = types
            .iter()
            .enumerate()
            .map(|(index, ty)| decode_cell(&row, index, ty))
            .collect::<DriverResult<Vec<_>>>()?;
        values.push(cells);
    }
    Ok(QueryResult::from_values(columns, values, start.elapsed()))
}

fn decode_cell(row: &Row, index: usize, ty: &OracleType) -> DriverResult<Value> {
    let value = match ty {
        OracleType::Number(_, _) | OracleType::Float(_) | OracleType::Int64 | OracleType::UInt64 => {
            // Integral values stay numbers; fractions keep their exact text.
            match row.get::<usize, Option<i64>>(index) {
                Ok(v) => v.map(Value::from).unwrap_or(Value::Null),
                Err(_) => text(row.get::<usize, Option<String>>(index)?),
            }
        }
        OracleType::BinaryFloat | OracleType::BinaryDouble => row
            .get::<usize, Option<f64>>(index)?
            .map(float_value)
            .unwrap_or(Value::Null),
        OracleType::Boolean => row
            .get::<usize, Option<bool>>(index)?
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB => row
            .get::<usize, Option<Vec<u8>>>(index)?
            .map(|bytes| Value::String(hex_literal(&bytes)))
            .unwrap_or(Value::Null),
        OracleType::Date
        | OracleType::Timestamp(_)
        | OracleType::TimestampTZ(_)
        | OracleType::TimestampLTZ(_) => row
            .get::<usize, Option<Timestamp>>(index)?
            .map(|ts| Value::String(iso_timestamp(&ts)))
            .unwrap_or(Value::Null),
        _ => text(row.get::<usize, Option<String>>(index)?),
    };
    Ok(value)
}

fn text(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

fn iso_timestamp(ts: &Timestamp) -> String {
    let mut out = format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        ts.year(),
        ts.month(),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second()
    );
    if ts.nanosecond() > 0 {
        out.push_str(&format!(".{:09}", ts.nanosecond()));
    }
    if ts.with_tz() {
        let offset = ts.tz_hour_offset() * 60 + ts.tz_minute_offset();
        let sign = if offset < 0 { '-' } else { '+' };
        let offset = offset.abs();
        out.push_str(&format!("{sign}{:02}:{:02}", offset / 60, offset % 60));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::Vendor;

    #[test]
    fn test_connect_string_prefers_schema() {
        let db = Database::new("ora", "ORCL", Vendor::Oracle19c, "10.0.0.1", 1521, "scott", "tiger");
        assert_eq!(OracleAdapter::connect_string(&db), "//10.0.0.1:1521/ORCL");

        let db = db.with_schema("XE");
        assert_eq!(OracleAdapter::connect_string(&db), "//10.0.0.1:1521/XE");
    }

    #[test]
    fn test_blank_schema_falls_back_to_name() {
        let db = Database::new("ora", "ORCL", Vendor::Oracle11g, "h", 1522, "s", "t").with_schema(" ");
        assert_eq!(OracleAdapter::connect_string(&db), "//h:1522/ORCL");
    }

    #[test]
    fn test_pool_builder_accepts_pool_settings() {
        let db = Database::new("ora", "ORCL", Vendor::Oracle19c, "10.0.0.1", 1521, "scott", "tiger");
        assert!(OracleAdapter::pool_builder(&db, &PoolSettings::default()).is_ok());

        let settings = PoolSettings {
            max_open: 4,
            min_idle: 1,
            max_lifetime: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(2),
        };
        assert!(OracleAdapter::pool_builder(&db, &settings).is_ok());
    }

    #[test]
    fn test_normalize_statement() {
        assert_eq!(normalize_statement("SELECT 1 FROM dual;  "), "SELECT 1 FROM dual");
        assert_eq!(normalize_statement("select * from t"), "select * from t");
        assert_eq!(
            normalize_statement("begin null; end;"),
            "begin null; end;"
        );
    }
}
