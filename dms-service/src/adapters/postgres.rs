//! PostgreSQL adapter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::types::{Oid, PgInterval, PgMoney};
use sqlx::postgres::{PgConnectOptions, PgHasArrayType, PgRow, PgSslMode};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, Uuid};
use sqlx::{Column, Executor, Postgres, Row, Statement, TypeInfo, ValueRef};

use common::models::{Database, QueryResult};
use common::OpContext;

use super::sqlx_pool::{pool_options, port_of, probe_or_close, SqlxHandle};
use super::{
    downcast_handle, float_value, hex_literal, raw_value, DriverError, DriverResult, PoolHandle,
    PoolSettings, VendorAdapter,
};

const NAME: &str = "postgres";
const DEFAULT_SCHEMA: &str = "public";

pub type PgHandle = SqlxHandle<Postgres>;

pub struct PostgresAdapter {
    probe_timeout: Duration,
}

impl PostgresAdapter {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    /// Connection target: database = `name`, TLS off.
    pub fn connect_options(db: &Database) -> DriverResult<PgConnectOptions> {
        Ok(PgConnectOptions::new()
            .host(&db.host)
            .port(port_of(db)?)
            .username(&db.username)
            .password(&db.password)
            .database(&db.name)
            .ssl_mode(PgSslMode::Disable))
    }

    fn handle<'a>(&self, handle: &'a dyn PoolHandle) -> DriverResult<&'a PgHandle> {
        downcast_handle::<PgHandle>(handle, NAME)
    }
}

#[async_trait]
impl VendorAdapter for PostgresAdapter {
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
        let options = Self::connect_options(db)?;
        let pool = pool_options::<Postgres>(settings).connect_lazy_with(options);
        let schema = db.schema().unwrap_or(DEFAULT_SCHEMA).to_string();
        let handle = Arc::new(PgHandle::new(pool, Some(schema)));

        probe_or_close(ctx, &*handle, self.probe_timeout).await?;

        tracing::debug!(id = %db.id, host = %db.host, port = db.port, "postgres pool opened");
        Ok(handle)
    }

    async fn execute_query(
        &self,
        ctx: &OpContext,
        handle: &dyn PoolHandle,
        query: &str,
    ) -> DriverResult<QueryResult> {
        let handle = self.handle(handle)?;
        ctx.guard(async {
            let mut conn = handle.pool().acquire().await?;
            let start = Instant::now();
            let stmt = (&mut *conn).prepare(query).await?;
            let columns: Vec<String> =
                stmt.columns().iter().map(|c| c.name().to_string()).collect();
            let rows = stmt.query().fetch_all(&mut *conn).await?;
            let values = rows
                .iter()
                .map(|row| {
                    (0..columns.len())
                        .map(|index| decode_cell(row, index))
                        .collect::<DriverResult<Vec<_>>>()
                })
                .collect::<DriverResult<Vec<_>>>()?;
            Ok::<_, DriverError>(QueryResult::from_values(columns, values, start.elapsed()))
        })
        .await?
    }

    async fn get_tables(
        &self,
        ctx: &OpContext,
        handle: &dyn PoolHandle,
    ) -> DriverResult<Vec<String>> {
        let handle = self.handle(handle)?;
        let schema = handle.catalog_schema().unwrap_or(DEFAULT_SCHEMA);
        let tables = ctx
            .guard(
                sqlx::query_scalar::<_, String>(
                    "SELECT tablename::text FROM pg_tables WHERE schemaname = $1 ORDER BY tablename",
                )
                .bind(schema)
                .fetch_all(handle.pool()),
            )
            .await??;
        Ok(tables)
    }

    async fn get_columns(
        &self,
        ctx: &OpContext,
        handle: &dyn PoolHandle,
        table: &str,
    ) -> DriverResult<Vec<String>> {
        let handle = self.handle(handle)?;
        let schema = handle.catalog_schema().unwrap_or(DEFAULT_SCHEMA);
        let columns = ctx
            .guard(
                sqlx::query_scalar::<_, String>(
                    "SELECT column_name::text FROM information_schema.columns \
                     WHERE table_schema = $1 AND table_name = $2 \
                     ORDER BY ordinal_position",
                )
                .bind(schema)
                .bind(table)
                .fetch_all(handle.pool()),
            )
            .await??;
        Ok(columns)
    }
}

fn decode_cell(row: &PgRow, index: usize) -> DriverResult<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "BOOL" => Value::Bool(row.try_get(index)?),
        "INT2" => Value::from(row.try_get::<i16, _>(index)?),
        "INT4" => Value::from(row.try_get::<i32, _>(index)?),
        "INT8" => Value::from(row.try_get::<i64, _>(index)?),
        "FLOAT4" => float_value(f64::from(row.try_get::<f32, _>(index)?)),
        "FLOAT8" => float_value(row.try_get::<f64, _>(index)?),
        "NUMERIC" => Value::String(row.try_get::<Decimal, _>(index)?.to_string()),
        "UUID" => Value::String(row.try_get::<Uuid, _>(index)?.to_string()),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index)?,
        "TIMESTAMPTZ" => Value::String(row.try_get::<DateTime<Utc>, _>(index)?.to_rfc3339()),
        "TIMESTAMP" => Value::String(
            row.try_get::<NaiveDateTime, _>(index)?
                .format("%Y-%m-%dT%H:%M:%S%.f")
                .to_string(),
        ),
        "DATE" => Value::String(row.try_get::<NaiveDate, _>(index)?.to_string()),
        "TIME" => Value::String(row.try_get::<NaiveTime, _>(index)?.to_string()),
        "BYTEA" => Value::String(hex_literal(&row.try_get::<Vec<u8>, _>(index)?)),
        "OID" => Value::from(row.try_get::<Oid, _>(index)?.0),
        "MONEY" => Value::String(row.try_get::<PgMoney, _>(index)?.to_decimal(2).to_string()),
        "INTERVAL" => Value::String(interval_text(&row.try_get::<PgInterval, _>(index)?)),
        "BOOL[]" => array::<bool>(row, index)?,
        "INT2[]" => array::<i16>(row, index)?,
        "INT4[]" => array::<i32>(row, index)?,
        "INT8[]" => array::<i64>(row, index)?,
        "FLOAT8[]" => array::<f64>(row, index)?,
        "TEXT[]" | "VARCHAR[]" => array::<String>(row, index)?,
        _ => match row.try_get::<String, _>(index) {
            Ok(text) => Value::String(text),
            Err(_) => {
                let bytes = row.try_get_unchecked::<Vec<u8>, _>(index).map_err(|_| {
                    DriverError::decode(row.column(index).name(), type_name.as_str())
                })?;
                raw_value(&bytes)
            }
        },
    };
    Ok(value)
}

/// One-dimensional array cell; NULL elements stay `null`.
fn array<T>(row: &PgRow, index: usize) -> DriverResult<Value>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres> + PgHasArrayType + Into<Value>,
{
    Ok(Value::from(row.try_get::<Vec<Option<T>>, _>(index)?))
}

/// ISO 8601 duration keeping the months/days/time split Postgres stores.
fn interval_text(interval: &PgInterval) -> String {
    let sign = if interval.microseconds < 0 { "-" } else { "" };
    let micros = interval.microseconds.unsigned_abs();
    let mut out = format!(
        "P{}M{}DT{sign}{}",
        interval.months,
        interval.days,
        micros / 1_000_000
    );
    let fraction = micros % 1_000_000;
    if fraction > 0 {
        out.push_str(&format!(".{fraction:06}"));
    }
    out.push('S');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::Vendor;

    fn database() -> Database {
        Database::new("pg1", "app", Vendor::Postgres, "db.local", 5433, "u", "p")
    }

    #[test]
    fn test_connect_options_use_name_as_database() {
        let options = PostgresAdapter::connect_options(&database()).unwrap();
        assert_eq!(options.get_host(), "db.local");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_username(), "u");
        assert_eq!(options.get_database(), Some("app"));
    }

    #[test]
    fn test_out_of_range_port_is_a_driver_error() {
        let mut db = database();
        db.port = 70000;
        assert!(PostgresAdapter::connect_options(&db).is_err());
    }

    #[test]
    fn test_interval_text() {
        let interval = PgInterval {
            months: 14,
            days: 3,
            microseconds: 3_600_500_000,
        };
        assert_eq!(interval_text(&interval), "P14M3DT3600.500000S");

        let negative = PgInterval {
            months: 0,
            days: 0,
            microseconds: -90_000_000,
        };
        assert_eq!(interval_text(&negative), "P0M0DT-90S");
    }

    #[tokio::test]
    async fn test_foreign_handle_is_rejected() {
        struct Other;

        #[async_trait]
        impl PoolHandle for Other {
            async fn ping(&self) -> DriverResult<()> {
                Ok(())
            }
            async fn close(&self) -> DriverResult<()> {
                Ok(())
            }
            fn is_closed(&self) -> bool {
                false
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }

        let adapter = PostgresAdapter::new(Duration::from_secs(1));
        let err = adapter
            .get_tables(&OpContext::background(), &Other)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::HandleMismatch("postgres")));
    }
}
