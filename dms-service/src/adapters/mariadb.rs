//! MariaDB adapter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlRow};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::Decimal;
use sqlx::{Column, Executor, MySql, Row, Statement, TypeInfo, ValueRef};

use common::models::{Database, QueryResult};
use common::OpContext;

use super::sqlx_pool::{pool_options, port_of, probe_or_close, SqlxHandle};
use super::{
    downcast_handle, float_value, hex_literal, raw_value, DriverError, DriverResult, PoolHandle,
    PoolSettings, VendorAdapter,
};

const NAME: &str = "mariadb";

pub type MariaDbHandle = SqlxHandle<MySql>;

pub struct MariaDbAdapter {
    probe_timeout: Duration,
}

impl MariaDbAdapter {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    /// Connection target: database = `name`.
    pub fn connect_options(db: &Database) -> DriverResult<MySqlConnectOptions> {
        Ok(MySqlConnectOptions::new()
            .host(&db.host)
            .port(port_of(db)?)
            .username(&db.username)
            .password(&db.password)
            .database(&db.name))
    }

    fn handle<'a>(&self, handle: &'a dyn PoolHandle) -> DriverResult<&'a MariaDbHandle> {
        downcast_handle::<MariaDbHandle>(handle, NAME)
    }
}

#[async_trait]
impl VendorAdapter for MariaDbAdapter {
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
        let pool = pool_options::<MySql>(settings).connect_lazy_with(options);
        // No schema means the catalog of the connected database.
        let handle = Arc::new(MariaDbHandle::new(pool, db.schema().map(String::from)));

        probe_or_close(ctx, &*handle, self.probe_timeout).await?;

        tracing::debug!(id = %db.id, host = %db.host, port = db.port, "mariadb pool opened");
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
        let tables = ctx
            .guard(
                sqlx::query_scalar::<_, String>(
                    "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
                     WHERE table_schema = COALESCE(?, DATABASE()) \
                     ORDER BY table_name",
                )
                .bind(handle.catalog_schema())
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
        let columns = ctx
            .guard(
                sqlx::query_scalar::<_, String>(
                    "SELECT CAST(column_name AS CHAR) FROM information_schema.columns \
                     WHERE table_schema = COALESCE(?, DATABASE()) AND table_name = ? \
                     ORDER BY ordinal_position",
                )
                .bind(handle.catalog_schema())
                .bind(table)
                .fetch_all(handle.pool()),
            )
            .await??;
        Ok(columns)
    }
}

fn decode_cell(row: &MySqlRow, index: usize) -> DriverResult<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "BOOLEAN" => Value::Bool(row.try_get(index)?),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => Value::from(row.try_get::<u64, _>(index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            Value::from(row.try_get::<i64, _>(index)?)
        }
        "FLOAT" => float_value(f64::from(row.try_get::<f32, _>(index)?)),
        "DOUBLE" => float_value(row.try_get::<f64, _>(index)?),
        "DECIMAL" => Value::String(row.try_get::<Decimal, _>(index)?.to_string()),
        "TIMESTAMP" => Value::String(row.try_get::<DateTime<Utc>, _>(index)?.to_rfc3339()),
        "DATETIME" => Value::String(
            row.try_get::<NaiveDateTime, _>(index)?
                .format("%Y-%m-%dT%H:%M:%S%.f")
                .to_string(),
        ),
        "DATE" => Value::String(row.try_get::<NaiveDate, _>(index)?.to_string()),
        "TIME" => Value::String(row.try_get::<NaiveTime, _>(index)?.to_string()),
        "JSON" => row.try_get::<Value, _>(index)?,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            Value::String(hex_literal(&row.try_get::<Vec<u8>, _>(index)?))
        }
        "YEAR" => Value::from(row.try_get_unchecked::<u16, _>(index)?),
        "BIT" => Value::from(row.try_get_unchecked::<u64, _>(index)?),
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

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::Vendor;

    #[test]
    fn test_connect_options() {
        let db = Database::new("m1", "shop", Vendor::MariaDb, "10.1.1.1", 3307, "root", "pw");
        let options = MariaDbAdapter::connect_options(&db).unwrap();
        assert_eq!(options.get_host(), "10.1.1.1");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_database(), Some("shop"));
    }

    #[test]
    fn test_zero_port_is_rejected() {
        let mut db = Database::new("m1", "shop", Vendor::MariaDb, "h", 3306, "root", "pw");
        db.port = 0;
        assert!(matches!(
            MariaDbAdapter::connect_options(&db),
            Err(DriverError::Sqlx(sqlx::Error::Configuration(_)))
        ));
    }
}
