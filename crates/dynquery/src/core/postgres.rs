//! PostgreSQL driver backed by a small deadpool pool per connection target.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_postgres::{
    types::{FromSql, Type},
    Config as PgConfig, NoTls, Row,
};
use tracing::{debug, info};

use crate::{
    core::{
        driver::{quote_ident, DbConnection, Driver},
        types::{ColumnDescriptor, Credentials, DbRow, Dialect, QueryResult},
    },
    error::{AppError, AppResult},
};

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PostgresDriver {
    pool_size: usize,
    /// Bounds TCP connect, pool slot creation and waiting for a free slot.
    connect_timeout: Duration,
}

impl PostgresDriver {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size: pool_size.max(1),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new(4)
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn open(&self, creds: &Credentials) -> AppResult<Arc<dyn DbConnection>> {
        let host = creds.host.trim();
        let port = creds.port.unwrap_or(DEFAULT_PORT);
        let database = creds.database_name.trim();
        let target = format!("{host}:{port}/{database}");

        let mut pg_config = PgConfig::new();
        pg_config.host(host);
        pg_config.port(port);
        pg_config.dbname(database);
        pg_config.user(creds.username.trim());
        pg_config.password(&creds.password);
        pg_config.connect_timeout(self.connect_timeout);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(self.pool_size)
            .wait_timeout(Some(self.connect_timeout))
            .create_timeout(Some(self.connect_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| AppError::connection(target.clone(), e))?;

        // The pool connects lazily; take one client now so bad credentials fail here.
        let client = pool
            .get()
            .await
            .map_err(|e| AppError::connection(target.clone(), e))?;
        drop(client);

        info!(%target, "opened postgres pool");
        Ok(Arc::new(PgConnection { pool, target }))
    }
}

pub struct PgConnection {
    pool: Pool,
    target: String,
}

impl fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnection")
            .field("target", &self.target)
            .finish()
    }
}

impl PgConnection {
    async fn client(&self) -> AppResult<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::connection(self.target.clone(), e))
    }

    async fn table_exists(&self, client: &Object, table: &str) -> AppResult<bool> {
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1 \
                 AND table_type = 'BASE TABLE')",
                &[&table],
            )
            .await?;
        Ok(row.get::<_, bool>(0))
    }

    /// Primary-key columns in key order, or `ctid` when the table has no key.
    async fn order_by(&self, client: &Object, table: &str) -> AppResult<String> {
        let rows = client
            .query(
                "SELECT a.attname::text \
                 FROM pg_index i \
                 JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
                 WHERE i.indrelid = to_regclass($1::text) AND i.indisprimary \
                 ORDER BY array_position(i.indkey::int2[], a.attnum)",
                &[&quote_ident(table)],
            )
            .await?;
        if rows.is_empty() {
            return Ok("ctid".to_string());
        }
        Ok(rows
            .iter()
            .map(|r| quote_ident(&r.get::<_, String>(0)))
            .collect::<Vec<_>>()
            .join(", "))
    }
}

#[async_trait]
impl DbConnection for PgConnection {
    async fn ping(&self) -> AppResult<()> {
        let client = self.client().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn tables(&self) -> AppResult<Vec<String>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn columns(&self, table: &str) -> AppResult<Option<Vec<ColumnDescriptor>>> {
        let client = self.client().await?;
        if !self.table_exists(&client, table).await? {
            return Ok(None);
        }
        let rows = client
            .query(
                "SELECT column_name::text, data_type::text, is_nullable::text, \
                 ordinal_position::int4 \
                 FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 \
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await?;
        let cols = rows
            .iter()
            .map(|r| ColumnDescriptor {
                name: r.get(0),
                data_type: r.get(1),
                nullable: r.get::<_, String>(2) == "YES",
                position: u32::try_from(r.get::<_, i32>(3)).unwrap_or_default(),
            })
            .collect();
        Ok(Some(cols))
    }

    async fn fetch_rows(&self, table: &str, limit: u64, offset: u64) -> AppResult<QueryResult> {
        let client = self.client().await?;
        let order = self.order_by(&client, table).await?;
        let sql = format!(
            "SELECT * FROM {} ORDER BY {order} LIMIT $1 OFFSET $2",
            quote_ident(table)
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows = client.query(&sql, &[&limit, &offset]).await?;
        rows_to_json(&rows)
    }

    async fn count_rows(&self, table: &str) -> AppResult<u64> {
        let client = self.client().await?;
        let sql = format!("SELECT COUNT(*)::int8 FROM {}", quote_ident(table));
        let row = client.query_one(&sql, &[]).await?;
        Ok(row.get::<_, i64>(0).max(0) as u64)
    }

    async fn query(&self, sql: &str) -> AppResult<QueryResult> {
        let client = self.client().await?;
        let rows = client.query(sql, &[]).await?;
        rows_to_json(&rows)
    }

    async fn query_read_only(&self, sql: &str) -> AppResult<QueryResult> {
        let mut client = self.client().await?;
        let tx = client.build_transaction().read_only(true).start().await?;
        let rows = tx.query(sql, &[]).await?;
        tx.rollback().await?;
        debug!(target = %self.target, rows = rows.len(), "read-only query finished");
        rows_to_json(&rows)
    }
}

fn rows_to_json(rows: &[Row]) -> AppResult<QueryResult> {
    rows.iter().map(row_to_json_object).collect()
}

fn row_to_json_object(row: &Row) -> AppResult<DbRow> {
    let mut out = DbRow::new();
    for (idx, col) in row.columns().iter().enumerate() {
        let value = pg_value(row, idx, col.type_()).map_err(|e| {
            AppError::SqlError(format!("cannot decode column {}: {e}", col.name()))
        })?;
        out.insert(col.name().to_string(), value);
    }
    Ok(out)
}

fn pg_value(row: &Row, idx: usize, ty: &Type) -> Result<Value, tokio_postgres::Error> {
    fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>, tokio_postgres::Error> {
        row.try_get::<_, Option<T>>(idx)
    }

    let v = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::from),
        Type::INT2 => get::<i16>(row, idx)?.map(Value::from),
        Type::INT4 => get::<i32>(row, idx)?.map(Value::from),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::from),
        Type::OID => get::<u32>(row, idx)?.map(Value::from),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(Value::from),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(Value::from),
        // Strings keep full precision; a JSON number would round through f64.
        Type::NUMERIC => get::<Decimal>(row, idx)?.map(|d| Value::from(d.to_string())),
        Type::UUID => get::<uuid::Uuid>(row, idx)?.map(|u| Value::from(u.to_string())),
        Type::JSON | Type::JSONB => get::<Value>(row, idx)?,
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(|b| {
            serde_json::json!({
                "$type": "bytea",
                "base64": STANDARD.encode(&b),
                "size": b.len()
            })
        }),
        Type::TIMESTAMP => {
            get::<chrono::NaiveDateTime>(row, idx)?.map(|t| Value::from(t.to_string()))
        }
        Type::TIMESTAMPTZ => {
            get::<chrono::DateTime<chrono::Utc>>(row, idx)?.map(|t| Value::from(t.to_rfc3339()))
        }
        Type::DATE => get::<chrono::NaiveDate>(row, idx)?.map(|d| Value::from(d.to_string())),
        Type::TIME => get::<chrono::NaiveTime>(row, idx)?.map(|t| Value::from(t.to_string())),
        _ if <String as FromSql>::accepts(ty) => get::<String>(row, idx)?.map(Value::from),
        // No JSON mapping for this type; report the type instead of a value.
        _ => Some(serde_json::json!({ "$type": ty.name() })),
    };
    Ok(v.unwrap_or(Value::Null))
}
