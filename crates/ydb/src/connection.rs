//! Database connections.
//!
//! Everything ydb does against a database goes through the [`Connection`]
//! trait. [`SqliteDriver`] implements it over a sqlx SQLite pool.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row as _, Sqlite, TypeInfo, ValueRef};
use tracing::{debug, info};
use ydb_core::value::Value;

use crate::error::Result;

/// One result row, values in select-list order.
pub type Row = Vec<Value>;

/// A statement with its bound parameters.
pub type BoundStatement = (String, Vec<Value>);

/// Execute/query interface to a database.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Runs a statement and returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Runs a query and returns every row.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Runs statements atomically: either all of them take effect or none.
    async fn transaction(&self, statements: &[BoundStatement]) -> Result<()>;
}

/// SQLite connection backed by a single-connection sqlx pool.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    pool: SqlitePool,
}

impl SqliteDriver {
    /// Opens the database at `dsn`, creating the file if needed.
    ///
    /// The pool keeps exactly one connection alive for the lifetime of the
    /// driver, so `sqlite::memory:` databases are not lost between calls.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(dsn)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        info!(dsn = %dsn, "Connected to SQLite");
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Connection for SqliteDriver {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        debug!(sql = %sql, params = params.len(), "Executing SQL");
        let query = bind_params(sqlx::query(sql), params);
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        debug!(sql = %sql, params = params.len(), "Querying");
        let query = bind_params(sqlx::query(sql), params);
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn transaction(&self, statements: &[BoundStatement]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (sql, params) in statements {
            debug!(sql = %sql, params = params.len(), "Executing SQL in transaction");
            bind_params(sqlx::query(sql), params)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_params<'q>(query: SqliteQuery<'q>, params: &[Value]) -> SqliteQuery<'q> {
    params.iter().fold(query, |query, value| bind_param(query, value))
}

/// Binds a Value parameter to a raw query.
fn bind_param<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(Option::<i64>::None),
        Value::Bool(b) => query.bind(i64::from(*b)),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Blob(b) => query.bind(b.clone()),
        Value::Array(_) => query.bind(value.to_json().to_string()),
    }
}

fn decode_row(row: &SqliteRow) -> Result<Row> {
    (0..row.len()).map(|index| decode_column(row, index)).collect()
}

/// Decodes a column by the storage class of the value it holds.
fn decode_column(row: &SqliteRow, index: usize) -> Result<Value> {
    let storage = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_string()
    };

    let value = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => Value::Int(row.try_get(index)?),
        "REAL" => Value::Float(row.try_get(index)?),
        "BLOB" => Value::Blob(row.try_get(index)?),
        _ => Value::Text(row.try_get(index)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_driver() -> SqliteDriver {
        SqliteDriver::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite driver")
    }

    #[tokio::test]
    async fn test_execute_and_query() {
        let driver = create_test_driver().await;
        driver
            .execute("CREATE TABLE t (i INTEGER, r REAL, s TEXT, b BLOB)", &[])
            .await
            .unwrap();
        let affected = driver
            .execute(
                "INSERT INTO t VALUES (?, ?, ?, ?)",
                &[
                    Value::Int(7),
                    Value::Float(1.5),
                    Value::from("hi"),
                    Value::Blob(vec![0, 1]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);
        driver
            .execute("INSERT INTO t (i) VALUES (?)", &[Value::Bool(true)])
            .await
            .unwrap();

        let rows = driver
            .query("SELECT i, r, s, b FROM t ORDER BY r DESC", &[])
            .await
            .unwrap();
        assert_eq!(
            rows,
            vec![
                vec![
                    Value::Int(7),
                    Value::Float(1.5),
                    Value::from("hi"),
                    Value::Blob(vec![0, 1])
                ],
                vec![Value::Int(1), Value::Null, Value::Null, Value::Null],
            ]
        );

        let count = driver.query("SELECT COUNT(*) FROM t", &[]).await.unwrap();
        assert_eq!(count, vec![vec![Value::Int(2)]]);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back() {
        let driver = create_test_driver().await;
        driver
            .execute("CREATE TABLE t (i INTEGER NOT NULL)", &[])
            .await
            .unwrap();

        let result = driver
            .transaction(&[
                ("INSERT INTO t VALUES (?)".to_string(), vec![Value::Int(1)]),
                ("INSERT INTO t VALUES (?)".to_string(), vec![Value::Null]),
            ])
            .await;
        assert!(result.is_err());

        let rows = driver.query("SELECT COUNT(*) FROM t", &[]).await.unwrap();
        assert_eq!(rows, vec![vec![Value::Int(0)]]);
    }

    #[tokio::test]
    async fn test_memory_database_survives() {
        let driver = create_test_driver().await;
        driver.execute("CREATE TABLE kept (i INTEGER)", &[]).await.unwrap();
        let again = driver.clone();
        let rows = again
            .query("SELECT name FROM sqlite_master WHERE name = 'kept'", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
