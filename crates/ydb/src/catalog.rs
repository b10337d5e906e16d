//! Persisted schema history.
//!
//! This module manages the `ydb_schemas` and `ydb_classes` tables that record
//! every table version and every class a database has seen. A table version
//! is recorded in the same transaction that creates its physical table.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ydb_core::schema::TableSchema;
use ydb_core::value::Value;
use ydb_core::version::TableId;

use crate::connection::{BoundStatement, Connection, Row};
use crate::error::{Error, Result};
use crate::program::CompiledClass;

/// SQL to create the schema history table (SQLite).
pub const CREATE_SCHEMAS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS ydb_schemas (
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    schema TEXT NOT NULL,
    source TEXT,
    plan TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (name, version)
)
"#;

/// SQL to create the class table (SQLite).
pub const CREATE_CLASSES_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS ydb_classes (
    name TEXT PRIMARY KEY,
    program TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

/// A recorded table version.
#[derive(Debug, Clone)]
pub struct StoredSchema {
    pub schema: TableSchema,
    /// Migration plan label, for versions created from a prior version.
    pub plan: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A recorded class.
#[derive(Debug, Clone)]
pub struct StoredClass {
    pub class: CompiledClass,
    pub created_at: DateTime<Utc>,
}

/// Reads and writes the catalog tables.
#[derive(Clone)]
pub struct Catalog {
    conn: Arc<dyn Connection>,
}

impl Catalog {
    /// Creates a new catalog over `conn`.
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }

    /// Ensures the catalog tables exist.
    pub async fn ensure_tables(&self) -> Result<()> {
        self.conn.execute(CREATE_SCHEMAS_TABLE_SQL, &[]).await?;
        self.conn.execute(CREATE_CLASSES_TABLE_SQL, &[]).await?;
        Ok(())
    }

    /// Statement recording `schema`, to run inside the creating transaction.
    pub fn record_schema(schema: &TableSchema, plan: Option<&str>) -> Result<BoundStatement> {
        let source = schema
            .source
            .as_ref()
            .map_or(Value::Null, |s| Value::Text(s.prior.to_string()));
        Ok((
            "INSERT INTO ydb_schemas (name, version, schema, source, plan) VALUES (?, ?, ?, ?, ?)"
                .to_string(),
            vec![
                Value::Text(schema.id.name.clone()),
                Value::Text(schema.id.version.to_string()),
                Value::Text(serde_json::to_string(schema)?),
                source,
                plan.map_or(Value::Null, Value::from),
            ],
        ))
    }

    /// Gets a recorded table version.
    pub async fn get_schema(&self, id: &TableId) -> Result<Option<StoredSchema>> {
        let rows = self
            .conn
            .query(
                "SELECT schema, plan, created_at FROM ydb_schemas WHERE name = ? AND version = ?",
                &[
                    Value::Text(id.name.clone()),
                    Value::Text(id.version.to_string()),
                ],
            )
            .await?;
        rows.into_iter().next().map(stored_schema).transpose()
    }

    /// Gets the highest recorded version of table `name`.
    pub async fn latest_schema(&self, name: &str) -> Result<Option<StoredSchema>> {
        let rows = self
            .conn
            .query(
                "SELECT schema, plan, created_at FROM ydb_schemas WHERE name = ?",
                &[Value::from(name)],
            )
            .await?;
        let mut versions = rows
            .into_iter()
            .map(stored_schema)
            .collect::<Result<Vec<_>>>()?;
        versions.sort_by(|a, b| a.schema.id.version.cmp(&b.schema.id.version));
        Ok(versions.pop())
    }

    /// Gets every recorded table version, by name then version.
    pub async fn list_schemas(&self) -> Result<Vec<StoredSchema>> {
        let rows = self
            .conn
            .query("SELECT schema, plan, created_at FROM ydb_schemas", &[])
            .await?;
        let mut schemas = rows
            .into_iter()
            .map(stored_schema)
            .collect::<Result<Vec<_>>>()?;
        schemas.sort_by(|a, b| {
            a.schema
                .id
                .name
                .cmp(&b.schema.id.name)
                .then(a.schema.id.version.cmp(&b.schema.id.version))
        });
        Ok(schemas)
    }

    /// Records a compiled class, replacing an earlier record of the same name.
    pub async fn record_class(&self, class: &CompiledClass) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO ydb_classes (name, program) VALUES (?, ?)",
                &[
                    Value::Text(class.name.clone()),
                    Value::Text(serde_json::to_string(class)?),
                ],
            )
            .await?;
        Ok(())
    }

    /// Gets every recorded class, by name.
    pub async fn list_classes(&self) -> Result<Vec<StoredClass>> {
        let rows = self
            .conn
            .query(
                "SELECT program, created_at FROM ydb_classes ORDER BY name",
                &[],
            )
            .await?;
        rows.into_iter()
            .map(|row| {
                let [program, created_at] = <[Value; 2]>::try_from(row)
                    .map_err(|_| malformed_row("ydb_classes"))?;
                Ok(StoredClass {
                    class: serde_json::from_str(&text(program)?)?,
                    created_at: parse_timestamp(&text(created_at)?),
                })
            })
            .collect()
    }
}

fn stored_schema(row: Row) -> Result<StoredSchema> {
    let [schema, plan, created_at] =
        <[Value; 3]>::try_from(row).map_err(|_| malformed_row("ydb_schemas"))?;
    Ok(StoredSchema {
        schema: serde_json::from_str(&text(schema)?)?,
        plan: match plan {
            Value::Null => None,
            other => Some(text(other)?),
        },
        created_at: parse_timestamp(&text(created_at)?),
    })
}

fn text(value: Value) -> Result<String> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(Error::TypeMismatch(format!(
            "catalog column holds {other}, expected text"
        ))),
    }
}

fn malformed_row(table: &str) -> Error {
    Error::TypeMismatch(format!("unexpected row shape in {table}"))
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime format fallback
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|dt| dt.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}
