//! SQLite SQL generation.
//!
//! Produces the DDL that materializes a [`TableSchema`] and the parameterized
//! DML that API methods compile to. Every user value goes through a `?`
//! parameter; only column defaults are inlined.

use std::collections::BTreeMap;

use crate::column::{ColumnShape, ColumnSpec};
use crate::constraint::{Constraint, ConstraintKind};
use crate::error::{Result, SchemaError};
use crate::schema::TableSchema;
use crate::statement::{Slot, Statement};
use crate::template::{Filter, Operand};

/// Logical table name to the physical table holding its current version.
pub type ReferenceTargets = BTreeMap<String, String>;

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Quote an identifier (table name, column name, etc.).
    #[must_use]
    pub fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Generates a column definition.
    pub fn column_definition(&self, column: &ColumnSpec, targets: &ReferenceTargets) -> Result<String> {
        let name = self.quote_identifier(&column.name);
        let mut parts = vec![name.clone(), column.shape.sqlite_name().to_string()];

        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = column.stored_default()? {
            parts.push(format!("DEFAULT {}", default.to_sql_inline()));
        }

        if let ColumnShape::FixedBytes(width) = &column.shape {
            parts.push(format!("CHECK (length({name}) = {width})"));
        }

        if let Some(reference) = &column.references {
            let physical = targets.get(&reference.table).ok_or_else(|| {
                SchemaError::malformed(format!(
                    "column '{}' references undeclared table '{}'",
                    column.name, reference.table
                ))
            })?;
            parts.push(format!(
                "REFERENCES {}({})",
                self.quote_identifier(physical),
                self.quote_identifier(&reference.column)
            ));
        }

        Ok(parts.join(" "))
    }

    /// Generates SQL for creating the physical table of `schema`.
    pub fn create_table_sql(&self, schema: &TableSchema, targets: &ReferenceTargets) -> Result<String> {
        let col_defs = schema
            .columns
            .iter()
            .map(|c| self.column_definition(c, targets))
            .collect::<Result<Vec<_>>>()?;

        let mut sql = String::from("CREATE TABLE ");
        sql.push_str(&self.quote_identifier(&schema.physical_name()));
        sql.push_str(" (\n  ");
        sql.push_str(&col_defs.join(",\n  "));
        sql.push_str("\n)");
        Ok(sql)
    }

    /// Generates SQL for creating the index backing a constraint.
    #[must_use]
    pub fn create_index_sql(&self, constraint: &Constraint, physical_table: &str) -> String {
        let mut sql = String::from("CREATE ");
        if constraint.kind == ConstraintKind::Unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_identifier(&constraint.index_name(physical_table)));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(physical_table));
        sql.push_str(" (");
        let quoted: Vec<String> = constraint
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        sql.push_str(&quoted.join(", "));
        sql.push(')');
        sql
    }

    /// All DDL needed to materialize `schema`: the table, then its indexes.
    pub fn create_statements(&self, schema: &TableSchema, targets: &ReferenceTargets) -> Result<Vec<String>> {
        let physical = schema.physical_name();
        let mut statements = vec![self.create_table_sql(schema, targets)?];
        statements.extend(
            schema
                .constraints
                .iter()
                .map(|c| self.create_index_sql(c, &physical)),
        );
        Ok(statements)
    }

    /// `SELECT` of every column in declaration order, without filter.
    #[must_use]
    pub fn select_all_sql(&self, schema: &TableSchema) -> String {
        format!(
            "SELECT {} FROM {}",
            self.column_list(schema),
            self.quote_identifier(&schema.physical_name())
        )
    }

    /// `INSERT` of every column in declaration order, one `?` per column.
    #[must_use]
    pub fn insert_row_sql(&self, schema: &TableSchema) -> String {
        let placeholders = vec!["?"; schema.columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            self.quote_identifier(&schema.physical_name()),
            self.column_list(schema)
        )
    }

    /// Compiles an insert of the given `(column, value)` pairs.
    ///
    /// Columns left out take their default. A NOT NULL column without
    /// default must be given a value.
    pub fn insert(&self, schema: &TableSchema, values: &[(String, Operand)], scope: &[String]) -> Result<Statement> {
        if values.is_empty() {
            return Err(SchemaError::malformed(format!(
                "insert into {} names no columns",
                schema.id
            )));
        }

        let mut columns = Vec::with_capacity(values.len());
        let mut slots = Vec::with_capacity(values.len());
        for (name, operand) in values {
            let column = schema.column(name).ok_or_else(|| {
                SchemaError::malformed(format!("insert names unknown column '{name}' of {}", schema.id))
            })?;
            if columns.contains(&self.quote_identifier(name)) {
                return Err(SchemaError::malformed(format!(
                    "insert sets column '{name}' twice"
                )));
            }
            slots.push(self.slot(column, operand, scope)?);
            columns.push(self.quote_identifier(name));
        }

        if let Some(missing) = schema.columns.iter().find(|c| {
            !c.nullable && c.default.is_none() && !values.iter().any(|(name, _)| name == &c.name)
        }) {
            return Err(SchemaError::malformed(format!(
                "insert into {} leaves NOT NULL column '{}' without a value",
                schema.id, missing.name
            )));
        }

        let placeholders = vec!["?"; slots.len()].join(", ");
        Ok(Statement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                self.quote_identifier(&schema.physical_name()),
                columns.join(", ")
            ),
            slots,
        })
    }

    /// Compiles a select of every column matching `filter`.
    pub fn select(&self, schema: &TableSchema, filter: &Filter, scope: &[String], limit: Option<u64>) -> Result<Statement> {
        let (condition, slots) = filter.compile(schema, scope)?;
        let mut sql = self.select_all_sql(schema);
        push_where(&mut sql, &condition);
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        Ok(Statement { sql, slots })
    }

    /// Compiles a count of the rows matching `filter`.
    pub fn count(&self, schema: &TableSchema, filter: &Filter, scope: &[String]) -> Result<Statement> {
        let (condition, slots) = filter.compile(schema, scope)?;
        let mut sql = format!(
            "SELECT COUNT(*) FROM {}",
            self.quote_identifier(&schema.physical_name())
        );
        push_where(&mut sql, &condition);
        Ok(Statement { sql, slots })
    }

    /// Compiles an update of the rows matching `filter`.
    pub fn update(
        &self,
        schema: &TableSchema,
        set: &[(String, Operand)],
        filter: &Filter,
        scope: &[String],
    ) -> Result<Statement> {
        if set.is_empty() {
            return Err(SchemaError::malformed(format!(
                "update of {} sets no columns",
                schema.id
            )));
        }

        let mut assignments = Vec::with_capacity(set.len());
        let mut slots = Vec::new();
        for (name, operand) in set {
            let column = schema.column(name).ok_or_else(|| {
                SchemaError::malformed(format!("update names unknown column '{name}' of {}", schema.id))
            })?;
            slots.push(self.slot(column, operand, scope)?);
            assignments.push(format!("{} = ?", self.quote_identifier(name)));
        }

        let (condition, filter_slots) = filter.compile(schema, scope)?;
        slots.extend(filter_slots);

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.quote_identifier(&schema.physical_name()),
            assignments.join(", ")
        );
        push_where(&mut sql, &condition);
        Ok(Statement { sql, slots })
    }

    fn column_list(&self, schema: &TableSchema) -> String {
        schema
            .columns
            .iter()
            .map(|c| self.quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn slot(&self, column: &ColumnSpec, operand: &Operand, scope: &[String]) -> Result<Slot> {
        let binding = operand.resolve(scope)?;
        if let Operand::Literal(value) = operand {
            column.shape.coerce(value.clone())?;
        }
        Ok(Slot {
            binding,
            shape: column.shape.clone(),
        })
    }
}

fn push_where(sql: &mut String, condition: &str) {
    if !condition.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(condition);
    }
}
