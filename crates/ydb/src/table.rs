//! Table declarations.
//!
//! A [`TableBuilder`] collects the columns, constraints and optional
//! migration source of one table version. [`TableBuilder::finalize`] then
//! creates the version's physical table, copies rows over from the prior
//! version when there is one, and records the schema in the catalog, all in
//! a single transaction.

use tracing::{debug, info};
use ydb_core::column::ColumnSpec;
use ydb_core::constraint::ConstraintKind;
use ydb_core::dialect::{ReferenceTargets, SqliteDialect};
use ydb_core::resolver::{carry_row, resolve_chain, resolve_with, MigrationPlan};
use ydb_core::schema::{MigrationSource, MigrationSpec, TableSchema};
use ydb_core::version::TableId;

use crate::catalog::Catalog;
use crate::connection::BoundStatement;
use crate::error::{Error, Result};
use crate::session::Session;

/// What finalizing a table declaration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    /// A new physical table was created.
    Created,
    /// The version already existed in the database with an identical
    /// schema and was taken over as is.
    Adopted,
    /// A new physical table was created and filled from the prior version.
    Migrated { plan: MigrationPlan, rows: usize },
}

/// Builder for one table version.
#[derive(Debug, Clone)]
pub struct TableBuilder {
    schema: TableSchema,
}

impl TableBuilder {
    pub(crate) fn new(id: TableId) -> Self {
        Self {
            schema: TableSchema::new(id),
        }
    }

    /// Appends a column.
    pub fn column(mut self, column: ColumnSpec) -> Result<Self> {
        self.schema.add_column(column)?;
        Ok(self)
    }

    /// Adds a unique constraint over declared columns.
    pub fn unique<I, S>(self, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraint(ConstraintKind::Unique, columns)
    }

    /// Adds an index over declared columns.
    pub fn index<I, S>(self, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraint(ConstraintKind::Index, columns)
    }

    fn constraint<I, S>(mut self, kind: ConstraintKind, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        self.schema.add_constraint(kind, columns)?;
        Ok(self)
    }

    /// Declares the version rows are migrated from, as `"name version"`.
    pub fn from(mut self, prior: &str, spec: MigrationSpec) -> Result<Self> {
        let prior: TableId = prior.parse()?;
        if prior.name == self.schema.id.name && prior.version >= self.schema.id.version {
            return Err(Error::malformed(format!(
                "{} cannot migrate from {prior}, which is not an earlier version",
                self.schema.id
            )));
        }
        self.schema.source = Some(MigrationSource { prior, spec });
        Ok(self)
    }

    /// Returns the schema declared so far.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Returns the DDL that creates this version's table and indexes.
    pub async fn sql(&self, session: &Session) -> Result<Vec<String>> {
        let targets = reference_targets(&self.schema, session).await?;
        Ok(SqliteDialect::new().create_statements(&self.schema, &targets)?)
    }

    /// Materializes the table version and registers it with the session.
    ///
    /// Fails with `DuplicateSchema` when the version was already declared in
    /// this session, or is recorded in the database with a different schema.
    pub async fn finalize(self, session: &mut Session) -> Result<Materialized> {
        let conn = session.connection()?.clone();
        let schema = self.schema;
        let id = schema.id.clone();

        if session.is_declared(&id) {
            return Err(Error::DuplicateSchema(id.to_string()));
        }

        if let Some(stored) = session.catalog()?.get_schema(&id).await? {
            if stored.schema != schema {
                return Err(Error::DuplicateSchema(id.to_string()));
            }
            info!(table = %id, "Adopting existing table");
            session.register_table(schema);
            return Ok(Materialized::Adopted);
        }

        let dialect = SqliteDialect::new();
        let targets = reference_targets(&schema, session).await?;
        let mut batch: Vec<BoundStatement> = dialect
            .create_statements(&schema, &targets)?
            .into_iter()
            .map(|sql| (sql, Vec::new()))
            .collect();

        let outcome = match &schema.source {
            None => {
                batch.push(Catalog::record_schema(&schema, None)?);
                Materialized::Created
            }
            Some(source) => {
                let prior = session.schema(&source.prior).await?.ok_or_else(|| {
                    Error::malformed(format!(
                        "{id} migrates from {}, which is not declared",
                        source.prior
                    ))
                })?;
                source.spec.validate(&prior, &schema)?;

                let plan = resolve_with(&prior, &schema, &source.spec);
                if let MigrationPlan::Incompatible { reason } = &plan {
                    return Err(Error::IncompatibleMigration(format!(
                        "{} -> {id}: {reason}",
                        prior.id
                    )));
                }
                check_lineage(session, &prior, &schema).await?;

                let rows = conn.query(&dialect.select_all_sql(&prior), &[]).await?;
                let insert = dialect.insert_row_sql(&schema);
                for row in &rows {
                    let carried = carry_row(&prior, &schema, &source.spec, row)?;
                    batch.push((insert.clone(), carried));
                }
                debug!(table = %id, prior = %prior.id, plan = plan.label(), rows = rows.len(), "Migrating rows");

                batch.push(Catalog::record_schema(&schema, Some(plan.label()))?);
                Materialized::Migrated {
                    plan,
                    rows: rows.len(),
                }
            }
        };

        conn.transaction(&batch).await?;
        info!(table = %id, physical = %schema.physical_name(), "Table created");
        session.register_table(schema);
        Ok(outcome)
    }
}

/// Resolves the physical table of every referenced table and checks the
/// referenced column exists with the same shape.
async fn reference_targets(schema: &TableSchema, session: &Session) -> Result<ReferenceTargets> {
    let mut targets = ReferenceTargets::new();
    for column in &schema.columns {
        let Some(reference) = &column.references else {
            continue;
        };
        let target = if reference.table == schema.id.name {
            schema.clone()
        } else {
            session
                .latest(&reference.table)
                .await?
                .ok_or_else(|| {
                    Error::malformed(format!(
                        "column '{}' references undeclared table '{}'",
                        column.name, reference.table
                    ))
                })?
        };
        let referenced = target.column(&reference.column).ok_or_else(|| {
            Error::malformed(format!(
                "column '{}' references unknown column {reference}",
                column.name
            ))
        })?;
        if referenced.shape != column.shape {
            return Err(Error::malformed(format!(
                "column '{}' is {} but {reference} is {}",
                column.name, column.shape, referenced.shape
            )));
        }
        // SQLite rejects foreign keys whose parent column is not unique.
        let unique = target.constraints.iter().any(|c| {
            c.kind == ConstraintKind::Unique && c.columns.len() == 1 && c.columns[0] == reference.column
        });
        if !unique {
            return Err(Error::malformed(format!(
                "column '{}' references {reference}, which has no unique constraint",
                column.name
            )));
        }
        targets.insert(reference.table.clone(), target.physical_name());
    }
    Ok(targets)
}

/// Walks the migration sources back from `prior` and resolves the whole
/// chain, so a column dropped earlier cannot come back under its old name.
async fn check_lineage(session: &Session, prior: &TableSchema, target: &TableSchema) -> Result<()> {
    if prior.id.name != target.id.name {
        return Ok(());
    }
    let mut chain = vec![target.clone(), prior.clone()];
    let mut current = prior.clone();
    while let Some(source) = current.source.clone() {
        if source.prior.name != target.id.name {
            break;
        }
        match session.schema(&source.prior).await? {
            Some(earlier) => {
                chain.push(earlier.clone());
                current = earlier;
            }
            None => break,
        }
    }
    if chain.len() <= 2 {
        return Ok(());
    }

    let links: Vec<&TableSchema> = chain.iter().collect();
    if let MigrationPlan::Incompatible { reason } = resolve_chain(&links) {
        return Err(Error::IncompatibleMigration(reason));
    }
    Ok(())
}
