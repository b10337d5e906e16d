//! Table schema representation.
//!
//! A [`TableSchema`] describes one version of a table: its ordered columns,
//! its constraints and, when the version is derived from an earlier one, the
//! migration source it copies its rows from.

use serde::{Deserialize, Serialize};

use crate::column::ColumnSpec;
use crate::constraint::{Constraint, ConstraintKind};
use crate::error::{Result, SchemaError};
use crate::value::Value;
use crate::version::{is_identifier, TableId};

/// A target column that takes its values from a differently named prior
/// column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    /// Column in the new version.
    pub column: String,
    /// Column in the prior version.
    pub from: String,
}

/// Per-column instructions for carrying rows from a prior version.
///
/// Empty means a straight carry-over: same-named columns are copied and new
/// columns take their default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationSpec {
    pub renames: Vec<Rename>,
    /// Values written into a target column for every migrated row.
    pub fills: Vec<(String, Value)>,
}

impl MigrationSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies prior column `from` into target column `column`.
    #[must_use]
    pub fn rename(mut self, column: impl Into<String>, from: impl Into<String>) -> Self {
        self.renames.push(Rename {
            column: column.into(),
            from: from.into(),
        });
        self
    }

    /// Writes `value` into `column` for every migrated row.
    #[must_use]
    pub fn fill(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fills.push((column.into(), value.into()));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.renames.is_empty() && self.fills.is_empty()
    }

    /// Prior column renamed into `column`, if any.
    #[must_use]
    pub fn renamed_from(&self, column: &str) -> Option<&str> {
        self.renames
            .iter()
            .find(|r| r.column == column)
            .map(|r| r.from.as_str())
    }

    /// Returns true if some rename consumes prior column `from`.
    #[must_use]
    pub fn consumes(&self, from: &str) -> bool {
        self.renames.iter().any(|r| r.from == from)
    }

    /// Fill value for `column`, if any.
    #[must_use]
    pub fn fill_for(&self, column: &str) -> Option<&Value> {
        self.fills
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Checks every rename and fill against the prior and target schemas.
    pub fn validate(&self, prior: &TableSchema, target: &TableSchema) -> Result<()> {
        for rename in &self.renames {
            if prior.column(&rename.from).is_none() {
                return Err(SchemaError::malformed(format!(
                    "migration renames unknown column '{}' of {}",
                    rename.from, prior.id
                )));
            }
            if target.column(&rename.column).is_none() {
                return Err(SchemaError::malformed(format!(
                    "migration renames into unknown column '{}' of {}",
                    rename.column, target.id
                )));
            }
            if self.renames.iter().filter(|r| r.column == rename.column).count() > 1 {
                return Err(SchemaError::malformed(format!(
                    "column '{}' is renamed more than once",
                    rename.column
                )));
            }
        }
        for (column, value) in &self.fills {
            let spec = target.column(column).ok_or_else(|| {
                SchemaError::malformed(format!(
                    "migration fills unknown column '{column}' of {}",
                    target.id
                ))
            })?;
            spec.shape.coerce(value.clone())?;
        }
        Ok(())
    }
}

/// Link from a table version to the version its rows originate from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationSource {
    pub prior: TableId,
    pub spec: MigrationSpec,
}

/// Complete schema of one table version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub id: TableId,
    /// Columns in declaration order.
    pub columns: Vec<ColumnSpec>,
    pub constraints: Vec<Constraint>,
    pub source: Option<MigrationSource>,
}

impl TableSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new(id: TableId) -> Self {
        Self {
            id,
            columns: Vec::new(),
            constraints: Vec::new(),
            source: None,
        }
    }

    /// Appends a column. Fails if the name is taken or the default does not
    /// fit the column shape.
    pub fn add_column(&mut self, column: ColumnSpec) -> Result<()> {
        if !is_identifier(&column.name) {
            return Err(SchemaError::malformed(format!(
                "column name '{}' is not a valid identifier",
                column.name
            )));
        }
        if self.column(&column.name).is_some() {
            return Err(SchemaError::malformed(format!(
                "column '{}' is declared twice in {}",
                column.name, self.id
            )));
        }
        column.stored_default()?;
        self.columns.push(column);
        Ok(())
    }

    /// Appends a constraint over already declared columns.
    pub fn add_constraint(&mut self, kind: ConstraintKind, columns: Vec<String>) -> Result<()> {
        if columns.is_empty() {
            return Err(SchemaError::malformed(format!(
                "{kind} constraint on {} names no columns",
                self.id
            )));
        }
        if let Some(unknown) = columns.iter().find(|c| self.column(c).is_none()) {
            return Err(SchemaError::malformed(format!(
                "{kind} constraint names unknown column '{unknown}' of {}",
                self.id
            )));
        }
        self.constraints.push(Constraint::new(kind, columns));
        Ok(())
    }

    /// Gets a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Name of the physical table.
    #[must_use]
    pub fn physical_name(&self) -> String {
        self.id.physical_name()
    }
}
