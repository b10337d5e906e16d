//! Unique and index constraints.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Rows must not share values for the constrained columns.
    Unique,
    /// Plain lookup index.
    Index,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unique => f.write_str("unique"),
            Self::Index => f.write_str("index"),
        }
    }
}

/// A constraint over one or more columns of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
}

impl Constraint {
    #[must_use]
    pub fn new(kind: ConstraintKind, columns: Vec<String>) -> Self {
        Self { kind, columns }
    }

    /// Index name for this constraint on the given physical table.
    #[must_use]
    pub fn index_name(&self, physical_table: &str) -> String {
        let tag = match self.kind {
            ConstraintKind::Unique => "uq",
            ConstraintKind::Index => "ix",
        };
        format!("{physical_table}_{tag}_{}", self.columns.join("_"))
    }
}
