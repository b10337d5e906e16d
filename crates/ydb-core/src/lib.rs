//! Versioned table schemas and statement compilation.
//!
//! `ydb-core` is the pure half of ydb: it knows how tables are declared, how
//! one version of a table relates to the next, and how declarative method
//! bodies turn into parameterized SQLite statements. It performs no I/O.
//!
//! # Architecture
//!
//! - **Version** - `major.minor.patch` versions and `"name version"` table ids
//! - **Column** - Column shapes (scalar, fixed bytes, fixed arrays), defaults
//!   and `column@table` references
//! - **Constraint** - Unique and index constraints
//! - **Schema** - One version of a table, plus its migration source
//! - **Resolver** - Classifies the step between two versions
//! - **Template** - `{name}` filter templates
//! - **Dialect** - SQLite DDL and DML generation
//!
//! # Example
//!
//! ```rust
//! use ydb_core::prelude::*;
//!
//! let mut v1 = TableSchema::new("article v0.1.0".parse().unwrap());
//! v1.add_column(ColumnSpec::new("id", ColumnShape::FixedBytes(4)).not_null())
//!     .unwrap();
//!
//! let mut v2 = v1.clone();
//! v2.id = "article v0.2.0".parse().unwrap();
//! v2.add_column(ColumnSpec::scalar("body", ScalarType::Text).default("empty"))
//!     .unwrap();
//!
//! assert_eq!(
//!     resolve(&v1, &v2),
//!     MigrationPlan::Additive {
//!         new_columns: vec!["body".to_string()],
//!         widened: vec![],
//!     }
//! );
//! ```

pub mod column;
pub mod constraint;
pub mod dialect;
pub mod error;
pub mod resolver;
pub mod schema;
pub mod statement;
pub mod template;
pub mod value;
pub mod version;

pub use error::{Result, SchemaError};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::column::{ColumnRef, ColumnShape, ColumnSpec, Compatibility, ScalarType};
    pub use crate::constraint::{Constraint, ConstraintKind};
    pub use crate::dialect::{ReferenceTargets, SqliteDialect};
    pub use crate::error::{Result, SchemaError};
    pub use crate::resolver::{carry_row, resolve, resolve_chain, resolve_with, MigrationPlan};
    pub use crate::schema::{MigrationSource, MigrationSpec, Rename, TableSchema};
    pub use crate::statement::{Binding, Slot, Statement};
    pub use crate::template::{Check, CompareOp, Condition, Filter, Operand, Term};
    pub use crate::value::{Value, ValueKind};
    pub use crate::version::{TableId, Version};
}
