//! Declarative versioned tables and classes over SQLite.
//!
//! `ydb` turns table and class declarations into live SQLite objects:
//!
//! - **Engines** - A process-wide registry maps engine names to connection
//!   strings; a [`Session`](session::Session) opens one of them
//! - **Tables** - Each `"name version"` gets its own physical table. A version
//!   declared `from` an earlier one is filled with the earlier rows
//! - **Classes** - Named API methods over one or more tables, compiled into
//!   parameterized statements and checked by call scenarios
//! - **Catalog** - Every table version and class is recorded in the database
//!
//! # Example
//!
//! ```rust,no_run
//! use ydb::prelude::*;
//!
//! # async fn run() -> ydb::Result<()> {
//! register_engine("main", "sqlite::memory:");
//! let mut session = Session::connect("main").await?;
//!
//! session
//!     .begin_table("user v0.1.0")?
//!     .column(ColumnSpec::new("id", ColumnShape::FixedBytes(32)).not_null())?
//!     .column(ColumnSpec::scalar("email", ScalarType::Text))?
//!     .index(["email"])?
//!     .finalize(&mut session)
//!     .await?;
//!
//! session
//!     .begin_class("Users")?
//!     .uses("user")?
//!     .api(
//!         ApiMethod::new("register")
//!             .param("id", ValueKind::Text)
//!             .param("email", ValueKind::Text)
//!             .limit(3, "email={email}")
//!             .insert([("id", "{id}"), ("email", "{email}")]),
//!     )?
//!     .finalize(&mut session)
//!     .await?;
//!
//! session
//!     .call("Users", "register", &["u1".into(), "a@x.com".into()])
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod class;
pub mod connection;
pub mod error;
pub mod program;
pub mod registry;
pub mod session;
pub mod table;

pub use error::{Error, ErrorKind, Result, Sentinel};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::catalog::{Catalog, StoredClass, StoredSchema};
    pub use crate::class::{ApiMethod, ClassBuilder, Expect, Ret, Scenario};
    pub use crate::connection::{Connection, Row, SqliteDriver};
    pub use crate::error::{Error, ErrorKind, Result, Sentinel};
    pub use crate::program::{CompiledClass, CompiledMethod, Output};
    pub use crate::registry::{engine_dsn, register_engine};
    pub use crate::session::Session;
    pub use crate::table::{Materialized, TableBuilder};
    pub use ydb_core::prelude::{
        ColumnRef, ColumnShape, ColumnSpec, MigrationPlan, MigrationSpec, ScalarType, TableId,
        TableSchema, Value, ValueKind, Version,
    };
}
