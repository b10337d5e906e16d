//! Sessions.
//!
//! A [`Session`] owns one database connection and the tables and classes
//! declared through it. Declarations take `&mut Session`; method calls take
//! `&Session` and may run concurrently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};
use ydb_core::schema::TableSchema;
use ydb_core::value::Value;
use ydb_core::version::TableId;

use crate::catalog::Catalog;
use crate::class::ClassBuilder;
use crate::connection::{Connection, SqliteDriver};
use crate::error::{Error, Result};
use crate::program::{CompiledClass, Output};
use crate::registry::engine_dsn;
use crate::table::TableBuilder;

/// A connection plus the tables and classes declared through it.
#[derive(Default)]
pub struct Session {
    engine: Option<String>,
    conn: Option<Arc<dyn Connection>>,
    /// Every table version declared or adopted in this session.
    schemas: HashMap<TableId, TableSchema>,
    /// Highest version per table name.
    tables: HashMap<String, TableId>,
    /// Versions declared by this session, adopted ones included.
    declared: HashSet<TableId>,
    classes: HashMap<String, Arc<CompiledClass>>,
}

impl Session {
    /// Creates a session without an engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session and opens the registered engine `name`.
    pub async fn connect(name: &str) -> Result<Self> {
        let mut session = Self::new();
        session.open(name).await?;
        Ok(session)
    }

    /// Creates a session over an already open connection.
    pub async fn with_connection(name: impl Into<String>, conn: Arc<dyn Connection>) -> Result<Self> {
        let mut session = Self::new();
        session.attach(name.into(), conn).await?;
        Ok(session)
    }

    /// Opens the engine registered under `name` and binds it to this session.
    ///
    /// An unregistered name leaves the session without an engine; every
    /// declaration then fails with `Configuration`.
    pub async fn open(&mut self, name: &str) -> Result<()> {
        if let Some(current) = &self.engine {
            return Err(Error::configuration(format!(
                "session already uses engine '{current}'"
            )));
        }
        let dsn = engine_dsn(name).ok_or_else(|| {
            warn!(engine = %name, "Unknown engine");
            Error::configuration(format!("no engine registered as '{name}'"))
        })?;
        let driver = SqliteDriver::connect(&dsn).await?;
        self.attach(name.to_string(), Arc::new(driver)).await
    }

    async fn attach(&mut self, name: String, conn: Arc<dyn Connection>) -> Result<()> {
        Catalog::new(conn.clone()).ensure_tables().await?;
        info!(engine = %name, "Session opened");
        self.engine = Some(name);
        self.conn = Some(conn);
        Ok(())
    }

    /// Returns the engine name, if one is open.
    #[must_use]
    pub fn engine(&self) -> Option<&str> {
        self.engine.as_deref()
    }

    /// Returns the open connection.
    pub fn connection(&self) -> Result<&Arc<dyn Connection>> {
        self.conn
            .as_ref()
            .ok_or_else(|| Error::configuration("no engine is open in this session"))
    }

    pub(crate) fn catalog(&self) -> Result<Catalog> {
        Ok(Catalog::new(self.connection()?.clone()))
    }

    /// Starts a table declaration from `"name version"`.
    pub fn begin_table(&self, declaration: &str) -> Result<TableBuilder> {
        self.connection()?;
        let id: TableId = declaration.parse()?;
        debug!(table = %id, "Declaring table");
        Ok(TableBuilder::new(id))
    }

    /// Starts a class declaration.
    pub fn begin_class(&self, name: &str) -> Result<ClassBuilder> {
        self.connection()?;
        if !ydb_core::version::is_identifier(name) {
            return Err(Error::malformed(format!(
                "class name '{name}' is not a valid identifier"
            )));
        }
        let available = self
            .tables
            .iter()
            .filter_map(|(name, id)| Some((name.clone(), self.schemas.get(id)?.clone())))
            .collect();
        debug!(class = %name, "Declaring class");
        Ok(ClassBuilder::new(name.to_string(), available))
    }

    /// Returns the highest declared version of table `name`.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name).and_then(|id| self.schemas.get(id))
    }

    /// Returns the names of the declared tables, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns a declared class.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&CompiledClass> {
        self.classes.get(name).map(Arc::as_ref)
    }

    /// Calls `method` of `class` with `args`.
    pub async fn call(&self, class: &str, method: &str, args: &[Value]) -> Result<Output> {
        let conn = self.connection()?;
        let compiled = self
            .classes
            .get(class)
            .ok_or_else(|| Error::invalid_call(format!("no class named '{class}'")))?;
        let method = compiled.method(method)?;
        debug!(class = %class, method = %method.name, args = args.len(), "Calling method");
        method.run(conn.as_ref(), args).await
    }

    pub(crate) fn is_declared(&self, id: &TableId) -> bool {
        self.declared.contains(id)
    }

    /// Looks up a table version in this session, then in the catalog.
    pub(crate) async fn schema(&self, id: &TableId) -> Result<Option<TableSchema>> {
        if let Some(schema) = self.schemas.get(id) {
            return Ok(Some(schema.clone()));
        }
        Ok(self.catalog()?.get_schema(id).await?.map(|s| s.schema))
    }

    /// Looks up the highest version of table `name` in this session, then in
    /// the catalog.
    pub(crate) async fn latest(&self, name: &str) -> Result<Option<TableSchema>> {
        if let Some(schema) = self.table(name) {
            return Ok(Some(schema.clone()));
        }
        Ok(self.catalog()?.latest_schema(name).await?.map(|s| s.schema))
    }

    pub(crate) fn register_table(&mut self, schema: TableSchema) {
        let id = schema.id.clone();
        let newer = self
            .tables
            .get(&id.name)
            .map_or(true, |current| current.version < id.version);
        if newer {
            self.tables.insert(id.name.clone(), id.clone());
        }
        self.declared.insert(id.clone());
        self.schemas.insert(id, schema);
    }

    pub(crate) fn register_class(&mut self, class: CompiledClass) {
        self.classes.insert(class.name.clone(), Arc::new(class));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::register_engine;

    #[tokio::test]
    async fn test_unknown_engine_leaves_session_unset() {
        let mut session = Session::new();
        let err = session.open("session-test-missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(session.engine().is_none());

        let err = session.begin_table("user v0.1.0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let err = session.begin_class("Users").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_open_registered_engine_once() {
        register_engine("session-test", "sqlite::memory:");
        let mut session = Session::connect("session-test").await.unwrap();
        assert_eq!(session.engine(), Some("session-test"));

        let err = session.open("session-test").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_begin_table_requires_separator() {
        register_engine("session-test-decl", "sqlite::memory:");
        let session = Session::connect("session-test-decl").await.unwrap();
        let err = session.begin_table("user").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedDeclaration);
        assert!(session.begin_table("user  v0.1.0 ").is_ok());
    }

    #[tokio::test]
    async fn test_call_unknown_class() {
        register_engine("session-test-call", "sqlite::memory:");
        let session = Session::connect("session-test-call").await.unwrap();
        let err = session.call("Users", "register", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCall);
    }
}
