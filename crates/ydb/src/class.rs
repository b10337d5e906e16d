//! Class declarations.
//!
//! A class groups already declared tables behind named API methods. Method
//! bodies are written as a list of statements and compiled when the class
//! is finalized:
//!
//! ```rust,ignore
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
//!     .scenario("register", vec!["u1".into(), "a@x.com".into()], Expect::Ok)
//!     .finalize(&mut session)
//!     .await?;
//! ```

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};
use ydb_core::dialect::SqliteDialect;
use ydb_core::schema::TableSchema;
use ydb_core::statement::Binding;
use ydb_core::template::{Condition, Filter, Operand};
use ydb_core::value::{Value, ValueKind};
use ydb_core::version::is_identifier;

use crate::connection::Row;
use crate::error::{Error, Result, Sentinel};
use crate::program::{CompiledClass, CompiledMethod, CompiledRet, Op, Output, ReturnColumn};
use crate::session::Session;

/// What a method returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Ret {
    /// Copies the named cursor columns, each checked against its kind.
    Columns(Vec<(String, ValueKind)>),
    /// Returns a literal value.
    Value(Value),
    /// Fails with a sentinel error.
    Fail(Sentinel),
}

impl Ret {
    /// Returns the given cursor columns.
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ValueKind)>,
        S: Into<String>,
    {
        Self::Columns(
            columns
                .into_iter()
                .map(|(name, kind)| (name.into(), kind))
                .collect(),
        )
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    #[must_use]
    pub fn fail(sentinel: Sentinel) -> Self {
        Self::Fail(sentinel)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    On(String),
    Limit(u64, String),
    Insert(Vec<(String, Operand)>),
    Query(String),
    Update(Vec<(String, Operand)>, String),
    Ret(Ret),
    RetIf(String, Ret),
    RetIfEmpty(Ret),
}

/// Declaration of an API method.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiMethod {
    name: String,
    params: Vec<(String, ValueKind)>,
    steps: Vec<Step>,
}

impl ApiMethod {
    /// Creates a method without parameters or statements.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Returns the method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a typed parameter. `{name}` placeholders refer to it.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.params.push((name.into(), kind));
        self
    }

    /// Directs the following statements at `table`. Statements target the
    /// first used table until this is called.
    #[must_use]
    pub fn on(mut self, table: impl Into<String>) -> Self {
        self.steps.push(Step::On(table.into()));
        self
    }

    /// Guards the next insert, or caps the next query at `n` rows.
    ///
    /// Before an insert, the insert is skipped with
    /// [`Sentinel::DuplicatedRow`] when more than `n` rows match `template`.
    /// Before a query, `template` is added to the query's filter. Consecutive
    /// limits all apply to the same statement.
    #[must_use]
    pub fn limit(mut self, n: u64, template: impl Into<String>) -> Self {
        self.steps.push(Step::Limit(n, template.into()));
        self
    }

    /// Inserts one row. Values written `"{param}"` bind to parameters;
    /// anything else is a literal.
    #[must_use]
    pub fn insert<I, C, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Operand>,
    {
        self.steps.push(Step::Insert(
            values
                .into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        ));
        self
    }

    /// Selects the rows matching `template` into the cursor.
    #[must_use]
    pub fn query(mut self, template: impl Into<String>) -> Self {
        self.steps.push(Step::Query(template.into()));
        self
    }

    /// Updates the rows matching `template`.
    #[must_use]
    pub fn update<I, C, V>(mut self, set: I, template: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Operand>,
    {
        self.steps.push(Step::Update(
            set.into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
            template.into(),
        ));
        self
    }

    #[must_use]
    pub fn ret(mut self, ret: Ret) -> Self {
        self.steps.push(Step::Ret(ret));
        self
    }

    /// Returns early with `ret` when `condition` holds for the call's
    /// arguments.
    ///
    /// The condition is a template whose left-hand names are parameters:
    /// `"email = '' and tel = ''"`.
    #[must_use]
    pub fn ret_if(mut self, condition: impl Into<String>, ret: Ret) -> Self {
        self.steps.push(Step::RetIf(condition.into(), ret));
        self
    }

    /// Returns early with `ret` when the cursor is empty.
    #[must_use]
    pub fn ret_if_empty(mut self, ret: Ret) -> Self {
        self.steps.push(Step::RetIfEmpty(ret));
        self
    }

    fn compile(&self, tables: &[TableSchema]) -> Result<CompiledMethod> {
        let scope: Vec<String> = self.params.iter().map(|(name, _)| name.clone()).collect();
        for (i, name) in scope.iter().enumerate() {
            if !is_identifier(name) {
                return Err(Error::malformed(format!(
                    "parameter '{name}' of {} is not a valid identifier",
                    self.name
                )));
            }
            if scope[..i].contains(name) {
                return Err(Error::malformed(format!(
                    "parameter '{name}' of {} is declared twice",
                    self.name
                )));
            }
        }

        let dialect = SqliteDialect::new();
        let mut target = tables.first();
        let mut pending: Vec<(u64, Filter)> = Vec::new();
        let mut cursor: Option<&TableSchema> = None;
        let mut ops = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            if !pending.is_empty() && !matches!(step, Step::Limit(..) | Step::Insert(_) | Step::Query(_)) {
                return Err(Error::malformed(format!(
                    "limit in {} must be followed by an insert or a query",
                    self.name
                )));
            }
            match step {
                Step::On(name) => {
                    target = Some(tables.iter().find(|t| &t.id.name == name).ok_or_else(|| {
                        Error::malformed(format!("{} targets table '{name}', which the class does not use", self.name))
                    })?);
                }
                Step::Limit(n, template) => {
                    pending.push((*n, Filter::parse(template)?));
                }
                Step::Insert(values) => {
                    let table = self.target(target)?;
                    for (max, filter) in pending.drain(..) {
                        ops.push(Op::Guard {
                            count: dialect.count(table, &filter, &scope)?,
                            max,
                        });
                    }
                    ops.push(Op::Insert(dialect.insert(table, values, &scope)?));
                }
                Step::Query(template) => {
                    let table = self.target(target)?;
                    let mut filter = Filter::parse(template)?;
                    let mut limit: Option<u64> = None;
                    for (n, extra) in pending.drain(..) {
                        filter.terms.extend(extra.terms);
                        limit = Some(limit.map_or(n, |current| current.min(n)));
                    }
                    ops.push(Op::Query {
                        statement: dialect.select(table, &filter, &scope, limit)?,
                        shapes: table.columns.iter().map(|c| c.shape.clone()).collect(),
                    });
                    cursor = Some(table);
                }
                Step::Update(set, template) => {
                    let table = self.target(target)?;
                    let filter = Filter::parse(template)?;
                    ops.push(Op::Update(dialect.update(table, set, &filter, &scope)?));
                }
                Step::Ret(ret) => ops.push(Op::Ret(self.compile_ret(ret, cursor)?)),
                Step::RetIf(template, ret) => {
                    let condition = self.compile_condition(template, &scope)?;
                    ops.push(Op::RetIf {
                        condition,
                        ret: self.compile_ret(ret, cursor)?,
                    });
                }
                Step::RetIfEmpty(ret) => {
                    if cursor.is_none() {
                        return Err(Error::malformed(format!(
                            "ret_if_empty in {} has no query before it",
                            self.name
                        )));
                    }
                    ops.push(Op::RetIfEmpty(self.compile_ret(ret, cursor)?));
                }
            }
        }

        if !pending.is_empty() {
            return Err(Error::malformed(format!(
                "limit in {} must be followed by an insert or a query",
                self.name
            )));
        }

        Ok(CompiledMethod {
            name: self.name.clone(),
            params: self.params.clone(),
            ops,
        })
    }

    fn target<'a>(&self, target: Option<&'a TableSchema>) -> Result<&'a TableSchema> {
        target.ok_or_else(|| Error::malformed(format!("{} has no table to work on", self.name)))
    }

    fn compile_condition(&self, template: &str, scope: &[String]) -> Result<Condition> {
        let condition = Filter::parse(template)?.condition(scope)?;
        if condition.checks.is_empty() {
            return Err(Error::malformed(format!(
                "ret_if in {} has an empty condition",
                self.name
            )));
        }
        for check in &condition.checks {
            let (name, kind) = &self.params[check.param];
            if let Binding::Literal(value) = &check.operand {
                if !value.fits(*kind) {
                    return Err(Error::TypeMismatch(format!(
                        "{} compares parameter '{name}' of kind {kind} with {value}",
                        self.name
                    )));
                }
            }
        }
        Ok(condition)
    }

    fn compile_ret(&self, ret: &Ret, cursor: Option<&TableSchema>) -> Result<CompiledRet> {
        match ret {
            Ret::Value(value) => Ok(CompiledRet::Value(value.clone())),
            Ret::Fail(sentinel) => Ok(CompiledRet::Fail(sentinel.clone())),
            Ret::Columns(columns) => {
                let table = cursor.ok_or_else(|| {
                    Error::malformed(format!("{} returns columns without a query", self.name))
                })?;
                columns
                    .iter()
                    .map(|(name, kind)| {
                        let index = table
                            .columns
                            .iter()
                            .position(|c| &c.name == name)
                            .ok_or_else(|| {
                                Error::malformed(format!(
                                    "{} returns unknown column '{name}' of {}",
                                    self.name, table.id
                                ))
                            })?;
                        let stored = table.columns[index].shape.value_kind();
                        if !kind_accepts(*kind, stored) {
                            return Err(Error::TypeMismatch(format!(
                                "{} returns column '{name}' as {kind}, but it holds {stored}",
                                self.name
                            )));
                        }
                        Ok(ReturnColumn {
                            name: name.clone(),
                            index,
                            kind: *kind,
                        })
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(CompiledRet::Columns)
            }
        }
    }
}

fn kind_accepts(declared: ValueKind, stored: ValueKind) -> bool {
    declared == ValueKind::Any
        || declared == stored
        || (declared == ValueKind::Float && stored == ValueKind::Int)
}

/// Expected result of a call scenario.
#[derive(Debug, Clone, PartialEq)]
pub enum Expect {
    /// Any successful result.
    Ok,
    Value(Value),
    Rows(Vec<Row>),
    /// A successful row result with this many rows.
    RowCount(usize),
    Fail(Sentinel),
}

impl Expect {
    fn matches(&self, actual: &Result<Output>) -> bool {
        match (self, actual) {
            (Self::Ok, Ok(_)) => true,
            (Self::Value(expected), Ok(Output::Value(value))) => expected == value,
            (Self::Rows(expected), Ok(Output::Rows(rows))) => expected == rows,
            (Self::RowCount(n), Ok(Output::Rows(rows))) => rows.len() == *n,
            (Self::Fail(expected), Err(err)) => err.sentinel().as_ref() == Some(expected),
            _ => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Ok => "success".to_string(),
            Self::Value(value) => format!("value {value}"),
            Self::Rows(rows) => format!("{} row(s) {rows:?}", rows.len()),
            Self::RowCount(n) => format!("{n} row(s)"),
            Self::Fail(sentinel) => format!("failure '{sentinel}'"),
        }
    }
}

/// A recorded call and its expected result.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub method: String,
    pub args: Vec<Value>,
    pub expect: Expect,
}

/// Builder for a class declaration.
#[derive(Debug)]
pub struct ClassBuilder {
    name: String,
    available: HashMap<String, TableSchema>,
    uses: Vec<String>,
    methods: Vec<ApiMethod>,
    scenarios: Vec<Scenario>,
}

impl ClassBuilder {
    pub(crate) fn new(name: String, available: HashMap<String, TableSchema>) -> Self {
        Self {
            name,
            available,
            uses: Vec::new(),
            methods: Vec::new(),
            scenarios: Vec::new(),
        }
    }

    /// Adds a declared table to the class.
    pub fn uses(mut self, table: &str) -> Result<Self> {
        if !self.available.contains_key(table) {
            return Err(Error::malformed(format!(
                "class {} uses undeclared table '{table}'",
                self.name
            )));
        }
        if self.uses.iter().any(|t| t == table) {
            return Err(Error::malformed(format!(
                "class {} uses table '{table}' twice",
                self.name
            )));
        }
        self.uses.push(table.to_string());
        Ok(self)
    }

    /// Registers an API method.
    pub fn api(mut self, method: ApiMethod) -> Result<Self> {
        if !is_identifier(&method.name) {
            return Err(Error::malformed(format!(
                "method name '{}' is not a valid identifier",
                method.name
            )));
        }
        if self.methods.iter().any(|m| m.name == method.name) {
            return Err(Error::malformed(format!(
                "class {} declares method '{}' twice",
                self.name, method.name
            )));
        }
        self.methods.push(method);
        Ok(self)
    }

    /// Records a call scenario, evaluated in declaration order at finalize.
    #[must_use]
    pub fn scenario(mut self, method: impl Into<String>, args: Vec<Value>, expect: Expect) -> Self {
        self.scenarios.push(Scenario {
            method: method.into(),
            args,
            expect,
        });
        self
    }

    /// Compiles the methods, runs the scenarios, persists and registers the
    /// class.
    ///
    /// Nothing is registered when any step fails. Rows written by scenarios
    /// that ran before a failure stay in the tables.
    pub async fn finalize(self, session: &mut Session) -> Result<()> {
        let conn = session.connection()?.clone();
        if session.class(&self.name).is_some() {
            return Err(Error::DuplicateSchema(format!("class {}", self.name)));
        }

        let tables = self
            .uses
            .iter()
            .map(|name| {
                session
                    .table(name)
                    .or_else(|| self.available.get(name))
                    .cloned()
                    .ok_or_else(|| Error::malformed(format!("class {} uses undeclared table '{name}'", self.name)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut methods = BTreeMap::new();
        for method in &self.methods {
            let compiled = method.compile(&tables)?;
            debug!(class = %self.name, method = %method.name, ops = compiled.ops.len(), "Compiled method");
            methods.insert(method.name.clone(), compiled);
        }

        let class = CompiledClass {
            name: self.name.clone(),
            tables: tables.iter().map(|t| t.id.to_string()).collect(),
            methods,
        };

        for (index, scenario) in self.scenarios.iter().enumerate() {
            let method = class.method(&scenario.method).map_err(|_| {
                Error::malformed(format!(
                    "scenario {index} of {} calls unknown method '{}'",
                    self.name, scenario.method
                ))
            })?;
            let actual = method.run(conn.as_ref(), &scenario.args).await;
            if scenario.expect.matches(&actual) {
                debug!(class = %self.name, method = %scenario.method, index, "Scenario passed");
                continue;
            }
            let actual = match actual {
                Ok(output) => format!("{output:?}"),
                Err(err) if err.sentinel().is_some() => format!("failure '{err}'"),
                Err(err @ (Error::ConnectionFailure(_) | Error::Serialization(_))) => {
                    return Err(err)
                }
                Err(err) => err.to_string(),
            };
            return Err(Error::ScenarioMismatch {
                class: self.name.clone(),
                method: scenario.method.clone(),
                index,
                expected: scenario.expect.describe(),
                actual,
            });
        }

        session.catalog()?.record_class(&class).await?;
        info!(class = %class.name, methods = class.methods.len(), "Class declared");
        session.register_class(class);
        Ok(())
    }
}
