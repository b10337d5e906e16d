//! Compiled API methods and their executor.
//!
//! A [`CompiledMethod`] is a straight-line list of [`Op`]s whose statements
//! were fully resolved when the class was declared. Running one binds the
//! call arguments to each statement's slots and executes the ops in order
//! against a [`Connection`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ydb_core::column::ColumnShape;
use ydb_core::statement::Statement;
use ydb_core::template::Condition;
use ydb_core::value::{Value, ValueKind};

use crate::connection::{Connection, Row};
use crate::error::{Error, Result, Sentinel};

/// Result of a method call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Output {
    /// The method finished without returning anything.
    Unit,
    /// A single literal value.
    Value(Value),
    /// Rows copied from the cursor, columns in the order the method returns
    /// them.
    Rows(Vec<Row>),
}

impl Output {
    /// Returns the rows, or an empty slice for non-row outputs.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Rows(rows) => rows,
            _ => &[],
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => f.write_str("()"),
            Self::Value(value) => write!(f, "{value}"),
            Self::Rows(rows) => write!(f, "{} row(s)", rows.len()),
        }
    }
}

/// A returned column: its position in the cursor and its declared kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnColumn {
    pub name: String,
    pub index: usize,
    pub kind: ValueKind,
}

/// Compiled form of a `ret`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompiledRet {
    Columns(Vec<ReturnColumn>),
    Value(Value),
    Fail(Sentinel),
}

/// One step of a compiled method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Fails with [`Sentinel::DuplicatedRow`] when `count` yields more than
    /// `max`.
    Guard { count: Statement, max: u64 },
    Insert(Statement),
    Update(Statement),
    /// Replaces the cursor with the rows of `statement`, decoded by `shapes`.
    Query {
        statement: Statement,
        shapes: Vec<ColumnShape>,
    },
    Ret(CompiledRet),
    /// Returns early when `condition` holds for the call's arguments.
    RetIf {
        condition: Condition,
        ret: CompiledRet,
    },
    RetIfEmpty(CompiledRet),
}

/// A compiled API method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledMethod {
    pub name: String,
    pub params: Vec<(String, ValueKind)>,
    pub ops: Vec<Op>,
}

impl CompiledMethod {
    /// Runs the method with `args`.
    pub async fn run(&self, conn: &dyn Connection, args: &[Value]) -> Result<Output> {
        self.check_args(args)?;

        let mut cursor: Option<Vec<Row>> = None;
        for op in &self.ops {
            match op {
                Op::Guard { count, max } => {
                    let matching = count_rows(conn, count, args).await?;
                    if matching > *max {
                        warn!(method = %self.name, matching, max, "Limit exceeded, skipping insert");
                        return Err(Sentinel::DuplicatedRow.into());
                    }
                }
                Op::Insert(statement) | Op::Update(statement) => {
                    let affected = conn
                        .execute(&statement.sql, &statement.bind(args)?)
                        .await
                        .map_err(|err| duplicate_key(&self.name, err))?;
                    debug!(method = %self.name, affected, "Statement applied");
                }
                Op::Query { statement, shapes } => {
                    let rows = conn.query(&statement.sql, &statement.bind(args)?).await?;
                    let decoded = rows
                        .into_iter()
                        .map(|row| {
                            row.into_iter()
                                .zip(shapes)
                                .map(|(value, shape)| shape.decode(value))
                                .collect()
                        })
                        .collect();
                    cursor = Some(decoded);
                }
                Op::Ret(ret) => return self.ret(ret, cursor.as_deref()),
                Op::RetIf { condition, ret } => {
                    if condition.holds(args) {
                        debug!(method = %self.name, "Condition met, returning early");
                        return self.ret(ret, cursor.as_deref());
                    }
                }
                Op::RetIfEmpty(ret) => {
                    if cursor.as_ref().map_or(true, Vec::is_empty) {
                        return self.ret(ret, cursor.as_deref());
                    }
                }
            }
        }

        Ok(Output::Unit)
    }

    fn check_args(&self, args: &[Value]) -> Result<()> {
        if args.len() != self.params.len() {
            return Err(Error::invalid_call(format!(
                "{} takes {} argument(s), got {}",
                self.name,
                self.params.len(),
                args.len()
            )));
        }
        for ((name, kind), arg) in self.params.iter().zip(args) {
            if !arg.fits(*kind) {
                return Err(Error::TypeMismatch(format!(
                    "argument '{name}' of {} expects {kind}, got {arg}",
                    self.name
                )));
            }
        }
        Ok(())
    }

    fn ret(&self, ret: &CompiledRet, cursor: Option<&[Row]>) -> Result<Output> {
        match ret {
            CompiledRet::Value(value) => Ok(Output::Value(value.clone())),
            CompiledRet::Fail(sentinel) => Err(sentinel.clone().into()),
            CompiledRet::Columns(columns) => {
                let rows = cursor
                    .unwrap_or_default()
                    .iter()
                    .map(|row| {
                        columns
                            .iter()
                            .map(|column| {
                                let value = row.get(column.index).cloned().unwrap_or(Value::Null);
                                if value.fits(column.kind) {
                                    Ok(value)
                                } else {
                                    Err(Error::TypeMismatch(format!(
                                        "column '{}' holds {value}, declared {}",
                                        column.name, column.kind
                                    )))
                                }
                            })
                            .collect::<Result<Row>>()
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Output::Rows(rows))
            }
        }
    }
}

/// Unique constraint violations surface as [`Sentinel::DuplicatedRow`].
fn duplicate_key(method: &str, err: Error) -> Error {
    let unique = matches!(
        &err,
        Error::ConnectionFailure(e) if e.as_database_error().is_some_and(|db| db.is_unique_violation())
    );
    if unique {
        warn!(method = %method, "Unique constraint violated");
        Sentinel::DuplicatedRow.into()
    } else {
        err
    }
}

async fn count_rows(conn: &dyn Connection, count: &Statement, args: &[Value]) -> Result<u64> {
    let rows = conn.query(&count.sql, &count.bind(args)?).await?;
    match rows.first().and_then(|row| row.first()) {
        Some(Value::Int(n)) => Ok(u64::try_from(*n).unwrap_or(0)),
        other => Err(Error::TypeMismatch(format!(
            "count query returned {other:?}"
        ))),
    }
}

/// A compiled class: the tables it uses and its methods by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledClass {
    pub name: String,
    /// Used tables, as `"name version"`.
    pub tables: Vec<String>,
    pub methods: BTreeMap<String, CompiledMethod>,
}

impl CompiledClass {
    /// Gets a method by name.
    pub fn method(&self, name: &str) -> Result<&CompiledMethod> {
        self.methods.get(name).ok_or_else(|| {
            Error::invalid_call(format!("class {} has no method '{name}'", self.name))
        })
    }
}
