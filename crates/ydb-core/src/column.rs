//! Column descriptors.
//!
//! A column's storage is described by a [`ColumnShape`]. Foreign references
//! and defaults are attributes layered on top of the shape, so every column is
//! built through the same constructor:
//!
//! ```
//! use ydb_core::column::{ColumnShape, ColumnSpec, ScalarType};
//!
//! let id = ColumnSpec::new("id", ColumnShape::FixedBytes(32)).not_null();
//! let email = ColumnSpec::new("email", ColumnShape::Scalar(ScalarType::Text));
//! let owner = ColumnSpec::new("owner", ColumnShape::FixedBytes(32))
//!     .references("id@user".parse().unwrap());
//! # let _ = (id, email, owner);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::value::{Value, ValueKind};
use crate::version::is_identifier;

/// Scalar column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Bool,
    /// 32-bit integer.
    Int32,
    /// 64-bit integer.
    Int64,
    /// Single precision float.
    Float32,
    /// Double precision float.
    Float64,
    Text,
    Blob,
    /// RFC 3339 timestamp stored as text.
    Timestamp,
}

/// Families group scalar types that may be widened into one another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Bool,
    Int,
    Float,
    Text,
    Blob,
    Timestamp,
}

impl ScalarType {
    fn family(self) -> Family {
        match self {
            Self::Bool => Family::Bool,
            Self::Int32 | Self::Int64 => Family::Int,
            Self::Float32 | Self::Float64 => Family::Float,
            Self::Text => Family::Text,
            Self::Blob => Family::Blob,
            Self::Timestamp => Family::Timestamp,
        }
    }

    fn width(self) -> u8 {
        match self {
            Self::Int32 | Self::Float32 => 32,
            Self::Int64 | Self::Float64 => 64,
            _ => 0,
        }
    }

    /// Returns the SQLite storage type.
    #[must_use]
    pub fn sqlite_name(self) -> &'static str {
        match self {
            Self::Bool | Self::Int32 | Self::Int64 => "INTEGER",
            Self::Float32 | Self::Float64 => "REAL",
            Self::Text | Self::Timestamp => "TEXT",
            Self::Blob => "BLOB",
        }
    }

    /// Returns the kind of value this type holds once decoded.
    #[must_use]
    pub fn value_kind(self) -> ValueKind {
        match self {
            Self::Bool => ValueKind::Bool,
            Self::Int32 | Self::Int64 => ValueKind::Int,
            Self::Float32 | Self::Float64 => ValueKind::Float,
            Self::Text | Self::Timestamp => ValueKind::Text,
            Self::Blob => ValueKind::Blob,
        }
    }

    fn coerce(self, value: Value) -> Result<Value> {
        let coerced = match (self, value) {
            (_, Value::Null) => Value::Null,
            (Self::Bool, Value::Bool(b)) => Value::Int(i64::from(b)),
            (Self::Bool, Value::Int(i @ (0 | 1))) => Value::Int(i),
            (Self::Int32, Value::Int(i)) if i32::try_from(i).is_ok() => Value::Int(i),
            (Self::Int64, Value::Int(i)) => Value::Int(i),
            (Self::Float32 | Self::Float64, Value::Float(f)) => Value::Float(f),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float32 | Self::Float64, Value::Int(i)) => Value::Float(i as f64),
            (Self::Text | Self::Timestamp, Value::Text(s)) => Value::Text(s),
            (Self::Blob, Value::Blob(b)) => Value::Blob(b),
            (Self::Blob, Value::Text(s)) => Value::Blob(s.into_bytes()),
            (ty, other) => {
                return Err(SchemaError::mismatch(format!(
                    "{other} does not fit column type {ty:?}"
                )))
            }
        };
        Ok(coerced)
    }

    fn decode(self, value: Value) -> Value {
        match (self, value) {
            (Self::Bool, Value::Int(i)) => Value::Bool(i != 0),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float32 | Self::Float64, Value::Int(i)) => Value::Float(i as f64),
            (_, other) => other,
        }
    }
}

/// How two column shapes relate when migrating from one to the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Identical storage.
    Same,
    /// Same family, target is at least as wide.
    Widened,
    /// Same family, target is narrower.
    Narrowed,
    /// Different families.
    Unrelated,
}

/// Storage shape of a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnShape {
    /// A scalar primitive.
    Scalar(ScalarType),
    /// A byte sequence of exactly `width` bytes; shorter values are padded
    /// with zero bytes.
    FixedBytes(usize),
    /// A sequence of exactly `len` elements, stored as JSON text.
    ///
    /// Elements are scalars; nested arrays and structured elements are not
    /// supported. Lengthening the array in a migration pads carried rows
    /// with nulls.
    FixedArray { element: ScalarType, len: usize },
}

impl ColumnShape {
    /// Returns the SQLite storage type.
    #[must_use]
    pub fn sqlite_name(&self) -> &'static str {
        match self {
            Self::Scalar(ty) => ty.sqlite_name(),
            Self::FixedBytes(_) => "BLOB",
            Self::FixedArray { .. } => "TEXT",
        }
    }

    /// Returns the kind of value read back from this column.
    #[must_use]
    pub fn value_kind(&self) -> ValueKind {
        match self {
            Self::Scalar(ty) => ty.value_kind(),
            Self::FixedBytes(_) => ValueKind::Blob,
            Self::FixedArray { .. } => ValueKind::Array,
        }
    }

    /// Compares this (prior) shape with a target shape.
    #[must_use]
    pub fn compare(&self, target: &Self) -> Compatibility {
        fn by_size(prior: usize, target: usize) -> Compatibility {
            match target.cmp(&prior) {
                Ordering::Equal => Compatibility::Same,
                Ordering::Greater => Compatibility::Widened,
                Ordering::Less => Compatibility::Narrowed,
            }
        }

        match (self, target) {
            (Self::Scalar(a), Self::Scalar(b)) if a == b => Compatibility::Same,
            (Self::Scalar(a), Self::Scalar(b)) if a.family() == b.family() => {
                by_size(usize::from(a.width()), usize::from(b.width()))
            }
            (Self::FixedBytes(a), Self::FixedBytes(b)) => by_size(*a, *b),
            (
                Self::FixedArray { element: a, len: n },
                Self::FixedArray { element: b, len: m },
            ) if a.family() == b.family() => {
                match (
                    Self::Scalar(*a).compare(&Self::Scalar(*b)),
                    by_size(*n, *m),
                ) {
                    (Compatibility::Same, size) => size,
                    (Compatibility::Narrowed, _) | (_, Compatibility::Narrowed) => {
                        Compatibility::Narrowed
                    }
                    _ => Compatibility::Widened,
                }
            }
            _ => Compatibility::Unrelated,
        }
    }

    /// Converts a value into its stored form for this shape.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        match self {
            Self::Scalar(ty) => ty.coerce(value),
            Self::FixedBytes(width) => {
                let mut bytes = match value {
                    Value::Null => return Ok(Value::Null),
                    Value::Blob(b) => b,
                    Value::Text(s) => s.into_bytes(),
                    other => {
                        return Err(SchemaError::mismatch(format!(
                            "{other} does not fit a {width}-byte column"
                        )))
                    }
                };
                if bytes.len() > *width {
                    return Err(SchemaError::mismatch(format!(
                        "{} bytes do not fit a {width}-byte column",
                        bytes.len()
                    )));
                }
                bytes.resize(*width, 0);
                Ok(Value::Blob(bytes))
            }
            Self::FixedArray { element, len } => {
                let items = match value {
                    Value::Null => return Ok(Value::Null),
                    Value::Array(items) => items,
                    other => {
                        return Err(SchemaError::mismatch(format!(
                            "{other} is not an array of {len}"
                        )))
                    }
                };
                if items.len() != *len {
                    return Err(SchemaError::mismatch(format!(
                        "array of {} elements does not fit an array of {len}",
                        items.len()
                    )));
                }
                let items = items
                    .into_iter()
                    .map(|item| element.coerce(item).map(|v| element.decode(v)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Text(Value::Array(items).to_json().to_string()))
            }
        }
    }

    /// Converts a value stored under the prior shape `from` into the stored
    /// form of this shape. Used when carrying rows into a new version.
    pub fn carry(&self, from: &Self, stored: Value) -> Result<Value> {
        let value = match (from.decode(stored), self) {
            (Value::Array(mut items), Self::FixedArray { len, .. }) if items.len() < *len => {
                items.resize(*len, Value::Null);
                Value::Array(items)
            }
            (value, _) => value,
        };
        self.coerce(value)
    }

    /// Converts a stored value back into its logical form.
    #[must_use]
    pub fn decode(&self, value: Value) -> Value {
        match (self, value) {
            (Self::Scalar(ty), value) => ty.decode(value),
            (Self::FixedArray { element, .. }, Value::Text(json)) => {
                match serde_json::from_str::<serde_json::Value>(&json) {
                    Ok(parsed) => match Value::from_json(&parsed) {
                        Value::Array(items) => {
                            Value::Array(items.into_iter().map(|v| element.decode(v)).collect())
                        }
                        _ => Value::Text(json),
                    },
                    Err(_) => Value::Text(json),
                }
            }
            (_, value) => value,
        }
    }
}

impl fmt::Display for ColumnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(ty) => write!(f, "{ty:?}"),
            Self::FixedBytes(width) => write!(f, "[{width}]u8"),
            Self::FixedArray { element, len } => write!(f, "[{len}]{element:?}"),
        }
    }
}

/// A foreign reference written as `column@table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub column: String,
    pub table: String,
}

impl FromStr for ColumnRef {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        let (column, table) = s.split_once('@').ok_or_else(|| {
            SchemaError::malformed(format!("'{s}' is not a reference of the form column@table"))
        })?;
        if !is_identifier(column) || !is_identifier(table) {
            return Err(SchemaError::malformed(format!(
                "'{s}' is not a reference of the form column@table"
            )));
        }
        Ok(Self {
            column: column.to_string(),
            table: table.to_string(),
        })
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.column, self.table)
    }
}

/// Declaration of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Storage shape.
    pub shape: ColumnShape,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Default value for new rows and for rows carried over by a migration.
    pub default: Option<Value>,
    /// Foreign reference, if any.
    pub references: Option<ColumnRef>,
}

impl ColumnSpec {
    /// Creates a nullable column without default.
    #[must_use]
    pub fn new(name: impl Into<String>, shape: ColumnShape) -> Self {
        Self {
            name: name.into(),
            shape,
            nullable: true,
            default: None,
            references: None,
        }
    }

    /// Shorthand for a scalar column.
    #[must_use]
    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        Self::new(name, ColumnShape::Scalar(ty))
    }

    /// Builds a column from positional declaration arguments.
    ///
    /// `args[0]`, when present, is either a `column@table` reference or a
    /// default literal. Unquoted literals that are not numbers, booleans or
    /// `null` are taken as text.
    pub fn from_args(name: impl Into<String>, shape: ColumnShape, args: &[&str]) -> Result<Self> {
        let mut spec = Self::new(name, shape);
        match args {
            [] => {}
            [arg] if arg.contains('@') && !arg.starts_with(['\'', '"']) => {
                spec = spec.references(arg.parse()?);
            }
            [arg] => {
                let value = Value::parse_literal(arg).unwrap_or_else(|| Value::from(*arg));
                spec = spec.default(value);
            }
            _ => {
                return Err(SchemaError::malformed(format!(
                    "column '{}' takes at most one argument, got {}",
                    spec.name,
                    args.len()
                )))
            }
        }
        Ok(spec)
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Marks the column as a foreign reference.
    #[must_use]
    pub fn references(mut self, target: ColumnRef) -> Self {
        self.references = Some(target);
        self
    }

    /// Returns the default converted to its stored form.
    ///
    /// NaN and infinite floats have no SQL literal and are rejected.
    pub fn stored_default(&self) -> Result<Option<Value>> {
        if let Some(Value::Float(f)) = &self.default {
            if !f.is_finite() {
                return Err(SchemaError::malformed(format!(
                    "default of column '{}' is {f}, which has no SQL literal",
                    self.name
                )));
            }
        }
        self.default
            .clone()
            .map(|value| self.shape.coerce(value))
            .transpose()
    }
}
