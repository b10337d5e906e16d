//! Values passed to and returned from statements.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A SQL value, bound as a statement parameter or read back from a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary blob value.
    Blob(Vec<u8>),
    /// Fixed-length sequence, stored as JSON text.
    Array(Vec<Value>),
}

/// The kind of a [`Value`], used for typed parameters and outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Blob,
    Array,
    /// Accepts any value.
    Any,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Blob => "blob",
            Self::Array => "array",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Returns the kind of this value. `Null` reports [`ValueKind::Any`].
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Any,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Blob(_) => ValueKind::Blob,
            Self::Array(_) => ValueKind::Array,
        }
    }

    /// Returns true if this value may be passed where `kind` is expected.
    #[must_use]
    pub fn fits(&self, kind: ValueKind) -> bool {
        matches!(self, Self::Null)
            || kind == ValueKind::Any
            || self.kind() == kind
            || (kind == ValueKind::Float && matches!(self, Self::Int(_)))
    }

    /// Parses a literal as written in a template or declaration argument.
    ///
    /// Accepts quoted strings (`'a'` or `"a"`, doubled quotes escape),
    /// `true`/`false`, `null`, integers and floats. Returns `None` for
    /// anything else.
    #[must_use]
    pub fn parse_literal(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        for quote in ['\'', '"'] {
            if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
                let inner = &raw[1..raw.len() - 1];
                let doubled: String = [quote, quote].iter().collect();
                return Some(Self::Text(inner.replace(&doubled, &quote.to_string())));
            }
        }
        match raw.to_ascii_lowercase().as_str() {
            "true" => return Some(Self::Bool(true)),
            "false" => return Some(Self::Bool(false)),
            "null" => return Some(Self::Null),
            _ => {}
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Some(Self::Int(i));
        }
        if raw.contains(['.', 'e', 'E']) && raw.starts_with(|c: char| c.is_ascii_digit() || c == '-')
        {
            if let Ok(f) = raw.parse::<f64>() {
                return Some(Self::Float(f));
            }
        }
        None
    }

    /// Returns the SQL representation for inline use (column defaults).
    ///
    /// Statements never inline user values; they are bound as parameters.
    #[must_use]
    pub fn to_sql_inline(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Bool(b) => String::from(if *b { "1" } else { "0" }),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => format!("{f:?}"),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
            Self::Array(_) => format!("'{}'", self.to_json().to_string().replace('\'', "''")),
        }
    }

    /// Converts to a JSON value (used for array storage).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Self::Text(s) => Json::String(s.clone()),
            Self::Blob(b) => Json::Array(b.iter().map(|byte| Json::from(*byte)).collect()),
            Self::Array(items) => Json::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    /// Orders two values of the same kind. Integers and floats compare
    /// numerically; null only equals null. Returns `None` for values that
    /// cannot be ordered against each other.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Blob(a), Self::Blob(b)) => Some(a.cmp(b)),
            (Self::Array(a), Self::Array(b)) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Converts from a JSON value. Objects are kept as their JSON text.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            Json::String(s) => Self::Text(s.clone()),
            Json::Array(items) => Self::Array(items.iter().map(Self::from_json).collect()),
            Json::Object(_) => Self::Text(json.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            other => f.write_str(&other.to_sql_inline()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Blob(value.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::from("").compare(&Value::from("")), Some(Ordering::Equal));
        assert_eq!(Value::Null.compare(&Value::Null), Some(Ordering::Equal));
        assert_eq!(Value::Null.compare(&Value::from("")), None);
        assert_eq!(Value::Int(1).compare(&Value::from("1")), None);
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(Value::parse_literal("'a@x.com'"), Some(Value::from("a@x.com")));
        assert_eq!(Value::parse_literal("\"it\"\"s\""), Some(Value::from("it\"s")));
        assert_eq!(Value::parse_literal("'it''s'"), Some(Value::from("it's")));
        assert_eq!(Value::parse_literal("42"), Some(Value::Int(42)));
        assert_eq!(Value::parse_literal("-7"), Some(Value::Int(-7)));
        assert_eq!(Value::parse_literal("1.5"), Some(Value::Float(1.5)));
        assert_eq!(Value::parse_literal("TRUE"), Some(Value::Bool(true)));
        assert_eq!(Value::parse_literal("null"), Some(Value::Null));
        assert_eq!(Value::parse_literal("bare"), None);
        assert_eq!(Value::parse_literal("inf"), None);
    }

    #[test]
    fn test_to_sql_inline() {
        assert_eq!(Value::Null.to_sql_inline(), "NULL");
        assert_eq!(Value::Bool(true).to_sql_inline(), "1");
        assert_eq!(Value::from("O'Brien").to_sql_inline(), "'O''Brien'");
        assert_eq!(Value::Blob(vec![0xAB, 0x01]).to_sql_inline(), "X'AB01'");
        assert_eq!(Value::Float(2.0).to_sql_inline(), "2.0");
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::Int(2)]).to_sql_inline(),
            "'[1,2]'"
        );
    }

    #[test]
    fn test_fits() {
        assert!(Value::Int(1).fits(ValueKind::Float));
        assert!(!Value::Float(1.0).fits(ValueKind::Int));
        assert!(Value::Null.fits(ValueKind::Text));
        assert!(Value::from("x").fits(ValueKind::Any));
        assert!(!Value::from("x").fits(ValueKind::Blob));
    }

    #[test]
    fn test_json_conversion() {
        let value = Value::Array(vec![Value::Int(1), Value::from("two"), Value::Null]);
        assert_eq!(Value::from_json(&value.to_json()), value);
    }
}
