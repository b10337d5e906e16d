//! Compiled, parameterized statements.

use serde::{Deserialize, Serialize};

use crate::column::ColumnShape;
use crate::error::{Result, SchemaError};
use crate::value::Value;

/// Where a statement parameter takes its value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Binding {
    /// Positional argument of the enclosing method.
    Param(usize),
    /// Literal fixed at compile time.
    Literal(Value),
}

/// One `?` in a statement, with the shape the bound value must fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub binding: Binding,
    pub shape: ColumnShape,
}

/// SQL text plus one slot per `?`, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub sql: String,
    pub slots: Vec<Slot>,
}

impl Statement {
    /// Creates a statement without parameters.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            slots: Vec::new(),
        }
    }

    /// Resolves every slot against `args` and converts the values into
    /// their stored form.
    pub fn bind(&self, args: &[Value]) -> Result<Vec<Value>> {
        self.slots
            .iter()
            .map(|slot| {
                let value = match &slot.binding {
                    Binding::Param(index) => args.get(*index).cloned().ok_or_else(|| {
                        SchemaError::malformed(format!(
                            "statement expects argument #{index}, got {} arguments",
                            args.len()
                        ))
                    })?,
                    Binding::Literal(value) => value.clone(),
                };
                slot.shape.coerce(value)
            })
            .collect()
    }
}
