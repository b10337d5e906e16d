//! Filter templates with `{name}` placeholders.
//!
//! A template is a conjunction of comparisons, separated by `,` or `and`:
//!
//! ```text
//! email={email}
//! email = {email}, role != 'banned'
//! age >= 18 and name = {name}
//! ```
//!
//! Placeholders are resolved once, when the template is compiled against
//! the parameter names of the enclosing method. The result is a SQL
//! condition with one `?` per operand and a positional [`Slot`] list.
//! Equality against a placeholder compiles to `IS` / `IS NOT`, so a null
//! argument matches null columns.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::schema::TableSchema;
use crate::statement::{Binding, Slot};
use crate::value::Value;
use crate::version::is_identifier;

/// Comparison operator of a template term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Applies the operator to the ordering of its two sides. Sides that
    /// cannot be ordered are only ever unequal.
    #[must_use]
    pub fn test(self, ordering: Option<Ordering>) -> bool {
        match self {
            Self::Eq => ordering == Some(Ordering::Equal),
            Self::Ne => ordering != Some(Ordering::Equal),
            Self::Lt => ordering == Some(Ordering::Less),
            Self::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            Self::Gt => ordering == Some(Ordering::Greater),
            Self::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        }
    }

    fn to_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Right-hand side of a comparison, or the value of an insert/update column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// `{name}`: a parameter of the enclosing method.
    Param(String),
    /// A literal passed through unchanged.
    Literal(Value),
}

impl Operand {
    /// Placeholder for parameter `name`.
    #[must_use]
    pub fn param(name: impl Into<String>) -> Self {
        Self::Param(name.into())
    }

    /// Resolves the operand against the method's parameter names.
    pub fn resolve(&self, scope: &[String]) -> Result<Binding> {
        match self {
            Self::Param(name) => scope
                .iter()
                .position(|p| p == name)
                .map(Binding::Param)
                .ok_or_else(|| {
                    SchemaError::malformed(format!("placeholder {{{name}}} names no parameter"))
                }),
            Self::Literal(value) => Ok(Binding::Literal(value.clone())),
        }
    }
}

/// `"{name}"` is a placeholder; any other string is a text literal.
impl From<&str> for Operand {
    fn from(raw: &str) -> Self {
        placeholder_name(raw).map_or_else(
            || Self::Literal(Value::from(raw)),
            |name| Self::Param(name.to_string()),
        )
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Param(name) => write!(f, "{{{name}}}"),
            Self::Literal(value) => write!(f, "{value}"),
        }
    }
}

fn placeholder_name(raw: &str) -> Option<&str> {
    raw.strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| is_identifier(name))
}

/// One `column op operand` comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub column: String,
    pub op: CompareOp,
    pub operand: Operand,
}

/// A parsed filter template. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub terms: Vec<Term>,
}

impl Filter {
    /// Parses a template.
    pub fn parse(template: &str) -> Result<Self> {
        let tokens = tokenize(template)?;
        let mut terms = Vec::new();
        let mut iter = tokens.into_iter().peekable();

        while iter.peek().is_some() {
            if !terms.is_empty() {
                match iter.next() {
                    Some(Token::Comma | Token::And) => {}
                    other => {
                        return Err(SchemaError::malformed(format!(
                            "expected ',' or 'and' in template '{template}', found {other:?}"
                        )))
                    }
                }
            }
            let column = match iter.next() {
                Some(Token::Ident(name)) => name,
                other => {
                    return Err(SchemaError::malformed(format!(
                        "expected a column name in template '{template}', found {other:?}"
                    )))
                }
            };
            let op = match iter.next() {
                Some(Token::Op(op)) => op,
                other => {
                    return Err(SchemaError::malformed(format!(
                        "expected a comparison after '{column}' in template '{template}', found {other:?}"
                    )))
                }
            };
            let operand = match iter.next() {
                Some(Token::Placeholder(name)) => Operand::Param(name),
                Some(Token::Literal(value)) => Operand::Literal(value),
                other => {
                    return Err(SchemaError::malformed(format!(
                        "expected a value after '{column}' in template '{template}', found {other:?}"
                    )))
                }
            };
            terms.push(Term {
                column,
                op,
                operand,
            });
        }

        Ok(Self { terms })
    }

    /// Column names referenced by the filter.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|t| t.column.as_str())
    }

    /// Compiles the filter into a SQL condition over `table`.
    ///
    /// Returns an empty condition for an empty filter.
    pub fn compile(&self, table: &TableSchema, scope: &[String]) -> Result<(String, Vec<Slot>)> {
        let mut conditions = Vec::with_capacity(self.terms.len());
        let mut slots = Vec::new();

        for term in &self.terms {
            let column = table.column(&term.column).ok_or_else(|| {
                SchemaError::malformed(format!(
                    "filter names unknown column '{}' of {}",
                    term.column, table.id
                ))
            })?;
            let quoted = format!("\"{}\"", term.column);

            if term.operand == Operand::Literal(Value::Null) {
                let test = match term.op {
                    CompareOp::Eq => "IS NULL",
                    CompareOp::Ne => "IS NOT NULL",
                    op => {
                        return Err(SchemaError::malformed(format!(
                            "'{}' cannot compare '{}' with null",
                            op.to_sql(),
                            term.column
                        )))
                    }
                };
                conditions.push(format!("{quoted} {test}"));
                continue;
            }

            let binding = term.operand.resolve(scope)?;
            let op = match (&binding, term.op) {
                (Binding::Literal(value), op) => {
                    column.shape.coerce(value.clone())?;
                    op.to_sql()
                }
                // A parameter may be bound to null at call time.
                (Binding::Param(_), CompareOp::Eq) => "IS",
                (Binding::Param(_), CompareOp::Ne) => "IS NOT",
                (Binding::Param(_), op) => op.to_sql(),
            };
            conditions.push(format!("{quoted} {op} ?"));
            slots.push(Slot {
                binding,
                shape: column.shape.clone(),
            });
        }

        Ok((conditions.join(" AND "), slots))
    }
}

/// One `param op operand` test of a [`Condition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    /// Position of the tested parameter.
    pub param: usize,
    pub op: CompareOp,
    pub operand: Binding,
}

/// A conjunction of tests over the arguments of a call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub checks: Vec<Check>,
}

impl Condition {
    /// Returns true when every check holds for `args`.
    #[must_use]
    pub fn holds(&self, args: &[Value]) -> bool {
        self.checks.iter().all(|check| {
            let Some(left) = args.get(check.param) else {
                return false;
            };
            let right = match &check.operand {
                Binding::Param(index) => match args.get(*index) {
                    Some(value) => value,
                    None => return false,
                },
                Binding::Literal(value) => value,
            };
            check.op.test(left.compare(right))
        })
    }
}

impl Filter {
    /// Compiles the filter as a condition over the method's parameters: the
    /// left-hand side of every term names a parameter instead of a column.
    pub fn condition(&self, scope: &[String]) -> Result<Condition> {
        let checks = self
            .terms
            .iter()
            .map(|term| {
                let param = scope.iter().position(|p| p == &term.column).ok_or_else(|| {
                    SchemaError::malformed(format!(
                        "condition tests '{}', which names no parameter",
                        term.column
                    ))
                })?;
                Ok(Check {
                    param,
                    op: term.op,
                    operand: term.operand.resolve(scope)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Condition { checks })
    }
}

impl FromStr for Filter {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Op(CompareOp),
    Placeholder(String),
    Literal(Value),
    Comma,
    And,
}

fn tokenize(template: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = template.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '{' => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '}')
                    .map(|offset| i + offset)
                    .ok_or_else(|| {
                        SchemaError::malformed(format!("unclosed placeholder in '{template}'"))
                    })?;
                let name: String = chars[i + 1..end].iter().collect();
                if !is_identifier(&name) {
                    return Err(SchemaError::malformed(format!(
                        "'{{{name}}}' is not a valid placeholder"
                    )));
                }
                tokens.push(Token::Placeholder(name));
                i = end + 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(SchemaError::malformed(format!(
                                "unterminated string in '{template}'"
                            )))
                        }
                        Some(&ch) if ch == quote => {
                            if chars.get(i + 1) == Some(&quote) {
                                text.push(quote);
                                i += 2;
                            } else {
                                i += 1;
                                break;
                            }
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Literal(Value::Text(text)));
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, len) = match (c, next) {
                    ('=', Some('=')) => (CompareOp::Eq, 2),
                    ('=', _) => (CompareOp::Eq, 1),
                    ('!', Some('=')) | ('<', Some('>')) => (CompareOp::Ne, 2),
                    ('<', Some('=')) => (CompareOp::Le, 2),
                    ('<', _) => (CompareOp::Lt, 1),
                    ('>', Some('=')) => (CompareOp::Ge, 2),
                    ('>', _) => (CompareOp::Gt, 1),
                    _ => {
                        return Err(SchemaError::malformed(format!(
                            "unexpected '{c}' in '{template}'"
                        )))
                    }
                };
                tokens.push(Token::Op(op));
                i += len;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '.' | '+' | '-'))
                {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                match Value::parse_literal(&raw) {
                    Some(value @ (Value::Int(_) | Value::Float(_))) => {
                        tokens.push(Token::Literal(value));
                    }
                    _ => {
                        return Err(SchemaError::malformed(format!(
                            "'{raw}' is not a number in '{template}'"
                        )))
                    }
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    _ => Token::Ident(word),
                };
                tokens.push(token);
            }
            other => {
                return Err(SchemaError::malformed(format!(
                    "unexpected '{other}' in '{template}'"
                )))
            }
        }
    }

    Ok(tokens)
}
