//! Error types for schema declaration and compilation.

use thiserror::Error;

/// Errors raised while building schemas, compiling templates or resolving
/// migrations. None of these involve I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A declaration is syntactically or structurally invalid.
    #[error("malformed declaration: {0}")]
    Malformed(String),

    /// Two schema versions cannot be reconciled.
    #[error("incompatible migration: {0}")]
    Incompatible(String),

    /// A value does not fit the shape it is bound to.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

impl SchemaError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch(message.into())
    }
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
