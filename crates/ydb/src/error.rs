//! Error types for sessions, declarations and method calls.

use std::fmt;

use ydb_core::SchemaError;

/// Errors a method body may return on purpose.
///
/// Sentinels are compared by identity: a caller matches on
/// [`Error::sentinel`] rather than on the message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Sentinel {
    /// A `limit` guard found too many matching rows.
    DuplicatedRow,
    /// The requested row does not exist.
    NotFound,
    /// An error declared by the application, identified by its name.
    Custom(String),
}

impl Sentinel {
    /// Declares an application error. Two custom sentinels are the same
    /// error when their names are equal.
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicatedRow => f.write_str("duplicated row"),
            Self::NotFound => f.write_str("not found"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Errors that can occur in ydb.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No engine registered under the requested name, or no engine opened.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A declaration is syntactically or structurally invalid.
    #[error("Malformed declaration: {0}")]
    MalformedDeclaration(String),

    /// A table version is declared twice.
    #[error("Schema {0} is already declared")]
    DuplicateSchema(String),

    /// Rows of the prior version cannot be carried into the new one.
    #[error("Incompatible migration: {0}")]
    IncompatibleMigration(String),

    /// Database error.
    #[error("Connection failure: {0}")]
    ConnectionFailure(#[from] sqlx::Error),

    /// Sentinel error returned by a method body.
    #[error("{0}")]
    Sentinel(Sentinel),

    /// A call scenario did not produce its expected result.
    #[error("Scenario {index} of {class}.{method} failed: expected {expected}, got {actual}")]
    ScenarioMismatch {
        /// Class name.
        class: String,
        /// Method name.
        method: String,
        /// Position of the scenario within the class declaration.
        index: usize,
        /// Expected outcome.
        expected: String,
        /// Actual outcome.
        actual: String,
    },

    /// A value does not fit the type it is bound or returned as.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Unknown class or method, or wrong arguments.
    #[error("Invalid call: {0}")]
    InvalidCall(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Discriminant of [`Error`], for comparing errors by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    MalformedDeclaration,
    DuplicateSchema,
    IncompatibleMigration,
    ConnectionFailure,
    DuplicatedRow,
    NotFound,
    /// A [`Sentinel::Custom`] error.
    Custom,
    ScenarioMismatch,
    TypeMismatch,
    InvalidCall,
    Serialization,
}

impl Error {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::MalformedDeclaration(_) => ErrorKind::MalformedDeclaration,
            Self::DuplicateSchema(_) => ErrorKind::DuplicateSchema,
            Self::IncompatibleMigration(_) => ErrorKind::IncompatibleMigration,
            Self::ConnectionFailure(_) => ErrorKind::ConnectionFailure,
            Self::Sentinel(Sentinel::DuplicatedRow) => ErrorKind::DuplicatedRow,
            Self::Sentinel(Sentinel::NotFound) => ErrorKind::NotFound,
            Self::Sentinel(Sentinel::Custom(_)) => ErrorKind::Custom,
            Self::ScenarioMismatch { .. } => ErrorKind::ScenarioMismatch,
            Self::TypeMismatch(_) => ErrorKind::TypeMismatch,
            Self::InvalidCall(_) => ErrorKind::InvalidCall,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Returns the sentinel if this error is one.
    #[must_use]
    pub fn sentinel(&self) -> Option<Sentinel> {
        match self {
            Self::Sentinel(sentinel) => Some(sentinel.clone()),
            _ => None,
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedDeclaration(message.into())
    }

    pub(crate) fn invalid_call(message: impl Into<String>) -> Self {
        Self::InvalidCall(message.into())
    }
}

impl From<Sentinel> for Error {
    fn from(sentinel: Sentinel) -> Self {
        Self::Sentinel(sentinel)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Malformed(message) => Self::MalformedDeclaration(message),
            SchemaError::Incompatible(message) => Self::IncompatibleMigration(message),
            SchemaError::TypeMismatch(message) => Self::TypeMismatch(message),
        }
    }
}

/// Result type for ydb operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_mapping() {
        let err: Error = SchemaError::Malformed("x".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::MalformedDeclaration);
        let err: Error = SchemaError::Incompatible("x".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::IncompatibleMigration);
        let err: Error = SchemaError::TypeMismatch("x".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_sentinel_identity() {
        let err = Error::from(Sentinel::DuplicatedRow);
        assert_eq!(err.sentinel(), Some(Sentinel::DuplicatedRow));
        assert_eq!(err.kind(), ErrorKind::DuplicatedRow);
        assert_eq!(err.to_string(), "duplicated row");
        assert_eq!(Error::configuration("x").sentinel(), None);
    }

    #[test]
    fn test_custom_sentinel_identity() {
        let err = Error::from(Sentinel::custom("no email and telephone"));
        assert_eq!(err.kind(), ErrorKind::Custom);
        assert_eq!(err.sentinel(), Some(Sentinel::custom("no email and telephone")));
        assert_ne!(err.sentinel(), Some(Sentinel::custom("no email")));
        assert_eq!(err.to_string(), "no email and telephone");
    }
}
