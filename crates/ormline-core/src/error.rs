//! Error types for Ormline operations.
//!
//! Errors accumulate on a statement while its callback chain runs. Later
//! failures never replace earlier ones: [`Error::chain`] appends them so the
//! first root cause stays first.

use std::fmt;
use std::sync::Arc;

/// Shared, cloneable error source.
pub type ErrorSource = Arc<dyn std::error::Error + Send + Sync>;

/// The primary error type for all Ormline operations.
#[derive(Debug, Clone)]
pub enum Error {
    /// Connection-related errors reported by the executor
    Connection(ConnectionError),
    /// Query execution errors
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction errors
    Transaction(TransactionError),
    /// Model description and schema resolution errors
    Schema(SchemaError),
    /// Relationship lookups, joins and association misuse
    Relation(RelationError),
    /// Configuration errors
    Config(ConfigError),
    /// A single row was required but none matched
    RecordNotFound,
    /// UPDATE or DELETE without any condition
    MissingWhereClause,
    /// Operation timed out
    Timeout,
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
    /// Several errors recorded by one operation, root cause first
    Multiple(Vec<Error>),
}

#[derive(Debug, Clone)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<ErrorSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection lost during operation
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<ErrorSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Deadlock detected
    Deadlock,
    /// Serialization failure (retry may succeed)
    Serialization,
    /// Other database error
    Database,
}

#[derive(Debug, Clone)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// Begin failed
    Begin,
    /// Commit failed
    Commit,
    /// Rollback failed
    Rollback,
    /// Commit or rollback requested outside a transaction
    NotInTransaction,
    /// Savepoints are not available on this executor
    SavepointUnsupported,
}

#[derive(Debug, Clone)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub model: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Model description is invalid (duplicate fields, no fields)
    Invalid,
    /// A relationship key refers to a field that does not exist
    MissingField,
    /// A many-to-many join table mapping is malformed
    InvalidJoinTable,
    /// The statement has neither a model nor a table
    MissingTable,
}

#[derive(Debug, Clone)]
pub struct RelationError {
    pub kind: RelationErrorKind,
    pub relation: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationErrorKind {
    /// A preload path segment names no declared relationship
    NotFound,
    /// The relationship kind cannot be used this way (e.g. joining many-to-many)
    UnsupportedJoin,
    /// Two joins produce the same table or column alias
    AliasCollision,
    /// A record carries related data under a name the model never declared
    Undeclared,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<ErrorSource>,
}

impl Error {
    /// Append `next` after `self`, keeping `self` as the root cause.
    pub fn chain(self, next: Error) -> Error {
        let mut errors = match self {
            Error::Multiple(errors) => errors,
            other => vec![other],
        };
        match next {
            Error::Multiple(more) => errors.extend(more),
            other => errors.push(other),
        }
        Error::Multiple(errors)
    }

    /// The first error recorded.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Multiple(errors) => errors.first().map_or(self, Error::root_cause),
            other => other,
        }
    }

    /// Iterate the flattened chain, root cause first.
    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        let slice: &[Error] = match self {
            Error::Multiple(errors) => errors,
            other => std::slice::from_ref(other),
        };
        slice.iter()
    }

    /// Did any error in the chain report a missing record?
    pub fn is_record_not_found(&self) -> bool {
        self.iter().any(|e| matches!(e, Error::RecordNotFound))
    }

    /// Did any error in the chain report an unknown relation?
    pub fn is_relation_not_found(&self) -> bool {
        self.iter().any(|e| {
            matches!(
                e,
                Error::Relation(RelationError {
                    kind: RelationErrorKind::NotFound,
                    ..
                })
            )
        })
    }

    /// Shorthand for a relation-not-found error on `path`.
    pub fn relation_not_found(path: impl Into<String>) -> Error {
        let relation = path.into();
        Error::Relation(RelationError {
            kind: RelationErrorKind::NotFound,
            message: format!("{relation}: unsupported relation"),
            relation,
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Schema(e) => write!(f, "Schema error in {}: {}", e.model, e.message),
            Error::Relation(e) => write!(f, "{}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::RecordNotFound => write!(f, "record not found"),
            Error::MissingWhereClause => write!(f, "WHERE conditions required"),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
            Error::Multiple(errors) => {
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let source = match self {
            Error::Connection(e) => e.source.as_ref(),
            Error::Query(e) => e.source.as_ref(),
            Error::Config(e) => e.source.as_ref(),
            Error::Multiple(errors) => {
                return errors
                    .first()
                    .map(|err| err as &(dyn std::error::Error + 'static));
            }
            _ => None,
        };
        source.map(|err| err.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "column '{}': expected {}, found {}",
                col, self.expected, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<RelationError> for Error {
    fn from(err: RelationError) -> Self {
        Error::Relation(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for Ormline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn query_error(message: &str) -> Error {
        Error::Query(QueryError {
            kind: QueryErrorKind::Database,
            sql: None,
            sqlstate: None,
            message: message.to_string(),
            source: None,
        })
    }

    #[test]
    fn chain_keeps_root_cause_first() {
        let err = query_error("boom")
            .chain(Error::Custom("rollback failed".into()))
            .chain(Error::RecordNotFound);

        assert!(matches!(err.root_cause(), Error::Query(q) if q.message == "boom"));
        assert_eq!(err.iter().count(), 3);
        assert_eq!(
            err.to_string(),
            "Query error: boom; rollback failed; record not found"
        );
    }

    #[test]
    fn chain_flattens_nested_chains() {
        let left = Error::Custom("a".into()).chain(Error::Custom("b".into()));
        let right = Error::Custom("c".into()).chain(Error::Custom("d".into()));
        let joined = left.chain(right);
        assert_eq!(joined.iter().count(), 4);
        assert_eq!(joined.to_string(), "a; b; c; d");
    }

    #[test]
    fn predicates_search_the_whole_chain() {
        let err = query_error("boom").chain(Error::relation_not_found("Pets.Toys"));
        assert!(err.is_relation_not_found());
        assert!(!err.is_record_not_found());
        assert_eq!(
            err.iter().nth(1).map(ToString::to_string).as_deref(),
            Some("Pets.Toys: unsupported relation")
        );
    }

    #[test]
    fn display_includes_sqlstate() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Constraint,
            sql: Some("INSERT INTO users (id) VALUES ($1)".into()),
            sqlstate: Some("23505".into()),
            message: "duplicate key".into(),
            source: None,
        });
        assert_eq!(err.to_string(), "Query error (SQLSTATE 23505): duplicate key");
        assert!(std::error::Error::source(&err.chain(Error::Timeout)).is_some());
    }
}
