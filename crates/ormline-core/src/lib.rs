//! Core types and traits for Ormline.
//!
//! This crate provides the foundations the statement engine is built on:
//!
//! - `Value`, `Row` and `Record` for data moving in and out of the database
//! - `FieldInfo` for static field descriptions
//! - `Executor`, the capability a database driver provides
//! - `Error`, with root-cause-preserving chaining
//! - `Outcome` and `Cx` re-exported from asupersync for cancellation

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod error;
pub mod field;
pub mod prepared;
pub mod record;
pub mod row;
pub mod value;

pub use connection::{ExecResult, Executor, PreparedStatement, outcome_to_result};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind,
    RelationError, RelationErrorKind, Result, SchemaError, SchemaErrorKind, TransactionError,
    TransactionErrorKind, TypeError,
};
pub use field::FieldInfo;
pub use prepared::PreparedStmtExecutor;
pub use record::{Record, Related};
pub use row::Row;
pub use value::{FromValue, Value, ValueKey};
