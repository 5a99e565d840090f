//! The executor capability.
//!
//! This module defines everything the engine needs from a database driver:
//!
//! - [`Executor`] - runs SQL and manages transactions
//! - [`ExecResult`] - what a non-query statement reports back
//! - [`PreparedStatement`] - a pre-compiled statement handle
//!
//! All operations take a `Cx` so cancellation and timeouts reach the driver.
//! The engine never enforces them itself.

use crate::error::{Error, Result, TransactionError, TransactionErrorKind};
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::sync::Arc;

/// Result of executing an INSERT, UPDATE, DELETE or DDL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Database-assigned id of the inserted row, when the driver reports one
    pub last_insert_id: Option<i64>,
}

impl ExecResult {
    pub const fn new(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            last_insert_id: None,
        }
    }

    pub const fn with_last_insert_id(mut self, id: i64) -> Self {
        self.last_insert_id = Some(id);
        self
    }
}

/// A prepared statement for repeated execution.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    /// Unique identifier for this prepared statement (driver-specific)
    id: u64,
    /// The original SQL text
    sql: String,
    /// Number of expected parameters
    param_count: usize,
}

impl PreparedStatement {
    /// Create a new prepared statement.
    ///
    /// This is typically called by the driver, not by users directly.
    #[must_use]
    pub fn new(id: u64, sql: String, param_count: usize) -> Self {
        Self {
            id,
            sql,
            param_count,
        }
    }

    /// Get the statement ID.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Get the original SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get the expected number of parameters.
    #[must_use]
    pub const fn param_count(&self) -> usize {
        self.param_count
    }
}

/// Something that can run SQL.
///
/// The trait is object safe: the engine holds executors as
/// `Arc<dyn Executor>` and swaps in the transaction-bound executor returned
/// by [`begin`](Executor::begin) for the rest of a transactional operation.
///
/// # Example
///
/// ```rust,ignore
/// let sql = "SELECT * FROM users WHERE id = $1";
/// let rows = outcome_to_result(conn.query(&cx, sql, &[Value::BigInt(1)]))?;
///
/// let tx = outcome_to_result(conn.begin(&cx))?;
/// let sql = "INSERT INTO logs (msg) VALUES ($1)";
/// outcome_to_result(tx.execute(&cx, sql, &[Value::from("action")]))?;
/// outcome_to_result(tx.commit(&cx))?;
/// ```
pub trait Executor: Send + Sync {
    /// Execute a query and return all rows.
    fn query(&self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<Vec<Row>, Error>;

    /// Execute a statement (INSERT, UPDATE, DELETE) and report what it did.
    fn execute(&self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<ExecResult, Error>;

    /// Begin a transaction, returning an executor bound to it.
    fn begin(&self, cx: &Cx) -> Outcome<Arc<dyn Executor>, Error>;

    /// Commit the transaction this executor is bound to.
    fn commit(&self, cx: &Cx) -> Outcome<(), Error>;

    /// Roll back the transaction this executor is bound to.
    fn rollback(&self, cx: &Cx) -> Outcome<(), Error>;

    /// Whether this executor is bound to an open transaction.
    fn in_transaction(&self) -> bool {
        false
    }

    /// Create a savepoint inside the current transaction.
    fn savepoint(&self, cx: &Cx, name: &str) -> Outcome<(), Error> {
        if !self.in_transaction() {
            return Outcome::Err(not_in_transaction("savepoint"));
        }
        match self.execute(cx, &format!("SAVEPOINT {name}"), &[]) {
            Outcome::Ok(_) => Outcome::Ok(()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Roll back to a savepoint created with [`savepoint`](Executor::savepoint).
    fn rollback_to(&self, cx: &Cx, name: &str) -> Outcome<(), Error> {
        if !self.in_transaction() {
            return Outcome::Err(not_in_transaction("rollback to savepoint"));
        }
        match self.execute(cx, &format!("ROLLBACK TO SAVEPOINT {name}"), &[]) {
            Outcome::Ok(_) => Outcome::Ok(()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Prepare a statement. Drivers without server-side preparation can rely
    /// on the default, which only records the SQL text.
    fn prepare(&self, _cx: &Cx, sql: &str) -> Outcome<PreparedStatement, Error> {
        Outcome::Ok(PreparedStatement::new(0, sql.to_string(), count_placeholders(sql)))
    }

    /// Execute a prepared query.
    fn query_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> Outcome<Vec<Row>, Error> {
        self.query(cx, stmt.sql(), params)
    }

    /// Execute a prepared statement.
    fn execute_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> Outcome<ExecResult, Error> {
        self.execute(cx, stmt.sql(), params)
    }
}

fn not_in_transaction(op: &str) -> Error {
    Error::Transaction(TransactionError {
        kind: TransactionErrorKind::NotInTransaction,
        message: format!("{op} requires an open transaction"),
    })
}

/// Count `$n`, `?n` and `?` placeholders outside of string literals.
fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    let mut highest = 0;
    let mut in_string = false;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => in_string = !in_string,
            '$' | '?' if !in_string => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    digits.push(d);
                    chars.next();
                }
                match digits.parse::<usize>() {
                    Ok(n) => highest = highest.max(n),
                    Err(_) if c == '?' => count += 1,
                    Err(_) => {}
                }
            }
            _ => {}
        }
    }
    count.max(highest)
}

/// Convert an executor outcome into the engine's `Result`.
pub fn outcome_to_result<T>(outcome: Outcome<T, Error>) -> Result<T> {
    match outcome {
        Outcome::Ok(v) => Ok(v),
        Outcome::Err(e) => Err(e),
        Outcome::Cancelled(_) => Err(Error::Cancelled),
        Outcome::Panicked(p) => Err(Error::Custom(format!("executor panicked: {p:?}"))),
    }
}
