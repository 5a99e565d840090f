//! Prepared-statement caching executor.

use crate::connection::{ExecResult, Executor, PreparedStatement};
use crate::error::Error;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type StatementMap = Arc<Mutex<HashMap<String, PreparedStatement>>>;

/// Wraps an executor so every statement is prepared once and reused by SQL text.
///
/// Transactions begun through the wrapper are wrapped again and share the
/// same statement map.
pub struct PreparedStmtExecutor {
    inner: Arc<dyn Executor>,
    statements: StatementMap,
}

impl PreparedStmtExecutor {
    pub fn new(inner: Arc<dyn Executor>) -> Self {
        Self {
            inner,
            statements: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of distinct statements prepared so far.
    pub fn cached(&self) -> usize {
        self.statements.lock().map_or(0, |m| m.len())
    }

    fn prepared(&self, cx: &Cx, sql: &str) -> Outcome<PreparedStatement, Error> {
        if let Ok(map) = self.statements.lock() {
            if let Some(stmt) = map.get(sql) {
                tracing::trace!(sql = %sql, id = stmt.id(), "Prepared statement cache hit");
                return Outcome::Ok(stmt.clone());
            }
        }
        let stmt = match self.inner.prepare(cx, sql) {
            Outcome::Ok(stmt) => stmt,
            other => return other,
        };
        if let Ok(mut map) = self.statements.lock() {
            map.insert(sql.to_string(), stmt.clone());
        }
        tracing::debug!(
            sql = %sql,
            id = stmt.id(),
            params = stmt.param_count(),
            "Prepared statement"
        );
        Outcome::Ok(stmt)
    }
}

impl std::fmt::Debug for PreparedStmtExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStmtExecutor")
            .field("cached", &self.cached())
            .finish_non_exhaustive()
    }
}

impl Executor for PreparedStmtExecutor {
    fn query(&self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<Vec<Row>, Error> {
        match self.prepared(cx, sql) {
            Outcome::Ok(stmt) => self.inner.query_prepared(cx, &stmt, params),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    fn execute(&self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<ExecResult, Error> {
        match self.prepared(cx, sql) {
            Outcome::Ok(stmt) => self.inner.execute_prepared(cx, &stmt, params),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    fn begin(&self, cx: &Cx) -> Outcome<Arc<dyn Executor>, Error> {
        match self.inner.begin(cx) {
            Outcome::Ok(tx) => {
                let wrapped: Arc<dyn Executor> = Arc::new(PreparedStmtExecutor {
                    inner: tx,
                    statements: Arc::clone(&self.statements),
                });
                Outcome::Ok(wrapped)
            }
            other => other,
        }
    }

    fn commit(&self, cx: &Cx) -> Outcome<(), Error> {
        self.inner.commit(cx)
    }

    fn rollback(&self, cx: &Cx) -> Outcome<(), Error> {
        self.inner.rollback(cx)
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn savepoint(&self, cx: &Cx, name: &str) -> Outcome<(), Error> {
        self.inner.savepoint(cx, name)
    }

    fn rollback_to(&self, cx: &Cx, name: &str) -> Outcome<(), Error> {
        self.inner.rollback_to(cx, name)
    }
}
