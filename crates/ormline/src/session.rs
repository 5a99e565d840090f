//! Sessions and transactions.
//!
//! A session is a handle with adjusted configuration. Transactions are
//! handles whose statements run on a transaction-bound connection; nested
//! [`Db::transaction`] calls on such a handle use savepoints.

use crate::config::{LogLevel, LoggerConfig, NowFunc};
use crate::db::{CloneMode, Db};
use crate::statement::Statement;
use ormline_core::{
    Cx, Error, Executor, PreparedStmtExecutor, Result, TransactionError, TransactionErrorKind,
    outcome_to_result,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Changes a [`Db::session`] applies. Unset options keep the current value.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub dry_run: bool,
    pub prepare_stmt: bool,
    /// Keep this handle's accumulated conditions in every derived handle
    pub with_conditions: bool,
    pub skip_default_transaction: bool,
    pub allow_global_update: bool,
    pub logger: Option<LoggerConfig>,
    /// Clock for automatic creation and update times
    pub now_func: Option<NowFunc>,
}

static SAVEPOINTS: AtomicU64 = AtomicU64::new(0);

fn not_in_transaction(op: &str) -> Error {
    Error::Transaction(TransactionError {
        kind: TransactionErrorKind::NotInTransaction,
        message: format!("{op} requires a transaction handle"),
    })
}

impl Db {
    pub fn session(&self, options: SessionOptions) -> Db {
        let mut config = self.config.clone();
        if options.dry_run {
            config.dry_run = true;
        }
        if options.prepare_stmt {
            config.prepare_stmt = true;
        }
        if options.skip_default_transaction {
            config.skip_default_transaction = true;
        }
        if options.allow_global_update {
            config.allow_global_update = true;
        }
        if let Some(logger) = options.logger {
            config.logger = logger;
        }
        if let Some(now_func) = options.now_func {
            config.now_func = now_func;
        }

        let (mut statement, mode) = if options.with_conditions {
            (Arc::clone(&self.statement), CloneMode::CloneStatement)
        } else {
            (
                Arc::new(Statement::new(Arc::clone(&self.statement.conn))),
                CloneMode::FreshStatement,
            )
        };
        if options.prepare_stmt {
            let stmt = Arc::make_mut(&mut statement);
            let prepared: Arc<dyn Executor> =
                Arc::new(PreparedStmtExecutor::new(Arc::clone(&stmt.conn)));
            stmt.conn = prepared;
        }
        tracing::trace!(mode = ?mode, dry_run = config.dry_run, "New session");
        Db {
            shared: Arc::clone(&self.shared),
            config,
            statement,
            mode,
        }
    }

    /// A session keeping conditions that logs every statement.
    pub fn debug(&self) -> Db {
        self.session(SessionOptions {
            with_conditions: true,
            logger: Some(LoggerConfig {
                level: LogLevel::Info,
                ..self.config.logger.clone()
            }),
            ..SessionOptions::default()
        })
    }

    /// Begin a transaction. The returned handle runs every statement inside
    /// it until [`commit`](Db::commit) or [`rollback`](Db::rollback).
    pub fn begin(&self, cx: &Cx) -> Result<Db> {
        let tx = outcome_to_result(self.statement.conn.begin(cx))?;
        tracing::debug!("Began transaction");
        let (statement, mode) = match self.mode {
            CloneMode::FreshStatement => (Statement::new(tx), CloneMode::FreshStatement),
            CloneMode::CloneStatement | CloneMode::NoClone => {
                let mut statement = self.statement.derive();
                statement.conn = tx;
                (statement, CloneMode::CloneStatement)
            }
        };
        Ok(Db {
            shared: Arc::clone(&self.shared),
            config: self.config.clone(),
            statement: Arc::new(statement),
            mode,
        })
    }

    pub fn commit(&self, cx: &Cx) -> Result<()> {
        let conn = &self.statement.conn;
        if !conn.in_transaction() {
            return Err(not_in_transaction("commit"));
        }
        tracing::debug!("Committing transaction");
        outcome_to_result(conn.commit(cx))
    }

    pub fn rollback(&self, cx: &Cx) -> Result<()> {
        let conn = &self.statement.conn;
        if !conn.in_transaction() {
            return Err(not_in_transaction("rollback"));
        }
        tracing::debug!("Rolling back transaction");
        outcome_to_result(conn.rollback(cx))
    }

    pub fn savepoint(&self, cx: &Cx, name: &str) -> Result<()> {
        outcome_to_result(self.statement.conn.savepoint(cx, name))
    }

    pub fn rollback_to(&self, cx: &Cx, name: &str) -> Result<()> {
        outcome_to_result(self.statement.conn.rollback_to(cx, name))
    }

    /// Run `f` in a transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// On a handle that is already inside a transaction, `f` runs under a
    /// savepoint instead and an error rolls back to it.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn transaction<T, F>(&self, cx: &Cx, f: F) -> Result<T>
    where
        F: FnOnce(&Db) -> Result<T>,
    {
        if self.statement.conn.in_transaction() {
            let name = format!("sp{}", SAVEPOINTS.fetch_add(1, Ordering::Relaxed));
            self.savepoint(cx, &name)?;
            tracing::debug!(savepoint = %name, "Nested transaction");
            return match f(self) {
                Ok(value) => Ok(value),
                Err(e) => match self.rollback_to(cx, &name) {
                    Ok(()) => Err(e),
                    Err(rollback) => Err(e.chain(rollback)),
                },
            };
        }

        let tx = self.begin(cx)?;
        match f(&tx) {
            Ok(value) => {
                tx.commit(cx)?;
                Ok(value)
            }
            Err(e) => match tx.rollback(cx) {
                Ok(()) => Err(e),
                Err(rollback) => Err(e.chain(rollback)),
            },
        }
    }
}
