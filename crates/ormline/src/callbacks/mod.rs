//! The callback pipeline.
//!
//! Every operation runs as an ordered list of named steps against one
//! [`Statement`]. Steps communicate only through the statement: they add
//! clauses, set SQL, fill the destination, or record an error. Once an error
//! is recorded the remaining steps are skipped, except steps registered with
//! [`StepBuilder::always`] (the commit-or-rollback step is one).
//!
//! The default chains are built by [`Callbacks::default`]; a
//! [`DbBuilder`](crate::DbBuilder) lets callers adjust them before the handle
//! is built, after which they never change.

mod associations;
mod create;
mod delete;
mod hooks;
mod query;
mod raw;
mod transaction;
mod update;

use crate::config::Config;
use crate::db::{Db, Shared};
use crate::logger::SqlLogger;
use crate::schema::{Schema, SchemaRef};
use crate::statement::Statement;
use ormline_core::{Cx, Error, ExecResult, Result, Row, outcome_to_result};
use ormline_query::Dialect;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

pub use associations::{save_after_associations, save_before_associations};
pub use create::create;
pub use delete::delete;
pub use hooks::{
    after_create, after_delete, after_query, after_update, before_create, before_delete,
    before_update,
};
pub use query::{preload, query, row};
pub use raw::raw;
pub use transaction::{begin_transaction, commit_or_rollback_transaction};
pub use update::update;

/// A step body.
pub type Handler = Arc<dyn Fn(&mut Scope<'_>) + Send + Sync>;

/// Decides whether a step runs for the current statement.
pub type Predicate = Arc<dyn Fn(&Scope<'_>) -> bool + Send + Sync>;

/// What a step sees while it runs.
pub struct Scope<'a> {
    pub cx: &'a Cx,
    pub config: &'a Config,
    pub statement: &'a mut Statement,
    shared: &'a Arc<Shared>,
}

impl Scope<'_> {
    pub fn dialect(&self) -> Dialect {
        self.shared.dialect
    }

    /// A handle for nested operations (hooks, preloads, association saves).
    ///
    /// It starts from an empty statement on this statement's connection, so
    /// nested writes join a transaction this operation has open.
    pub fn handle(&self) -> Db {
        Db::from_parts(
            Arc::clone(self.shared),
            self.config.clone(),
            Statement::new(Arc::clone(&self.statement.conn)),
        )
    }

    /// Parse a related model through the shared schema cache.
    pub fn schema_of(&self, model: &SchemaRef) -> Result<Arc<Schema>> {
        self.shared.cache.parse(model, self.shared.naming.as_ref())
    }

    pub fn add_error(&mut self, err: Error) {
        self.statement.add_error(err);
    }

    /// Run the statement's SQL as a query.
    pub(crate) fn query_rows(&self) -> Result<Vec<Row>> {
        tracing::trace!(sql = %self.statement.sql, vars = self.statement.vars.len(), "query");
        outcome_to_result(self.statement.conn.query(
            self.cx,
            &self.statement.sql,
            &self.statement.vars,
        ))
    }

    /// Run the statement's SQL as a command.
    pub(crate) fn exec(&self) -> Result<ExecResult> {
        tracing::trace!(sql = %self.statement.sql, vars = self.statement.vars.len(), "execute");
        outcome_to_result(self.statement.conn.execute(
            self.cx,
            &self.statement.sql,
            &self.statement.vars,
        ))
    }
}

/// One named unit of a processor.
#[derive(Clone)]
pub struct Step {
    name: String,
    handler: Handler,
    predicate: Option<Predicate>,
    always_run: bool,
}

impl Step {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn always_run(&self) -> bool {
        self.always_run
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("conditional", &self.predicate.is_some())
            .field("always_run", &self.always_run)
            .finish()
    }
}

/// The ordered steps of one operation kind.
#[derive(Debug, Clone)]
pub struct Processor {
    kind: &'static str,
    steps: Vec<Step>,
}

impl Processor {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            steps: Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Append a step.
    pub fn register<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&mut Scope<'_>) + Send + Sync + 'static,
    {
        self.builder().register(name, f);
        self
    }

    /// Start a registration that lands before `name`.
    pub fn before(&mut self, name: &str) -> StepBuilder<'_> {
        self.builder().before(name)
    }

    /// Start a registration that lands after `name`.
    pub fn after(&mut self, name: &str) -> StepBuilder<'_> {
        self.builder().after(name)
    }

    /// Start a registration whose step runs only when `predicate` holds.
    pub fn when<P>(&mut self, predicate: P) -> StepBuilder<'_>
    where
        P: Fn(&Scope<'_>) -> bool + Send + Sync + 'static,
    {
        self.builder().when(predicate)
    }

    /// Start a registration whose step runs even after an error.
    pub fn always(&mut self) -> StepBuilder<'_> {
        self.builder().always()
    }

    /// Swap the handler of an existing step, keeping its position and
    /// predicate. Returns false when no step has that name.
    pub fn replace<F>(&mut self, name: &str, f: F) -> bool
    where
        F: Fn(&mut Scope<'_>) + Send + Sync + 'static,
    {
        match self.steps.iter_mut().find(|s| s.name == name) {
            Some(step) => {
                step.handler = Arc::new(f);
                tracing::debug!(processor = self.kind, step = name, "Replaced callback");
                true
            }
            None => {
                tracing::warn!(processor = self.kind, step = name, "No callback to replace");
                false
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.steps.len();
        self.steps.retain(|s| s.name != name);
        before != self.steps.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    fn builder(&mut self) -> StepBuilder<'_> {
        StepBuilder {
            processor: self,
            before: None,
            after: None,
            predicate: None,
            always_run: false,
        }
    }

    fn insert(&mut self, step: Step, before: Option<&str>, after: Option<&str>) {
        if let Some(existing) = self.steps.iter_mut().find(|s| s.name == step.name) {
            tracing::warn!(
                processor = self.kind,
                step = %step.name,
                "Callback already registered, replacing"
            );
            *existing = step;
            return;
        }

        let position = |target: &str| self.steps.iter().position(|s| s.name == target);
        let index = match (before, after) {
            (Some(target), _) => position(target),
            (None, Some(target)) => position(target).map(|i| i + 1),
            (None, None) => Some(self.steps.len()),
        };
        let index = index.unwrap_or_else(|| {
            tracing::warn!(
                processor = self.kind,
                step = %step.name,
                before = ?before,
                after = ?after,
                "Callback anchor not found, appending"
            );
            self.steps.len()
        });
        tracing::debug!(processor = self.kind, step = %step.name, index, "Registered callback");
        self.steps.insert(index, step);
    }

    /// Run every step against `db`'s statement.
    pub fn execute(&self, cx: &Cx, db: &mut Db) {
        let started = Instant::now();
        let shared = Arc::clone(&db.shared);
        let config = &db.config;
        let statement = Arc::make_mut(&mut db.statement);

        if statement.schema.is_none() {
            if let Some(model) = statement.model {
                match shared.cache.parse(&model, shared.naming.as_ref()) {
                    Ok(schema) => {
                        if statement.table.is_empty() {
                            statement.table = schema.table.clone();
                        }
                        statement.schema = Some(schema);
                    }
                    Err(e) => statement.add_error(e),
                }
            }
        }

        let mut scope = Scope {
            cx,
            config,
            statement,
            shared: &shared,
        };
        for step in &self.steps {
            if scope.statement.has_error() && !step.always_run {
                continue;
            }
            if let Some(predicate) = &step.predicate {
                if !predicate(&scope) {
                    continue;
                }
            }
            tracing::trace!(processor = self.kind, step = %step.name, "Running callback");
            (step.handler)(&mut scope);
        }

        let statement = &*scope.statement;
        SqlLogger::new(&config.logger).trace(
            started.elapsed(),
            &statement.sql,
            &statement.vars,
            statement.rows_affected,
            statement.error.as_ref(),
        );
    }
}

/// Positions and conditions for a step about to be registered.
pub struct StepBuilder<'p> {
    processor: &'p mut Processor,
    before: Option<String>,
    after: Option<String>,
    predicate: Option<Predicate>,
    always_run: bool,
}

impl<'p> StepBuilder<'p> {
    #[must_use]
    pub fn before(mut self, name: &str) -> Self {
        self.before = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn after(mut self, name: &str) -> Self {
        self.after = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Scope<'_>) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn always(mut self) -> Self {
        self.always_run = true;
        self
    }

    pub fn register<F>(self, name: &str, f: F) -> &'p mut Processor
    where
        F: Fn(&mut Scope<'_>) + Send + Sync + 'static,
    {
        let step = Step {
            name: name.to_string(),
            handler: Arc::new(f),
            predicate: self.predicate,
            always_run: self.always_run,
        };
        self.processor
            .insert(step, self.before.as_deref(), self.after.as_deref());
        self.processor
    }
}

/// Which processor an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Create,
    Query,
    Update,
    Delete,
    Row,
    Raw,
}

/// One processor per operation kind.
#[derive(Debug, Clone)]
pub struct Callbacks {
    pub create: Processor,
    pub query: Processor,
    pub update: Processor,
    pub delete: Processor,
    pub row: Processor,
    pub raw: Processor,
}

/// Default transactions are on and the statement really runs.
fn transactional(scope: &Scope<'_>) -> bool {
    !scope.config.skip_default_transaction && !scope.config.dry_run
}

impl Callbacks {
    /// Processors with no steps.
    pub fn empty() -> Self {
        Self {
            create: Processor::new("create"),
            query: Processor::new("query"),
            update: Processor::new("update"),
            delete: Processor::new("delete"),
            row: Processor::new("row"),
            raw: Processor::new("raw"),
        }
    }

    pub(crate) fn processor(&self, operation: Operation) -> &Processor {
        match operation {
            Operation::Create => &self.create,
            Operation::Query => &self.query,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
            Operation::Row => &self.row,
            Operation::Raw => &self.raw,
        }
    }
}

impl Default for Callbacks {
    fn default() -> Self {
        let mut callbacks = Self::empty();

        callbacks
            .create
            .when(transactional)
            .register("ormline:begin_transaction", begin_transaction);
        callbacks
            .create
            .register("ormline:before_create", before_create)
            .register("ormline:save_before_associations", save_before_associations)
            .register("ormline:create", create)
            .register("ormline:save_after_associations", save_after_associations)
            .register("ormline:after_create", after_create);
        callbacks.create.when(transactional).always().register(
            "ormline:commit_or_rollback_transaction",
            commit_or_rollback_transaction,
        );

        callbacks
            .query
            .register("ormline:query", query)
            .register("ormline:preload", preload)
            .register("ormline:after_query", after_query);

        callbacks
            .update
            .when(transactional)
            .register("ormline:begin_transaction", begin_transaction);
        callbacks
            .update
            .register("ormline:before_update", before_update)
            .register("ormline:save_before_associations", save_before_associations)
            .register("ormline:update", update)
            .register("ormline:save_after_associations", save_after_associations)
            .register("ormline:after_update", after_update);
        callbacks.update.when(transactional).always().register(
            "ormline:commit_or_rollback_transaction",
            commit_or_rollback_transaction,
        );

        callbacks
            .delete
            .when(transactional)
            .register("ormline:begin_transaction", begin_transaction);
        callbacks
            .delete
            .register("ormline:before_delete", before_delete)
            .register("ormline:delete", delete)
            .register("ormline:after_delete", after_delete);
        callbacks.delete.when(transactional).always().register(
            "ormline:commit_or_rollback_transaction",
            commit_or_rollback_transaction,
        );

        callbacks.row.register("ormline:row", row);
        callbacks.raw.register("ormline:raw", raw);
        callbacks
    }
}
