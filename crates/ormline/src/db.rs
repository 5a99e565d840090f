//! The database handle.
//!
//! A [`Db`] is cheap to clone and never changes once built. Every builder
//! returns a new handle; the statement behind it is shared until someone
//! writes to it (`Arc::make_mut`), so a chain never leaks conditions back
//! into the handle it started from.

use crate::callbacks::{Callbacks, Operation};
use crate::composer::Composed;
use crate::condition::Condition;
use crate::config::Config;
use crate::plugin::{Plugin, Plugins};
use crate::schema::{
    JoinTable, Model, NamingStrategy, RelationshipKind, Schema, SchemaCache, SchemaRef,
    SnakeCaseNaming, schema_error,
};
use crate::statement::{Dest, Statement};
use ormline_core::{
    Cx, Error, Executor, PreparedStmtExecutor, Record, Result, SchemaErrorKind, Value,
};
use ormline_query::{
    Clause, Column, Dialect, Expr, GroupBy, Limit, OnConflict, OrderBy, Select, SqlWriter,
};
use regex::Regex;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// State every handle derived from one root shares.
pub(crate) struct Shared {
    pub(crate) callbacks: Callbacks,
    pub(crate) cache: SchemaCache,
    pub(crate) naming: Box<dyn NamingStrategy>,
    pub(crate) dialect: Dialect,
    pub(crate) plugins: Plugins,
}

/// What the next derived handle starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneMode {
    /// Share this handle's statement; copied on first write
    NoClone,
    /// Start from an empty statement on the same connection
    FreshStatement,
    /// Start from a copy of this handle's accumulated statement
    CloneStatement,
}

/// A database handle.
#[derive(Clone)]
pub struct Db {
    pub(crate) shared: Arc<Shared>,
    pub(crate) config: Config,
    pub(crate) statement: Arc<Statement>,
    pub(crate) mode: CloneMode,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("dialect", &self.shared.dialect)
            .field("mode", &self.mode)
            .field("config", &self.config)
            .field("statement", &self.statement)
            .finish_non_exhaustive()
    }
}

/// Builder for a root [`Db`].
pub struct DbBuilder {
    conn: Arc<dyn Executor>,
    dialect: Dialect,
    config: Config,
    naming: Box<dyn NamingStrategy>,
    callbacks: Callbacks,
    plugins: Plugins,
}

impl DbBuilder {
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn naming(mut self, naming: impl NamingStrategy + 'static) -> Self {
        self.naming = Box::new(naming);
        self
    }

    /// Adjust the callback chains. They are fixed once the handle is built.
    pub fn callbacks(mut self, f: impl FnOnce(&mut Callbacks)) -> Self {
        f(&mut self.callbacks);
        self
    }

    /// Register a plugin and let it adjust the callback chains. Fails when
    /// the name is taken or the plugin cannot initialize.
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Result<Self> {
        self.plugins.register(Arc::new(plugin), &mut self.callbacks)?;
        Ok(self)
    }

    pub fn build(self) -> Db {
        let conn: Arc<dyn Executor> = if self.config.prepare_stmt {
            Arc::new(PreparedStmtExecutor::new(self.conn))
        } else {
            self.conn
        };
        tracing::debug!(
            dialect = ?self.dialect,
            prepare_stmt = self.config.prepare_stmt,
            skip_default_transaction = self.config.skip_default_transaction,
            "Opened database handle"
        );
        let shared = Shared {
            callbacks: self.callbacks,
            cache: SchemaCache::new(),
            naming: self.naming,
            dialect: self.dialect,
            plugins: self.plugins,
        };
        Db::from_parts(Arc::new(shared), self.config, Statement::new(conn))
    }
}

/// A single field or column name, optionally `Table.name`.
static PLAIN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("valid name pattern")
});

fn plain_name(name: &str) -> bool {
    PLAIN_NAME.is_match(name)
}

/// Split `"a, b, c"` into names; `None` when any part is an expression.
fn plain_names(list: &str) -> Option<Vec<String>> {
    let names: Vec<String> = list.split(',').map(|s| s.trim().to_string()).collect();
    names.iter().all(|n| plain_name(n)).then_some(names)
}

fn named_column(name: &str) -> Column {
    match name.split_once('.') {
        Some((table, name)) => Column::qualified(table, name),
        None => Column::current(name),
    }
}

impl Db {
    pub fn builder(conn: Arc<dyn Executor>) -> DbBuilder {
        DbBuilder {
            conn,
            dialect: Dialect::default(),
            config: Config::default(),
            naming: Box::new(SnakeCaseNaming::default()),
            callbacks: Callbacks::default(),
            plugins: Plugins::default(),
        }
    }

    /// A root handle with the default configuration and callbacks.
    pub fn new(conn: Arc<dyn Executor>, dialect: Dialect) -> Self {
        Self::builder(conn).dialect(dialect).build()
    }

    pub(crate) fn from_parts(shared: Arc<Shared>, config: Config, statement: Statement) -> Self {
        Self {
            shared,
            config,
            statement: Arc::new(statement),
            mode: CloneMode::FreshStatement,
        }
    }

    /// The handle the next builder or terminal works on.
    pub fn get_instance(&self) -> Db {
        let statement = match self.mode {
            CloneMode::FreshStatement => {
                Arc::new(Statement::new(Arc::clone(&self.statement.conn)))
            }
            CloneMode::CloneStatement => Arc::new(self.statement.derive()),
            CloneMode::NoClone => Arc::clone(&self.statement),
        };
        Db {
            shared: Arc::clone(&self.shared),
            config: self.config.clone(),
            statement,
            mode: CloneMode::NoClone,
        }
    }

    /// Write to this handle's own statement.
    pub(crate) fn edit(mut self, f: impl FnOnce(&mut Statement)) -> Db {
        f(Arc::make_mut(&mut self.statement));
        self
    }

    fn chain(&self, f: impl FnOnce(&mut Statement)) -> Db {
        self.get_instance().edit(f)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.shared.dialect
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn clone_mode(&self) -> CloneMode {
        self.mode
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.shared.callbacks
    }

    pub fn plugin(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.shared.plugins.get(name)
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.shared.plugins.names().collect()
    }

    /// The parsed schema of `M`.
    pub fn schema_of<M: Model>(&self) -> Result<Arc<Schema>> {
        self.schema(&SchemaRef::of::<M>())
    }

    pub(crate) fn schema(&self, model: &SchemaRef) -> Result<Arc<Schema>> {
        self.shared.cache.parse(model, self.shared.naming.as_ref())
    }

    /// Store `M`'s many-to-many `relation` in the table of the join model
    /// `J`. Every join column must be a column of `J`.
    pub fn setup_join_table<M: Model, J: Model>(&self, relation: &str) -> Result<()> {
        let owner = self.schema_of::<M>()?;
        let join = self.schema_of::<J>()?;
        let rel = owner
            .relationship(relation)
            .ok_or_else(|| Error::relation_not_found(relation))?;
        let current = match (rel.kind, &rel.join_table) {
            (RelationshipKind::ManyToMany, Some(current)) => current,
            _ => {
                return Err(schema_error(
                    SchemaErrorKind::InvalidJoinTable,
                    &owner.name,
                    format!("{relation}: not a many-to-many relationship"),
                ));
            }
        };
        if let Some(missing) = current
            .owner_keys
            .iter()
            .chain(&current.target_keys)
            .find(|key| join.field_by_column(&key.column).is_none())
        {
            return Err(schema_error(
                SchemaErrorKind::MissingField,
                &join.name,
                format!("missing field {} for join table", missing.column),
            ));
        }

        let table = JoinTable {
            table: join.table.clone(),
            ..current.clone()
        };
        let mut updated = (*owner).clone();
        if let Some(rel) = updated.relationships.iter_mut().find(|r| r.name == relation) {
            rel.join_table = Some(table);
        }
        tracing::debug!(model = %owner.name, relation, table = %join.table, "Set up join table");
        self.shared.cache.replace(updated);
        Ok(())
    }

    // Builders

    pub fn model<M: Model>(&self) -> Db {
        self.model_ref(SchemaRef::of::<M>())
    }

    pub(crate) fn model_ref(&self, model: SchemaRef) -> Db {
        self.chain(|s| {
            if s.model == Some(model) {
                return;
            }
            if s.schema.as_ref().is_some_and(|schema| schema.table == s.table) {
                s.table.clear();
            }
            s.model = Some(model);
            s.schema = None;
        })
    }

    pub fn table(&self, name: &str) -> Db {
        self.chain(|s| s.table = name.to_string())
    }

    /// Leave out the models' default query conditions.
    pub fn unscoped(&self) -> Db {
        self.chain(|s| s.unscoped = true)
    }

    pub fn filter(&self, condition: Condition) -> Db {
        self.chain(|s| s.add_conditions(vec![condition]))
    }

    pub fn not(&self, condition: Condition) -> Db {
        self.filter(condition.not())
    }

    /// Restrict the selected fields: `"Name, Age"`. Anything that is not a
    /// plain list of names is used as a raw select expression.
    pub fn select(&self, columns: &str) -> Db {
        match plain_names(columns) {
            Some(names) => self.chain(|s| s.selects = names),
            None => self.chain(|s| {
                s.selects.clear();
                s.add_clause(Select {
                    expression: Some(Expr::raw(columns, Vec::new())),
                    ..Select::default()
                });
            }),
        }
    }

    /// Leave fields (or associations, when saving) out: `"Password, Token"`.
    pub fn omit(&self, columns: &str) -> Db {
        self.chain(|s| {
            s.omits.extend(
                columns
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
            );
        })
    }

    pub fn distinct(&self) -> Db {
        self.chain(|s| s.distinct = true)
    }

    /// Join a declared relationship by name, or raw join SQL with `?` args.
    pub fn joins(&self, name: &str, args: Vec<Value>) -> Db {
        self.chain(|s| s.add_join(name.to_string(), args))
    }

    /// Eager-load a relationship path such as `"Pets.Toys"`, or
    /// [`ASSOCIATIONS`](crate::preload::ASSOCIATIONS) for every direct one.
    pub fn preload(&self, path: &str, conditions: Vec<Condition>) -> Db {
        self.chain(|s| {
            s.preloads.insert(path.to_string(), conditions);
        })
    }

    /// `"Name"`, `"Name desc"`, or any raw ordering expression.
    pub fn order(&self, expr: &str) -> Db {
        let expr = expr.trim();
        let parts: Vec<&str> = expr.split_whitespace().collect();
        let clause = match parts.as_slice() {
            [name] if plain_name(name) => OrderBy::asc(named_column(name)),
            [name, dir] if plain_name(name) && dir.eq_ignore_ascii_case("asc") => {
                OrderBy::asc(named_column(name))
            }
            [name, dir] if plain_name(name) && dir.eq_ignore_ascii_case("desc") => {
                OrderBy::desc(named_column(name))
            }
            _ => OrderBy::raw(Expr::raw(expr, Vec::new())),
        };
        self.chain(|s| s.add_clause(clause))
    }

    pub fn group(&self, name: &str) -> Db {
        self.chain(|s| {
            s.add_clause(GroupBy {
                columns: vec![named_column(name.trim())],
                having: Vec::new(),
            });
        })
    }

    pub fn having(&self, condition: Condition) -> Db {
        self.chain(|s| {
            s.add_clause(GroupBy {
                columns: Vec::new(),
                having: vec![condition.into_expr()],
            });
        })
    }

    pub fn limit(&self, limit: u64) -> Db {
        self.chain(|s| {
            s.add_clause(Limit {
                limit: Some(limit),
                offset: None,
            });
        })
    }

    pub fn offset(&self, offset: u64) -> Db {
        self.chain(|s| {
            s.add_clause(Limit {
                limit: None,
                offset: Some(offset),
            });
        })
    }

    /// Add clauses directly, e.g. locking or upsert.
    pub fn clauses(&self, clauses: impl IntoIterator<Item = Clause>) -> Db {
        self.chain(|s| {
            for clause in clauses {
                s.add_clause(clause);
            }
        })
    }

    /// Use `sql` as the statement, with `?` placeholders bound to `args`.
    pub fn raw(&self, sql: &str, args: Vec<Value>) -> Db {
        let mut w = SqlWriter::new(self.shared.dialect, String::new());
        Expr::raw(sql, args).build(&mut w);
        let (sql, vars) = w.finish();
        self.chain(|s| {
            s.sql = sql;
            s.vars = vars;
        })
    }

    /// Store a setting carried by every handle derived from this one.
    pub fn set(&self, key: &str, value: serde_json::Value) -> Db {
        self.chain(|s| {
            s.settings.insert(key.to_string(), value);
        })
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.statement.settings.get(key)
    }

    /// Store a setting visible to this statement only.
    pub fn instance_set(&self, key: &str, value: serde_json::Value) -> Db {
        self.chain(|s| {
            s.instance_settings.insert(key.to_string(), value);
        })
    }

    pub fn instance_get(&self, key: &str) -> Option<&serde_json::Value> {
        self.statement.instance_settings.get(key)
    }

    // Internals shared by terminals, preloading and association saving.

    pub(crate) fn run(&mut self, cx: &Cx, operation: Operation) {
        let shared = Arc::clone(&self.shared);
        shared.callbacks.processor(operation).execute(cx, self);
    }

    pub(crate) fn error(&self) -> Option<&Error> {
        self.statement.error.as_ref()
    }

    /// Take the records out of the destination.
    pub(crate) fn take_records(&mut self) -> Vec<Record> {
        match std::mem::take(&mut Arc::make_mut(&mut self.statement).dest) {
            Dest::One(record) => vec![record],
            Dest::Many(records) => records,
            Dest::None | Dest::Rows(_) => Vec::new(),
        }
    }

    /// Query `model` through the query pipeline.
    pub(crate) fn find_records(
        &self,
        cx: &Cx,
        model: SchemaRef,
        conditions: Vec<Condition>,
    ) -> Result<Vec<Record>> {
        let mut db = self.model_ref(model).edit(|s| {
            s.add_conditions(conditions);
            s.dest = Dest::Many(Vec::new());
        });
        db.run(cx, Operation::Query);
        if let Some(e) = db.error() {
            return Err(e.clone());
        }
        Ok(db.take_records())
    }

    /// Insert `records` of `model` through the create pipeline and return
    /// them with generated keys assigned.
    pub(crate) fn create_records(
        &self,
        cx: &Cx,
        model: SchemaRef,
        records: Vec<Record>,
        on_conflict: Option<OnConflict>,
    ) -> Result<Vec<Record>> {
        let mut db = self.model_ref(model).edit(|s| {
            s.dest = Dest::Many(records);
            if let Some(on_conflict) = on_conflict {
                s.add_clause(on_conflict);
            }
        });
        db.run(cx, Operation::Create);
        if let Some(e) = db.error() {
            return Err(e.clone());
        }
        Ok(db.take_records())
    }

    /// Run already composed SQL through the raw pipeline.
    pub(crate) fn exec_composed(&self, cx: &Cx, composed: Composed) -> Result<u64> {
        let mut db = self.get_instance().edit(|s| {
            s.sql = composed.sql;
            s.vars = composed.vars;
        });
        db.run(cx, Operation::Raw);
        match db.error() {
            Some(e) => Err(e.clone()),
            None => Ok(db.statement.rows_affected),
        }
    }
}
