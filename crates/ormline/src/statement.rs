//! The per-operation build context.

use crate::condition::Condition;
use crate::schema::{Schema, SchemaRef};
use ormline_core::{Error, Executor, Record, Row, Value};
use ormline_query::{Clause, Clauses, Operand, Where};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Where query results go and where writes come from.
#[derive(Debug, Clone, Default)]
pub enum Dest {
    #[default]
    None,
    One(Record),
    Many(Vec<Record>),
    /// Undecoded rows
    Rows(Vec<Row>),
}

impl Dest {
    pub fn records(&self) -> &[Record] {
        match self {
            Dest::One(record) => std::slice::from_ref(record),
            Dest::Many(records) => records,
            Dest::None | Dest::Rows(_) => &[],
        }
    }

    pub fn records_mut(&mut self) -> &mut [Record] {
        match self {
            Dest::One(record) => std::slice::from_mut(record),
            Dest::Many(records) => records,
            Dest::None | Dest::Rows(_) => &mut [],
        }
    }
}

/// A join requested by name.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequest {
    /// A relationship name, or raw join SQL
    pub name: String,
    pub args: Vec<Value>,
}

/// Mutable state for one top-level operation.
///
/// A statement is owned by exactly one handle. Builders copy it before
/// writing, so the handle a chain started from never sees the chain's
/// conditions.
#[derive(Clone)]
pub struct Statement {
    pub table: String,
    pub model: Option<SchemaRef>,
    pub schema: Option<Arc<Schema>>,
    pub dest: Dest,
    pub clauses: Clauses,
    pub distinct: bool,
    pub selects: Vec<String>,
    pub omits: Vec<String>,
    pub joins: Vec<JoinRequest>,
    /// Preload paths and the extra conditions for each exact path
    pub preloads: BTreeMap<String, Vec<Condition>>,
    /// Field assignments for UPDATE, in order
    pub update_values: Vec<(String, Operand)>,
    pub sql: String,
    pub vars: Vec<Value>,
    pub settings: serde_json::Map<String, serde_json::Value>,
    /// Settings private to this statement; never carried into derived ones
    pub instance_settings: serde_json::Map<String, serde_json::Value>,
    pub conn: Arc<dyn Executor>,
    pub rows_affected: u64,
    pub raise_not_found: bool,
    /// Skip the models' default query conditions
    pub unscoped: bool,
    /// Write only the given columns; update times are left alone
    pub updating_column: bool,
    pub started_transaction: bool,
    pub error: Option<Error>,
}

impl Statement {
    pub fn new(conn: Arc<dyn Executor>) -> Self {
        Self {
            table: String::new(),
            model: None,
            schema: None,
            dest: Dest::None,
            clauses: Clauses::new(),
            distinct: false,
            selects: Vec::new(),
            omits: Vec::new(),
            joins: Vec::new(),
            preloads: BTreeMap::new(),
            update_values: Vec::new(),
            sql: String::new(),
            vars: Vec::new(),
            settings: serde_json::Map::new(),
            instance_settings: serde_json::Map::new(),
            conn,
            rows_affected: 0,
            raise_not_found: false,
            unscoped: false,
            updating_column: false,
            started_transaction: false,
            error: None,
        }
    }

    /// A copy carrying the accumulated conditions and settings, without the
    /// previous run's SQL, results or instance settings.
    pub fn derive(&self) -> Self {
        Self {
            table: self.table.clone(),
            model: self.model,
            schema: self.schema.clone(),
            dest: self.dest.clone(),
            clauses: self.clauses.clone(),
            distinct: self.distinct,
            selects: self.selects.clone(),
            omits: self.omits.clone(),
            joins: self.joins.clone(),
            preloads: self.preloads.clone(),
            update_values: self.update_values.clone(),
            settings: self.settings.clone(),
            unscoped: self.unscoped,
            error: self.error.clone(),
            ..Self::new(Arc::clone(&self.conn))
        }
    }

    /// Record an error. Earlier errors stay the root cause.
    pub fn add_error(&mut self, err: Error) {
        tracing::debug!(error = %err, "Statement error recorded");
        self.error = Some(match self.error.take() {
            Some(existing) => existing.chain(err),
            None => err,
        });
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn add_clause(&mut self, clause: impl Into<Clause>) {
        self.clauses.add(clause);
    }

    /// AND `conditions` into the WHERE clause. Empty conditions are dropped.
    pub fn add_conditions(&mut self, conditions: Vec<Condition>) {
        let exprs: Vec<_> = conditions
            .into_iter()
            .filter(|c| !c.is_empty())
            .map(Condition::into_expr)
            .collect();
        if exprs.is_empty() {
            return;
        }
        self.clauses.add(Where::new(exprs));
    }

    /// Request a join; requesting the same name again replaces it.
    pub fn add_join(&mut self, name: String, args: Vec<Value>) {
        match self.joins.iter_mut().find(|j| j.name == name) {
            Some(existing) => existing.args = args,
            None => self.joins.push(JoinRequest { name, args }),
        }
    }

    /// Whether `name` is excluded from association saving.
    pub fn omits_association(&self, name: &str) -> bool {
        self.omits
            .iter()
            .any(|o| o == name || o == crate::preload::ASSOCIATIONS)
    }

    /// Whether association saving covers `name`: it is not omitted, and
    /// when fields are selected it is one of them or `*` is.
    pub fn saves_association(&self, name: &str) -> bool {
        !self.omits_association(name)
            && (self.selects.is_empty()
                || self
                    .selects
                    .iter()
                    .any(|s| s == name || s == crate::preload::ASSOCIATIONS))
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("table", &self.table)
            .field("model", &self.model)
            .field("dest", &self.dest)
            .field("clauses", &self.clauses)
            .field("selects", &self.selects)
            .field("omits", &self.omits)
            .field("joins", &self.joins)
            .field("preloads", &self.preloads.keys().collect::<Vec<_>>())
            .field("sql", &self.sql)
            .field("vars", &self.vars)
            .field("rows_affected", &self.rows_affected)
            .field("in_transaction", &self.conn.in_transaction())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
