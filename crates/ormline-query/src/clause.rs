//! Typed statement clauses and their merge rules.
//!
//! A statement holds at most one [`Clause`] per [`ClauseKind`]. Adding a
//! clause of a kind that is already present merges the two according to the
//! kind's rule; see [`Clause::merge`].

use crate::dialect::Dialect;
use crate::expr::{Column, Expr, Operand, build_and};
use crate::join::Join;
use crate::writer::SqlWriter;
use ormline_core::Value;
use std::collections::BTreeMap;

/// Clause kinds, ordered the way statements usually render them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClauseKind {
    Insert,
    Values,
    OnConflict,
    Update,
    Set,
    Delete,
    Select,
    From,
    Where,
    GroupBy,
    OrderBy,
    Limit,
    Locking,
    Returning,
}

/// Render order for SELECT statements.
pub const QUERY_CLAUSES: &[ClauseKind] = &[
    ClauseKind::Select,
    ClauseKind::From,
    ClauseKind::Where,
    ClauseKind::GroupBy,
    ClauseKind::OrderBy,
    ClauseKind::Limit,
    ClauseKind::Locking,
];

/// Render order for INSERT statements.
pub const CREATE_CLAUSES: &[ClauseKind] = &[
    ClauseKind::Insert,
    ClauseKind::Values,
    ClauseKind::OnConflict,
    ClauseKind::Returning,
];

/// Render order for UPDATE statements.
pub const UPDATE_CLAUSES: &[ClauseKind] = &[
    ClauseKind::Update,
    ClauseKind::Set,
    ClauseKind::Where,
    ClauseKind::Returning,
];

/// Render order for DELETE statements.
pub const DELETE_CLAUSES: &[ClauseKind] = &[
    ClauseKind::Delete,
    ClauseKind::From,
    ClauseKind::Where,
    ClauseKind::Returning,
];

fn write_columns(columns: &[Column], w: &mut SqlWriter) {
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            w.write_char(',');
        }
        column.build(w);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub columns: Vec<Column>,
    /// Replaces the column list when set
    pub expression: Option<Expr>,
}

impl Select {
    pub fn columns(columns: Vec<Column>) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    fn build(&self, w: &mut SqlWriter) {
        w.write("SELECT ");
        if self.distinct {
            w.write("DISTINCT ");
        }
        if let Some(expression) = &self.expression {
            expression.build(w);
        } else if self.columns.is_empty() {
            w.write_char('*');
        } else {
            write_columns(&self.columns, w);
        }
    }
}

/// A table in a FROM list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub alias: Option<String>,
    pub raw: bool,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            raw: false,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            raw: true,
            ..Self::new(sql)
        }
    }

    fn build(&self, w: &mut SqlWriter) {
        if self.raw {
            w.write(&self.name);
            return;
        }
        w.write_quoted(&self.name);
        if let Some(alias) = &self.alias {
            w.write_char(' ');
            w.write_quoted(alias);
        }
    }
}

/// FROM with joins. No tables means the statement's current table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct From {
    pub tables: Vec<Table>,
    pub joins: Vec<Join>,
}

impl From {
    fn build(&self, w: &mut SqlWriter) {
        w.write("FROM ");
        if self.tables.is_empty() {
            let table = w.current_table().to_string();
            w.write_quoted(&table);
        }
        for (i, table) in self.tables.iter().enumerate() {
            if i > 0 {
                w.write_char(',');
            }
            table.build(w);
        }
        for join in &self.joins {
            w.write_char(' ');
            join.build(w);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where {
    pub exprs: Vec<Expr>,
}

impl Where {
    pub fn new(exprs: Vec<Expr>) -> Self {
        Self { exprs }
    }

    fn build(&self, w: &mut SqlWriter) {
        w.write("WHERE ");
        build_and(&self.exprs, w);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupBy {
    pub columns: Vec<Column>,
    pub having: Vec<Expr>,
}

impl GroupBy {
    fn build(&self, w: &mut SqlWriter) {
        if !self.columns.is_empty() {
            w.write("GROUP BY ");
            write_columns(&self.columns, w);
        }
        if !self.having.is_empty() {
            if !self.columns.is_empty() {
                w.write_char(' ');
            }
            w.write("HAVING ");
            build_and(&self.having, w);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByColumn {
    pub column: Column,
    pub desc: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBy {
    pub columns: Vec<OrderByColumn>,
    /// Raw ordering expression; replaces everything before it
    pub expression: Option<Expr>,
}

impl OrderBy {
    pub fn asc(column: Column) -> Self {
        Self {
            columns: vec![OrderByColumn {
                column,
                desc: false,
            }],
            expression: None,
        }
    }

    pub fn desc(column: Column) -> Self {
        Self {
            columns: vec![OrderByColumn { column, desc: true }],
            expression: None,
        }
    }

    pub fn raw(expression: Expr) -> Self {
        Self {
            columns: Vec::new(),
            expression: Some(expression),
        }
    }

    fn build(&self, w: &mut SqlWriter) {
        w.write("ORDER BY ");
        if let Some(expression) = &self.expression {
            expression.build(w);
            return;
        }
        for (i, item) in self.columns.iter().enumerate() {
            if i > 0 {
                w.write_char(',');
            }
            item.column.build(w);
            if item.desc {
                w.write(" DESC");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limit {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Limit {
    fn effective_offset(&self) -> Option<u64> {
        self.offset.filter(|o| *o > 0)
    }

    fn build(&self, w: &mut SqlWriter) {
        match (self.limit, self.effective_offset()) {
            (Some(limit), offset) => {
                w.write(&format!("LIMIT {limit}"));
                if let Some(offset) = offset {
                    w.write(&format!(" OFFSET {offset}"));
                }
            }
            (None, Some(offset)) => match w.dialect() {
                Dialect::Sqlite => w.write(&format!("LIMIT -1 OFFSET {offset}")),
                Dialect::Mysql => w.write(&format!("LIMIT {} OFFSET {offset}", u64::MAX)),
                Dialect::Postgres => w.write(&format!("OFFSET {offset}")),
            },
            (None, None) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStrength {
    Update,
    Share,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOption {
    NoWait,
    SkipLocked,
}

/// `FOR UPDATE` / `FOR SHARE` row locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locking {
    pub strength: LockStrength,
    pub table: Option<String>,
    pub options: Option<LockOption>,
}

impl Locking {
    pub fn update() -> Self {
        Self {
            strength: LockStrength::Update,
            table: None,
            options: None,
        }
    }

    pub fn share() -> Self {
        Self {
            strength: LockStrength::Share,
            ..Self::update()
        }
    }

    fn build(&self, w: &mut SqlWriter) {
        w.write(match self.strength {
            LockStrength::Update => "FOR UPDATE",
            LockStrength::Share => "FOR SHARE",
        });
        if let Some(table) = &self.table {
            w.write(" OF ");
            w.write_quoted(table);
        }
        match self.options {
            Some(LockOption::NoWait) => w.write(" NOWAIT"),
            Some(LockOption::SkipLocked) => w.write(" SKIP LOCKED"),
            None => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Insert {
    /// Defaults to the statement's current table
    pub table: Option<String>,
    /// e.g. `IGNORE`
    pub modifier: Option<String>,
}

impl Insert {
    fn build(&self, w: &mut SqlWriter) {
        w.write("INSERT ");
        if let Some(modifier) = &self.modifier {
            w.write(modifier);
            w.write_char(' ');
        }
        w.write("INTO ");
        let table = self
            .table
            .clone()
            .unwrap_or_else(|| w.current_table().to_string());
        w.write_quoted(&table);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl Values {
    fn build(&self, w: &mut SqlWriter) {
        if self.columns.is_empty() {
            w.write("DEFAULT VALUES");
            return;
        }
        w.write_char('(');
        write_columns(&self.columns, w);
        w.write(") VALUES ");
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                w.write_char(',');
            }
            w.write_char('(');
            for (j, value) in row.iter().enumerate() {
                if j > 0 {
                    w.write_char(',');
                }
                w.add_var(value);
            }
            w.write_char(')');
        }
    }
}

/// `column = value` in SET lists and upserts.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: Column,
    pub value: Operand,
}

impl Assignment {
    pub fn new(column: Column, value: impl Into<Operand>) -> Self {
        Self {
            column,
            value: value.into(),
        }
    }

    fn build(&self, w: &mut SqlWriter) {
        self.column.build(w);
        w.write_char('=');
        match &self.value {
            Operand::Value(v) => w.add_var(v),
            Operand::Column(c) => c.build(w),
            Operand::Expr(e) => e.build(w),
        }
    }
}

fn write_assignments(assignments: &[Assignment], w: &mut SqlWriter) {
    for (i, assignment) in assignments.iter().enumerate() {
        if i > 0 {
            w.write_char(',');
        }
        assignment.build(w);
    }
}

/// Upsert handling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OnConflict {
    /// Conflict target columns
    pub columns: Vec<Column>,
    pub do_nothing: bool,
    /// Columns overwritten with the proposed row's value
    pub do_updates: Vec<Column>,
    pub assignments: Vec<Assignment>,
}

impl OnConflict {
    pub fn do_nothing() -> Self {
        Self {
            do_nothing: true,
            ..Self::default()
        }
    }

    fn excluded(&self, dialect: Dialect) -> Vec<Assignment> {
        self.do_updates
            .iter()
            .map(|column| {
                let name = dialect.quote_identifier(&column.name);
                let value = match dialect {
                    Dialect::Mysql => format!("VALUES({name})"),
                    Dialect::Postgres | Dialect::Sqlite => format!("excluded.{name}"),
                };
                Assignment::new(Column::new(column.name.clone()), Column::raw(value))
            })
            .chain(self.assignments.iter().cloned())
            .collect()
    }

    fn build(&self, w: &mut SqlWriter) {
        let assignments = self.excluded(w.dialect());
        if w.dialect() == Dialect::Mysql {
            w.write("ON DUPLICATE KEY UPDATE ");
            if self.do_nothing || assignments.is_empty() {
                // MySQL has no DO NOTHING; assign a conflict column to itself.
                if let Some(column) = self.columns.first() {
                    let keep = Assignment::new(Column::new(column.name.clone()), column.clone());
                    keep.build(w);
                }
            } else {
                write_assignments(&assignments, w);
            }
            return;
        }

        w.write("ON CONFLICT");
        if !self.columns.is_empty() {
            w.write(" (");
            write_columns(&self.columns, w);
            w.write_char(')');
        }
        if self.do_nothing || assignments.is_empty() {
            w.write(" DO NOTHING");
        } else {
            w.write(" DO UPDATE SET ");
            write_assignments(&assignments, w);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Returning {
    /// Empty means `RETURNING *`
    pub columns: Vec<Column>,
}

impl Returning {
    fn build(&self, w: &mut SqlWriter) {
        w.write("RETURNING ");
        if self.columns.is_empty() {
            w.write_char('*');
        } else {
            write_columns(&self.columns, w);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Update {
    pub table: Option<String>,
    pub modifier: Option<String>,
}

impl Update {
    fn build(&self, w: &mut SqlWriter) {
        w.write("UPDATE ");
        if let Some(modifier) = &self.modifier {
            w.write(modifier);
            w.write_char(' ');
        }
        let table = self
            .table
            .clone()
            .unwrap_or_else(|| w.current_table().to_string());
        w.write_quoted(&table);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Set {
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delete {
    pub modifier: Option<String>,
}

/// One clause of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Select(Select),
    From(From),
    Where(Where),
    GroupBy(GroupBy),
    OrderBy(OrderBy),
    Limit(Limit),
    Locking(Locking),
    Insert(Insert),
    Values(Values),
    OnConflict(OnConflict),
    Returning(Returning),
    Update(Update),
    Set(Set),
    Delete(Delete),
}

macro_rules! impl_from_clause {
    ($($variant:ident),* $(,)?) => {
        $(
            impl std::convert::From<$variant> for Clause {
                fn from(clause: $variant) -> Self {
                    Clause::$variant(clause)
                }
            }
        )*
    };
}

impl_from_clause!(
    Select, From, Where, GroupBy, OrderBy, Limit, Locking, Insert, Values, OnConflict, Returning,
    Update, Set, Delete,
);

impl Clause {
    pub fn kind(&self) -> ClauseKind {
        match self {
            Clause::Select(_) => ClauseKind::Select,
            Clause::From(_) => ClauseKind::From,
            Clause::Where(_) => ClauseKind::Where,
            Clause::GroupBy(_) => ClauseKind::GroupBy,
            Clause::OrderBy(_) => ClauseKind::OrderBy,
            Clause::Limit(_) => ClauseKind::Limit,
            Clause::Locking(_) => ClauseKind::Locking,
            Clause::Insert(_) => ClauseKind::Insert,
            Clause::Values(_) => ClauseKind::Values,
            Clause::OnConflict(_) => ClauseKind::OnConflict,
            Clause::Returning(_) => ClauseKind::Returning,
            Clause::Update(_) => ClauseKind::Update,
            Clause::Set(_) => ClauseKind::Set,
            Clause::Delete(_) => ClauseKind::Delete,
        }
    }

    /// Combine `self` with the `existing` clause of the same kind.
    pub fn merge(self, existing: Clause) -> Clause {
        match (self, existing) {
            (Clause::Where(new), Clause::Where(mut old)) => {
                old.exprs.extend(new.exprs);
                Clause::Where(old)
            }
            (Clause::From(new), Clause::From(mut old)) => {
                if !new.tables.is_empty() {
                    old.tables = new.tables;
                }
                old.joins.extend(new.joins);
                Clause::From(old)
            }
            (Clause::GroupBy(new), Clause::GroupBy(mut old)) => {
                old.columns.extend(new.columns);
                old.having.extend(new.having);
                Clause::GroupBy(old)
            }
            (Clause::OrderBy(new), Clause::OrderBy(mut old)) => {
                if new.expression.is_some() {
                    Clause::OrderBy(new)
                } else {
                    old.columns.extend(new.columns);
                    Clause::OrderBy(old)
                }
            }
            (Clause::Limit(new), Clause::Limit(old)) => Clause::Limit(Limit {
                limit: new.limit.or(old.limit),
                offset: new.offset.or(old.offset),
            }),
            (Clause::Returning(new), Clause::Returning(mut old)) => {
                old.columns.extend(new.columns);
                Clause::Returning(old)
            }
            (new, _) => new,
        }
    }

    /// Whether rendering would produce no SQL.
    pub fn is_empty(&self) -> bool {
        match self {
            Clause::Where(c) => c.exprs.iter().all(Expr::is_empty),
            Clause::GroupBy(c) => c.columns.is_empty() && c.having.is_empty(),
            Clause::OrderBy(c) => c.columns.is_empty() && c.expression.is_none(),
            Clause::Limit(c) => c.limit.is_none() && c.effective_offset().is_none(),
            Clause::Set(c) => c.assignments.is_empty(),
            _ => false,
        }
    }

    pub fn build(&self, w: &mut SqlWriter) {
        match self {
            Clause::Select(c) => c.build(w),
            Clause::From(c) => c.build(w),
            Clause::Where(c) => c.build(w),
            Clause::GroupBy(c) => c.build(w),
            Clause::OrderBy(c) => c.build(w),
            Clause::Limit(c) => c.build(w),
            Clause::Locking(c) => c.build(w),
            Clause::Insert(c) => c.build(w),
            Clause::Values(c) => c.build(w),
            Clause::OnConflict(c) => c.build(w),
            Clause::Returning(c) => c.build(w),
            Clause::Update(c) => c.build(w),
            Clause::Set(c) => {
                w.write("SET ");
                write_assignments(&c.assignments, w);
            }
            Clause::Delete(c) => {
                w.write("DELETE");
                if let Some(modifier) = &c.modifier {
                    w.write_char(' ');
                    w.write(modifier);
                }
            }
        }
    }

    /// Apply `f` to every column reference in the clause.
    pub fn map_columns(&mut self, f: &dyn Fn(&mut Column)) {
        let map_all = |exprs: &mut Vec<Expr>| exprs.iter_mut().for_each(|e| e.map_columns(f));
        match self {
            Clause::Select(c) => {
                c.columns.iter_mut().for_each(f);
                if let Some(e) = &mut c.expression {
                    e.map_columns(f);
                }
            }
            Clause::From(c) => {
                for join in &mut c.joins {
                    map_all(&mut join.on);
                }
            }
            Clause::Where(c) => map_all(&mut c.exprs),
            Clause::GroupBy(c) => {
                c.columns.iter_mut().for_each(f);
                map_all(&mut c.having);
            }
            Clause::OrderBy(c) => c.columns.iter_mut().for_each(|o| f(&mut o.column)),
            Clause::Values(c) => c.columns.iter_mut().for_each(f),
            Clause::OnConflict(c) => {
                c.columns.iter_mut().for_each(f);
                c.do_updates.iter_mut().for_each(f);
                for a in &mut c.assignments {
                    f(&mut a.column);
                    a.value.map_columns(f);
                }
            }
            Clause::Returning(c) => c.columns.iter_mut().for_each(f),
            Clause::Set(c) => {
                for a in &mut c.assignments {
                    f(&mut a.column);
                    a.value.map_columns(f);
                }
            }
            Clause::Limit(_)
            | Clause::Locking(_)
            | Clause::Insert(_)
            | Clause::Update(_)
            | Clause::Delete(_) => {}
        }
    }
}

/// The clauses of one statement, keyed by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clauses {
    map: BTreeMap<ClauseKind, Clause>,
}

impl Clauses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clause, merging with an existing clause of the same kind.
    pub fn add(&mut self, clause: impl Into<Clause>) {
        let clause = clause.into();
        let kind = clause.kind();
        let merged = match self.map.remove(&kind) {
            Some(existing) => clause.merge(existing),
            None => clause,
        };
        self.map.insert(kind, merged);
    }

    /// Add a clause only when none of its kind exists yet.
    pub fn add_if_absent(&mut self, clause: impl Into<Clause>) {
        let clause = clause.into();
        self.map.entry(clause.kind()).or_insert(clause);
    }

    pub fn get(&self, kind: ClauseKind) -> Option<&Clause> {
        self.map.get(&kind)
    }

    pub fn get_mut(&mut self, kind: ClauseKind) -> Option<&mut Clause> {
        self.map.get_mut(&kind)
    }

    pub fn remove(&mut self, kind: ClauseKind) -> Option<Clause> {
        self.map.remove(&kind)
    }

    pub fn contains(&self, kind: ClauseKind) -> bool {
        self.map.contains_key(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Whether a non-empty WHERE is present.
    pub fn has_conditions(&self) -> bool {
        self.map
            .get(&ClauseKind::Where)
            .is_some_and(|c| !c.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clause> {
        self.map.values()
    }

    /// Render the present, non-empty clauses of `order`, space separated.
    pub fn build(&self, order: &[ClauseKind], w: &mut SqlWriter) {
        let mut first = true;
        for kind in order {
            let Some(clause) = self.map.get(kind) else {
                continue;
            };
            if clause.is_empty() {
                continue;
            }
            if !first {
                w.write_char(' ');
            }
            clause.build(w);
            first = false;
        }
    }

    pub fn map_columns(&mut self, f: &dyn Fn(&mut Column)) {
        for clause in self.map.values_mut() {
            clause.map_columns(f);
        }
    }
}
