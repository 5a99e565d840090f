//! Column references and condition expressions.

use crate::writer::SqlWriter;
use ormline_core::Value;

/// Placeholder column name resolved to the model's primary key column when
/// the statement is composed.
pub const PRIMARY_KEY: &str = "~~~pk~~~";

/// Which table a column is qualified with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRef {
    /// The statement's own table, filled in at render time
    Current,
    /// A named table or alias
    Named(String),
}

/// A column reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub table: Option<TableRef>,
    pub name: String,
    pub alias: Option<String>,
    /// Raw columns are written verbatim, without quoting or qualification
    pub raw: bool,
}

impl Column {
    /// An unqualified column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
            alias: None,
            raw: false,
        }
    }

    /// A column of the statement's current table.
    pub fn current(name: impl Into<String>) -> Self {
        Self {
            table: Some(TableRef::Current),
            ..Self::new(name)
        }
    }

    /// A column qualified with a named table or alias.
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(TableRef::Named(table.into())),
            ..Self::new(name)
        }
    }

    /// A verbatim SQL fragment used where a column is expected.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            raw: true,
            ..Self::new(sql)
        }
    }

    /// The current table's primary key, resolved at composition time.
    pub fn primary_key() -> Self {
        Self::current(PRIMARY_KEY)
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn is_primary_key(&self) -> bool {
        !self.raw && self.name == PRIMARY_KEY
    }

    pub fn build(&self, w: &mut SqlWriter) {
        if self.raw {
            w.write(&self.name);
        } else {
            match &self.table {
                Some(TableRef::Current) => {
                    let table = w.current_table().to_string();
                    w.write_quoted(&table);
                    w.write_char('.');
                }
                Some(TableRef::Named(t)) => {
                    w.write_quoted(t);
                    w.write_char('.');
                }
                None => {}
            }
            if self.name == "*" {
                w.write("*");
            } else {
                let quoted = w.dialect().quote_identifier(&self.name);
                w.write(&quoted);
            }
        }
        if let Some(alias) = &self.alias {
            w.write(" AS ");
            let quoted = w.dialect().quote_identifier(alias);
            w.write(&quoted);
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Column(Column),
    /// A computed value such as `"age" + 1`
    Expr(Box<Expr>),
}

impl Operand {
    fn build(&self, w: &mut SqlWriter) {
        match self {
            Operand::Value(v) => w.add_var(v),
            Operand::Column(c) => c.build(w),
            Operand::Expr(e) => e.build(w),
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Operand::Value(Value::Null))
    }

    pub fn map_columns(&mut self, f: &dyn Fn(&mut Column)) {
        match self {
            Operand::Value(_) => {}
            Operand::Column(c) => f(c),
            Operand::Expr(e) => e.map_columns(f),
        }
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

impl From<Column> for Operand {
    fn from(column: Column) -> Self {
        Operand::Column(column)
    }
}

impl From<Expr> for Operand {
    fn from(expr: Expr) -> Self {
        Operand::Expr(Box::new(expr))
    }
}

/// A condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `column = operand`, or `IS NULL` against a NULL value
    Eq(Column, Operand),
    /// `column <> operand`, or `IS NOT NULL`
    Neq(Column, Operand),
    /// `column IN (...)` or `(a, b) IN ((...), (...))`
    In {
        columns: Vec<Column>,
        values: Vec<Vec<Value>>,
    },
    /// Raw SQL with `?` placeholders bound in order
    Raw { sql: String, vars: Vec<Value> },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn eq(column: Column, value: impl Into<Value>) -> Self {
        Expr::Eq(column, Operand::Value(value.into()))
    }

    pub fn eq_column(left: Column, right: Column) -> Self {
        Expr::Eq(left, Operand::Column(right))
    }

    pub fn neq(column: Column, value: impl Into<Value>) -> Self {
        Expr::Neq(column, Operand::Value(value.into()))
    }

    /// Single-column IN list.
    pub fn in_list(column: Column, values: Vec<Value>) -> Self {
        Expr::In {
            columns: vec![column],
            values: values.into_iter().map(|v| vec![v]).collect(),
        }
    }

    /// Multi-column IN list; every row must have one value per column.
    pub fn in_tuples(columns: Vec<Column>, values: Vec<Vec<Value>>) -> Self {
        Expr::In { columns, values }
    }

    pub fn raw(sql: impl Into<String>, vars: Vec<Value>) -> Self {
        Expr::Raw {
            sql: sql.into(),
            vars,
        }
    }

    #[must_use]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Whether this expression renders no SQL: a group whose members are
    /// all empty, or a negation of one.
    pub fn is_empty(&self) -> bool {
        match self {
            Expr::And(exprs) | Expr::Or(exprs) => exprs.iter().all(Expr::is_empty),
            Expr::Not(inner) => inner.is_empty(),
            Expr::Raw { sql, .. } => sql.trim().is_empty(),
            Expr::Eq(..) | Expr::Neq(..) | Expr::In { .. } => false,
        }
    }

    /// Whether this expression needs parentheses when AND-ed with others.
    pub fn needs_parens(&self) -> bool {
        match self {
            Expr::Or(exprs) => rendered(exprs) > 1,
            Expr::Raw { sql, .. } => sql.to_ascii_uppercase().contains(" OR "),
            _ => false,
        }
    }

    /// Apply `f` to every non-raw column this expression references.
    pub fn map_columns(&mut self, f: &dyn Fn(&mut Column)) {
        match self {
            Expr::Eq(c, op) | Expr::Neq(c, op) => {
                f(c);
                op.map_columns(f);
            }
            Expr::In { columns, .. } => columns.iter_mut().for_each(f),
            Expr::Raw { .. } => {}
            Expr::And(exprs) | Expr::Or(exprs) => {
                for e in exprs {
                    e.map_columns(f);
                }
            }
            Expr::Not(e) => e.map_columns(f),
        }
    }

    pub fn build(&self, w: &mut SqlWriter) {
        match self {
            Expr::Eq(column, operand) => {
                column.build(w);
                if operand.is_null() {
                    w.write(" IS NULL");
                } else {
                    w.write(" = ");
                    operand.build(w);
                }
            }
            Expr::Neq(column, operand) => {
                column.build(w);
                if operand.is_null() {
                    w.write(" IS NOT NULL");
                } else {
                    w.write(" <> ");
                    operand.build(w);
                }
            }
            Expr::In { columns, values } => build_in(columns, values, w),
            Expr::Raw { sql, vars } => build_raw(sql, vars, w),
            Expr::And(exprs) => build_and(exprs, w),
            Expr::Or(exprs) => build_joined(exprs, " OR ", w, |e| {
                matches!(e, Expr::And(inner) if rendered(inner) > 1)
            }),
            Expr::Not(inner) if inner.is_empty() => {}
            Expr::Not(inner) => {
                w.write("NOT (");
                inner.build(w);
                w.write_char(')');
            }
        }
    }
}

/// Write `exprs` joined with ` AND `, parenthesizing OR-ed members.
pub fn build_and(exprs: &[Expr], w: &mut SqlWriter) {
    build_joined(exprs, " AND ", w, Expr::needs_parens);
}

fn build_in(columns: &[Column], values: &[Vec<Value>], w: &mut SqlWriter) {
    if let [column] = columns {
        column.build(w);
        w.write(" IN (");
        if values.is_empty() {
            w.write("NULL");
        }
        for (i, row) in values.iter().enumerate() {
            if i > 0 {
                w.write_char(',');
            }
            w.add_var(row.first().unwrap_or(&Value::Null));
        }
        w.write_char(')');
        return;
    }

    w.write_char('(');
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            w.write_char(',');
        }
        column.build(w);
    }
    w.write(") IN (");
    if values.is_empty() {
        w.write("NULL");
    }
    for (i, row) in values.iter().enumerate() {
        if i > 0 {
            w.write_char(',');
        }
        w.write_char('(');
        for (j, v) in row.iter().enumerate() {
            if j > 0 {
                w.write_char(',');
            }
            w.add_var(v);
        }
        w.write_char(')');
    }
    w.write_char(')');
}

fn build_raw(sql: &str, vars: &[Value], w: &mut SqlWriter) {
    let mut vars = vars.iter();
    let mut in_string = false;
    for c in sql.chars() {
        match c {
            '\'' => {
                in_string = !in_string;
                w.write_char(c);
            }
            '?' if !in_string => match vars.next() {
                Some(v) => w.add_var(v),
                None => w.write_char('?'),
            },
            _ => w.write_char(c),
        }
    }
}

/// Members of a group that render any SQL.
fn rendered(exprs: &[Expr]) -> usize {
    exprs.iter().filter(|e| !e.is_empty()).count()
}

fn build_joined(exprs: &[Expr], sep: &str, w: &mut SqlWriter, parens: impl Fn(&Expr) -> bool) {
    let wrap = rendered(exprs) > 1;
    for (i, e) in exprs.iter().filter(|e| !e.is_empty()).enumerate() {
        if i > 0 {
            w.write(sep);
        }
        if wrap && parens(e) {
            w.write_char('(');
            e.build(w);
            w.write_char(')');
        } else {
            e.build(w);
        }
    }
}
