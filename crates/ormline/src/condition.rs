//! Query conditions.
//!
//! Conditions name fields the way records do (`"Name"`) or columns the way
//! the database does (`"name"`); both resolve to columns when the statement
//! is composed. A dotted name such as `"Company.Name"` refers to a joined
//! relationship.

use crate::schema::Model;
use ormline_core::Value;
use ormline_query::{Column, Expr};

/// A WHERE condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition(Expr);

fn column(name: &str) -> Column {
    match name.split_once('.') {
        Some((table, name)) => Column::qualified(table, name),
        None => Column::current(name),
    }
}

impl Condition {
    /// Raw SQL with `?` placeholders.
    pub fn raw(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self(Expr::raw(sql, args))
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self(Expr::eq(column(field), value))
    }

    pub fn neq(field: &str, value: impl Into<Value>) -> Self {
        Self(Expr::neq(column(field), value))
    }

    pub fn in_list(field: &str, values: Vec<Value>) -> Self {
        Self(Expr::in_list(column(field), values))
    }

    /// Match the model's primary key.
    pub fn primary_key(value: impl Into<Value>) -> Self {
        Self(Expr::eq(Column::primary_key(), value))
    }

    /// Match any of several primary keys.
    pub fn primary_keys(values: Vec<Value>) -> Self {
        Self(Expr::in_list(Column::primary_key(), values))
    }

    /// Equality on every non-zero field of `model`. A model with only zero
    /// fields gives an empty condition, which statements ignore.
    pub fn model<M: Model>(model: &M) -> Self {
        let record = model.to_record();
        let exprs = record
            .values()
            .filter(|(_, v)| !v.is_zero())
            .map(|(field, v)| Expr::eq(Column::current(field), v.clone()))
            .collect();
        Self(Expr::And(exprs))
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Self(Expr::Or(conditions.into_iter().map(|c| c.0).collect()))
    }

    #[must_use]
    pub fn not(self) -> Self {
        Self(self.0.not())
    }

    /// Whether the condition renders no SQL.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expr(&self) -> &Expr {
        &self.0
    }

    pub fn into_expr(self) -> Expr {
        self.0
    }
}

impl From<Expr> for Condition {
    fn from(expr: Expr) -> Self {
        Self(expr)
    }
}
