//! JOIN clause types.

use crate::expr::{Expr, build_and};
use crate::writer::SqlWriter;

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Type of join
    pub join_type: JoinType,
    /// Table to join
    pub table: String,
    /// Optional table alias
    pub alias: Option<String>,
    /// ON conditions, AND-ed together
    pub on: Vec<Expr>,
    /// Verbatim join SQL; when set the other fields are ignored
    pub expression: Option<Expr>,
}

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

impl Join {
    fn with_type(join_type: JoinType, table: impl Into<String>, on: Vec<Expr>) -> Self {
        Self {
            join_type,
            table: table.into(),
            alias: None,
            on,
            expression: None,
        }
    }

    /// Create an INNER JOIN.
    pub fn inner(table: impl Into<String>, on: Vec<Expr>) -> Self {
        Self::with_type(JoinType::Inner, table, on)
    }

    /// Create a LEFT JOIN.
    pub fn left(table: impl Into<String>, on: Vec<Expr>) -> Self {
        Self::with_type(JoinType::Left, table, on)
    }

    /// A join given as raw SQL, e.g.
    /// `"JOIN emails ON emails.user_id = users.id AND emails.email = ?"`.
    pub fn raw(expression: Expr) -> Self {
        Self {
            expression: Some(expression),
            ..Self::with_type(JoinType::Inner, String::new(), Vec::new())
        }
    }

    /// Set an alias for the joined table.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The name the joined table is referred to by.
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    pub fn build(&self, w: &mut SqlWriter) {
        if let Some(expression) = &self.expression {
            expression.build(w);
            return;
        }
        w.write(self.join_type.as_str());
        w.write_char(' ');
        w.write_quoted(&self.table);
        if let Some(alias) = &self.alias {
            w.write_char(' ');
            w.write_quoted(alias);
        }
        if !self.on.is_empty() {
            w.write(" ON ");
            build_and(&self.on, w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::expr::Column;
    use ormline_core::Value;

    #[test]
    fn left_join_with_alias_and_pairs() {
        let join = Join::left(
            "companies",
            vec![Expr::eq_column(
                Column::current("company_id"),
                Column::qualified("Company", "id"),
            )],
        )
        .alias("Company");
        let mut w = SqlWriter::new(Dialect::Postgres, "users");
        join.build(&mut w);
        assert_eq!(
            w.sql(),
            "LEFT JOIN \"companies\" \"Company\" ON \"users\".\"company_id\" = \"Company\".\"id\""
        );
        assert_eq!(join.reference_name(), "Company");
    }

    #[test]
    fn raw_join_binds_args() {
        let join = Join::raw(Expr::raw(
            "JOIN emails ON emails.user_id = users.id AND emails.email = ?",
            vec![Value::from("a@b")],
        ));
        let mut w = SqlWriter::new(Dialect::Mysql, "users");
        join.build(&mut w);
        let (sql, vars) = w.finish();
        assert_eq!(
            sql,
            "JOIN emails ON emails.user_id = users.id AND emails.email = ?"
        );
        assert_eq!(vars, vec![Value::from("a@b")]);
    }
}
