//! SQL text accumulation with bound parameters.

use crate::dialect::Dialect;
use ormline_core::Value;

/// Accumulates SQL text and the values bound to its placeholders.
///
/// The writer knows the statement's current table so that columns marked as
/// belonging to it can be qualified at render time.
#[derive(Debug, Clone)]
pub struct SqlWriter {
    dialect: Dialect,
    table: String,
    sql: String,
    vars: Vec<Value>,
}

impl SqlWriter {
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            sql: String::new(),
            vars: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn current_table(&self) -> &str {
        &self.table
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn write(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    pub fn write_char(&mut self, c: char) {
        self.sql.push(c);
    }

    /// Write an identifier, quoting each dotted part.
    pub fn write_quoted(&mut self, ident: &str) {
        let quoted = self.dialect.quote_path(ident);
        self.sql.push_str(&quoted);
    }

    /// Bind a value and write its placeholder.
    ///
    /// DEFAULT is written as the keyword and arrays expand to a parenthesized
    /// placeholder list.
    pub fn add_var(&mut self, value: &Value) {
        match value {
            Value::Default => self.sql.push_str("DEFAULT"),
            Value::Array(items) => {
                self.sql.push('(');
                if items.is_empty() {
                    self.sql.push_str("NULL");
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.sql.push(',');
                    }
                    self.add_var(item);
                }
                self.sql.push(')');
            }
            other => {
                self.vars.push(other.clone());
                let placeholder = self.dialect.placeholder(self.vars.len());
                self.sql.push_str(&placeholder);
            }
        }
    }

    pub fn finish(self) -> (String, Vec<Value>) {
        (self.sql, self.vars)
    }
}
