//! The clause model for Ormline.
//!
//! `ormline-query` is the **statement construction layer**. It provides the
//! typed clauses a statement is assembled from, the expression tree used in
//! conditions, and the writer that renders them into SQL plus parameters.
//!
//! # Role In The Architecture
//!
//! - **Clauses**: one variant per clause kind, each with its own merge rule.
//! - **Expressions**: `Expr` and `Column` build WHERE/ON/HAVING conditions.
//! - **Dialect support**: placeholders, quoting and upsert syntax for
//!   Postgres, MySQL and SQLite.
//!
//! Rendering is pure: the same clauses always produce the same SQL and
//! parameters. The `ormline` facade decides which clauses a statement gets.

pub mod clause;
pub mod dialect;
pub mod expr;
pub mod join;
pub mod writer;

pub use clause::{
    Assignment, CREATE_CLAUSES, Clause, ClauseKind, Clauses, DELETE_CLAUSES, Delete,
    GroupBy, Insert, Limit, LockOption, LockStrength, Locking, OnConflict, OrderBy, OrderByColumn,
    QUERY_CLAUSES, Returning, Select, Set, Table, UPDATE_CLAUSES, Update, Values, Where,
};
pub use dialect::Dialect;
pub use expr::{Column, Expr, Operand, PRIMARY_KEY, TableRef, build_and};
pub use join::{Join, JoinType};
pub use writer::SqlWriter;
