//! Ormline - callback-driven statement construction for Rust models.
//!
//! Ormline builds and runs SQL for plain Rust types through a [`Db`] handle:
//!
//! - Chainable builders that never modify the handle they are called on
//! - One callback pipeline per operation kind, adjustable before the
//!   handle is built
//! - Joined selects, eager preloading and association saving driven by
//!   declared relationships
//! - Default transactions, explicit transactions and savepoints
//! - Automatic creation and update times, and named plugins
//!
//! # Quick Start
//!
//! ```ignore
//! use ormline::prelude::*;
//!
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Model for User {
//!     fn describe() -> ModelDef {
//!         ModelDef::new("User")
//!             .field(FieldInfo::new("ID").primary_key(true).auto_increment(true))
//!             .field(FieldInfo::new("Name"))
//!     }
//!     fn to_record(&self) -> Record {
//!         Record::new().with("ID", self.id).with("Name", &self.name)
//!     }
//!     fn from_record(record: &Record) -> Result<Self> {
//!         Ok(Self {
//!             id: record.get_as("ID")?,
//!             name: record.get_as("Name")?,
//!         })
//!     }
//! }
//!
//! fn example(cx: &Cx, conn: Arc<dyn Executor>) -> Result<()> {
//!     let db = Db::new(conn, Dialect::Postgres);
//!
//!     let mut user = User { id: 0, name: "ada".into() };
//!     db.create(cx, &mut user)?;
//!
//!     let mut users = Vec::new();
//!     db.filter(Condition::eq("Name", "ada")).find(cx, &mut users, vec![])?;
//!
//!     db.transaction(cx, |tx| {
//!         tx.update_column(cx, &mut user, "Name", "grace")?;
//!         Ok(())
//!     })
//! }
//! ```
//!
//! The database itself sits behind [`Executor`]; Ormline ships no driver.

pub mod callbacks;
pub mod composer;
pub mod condition;
pub mod config;
pub mod db;
pub mod finish;
pub mod logger;
pub mod plugin;
pub mod preload;
pub mod scan;
pub mod schema;
pub mod session;
pub mod statement;

pub use callbacks::{Callbacks, Processor, Scope, Step, StepBuilder};
pub use composer::Composed;
pub use condition::Condition;
pub use config::{Config, CreateConfig, LogLevel, LoggerConfig, NowFunc};
pub use db::{CloneMode, Db, DbBuilder};
pub use finish::Executed;
pub use plugin::Plugin;
pub use preload::ASSOCIATIONS;
pub use schema::{
    Field, HookKind, Model, ModelDef, NamingStrategy, Relationship, RelationshipInfo,
    RelationshipKind, Schema, SchemaCache, SchemaRef, SnakeCaseNaming,
};
pub use session::SessionOptions;
pub use statement::{Dest, Statement};

pub use ormline_core::{
    Cx, Error, ExecResult, Executor, FieldInfo, Outcome, PreparedStmtExecutor, Record, Related,
    Result, Row, Value, ValueKey,
};
pub use ormline_query::{Clause, Dialect, Expr, Locking, OnConflict};

/// Commonly used items.
pub mod prelude {
    pub use crate::{
        Condition, Config, Cx, Db, Dialect, Error, Executor, FieldInfo, HookKind, Model, ModelDef,
        NowFunc, Plugin, Record, Related, RelationshipInfo, Result, Row, SessionOptions, Value,
    };
    pub use std::sync::Arc;
}
