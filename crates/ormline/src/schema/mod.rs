//! Model descriptions and their parsed schemas.
//!
//! A model describes itself once through [`Model::describe`]. The
//! [`SchemaCache`] turns that description into an immutable [`Schema`]
//! with column names, primary keys and resolved relationships, and hands the
//! same `Arc<Schema>` to every later operation on the type.

mod cache;
pub mod naming;
mod relationship;

pub use cache::SchemaCache;
pub use naming::{NamingStrategy, SnakeCaseNaming};
pub use relationship::{
    FieldRef, JoinKey, JoinTable, JoinTableInfo, Reference, Relationship, RelationshipInfo,
    RelationshipKind,
};

use crate::Db;
use crate::condition::Condition;
use ormline_core::{Cx, Error, FieldInfo, Record, Result, SchemaError, SchemaErrorKind};
use std::any::TypeId;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A typed entity the engine can persist.
pub trait Model: Sized + Send + Sync + 'static {
    /// Describe the model. Called once per type; the result is cached.
    fn describe() -> ModelDef;

    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> Result<Self>;
}

/// Lifecycle points a model can hook into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookKind {
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    AfterFind,
}

/// A lifecycle hook adapted to records.
///
/// The `Db` handed to a hook runs on the same connection as the operation
/// that triggered it, so nested writes join its transaction.
pub type Hook = Arc<dyn Fn(&mut Record, &Db, &Cx) -> Result<()> + Send + Sync>;

/// One-time description of a model type.
#[derive(Clone)]
pub struct ModelDef {
    pub name: &'static str,
    /// Explicit table name; derived from `name` by the naming strategy when unset
    pub table: Option<&'static str>,
    pub fields: Vec<FieldInfo>,
    pub relationships: Vec<RelationshipInfo>,
    /// Conditions every query on the model carries unless unscoped
    pub query_conditions: Vec<Condition>,
    hooks: BTreeMap<HookKind, Hook>,
}

impl ModelDef {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            table: None,
            fields: Vec::new(),
            relationships: Vec::new(),
            query_conditions: Vec::new(),
            hooks: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn table(mut self, table: &'static str) -> Self {
        self.table = Some(table);
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldInfo>) -> Self {
        self.fields.extend(fields);
        self
    }

    #[must_use]
    pub fn relationship(mut self, relationship: RelationshipInfo) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Add a condition to every query on this model.
    #[must_use]
    pub fn query_condition(mut self, condition: Condition) -> Self {
        self.query_conditions.push(condition);
        self
    }

    /// Register a typed hook. The record is converted to `M` before the call
    /// and field changes are copied back afterwards.
    #[must_use]
    pub fn hook<M, F>(mut self, kind: HookKind, f: F) -> Self
    where
        M: Model,
        F: Fn(&mut M, &Db, &Cx) -> Result<()> + Send + Sync + 'static,
    {
        let hook: Hook = Arc::new(move |record: &mut Record, db: &Db, cx: &Cx| {
            let mut model = M::from_record(record)?;
            f(&mut model, db, cx)?;
            record.assign_values(&model.to_record());
            Ok(())
        });
        self.hooks.insert(kind, hook);
        self
    }

    /// Register a hook that works on the record directly.
    #[must_use]
    pub fn record_hook<F>(mut self, kind: HookKind, f: F) -> Self
    where
        F: Fn(&mut Record, &Db, &Cx) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.insert(kind, Arc::new(f));
        self
    }
}

impl fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDef")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("relationships", &self.relationships)
            .field("query_conditions", &self.query_conditions.len())
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A handle on a model type that can be described on demand.
#[derive(Clone, Copy)]
pub struct SchemaRef {
    type_id: TypeId,
    type_name: &'static str,
    describe: fn() -> ModelDef,
}

impl SchemaRef {
    pub fn of<M: Model>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
            describe: M::describe,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn describe(&self) -> ModelDef {
        (self.describe)()
    }
}

impl PartialEq for SchemaRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for SchemaRef {}

impl fmt::Debug for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SchemaRef").field(&self.type_name).finish()
    }
}

/// A field with its resolved column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub column: String,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub has_default: bool,
    pub read_only: bool,
    pub auto_create_time: bool,
    pub auto_update_time: bool,
}

/// A model's fields, table and primary keys, without relationships.
#[derive(Debug, Clone)]
pub(crate) struct FieldSet {
    pub(crate) table: String,
    pub(crate) fields: Vec<Field>,
    pub(crate) primary: Vec<String>,
}

impl FieldSet {
    pub(crate) fn build(def: &ModelDef, naming: &dyn NamingStrategy) -> Result<Self> {
        if def.fields.is_empty() {
            return Err(schema_error(
                SchemaErrorKind::Invalid,
                def.name,
                "model declares no fields",
            ));
        }
        let table = def
            .table
            .map_or_else(|| naming.table_name(def.name), str::to_string);

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(def.fields.len());
        for info in &def.fields {
            if !seen.insert(info.name) {
                return Err(schema_error(
                    SchemaErrorKind::Invalid,
                    def.name,
                    format!("duplicate field {}", info.name),
                ));
            }
            fields.push(Field {
                name: info.name.to_string(),
                column: info
                    .column
                    .map_or_else(|| naming.column_name(&table, info.name), str::to_string),
                primary_key: info.primary_key,
                auto_increment: info.auto_increment,
                has_default: info.has_default,
                read_only: info.read_only,
                auto_create_time: info.auto_create_time || info.name == "CreatedAt",
                auto_update_time: info.auto_update_time || info.name == "UpdatedAt",
            });
        }

        // A field named ID is the primary key when none is declared.
        if !fields.iter().any(|f| f.primary_key) {
            if let Some(id) = fields.iter_mut().find(|f| f.name == "ID") {
                id.primary_key = true;
            }
        }
        let primary = fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name.clone())
            .collect();

        Ok(Self {
            table,
            fields,
            primary,
        })
    }

    pub(crate) fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub(crate) fn field_ref(&self, model: &str, name: &str) -> Result<FieldRef> {
        self.field(name).map(FieldRef::from).ok_or_else(|| {
            schema_error(
                SchemaErrorKind::MissingField,
                model,
                format!("relationship key {name} is not a field of {model}"),
            )
        })
    }

    pub(crate) fn primary_refs(&self) -> Vec<FieldRef> {
        self.primary
            .iter()
            .filter_map(|name| self.field(name))
            .map(FieldRef::from)
            .collect()
    }
}

pub(crate) fn schema_error(
    kind: SchemaErrorKind,
    model: &str,
    message: impl Into<String>,
) -> Error {
    Error::Schema(SchemaError {
        kind,
        model: model.to_string(),
        message: message.into(),
    })
}

/// The parsed, immutable description of a model.
#[derive(Clone)]
pub struct Schema {
    pub name: String,
    pub table: String,
    pub model: SchemaRef,
    pub fields: Vec<Field>,
    /// Primary key field names, in declaration order
    pub primary_fields: Vec<String>,
    /// Relationships in declaration order
    pub relationships: Vec<Relationship>,
    pub query_conditions: Vec<Condition>,
    hooks: BTreeMap<HookKind, Hook>,
}

impl Schema {
    pub(crate) fn parse(model: &SchemaRef, naming: &dyn NamingStrategy) -> Result<Self> {
        let def = model.describe();
        let own = FieldSet::build(&def, naming)?;
        let relationships = def
            .relationships
            .iter()
            .map(|info| Relationship::resolve(&def, &own, model, info, naming))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: def.name.to_string(),
            table: own.table,
            model: *model,
            fields: own.fields,
            primary_fields: own.primary,
            relationships,
            query_conditions: def.query_conditions,
            hooks: def.hooks,
        })
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_column(&self, column: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.column == column)
    }

    /// Find a field by name, falling back to its column name.
    pub fn lookup(&self, name: &str) -> Option<&Field> {
        self.field(name).or_else(|| self.field_by_column(name))
    }

    pub fn primary_fields(&self) -> impl Iterator<Item = &Field> {
        self.primary_fields.iter().filter_map(|name| self.field(name))
    }

    /// The primary key used where a single key column is needed.
    pub fn prioritized_primary_field(&self) -> Option<&Field> {
        self.primary_fields().next()
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn hook(&self, kind: HookKind) -> Option<&Hook> {
        self.hooks.get(&kind)
    }

    pub fn has_hook(&self, kind: HookKind) -> bool {
        self.hooks.contains_key(&kind)
    }

    /// Whether every primary key of `record` is zero.
    pub fn primary_key_is_zero(&self, record: &Record) -> bool {
        self.primary_fields().all(|f| record.is_zero(&f.name))
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("primary_fields", &self.primary_fields)
            .field("relationships", &self.relationships)
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}
