//! Relationship metadata.
//!
//! Relationships are declared on a [`ModelDef`] as [`RelationshipInfo`] and
//! resolved into a [`Relationship`] when the owning schema is parsed. The
//! resolved form names concrete fields and columns on both sides, so the
//! composer and preloader never look at the declaration again.

use super::naming::singularize;
use super::{Field, FieldSet, Model, ModelDef, NamingStrategy, SchemaRef, schema_error};
use ormline_core::{Result, SchemaErrorKind, Value};

/// The type of relationship between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// The owner holds the foreign key: many `User`s belong to one `Company`.
    BelongsTo,
    /// The target holds the foreign key: a `User` has one `Account`.
    HasOne,
    /// The target holds the foreign key: a `User` has many `Pet`s.
    HasMany,
    /// Both sides are linked through a join table.
    ManyToMany,
}

/// Join table layout for many-to-many relationships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTableInfo {
    pub table: &'static str,
    /// Columns pointing at the owner's primary keys; derived when empty
    pub owner_columns: Vec<&'static str>,
    /// Columns pointing at the target's primary keys; derived when empty
    pub target_columns: Vec<&'static str>,
}

/// A relationship as declared on a model.
#[derive(Debug, Clone)]
pub struct RelationshipInfo {
    /// Name of the relationship field
    pub name: &'static str,
    pub kind: RelationshipKind,
    pub target: SchemaRef,
    /// Foreign key fields: on the owner for belongs-to, on the target for
    /// has-one/has-many, and the referenced owner fields for many-to-many
    pub foreign_keys: Vec<&'static str>,
    /// Fields the foreign keys point at
    pub references: Vec<&'static str>,
    /// Polymorphic prefix: `Owner` means `OwnerID` and `OwnerType` on the target
    pub polymorphic: Option<&'static str>,
    /// Value stored in the polymorphic type column; the owner's table by default
    pub polymorphic_value: Option<&'static str>,
    pub join_table: Option<JoinTableInfo>,
}

impl RelationshipInfo {
    fn new<T: Model>(name: &'static str, kind: RelationshipKind) -> Self {
        Self {
            name,
            kind,
            target: SchemaRef::of::<T>(),
            foreign_keys: Vec::new(),
            references: Vec::new(),
            polymorphic: None,
            polymorphic_value: None,
            join_table: None,
        }
    }

    pub fn belongs_to<T: Model>(name: &'static str) -> Self {
        Self::new::<T>(name, RelationshipKind::BelongsTo)
    }

    pub fn has_one<T: Model>(name: &'static str) -> Self {
        Self::new::<T>(name, RelationshipKind::HasOne)
    }

    pub fn has_many<T: Model>(name: &'static str) -> Self {
        Self::new::<T>(name, RelationshipKind::HasMany)
    }

    pub fn many_to_many<T: Model>(name: &'static str, join_table: &'static str) -> Self {
        let mut info = Self::new::<T>(name, RelationshipKind::ManyToMany);
        info.join_table = Some(JoinTableInfo {
            table: join_table,
            owner_columns: Vec::new(),
            target_columns: Vec::new(),
        });
        info
    }

    #[must_use]
    pub fn foreign_keys(mut self, keys: &[&'static str]) -> Self {
        self.foreign_keys = keys.to_vec();
        self
    }

    #[must_use]
    pub fn references(mut self, keys: &[&'static str]) -> Self {
        self.references = keys.to_vec();
        self
    }

    #[must_use]
    pub fn polymorphic(mut self, prefix: &'static str) -> Self {
        self.polymorphic = Some(prefix);
        self
    }

    #[must_use]
    pub fn polymorphic_value(mut self, value: &'static str) -> Self {
        self.polymorphic_value = Some(value);
        self
    }

    /// Override the join table's column names.
    #[must_use]
    pub fn join_columns(mut self, owner: &[&'static str], target: &[&'static str]) -> Self {
        if let Some(join) = &mut self.join_table {
            join.owner_columns = owner.to_vec();
            join.target_columns = target.to_vec();
        }
        self
    }
}

/// A field name together with its column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub field: String,
    pub column: String,
}

impl From<&Field> for FieldRef {
    fn from(field: &Field) -> Self {
        Self {
            field: field.name.clone(),
            column: field.column.clone(),
        }
    }
}

/// One key pair of a relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// The referenced key; `None` when the foreign key is pinned to a value
    pub primary_key: Option<FieldRef>,
    pub foreign_key: FieldRef,
    /// True when the primary key lives on the owner and the foreign key on
    /// the target
    pub own_primary_key: bool,
    /// Literal the foreign key must equal (polymorphic type column)
    pub primary_value: Option<Value>,
}

/// A join table column and the primary key it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinKey {
    pub column: String,
    pub references: FieldRef,
}

/// A resolved many-to-many join table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    pub table: String,
    pub owner_keys: Vec<JoinKey>,
    pub target_keys: Vec<JoinKey>,
}

/// A relationship resolved against both models' fields.
#[derive(Debug, Clone)]
pub struct Relationship {
    pub name: String,
    pub kind: RelationshipKind,
    pub target: SchemaRef,
    pub target_table: String,
    /// The target's fields, used for joined selects and scanning
    pub target_fields: Vec<Field>,
    pub references: Vec<Reference>,
    pub join_table: Option<JoinTable>,
}

impl Relationship {
    pub(crate) fn resolve(
        owner_def: &ModelDef,
        owner: &FieldSet,
        owner_ref: &SchemaRef,
        info: &RelationshipInfo,
        naming: &dyn NamingStrategy,
    ) -> Result<Self> {
        let target_def = info.target.describe();
        let target = FieldSet::build(&target_def, naming)?;
        let owner_name = owner_def.name;

        let mut join_table = None;
        let references = match info.kind {
            RelationshipKind::BelongsTo => {
                let targets = pick_or_primary(&target, target_def.name, &info.references)?;
                let locals = if info.foreign_keys.is_empty() {
                    targets
                        .iter()
                        .map(|pk| {
                            owner.field_ref(owner_name, &format!("{}{}", info.name, pk.field))
                        })
                        .collect::<Result<Vec<_>>>()?
                } else {
                    info.foreign_keys
                        .iter()
                        .map(|k| owner.field_ref(owner_name, k))
                        .collect::<Result<Vec<_>>>()?
                };
                pair_up(owner_name, info.name, targets, locals, false)?
            }
            RelationshipKind::HasOne | RelationshipKind::HasMany => {
                let owner_keys = pick_or_primary(owner, owner_name, &info.references)?;
                match info.polymorphic {
                    Some(prefix) => {
                        let pk = owner_keys.into_iter().next().ok_or_else(|| {
                            schema_error(
                                SchemaErrorKind::MissingField,
                                owner_name,
                                "no primary key",
                            )
                        })?;
                        let id = target.field_ref(target_def.name, &format!("{prefix}ID"))?;
                        let kind = target.field_ref(target_def.name, &format!("{prefix}Type"))?;
                        let value = info
                            .polymorphic_value
                            .map_or_else(|| owner.table.clone(), str::to_string);
                        vec![
                            Reference {
                                primary_key: Some(pk),
                                foreign_key: id,
                                own_primary_key: true,
                                primary_value: None,
                            },
                            Reference {
                                primary_key: None,
                                foreign_key: kind,
                                own_primary_key: false,
                                primary_value: Some(Value::Text(value)),
                            },
                        ]
                    }
                    None => {
                        let foreign = if info.foreign_keys.is_empty() {
                            owner_keys
                                .iter()
                                .map(|pk| {
                                    target.field_ref(
                                        target_def.name,
                                        &format!("{owner_name}{}", pk.field),
                                    )
                                })
                                .collect::<Result<Vec<_>>>()?
                        } else {
                            info.foreign_keys
                                .iter()
                                .map(|k| target.field_ref(target_def.name, k))
                                .collect::<Result<Vec<_>>>()?
                        };
                        pair_up(owner_name, info.name, owner_keys, foreign, true)?
                    }
                }
            }
            RelationshipKind::ManyToMany => {
                let decl = info.join_table.as_ref().ok_or_else(|| {
                    schema_error(
                        SchemaErrorKind::InvalidJoinTable,
                        owner_name,
                        format!("{}: many-to-many requires a join table", info.name),
                    )
                })?;
                if decl.table.is_empty() {
                    return Err(schema_error(
                        SchemaErrorKind::InvalidJoinTable,
                        owner_name,
                        format!("{}: empty join table name", info.name),
                    ));
                }
                let owner_keys = pick_or_primary(owner, owner_name, &info.foreign_keys)?;
                let target_keys = pick_or_primary(&target, target_def.name, &info.references)?;
                let self_referential = info.target == *owner_ref;
                let target_prefix = if self_referential {
                    singularize(info.name)
                } else {
                    target_def.name.to_string()
                };

                let owner_join = join_keys(
                    owner_name,
                    info.name,
                    owner_keys,
                    &decl.owner_columns,
                    |pk| naming.join_table_column(owner_name, &pk.column),
                )?;
                let target_join = join_keys(
                    owner_name,
                    info.name,
                    target_keys,
                    &decl.target_columns,
                    |pk| naming.join_table_column(&target_prefix, &pk.column),
                )?;
                join_table = Some(JoinTable {
                    table: decl.table.to_string(),
                    owner_keys: owner_join,
                    target_keys: target_join,
                });
                Vec::new()
            }
        };

        Ok(Self {
            name: info.name.to_string(),
            kind: info.kind,
            target: info.target,
            target_table: target.table,
            target_fields: target.fields,
            references,
            join_table,
        })
    }

    pub fn is_many(&self) -> bool {
        matches!(
            self.kind,
            RelationshipKind::HasMany | RelationshipKind::ManyToMany
        )
    }

    pub fn target_field(&self, name: &str) -> Option<&Field> {
        self.target_fields.iter().find(|f| f.name == name)
    }

    pub fn target_field_by_column(&self, column: &str) -> Option<&Field> {
        self.target_fields.iter().find(|f| f.column == column)
    }

    pub fn target_columns(&self) -> impl Iterator<Item = &str> {
        self.target_fields.iter().map(|f| f.column.as_str())
    }

    pub fn target_primary_fields(&self) -> impl Iterator<Item = &Field> {
        self.target_fields.iter().filter(|f| f.primary_key)
    }

    /// (owner field, target field) pairs used to match records, and the
    /// pinned (target field, value) pairs the target must also satisfy.
    pub fn key_pairs(&self) -> (Vec<(String, String)>, Vec<(FieldRef, Value)>) {
        let mut pairs = Vec::new();
        let mut pinned = Vec::new();
        for r in &self.references {
            match (&r.primary_key, &r.primary_value) {
                (_, Some(value)) => pinned.push((r.foreign_key.clone(), value.clone())),
                (Some(pk), None) if r.own_primary_key => {
                    pairs.push((pk.field.clone(), r.foreign_key.field.clone()));
                }
                (Some(pk), None) => pairs.push((r.foreign_key.field.clone(), pk.field.clone())),
                (None, None) => {}
            }
        }
        (pairs, pinned)
    }
}

fn pick_or_primary(set: &FieldSet, model: &str, names: &[&'static str]) -> Result<Vec<FieldRef>> {
    if names.is_empty() {
        let primary = set.primary_refs();
        if primary.is_empty() {
            return Err(schema_error(
                SchemaErrorKind::MissingField,
                model,
                "relationship needs a primary key to reference",
            ));
        }
        return Ok(primary);
    }
    names.iter().map(|n| set.field_ref(model, n)).collect()
}

fn pair_up(
    owner: &str,
    relation: &str,
    primary: Vec<FieldRef>,
    foreign: Vec<FieldRef>,
    own_primary_key: bool,
) -> Result<Vec<Reference>> {
    if primary.len() != foreign.len() {
        return Err(schema_error(
            SchemaErrorKind::MissingField,
            owner,
            format!(
                "{relation}: {} foreign keys for {} references",
                foreign.len(),
                primary.len()
            ),
        ));
    }
    Ok(primary
        .into_iter()
        .zip(foreign)
        .map(|(pk, fk)| Reference {
            primary_key: Some(pk),
            foreign_key: fk,
            own_primary_key,
            primary_value: None,
        })
        .collect())
}

fn join_keys(
    owner: &str,
    relation: &str,
    keys: Vec<FieldRef>,
    columns: &[&'static str],
    derive: impl Fn(&FieldRef) -> String,
) -> Result<Vec<JoinKey>> {
    if !columns.is_empty() && columns.len() != keys.len() {
        return Err(schema_error(
            SchemaErrorKind::InvalidJoinTable,
            owner,
            format!(
                "{relation}: {} join columns for {} keys",
                columns.len(),
                keys.len()
            ),
        ));
    }
    Ok(keys
        .into_iter()
        .enumerate()
        .map(|(i, key)| JoinKey {
            column: columns
                .get(i)
                .map_or_else(|| derive(&key), |c| (*c).to_string()),
            references: key,
        })
        .collect())
}
