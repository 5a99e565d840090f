//! Saving related records together with their owner.
//!
//! belongs-to targets are saved before the owner so their keys can be copied
//! into it. has-one, has-many and many-to-many are saved after, once the
//! owner's primary key is known. Every nested write goes through the create
//! pipeline of a nested handle on the same connection.

use super::Scope;
use crate::composer;
use crate::db::Db;
use crate::schema::{Relationship, RelationshipKind, Schema, schema_error};
use ormline_core::{
    Cx, Error, Record, Related, RelationError, RelationErrorKind, Result, SchemaErrorKind, Value,
};
use ormline_query::{Column, OnConflict};

/// The first related name a record carries that `schema` does not declare.
fn undeclared(schema: &Schema, records: &[Record]) -> Option<Error> {
    records
        .iter()
        .flat_map(Record::relation_names)
        .find(|name| schema.relationship(name).is_none())
        .map(|name| {
            Error::Relation(RelationError {
                kind: RelationErrorKind::Undeclared,
                relation: name.to_string(),
                message: format!("{}: {name} is not a declared relationship", schema.name),
            })
        })
}

fn is_new(rel: &Relationship, target: &Record) -> bool {
    rel.target_primary_fields().all(|f| target.is_zero(&f.name))
}

/// Related records at `(record, position)` pairs.
fn children_at(records: &[Record], name: &str, at: &[(usize, usize)]) -> Vec<Record> {
    at.iter()
        .filter_map(|&(i, j)| records[i].relation(name)?.records().nth(j).cloned())
        .collect()
}

fn put_back(records: &mut [Record], name: &str, at: &[(usize, usize)], saved: Vec<Record>) {
    for (&(i, j), child) in at.iter().zip(saved) {
        if let Some(slot) = records[i]
            .relation_mut(name)
            .and_then(|related| related.records_mut().nth(j))
        {
            *slot = child;
        }
    }
}

pub fn save_before_associations(scope: &mut Scope<'_>) {
    let Some(schema) = scope.statement.schema.clone() else {
        return;
    };
    if let Some(e) = undeclared(&schema, scope.statement.dest.records()) {
        scope.add_error(e);
        return;
    }

    let handle = scope.handle();
    let cx = scope.cx;
    for rel in &schema.relationships {
        if rel.kind != RelationshipKind::BelongsTo
            || !scope.statement.saves_association(&rel.name)
        {
            continue;
        }
        if let Err(e) = save_belongs_to(&handle, cx, rel, scope.statement.dest.records_mut()) {
            tracing::debug!(relation = %rel.name, error = %e, "Saving association failed");
            scope.add_error(e);
            return;
        }
    }
}

pub fn save_after_associations(scope: &mut Scope<'_>) {
    let Some(schema) = scope.statement.schema.clone() else {
        return;
    };

    let handle = scope.handle();
    let cx = scope.cx;
    for rel in &schema.relationships {
        if !scope.statement.saves_association(&rel.name) {
            continue;
        }
        let records = scope.statement.dest.records_mut();
        let result = match rel.kind {
            RelationshipKind::BelongsTo => Ok(()),
            RelationshipKind::HasOne | RelationshipKind::HasMany => {
                save_owned(&handle, cx, rel, records)
            }
            RelationshipKind::ManyToMany => save_many_to_many(&handle, cx, rel, records),
        };
        if let Err(e) = result {
            tracing::debug!(relation = %rel.name, error = %e, "Saving association failed");
            scope.add_error(e);
            return;
        }
    }
}

/// Create new belongs-to targets, then copy their keys into the owners.
fn save_belongs_to(handle: &Db, cx: &Cx, rel: &Relationship, records: &mut [Record]) -> Result<()> {
    let mut pending = Vec::new();
    let mut fresh = Vec::new();
    for (i, record) in records.iter().enumerate() {
        if let Some(target) = record.one(&rel.name) {
            if is_new(rel, target) {
                pending.push(i);
                fresh.push(target.clone());
            }
        }
    }
    if !fresh.is_empty() {
        let created = handle.create_records(cx, rel.target, fresh, None)?;
        for (i, target) in pending.into_iter().zip(created) {
            records[i].set_relation(rel.name.clone(), Related::One(Some(Box::new(target))));
        }
    }

    let (pairs, _) = rel.key_pairs();
    for record in records.iter_mut() {
        let Some(target) = record.one(&rel.name) else {
            continue;
        };
        let keys: Vec<(String, Value)> = pairs
            .iter()
            .map(|(local, referenced)| (local.clone(), target.value(referenced).clone()))
            .collect();
        for (field, value) in keys {
            record.set(field, value);
        }
    }
    Ok(())
}

/// Point has-one and has-many children at their owner and save them.
///
/// New children are created; existing ones are upserted so that only their
/// foreign keys change.
fn save_owned(handle: &Db, cx: &Cx, rel: &Relationship, records: &mut [Record]) -> Result<()> {
    let (pairs, pinned) = rel.key_pairs();
    let mut fresh = Vec::new();
    let mut existing = Vec::new();
    for (i, record) in records.iter_mut().enumerate() {
        let keys: Vec<(String, Value)> = pairs
            .iter()
            .map(|(owner, child)| (child.clone(), record.value(owner).clone()))
            .collect();
        let Some(related) = record.relation_mut(&rel.name) else {
            continue;
        };
        for (j, child) in related.records_mut().enumerate() {
            for (field, value) in &keys {
                child.set(field.clone(), value.clone());
            }
            for (field, value) in &pinned {
                child.set(field.field.clone(), value.clone());
            }
            if is_new(rel, child) {
                fresh.push((i, j));
            } else {
                existing.push((i, j));
            }
        }
    }

    if !fresh.is_empty() {
        let children = children_at(records, &rel.name, &fresh);
        let created = handle.create_records(cx, rel.target, children, None)?;
        put_back(records, &rel.name, &fresh, created);
    }
    if !existing.is_empty() {
        let key_columns = pairs
            .iter()
            .map(|(_, child)| child.as_str())
            .chain(pinned.iter().map(|(field, _)| field.field.as_str()))
            .filter_map(|name| rel.target_field(name))
            .map(|f| Column::new(&f.column))
            .collect();
        let on_conflict = OnConflict {
            columns: rel.target_primary_fields().map(|f| Column::new(&f.column)).collect(),
            do_updates: key_columns,
            ..OnConflict::default()
        };
        let saved = handle.create_records(
            cx,
            rel.target,
            children_at(records, &rel.name, &existing),
            Some(on_conflict),
        )?;
        put_back(records, &rel.name, &existing, saved);
    }
    Ok(())
}

/// Create new targets, then link every owner to its targets.
fn save_many_to_many(
    handle: &Db,
    cx: &Cx,
    rel: &Relationship,
    records: &mut [Record],
) -> Result<()> {
    let join = rel.join_table.as_ref().ok_or_else(|| {
        schema_error(
            SchemaErrorKind::InvalidJoinTable,
            &rel.name,
            "many-to-many relationship has no join table",
        )
    })?;

    let mut fresh = Vec::new();
    for (i, record) in records.iter().enumerate() {
        if let Some(related) = record.relation(&rel.name) {
            for (j, target) in related.records().enumerate() {
                if is_new(rel, target) {
                    fresh.push((i, j));
                }
            }
        }
    }
    if !fresh.is_empty() {
        let children = children_at(records, &rel.name, &fresh);
        let created = handle.create_records(cx, rel.target, children, None)?;
        put_back(records, &rel.name, &fresh, created);
    }

    let mut rows = Vec::new();
    for record in records.iter() {
        let Some(related) = record.relation(&rel.name) else {
            continue;
        };
        let owner: Vec<Value> = join
            .owner_keys
            .iter()
            .map(|k| record.value(&k.references.field).clone())
            .collect();
        for target in related.records() {
            let mut row = owner.clone();
            row.extend(
                join.target_keys
                    .iter()
                    .map(|k| target.value(&k.references.field).clone()),
            );
            rows.push(row);
        }
    }
    if rows.is_empty() {
        return Ok(());
    }
    tracing::debug!(
        relation = %rel.name,
        join_table = %join.table,
        links = rows.len(),
        "Linking association"
    );
    handle.exec_composed(cx, composer::build_join_rows_sql(handle.dialect(), join, rows))?;
    Ok(())
}
