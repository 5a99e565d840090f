//! Eager loading of associations.
//!
//! Requested paths expand to every prefix (`"Pets.Toys"` also loads
//! `"Pets"`) and run in lexicographic order, which puts each parent path
//! before its children. Every path costs one query against its target
//! table (two for many-to-many), filtered by the keys gathered from the
//! records the parent path loaded. Results are spliced into the parents by
//! key equality.
//!
//! A path that cannot be resolved or loaded records its error and skips its
//! own subtree; sibling paths still run.

use crate::callbacks::Scope;
use crate::condition::Condition;
use crate::db::Db;
use crate::schema::{Relationship, RelationshipKind, Schema, schema_error};
use ormline_core::{
    Cx, Error, Record, Related, Result, Row, SchemaErrorKind, Value, ValueKey,
};
use ormline_query::{Column, Expr};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Preload every direct relationship of the root model.
pub const ASSOCIATIONS: &str = "*";

/// Expand requested paths into the full, ordered set of paths to load.
///
/// Extra conditions stay attached to the exact path they were given for;
/// conditions given with [`ASSOCIATIONS`] apply to every root relationship.
pub fn expand_paths(
    schema: &Schema,
    requested: &BTreeMap<String, Vec<Condition>>,
) -> BTreeMap<String, Vec<Condition>> {
    let mut paths: BTreeMap<String, Vec<Condition>> = BTreeMap::new();
    for (path, conditions) in requested {
        if path == ASSOCIATIONS {
            for rel in &schema.relationships {
                paths
                    .entry(rel.name.clone())
                    .or_default()
                    .extend(conditions.iter().cloned());
            }
            continue;
        }
        let segments: Vec<&str> = path.split('.').collect();
        for depth in 1..segments.len() {
            paths.entry(segments[..depth].join(".")).or_default();
        }
        paths
            .entry(path.clone())
            .or_default()
            .extend(conditions.iter().cloned());
    }
    paths
}

/// Whether `path` lies below `parent`.
fn is_below(path: &str, parent: &str) -> bool {
    path.len() > parent.len() && path.starts_with(parent) && path[parent.len()..].starts_with('.')
}

/// Walk `path` from `root`. Returns the relationship at its end.
fn resolve(scope: &Scope<'_>, root: &Arc<Schema>, path: &str) -> Result<Relationship> {
    let mut schema = Arc::clone(root);
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let rel = schema
            .relationship(segment)
            .ok_or_else(|| Error::relation_not_found(path))?;
        if segments.peek().is_none() {
            return Ok(rel.clone());
        }
        let target = rel.target;
        schema = scope.schema_of(&target)?;
    }
    Err(Error::relation_not_found(path))
}

pub(crate) fn preload(scope: &mut Scope<'_>) {
    let Some(root) = scope.statement.schema.clone() else {
        scope.add_error(Error::Custom(format!(
            "{}: preload needs a model",
            scope.statement.table
        )));
        return;
    };
    let paths = expand_paths(&root, &scope.statement.preloads);
    let handle = scope.handle();
    let cx = scope.cx;
    let mut failed: Vec<&str> = Vec::new();

    for (path, conditions) in &paths {
        if failed.iter().any(|f| is_below(path, f)) {
            tracing::debug!(path = %path, "Skipping preload below a failed path");
            continue;
        }
        let result = resolve(scope, &root, path).and_then(|rel| {
            let parent_path: Vec<&str> = match path.rsplit_once('.') {
                Some((parent, _)) => parent.split('.').collect(),
                None => Vec::new(),
            };
            let mut parents: Vec<&mut Record> =
                scope.statement.dest.records_mut().iter_mut().collect();
            for segment in parent_path {
                parents = descend(parents, segment);
            }
            match rel.kind {
                RelationshipKind::ManyToMany => {
                    load_many_to_many(&handle, cx, &rel, conditions, parents)
                }
                _ => load_direct(&handle, cx, &rel, conditions, parents),
            }
        });
        if let Err(e) = result {
            tracing::debug!(path = %path, error = %e, "Preload failed");
            failed.push(path);
            scope.add_error(e);
        }
    }
}

/// The records held under `name` by each of `records`.
fn descend<'a>(records: Vec<&'a mut Record>, name: &str) -> Vec<&'a mut Record> {
    let mut out = Vec::new();
    for record in records {
        if let Some(related) = record.relation_mut(name) {
            out.extend(related.records_mut());
        }
    }
    out
}

/// Distinct non-zero keys of `records` over `fields`, as values.
fn gather_keys(records: &[&mut Record], fields: &[String]) -> Vec<Vec<Value>> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|record| {
            let key = record.key(fields)?;
            seen.insert(key)
                .then(|| fields.iter().map(|f| record.value(f).clone()).collect())
        })
        .collect()
}

/// `columns IN (keys)`, as a single column or a tuple.
fn key_condition(columns: &[String], keys: Vec<Vec<Value>>) -> Condition {
    if let [column] = columns {
        return Condition::in_list(column, keys.into_iter().flatten().collect());
    }
    Condition::from(Expr::in_tuples(
        columns.iter().map(Column::current).collect(),
        keys,
    ))
}

fn empty_relation(rel: &Relationship) -> Related {
    if rel.is_many() {
        Related::Many(Vec::new())
    } else {
        Related::One(None)
    }
}

fn matched_relation(rel: &Relationship, matches: Vec<Record>) -> Related {
    if rel.is_many() {
        Related::Many(matches)
    } else {
        Related::One(matches.into_iter().next().map(Box::new))
    }
}

fn reset(parents: &mut [&mut Record], rel: &Relationship) {
    for parent in parents.iter_mut() {
        parent.set_relation(rel.name.clone(), empty_relation(rel));
    }
}

/// belongs-to, has-one and has-many.
fn load_direct(
    handle: &Db,
    cx: &Cx,
    rel: &Relationship,
    conditions: &[Condition],
    mut parents: Vec<&mut Record>,
) -> Result<()> {
    let (pairs, pinned) = rel.key_pairs();
    let (owner_fields, target_fields): (Vec<String>, Vec<String>) = pairs.into_iter().unzip();
    let keys = gather_keys(&parents, &owner_fields);
    if keys.is_empty() {
        reset(&mut parents, rel);
        return Ok(());
    }

    let target_columns: Vec<String> = target_fields
        .iter()
        .map(|f| rel.target_field(f).map_or_else(|| f.clone(), |t| t.column.clone()))
        .collect();
    let key_count = keys.len();
    let mut filters = vec![key_condition(&target_columns, keys)];
    filters.extend(
        pinned
            .into_iter()
            .map(|(field, value)| Condition::eq(&field.column, value)),
    );
    filters.extend(conditions.iter().cloned());

    let children = handle.find_records(cx, rel.target, filters)?;
    tracing::debug!(
        relation = %rel.name,
        parents = parents.len(),
        keys = key_count,
        loaded = children.len(),
        "Preloaded association"
    );

    let mut by_key: HashMap<Vec<ValueKey>, Vec<Record>> = HashMap::new();
    for child in children {
        if let Some(key) = child.key(&target_fields) {
            by_key.entry(key).or_default().push(child);
        }
    }
    for parent in parents {
        let matches = parent
            .key(&owner_fields)
            .and_then(|key| by_key.get(&key))
            .cloned()
            .unwrap_or_default();
        parent.set_relation(rel.name.clone(), matched_relation(rel, matches));
    }
    Ok(())
}

/// Key and values of `row` over `columns`; `None` when a part is missing,
/// NULL or zero.
fn row_key(row: &Row, columns: &[String]) -> Option<(Vec<ValueKey>, Vec<Value>)> {
    let values: Vec<Value> = columns
        .iter()
        .map(|c| row.get_by_name(c).cloned())
        .collect::<Option<_>>()?;
    let key = values
        .iter()
        .map(|v| if v.is_zero() { None } else { v.to_key() })
        .collect::<Option<Vec<_>>>()?;
    Some((key, values))
}

/// many-to-many, bridged through the join table.
fn load_many_to_many(
    handle: &Db,
    cx: &Cx,
    rel: &Relationship,
    conditions: &[Condition],
    mut parents: Vec<&mut Record>,
) -> Result<()> {
    let join = rel.join_table.as_ref().ok_or_else(|| {
        schema_error(
            SchemaErrorKind::InvalidJoinTable,
            &rel.name,
            "many-to-many relationship has no join table",
        )
    })?;
    let owner_fields: Vec<String> = join
        .owner_keys
        .iter()
        .map(|k| k.references.field.clone())
        .collect();
    let owner_columns: Vec<String> = join.owner_keys.iter().map(|k| k.column.clone()).collect();
    let link_columns: Vec<String> = join.target_keys.iter().map(|k| k.column.clone()).collect();
    let target_fields: Vec<String> = join
        .target_keys
        .iter()
        .map(|k| k.references.field.clone())
        .collect();
    let target_columns: Vec<String> = join
        .target_keys
        .iter()
        .map(|k| k.references.column.clone())
        .collect();

    let keys = gather_keys(&parents, &owner_fields);
    if keys.is_empty() {
        reset(&mut parents, rel);
        return Ok(());
    }
    let links = handle
        .table(&join.table)
        .filter(key_condition(&owner_columns, keys))
        .rows(cx)?;

    let mut targets_of: HashMap<Vec<ValueKey>, Vec<Vec<ValueKey>>> = HashMap::new();
    let mut seen = HashSet::new();
    let mut target_keys = Vec::new();
    for link in &links {
        let (Some((owner, _)), Some((target, values))) =
            (row_key(link, &owner_columns), row_key(link, &link_columns))
        else {
            continue;
        };
        if seen.insert(target.clone()) {
            target_keys.push(values);
        }
        targets_of.entry(owner).or_default().push(target);
    }

    let children = if target_keys.is_empty() {
        Vec::new()
    } else {
        let mut filters = vec![key_condition(&target_columns, target_keys)];
        filters.extend(conditions.iter().cloned());
        handle.find_records(cx, rel.target, filters)?
    };
    tracing::debug!(
        relation = %rel.name,
        join_table = %join.table,
        links = links.len(),
        loaded = children.len(),
        "Preloaded many-to-many association"
    );

    let by_key: HashMap<Vec<ValueKey>, Record> = children
        .into_iter()
        .filter_map(|child| child.key(&target_fields).map(|key| (key, child)))
        .collect();
    for parent in parents {
        let matches: Vec<Record> = parent
            .key(&owner_fields)
            .and_then(|key| targets_of.get(&key))
            .map(|targets| targets.iter().filter_map(|t| by_key.get(t).cloned()).collect())
            .unwrap_or_default();
        parent.set_relation(rel.name.clone(), Related::Many(matches));
    }
    Ok(())
}
