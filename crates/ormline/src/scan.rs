//! Row decoding.
//!
//! Columns map to fields through the schema. A column aliased
//! `<Rel>__<column>` belongs to the joined relationship `Rel` and lands in
//! that relation of the decoded record.

use crate::composer::JOIN_ALIAS_SEPARATOR;
use crate::schema::Schema;
use crate::statement::{Dest, Statement};
use ormline_core::{Error, Record, Related, Row};
use std::collections::BTreeMap;

/// Decode one row. Without a schema, fields are named after columns.
pub fn decode_row(row: &Row, schema: Option<&Schema>) -> Record {
    let mut record = Record::new();
    let Some(schema) = schema else {
        for (column, value) in row.iter() {
            record.set(column, value.clone());
        }
        return record;
    };

    // relation name -> (record, saw a non-null value)
    let mut joined: BTreeMap<&str, (Record, bool)> = BTreeMap::new();
    for (column, value) in row.iter() {
        if let Some((name, target_column)) = column.split_once(JOIN_ALIAS_SEPARATOR) {
            if let Some(rel) = schema.relationship(name) {
                let field = rel
                    .target_field_by_column(target_column)
                    .map_or(target_column, |f| f.name.as_str());
                let entry = joined
                    .entry(rel.name.as_str())
                    .or_insert_with(|| (Record::new(), false));
                entry.0.set(field, value.clone());
                entry.1 |= !value.is_null();
                continue;
            }
        }
        match schema.field_by_column(column) {
            Some(field) => record.set(field.name.clone(), value.clone()),
            None => record.set(column, value.clone()),
        }
    }

    for (name, (related, present)) in joined {
        record.set_relation(name, Related::One(present.then(|| Box::new(related))));
    }
    record
}

/// Store query results in the statement's destination.
///
/// A batch destination is replaced; a single record is merged with the
/// first row.
pub fn scan_rows(stmt: &mut Statement, rows: Vec<Row>) {
    stmt.rows_affected = rows.len() as u64;
    if rows.is_empty() && stmt.raise_not_found {
        stmt.add_error(Error::RecordNotFound);
    }

    let schema = stmt.schema.clone();
    let schema = schema.as_deref();
    match &mut stmt.dest {
        Dest::Rows(existing) => *existing = rows,
        Dest::One(record) => {
            if let Some(row) = rows.first() {
                merge(record, decode_row(row, schema));
            }
        }
        Dest::Many(records) => {
            *records = rows.iter().map(|row| decode_row(row, schema)).collect();
        }
        Dest::None => {
            stmt.dest = Dest::Many(rows.iter().map(|row| decode_row(row, schema)).collect());
        }
    }
}

fn merge(record: &mut Record, decoded: Record) {
    record.assign_values(&decoded);
    let names: Vec<String> = decoded.relation_names().map(str::to_string).collect();
    for name in names {
        if let Some(related) = decoded.relation(&name) {
            record.set_relation(name.clone(), related.clone());
        }
    }
}
