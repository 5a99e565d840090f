use super::Scope;
use crate::composer;
use crate::schema::Schema;
use crate::statement::Statement;
use ormline_core::{Error, Record, Row, Value};
use ormline_query::ClauseKind;

/// INSERT the destination records and assign generated keys.
pub fn create(scope: &mut Scope<'_>) {
    let Some(schema) = scope.statement.schema.clone() else {
        scope.add_error(Error::Custom(format!(
            "{}: create needs a model",
            scope.statement.table
        )));
        return;
    };
    let dialect = scope.dialect();
    let returning = scope.statement.clauses.contains(ClauseKind::Returning)
        || composer::returned_primary_key(&schema, dialect, &scope.config.create).is_some();

    if scope.statement.sql.is_empty() {
        stamp_times(scope.statement, &schema, &scope.config.now_func.now());
        match composer::build_create_sql(scope.statement, dialect, &scope.config.create) {
            Ok(composed) => {
                scope.statement.sql = composed.sql;
                scope.statement.vars = composed.vars;
            }
            Err(e) => {
                scope.add_error(e);
                return;
            }
        }
    }
    if scope.config.dry_run {
        return;
    }

    if returning {
        match scope.query_rows() {
            Ok(rows) => {
                scope.statement.rows_affected = rows.len() as u64;
                assign_returned(&schema, scope.statement.dest.records_mut(), &rows);
            }
            Err(e) => scope.add_error(e),
        }
        return;
    }

    match scope.exec() {
        Ok(result) => {
            scope.statement.rows_affected = result.rows_affected;
            if let Some(id) = result.last_insert_id {
                assign_last_insert_id(
                    &schema,
                    scope.statement.dest.records_mut(),
                    id,
                    scope.config.create.last_insert_id_reversed,
                );
            }
        }
        Err(e) => scope.add_error(e),
    }
}

/// Fill zero creation and update times of the fields being written.
fn stamp_times(stmt: &mut Statement, schema: &Schema, now: &Value) {
    let fields: Vec<&str> = schema
        .fields
        .iter()
        .filter(|f| f.auto_create_time || f.auto_update_time)
        .filter(|f| stmt.selects.is_empty() || composer::names_field(&stmt.selects, f))
        .filter(|f| !composer::names_field(&stmt.omits, f))
        .map(|f| f.name.as_str())
        .collect();
    for record in stmt.dest.records_mut() {
        for name in &fields {
            if record.is_zero(name) {
                record.set(*name, now.clone());
            }
        }
    }
}

/// Copy RETURNING rows back into the records, in order.
fn assign_returned(schema: &Schema, records: &mut [Record], rows: &[Row]) {
    for (record, row) in records.iter_mut().zip(rows) {
        for (column, value) in row.iter() {
            if let Some(field) = schema.field_by_column(column) {
                record.set(field.name.clone(), value.clone());
            }
        }
    }
}

/// Give consecutive ids to the records whose auto-increment key is zero.
///
/// `id` is the first generated id, or the last one when the driver reports
/// it that way.
fn assign_last_insert_id(schema: &Schema, records: &mut [Record], id: i64, reversed: bool) {
    let Some(pk) = schema
        .prioritized_primary_field()
        .filter(|f| f.auto_increment)
    else {
        return;
    };
    let mut next = id;
    let mut assign = |record: &mut Record| {
        if record.is_zero(&pk.name) {
            record.set(pk.name.clone(), Value::BigInt(next));
            next = if reversed { next - 1 } else { next + 1 };
        }
    };
    if reversed {
        records.iter_mut().rev().for_each(&mut assign);
    } else {
        records.iter_mut().for_each(&mut assign);
    }
}
