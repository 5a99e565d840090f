use super::Scope;
use crate::statement::Statement;
use crate::{composer, scan};
use ormline_core::Value;
use ormline_query::{ClauseKind, Operand};

/// UPDATE the statement's assignments.
///
/// With a RETURNING clause the returned rows are decoded back into the
/// destination.
pub fn update(scope: &mut Scope<'_>) {
    if scope.statement.sql.is_empty() {
        if !scope.statement.updating_column {
            stamp_update_time(scope.statement, &scope.config.now_func.now());
        }
        match composer::build_update_sql(
            scope.statement,
            scope.dialect(),
            scope.config.allow_global_update,
        ) {
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

    if scope.statement.clauses.contains(ClauseKind::Returning) {
        match scope.query_rows() {
            Ok(rows) => scan::scan_rows(scope.statement, rows),
            Err(e) => scope.add_error(e),
        }
        return;
    }
    match scope.exec() {
        Ok(result) => scope.statement.rows_affected = result.rows_affected,
        Err(e) => scope.add_error(e),
    }
}

/// Assign the current time to update-time fields the statement does not
/// already set, and copy it into the destination.
fn stamp_update_time(stmt: &mut Statement, now: &Value) {
    let Some(schema) = stmt.schema.clone() else {
        return;
    };
    for field in schema.fields.iter().filter(|f| f.auto_update_time) {
        if composer::names_field(&stmt.omits, field)
            || stmt.update_values.iter().any(|(name, _)| *name == field.name)
        {
            continue;
        }
        stmt.update_values.push((field.name.clone(), Operand::Value(now.clone())));
        for record in stmt.dest.records_mut() {
            record.set(field.name.clone(), now.clone());
        }
    }
}
