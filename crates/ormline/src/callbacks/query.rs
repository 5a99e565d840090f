use super::Scope;
use crate::statement::Dest;
use crate::{composer, preload as preloader, scan};

/// Compose the SELECT unless SQL is already set. The model's default
/// conditions are added first unless the statement is unscoped.
fn compose(scope: &mut Scope<'_>) -> bool {
    if !scope.statement.sql.is_empty() {
        return true;
    }
    if !scope.statement.unscoped {
        if let Some(schema) = scope.statement.schema.clone() {
            scope.statement.add_conditions(schema.query_conditions.clone());
        }
    }
    match composer::build_query_sql(scope.statement, scope.dialect()) {
        Ok(composed) => {
            scope.statement.sql = composed.sql;
            scope.statement.vars = composed.vars;
            true
        }
        Err(e) => {
            scope.add_error(e);
            false
        }
    }
}

/// Run the SELECT and decode its rows into the destination.
pub fn query(scope: &mut Scope<'_>) {
    if !compose(scope) || scope.config.dry_run {
        return;
    }
    match scope.query_rows() {
        Ok(rows) => scan::scan_rows(scope.statement, rows),
        Err(e) => scope.add_error(e),
    }
}

/// Run the SELECT and keep the rows undecoded.
pub fn row(scope: &mut Scope<'_>) {
    if !compose(scope) || scope.config.dry_run {
        return;
    }
    match scope.query_rows() {
        Ok(rows) => {
            scope.statement.rows_affected = rows.len() as u64;
            scope.statement.dest = Dest::Rows(rows);
        }
        Err(e) => scope.add_error(e),
    }
}

/// Load requested associations into the records just queried.
pub fn preload(scope: &mut Scope<'_>) {
    if scope.config.dry_run || scope.statement.preloads.is_empty() {
        return;
    }
    preloader::preload(scope);
}
