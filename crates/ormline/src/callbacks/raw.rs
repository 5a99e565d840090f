use super::Scope;
use ormline_core::Error;

/// Execute the statement's SQL as given.
pub fn raw(scope: &mut Scope<'_>) {
    if scope.statement.sql.is_empty() {
        scope.add_error(Error::Custom("raw statement has no SQL".into()));
        return;
    }
    if scope.config.dry_run {
        return;
    }
    match scope.exec() {
        Ok(result) => scope.statement.rows_affected = result.rows_affected,
        Err(e) => scope.add_error(e),
    }
}
