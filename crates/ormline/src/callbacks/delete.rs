use super::Scope;
use crate::composer;

pub fn delete(scope: &mut Scope<'_>) {
    if scope.statement.sql.is_empty() {
        match composer::build_delete_sql(
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
    match scope.exec() {
        Ok(result) => scope.statement.rows_affected = result.rows_affected,
        Err(e) => scope.add_error(e),
    }
}
