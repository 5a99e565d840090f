use super::Scope;
use ormline_core::outcome_to_result;
use std::sync::Arc;

/// Open the operation's default transaction, or join the one in flight.
pub fn begin_transaction(scope: &mut Scope<'_>) {
    if scope.statement.conn.in_transaction() {
        tracing::trace!("Reusing open transaction");
        return;
    }
    match outcome_to_result(scope.statement.conn.begin(scope.cx)) {
        Ok(tx) => {
            tracing::debug!(table = %scope.statement.table, "Began default transaction");
            scope.statement.conn = tx;
            scope.statement.started_transaction = true;
        }
        Err(e) => scope.add_error(e),
    }
}

/// Commit when every earlier step succeeded, roll back otherwise.
///
/// Registered to run even after an error. A failure here is chained after
/// the error that caused the rollback.
pub fn commit_or_rollback_transaction(scope: &mut Scope<'_>) {
    if !scope.statement.started_transaction {
        return;
    }
    scope.statement.started_transaction = false;
    let conn = Arc::clone(&scope.statement.conn);

    let result = if scope.statement.has_error() {
        tracing::debug!(table = %scope.statement.table, "Rolling back default transaction");
        outcome_to_result(conn.rollback(scope.cx))
    } else {
        tracing::debug!(table = %scope.statement.table, "Committing default transaction");
        outcome_to_result(conn.commit(scope.cx))
    };
    if let Err(e) = result {
        scope.add_error(e);
    }
}
