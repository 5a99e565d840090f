use super::Scope;
use crate::schema::HookKind;

/// Call the model's `kind` hook on every record of the destination. Stops at
/// the first failing record.
fn call_hooks(scope: &mut Scope<'_>, kind: HookKind) {
    if scope.config.skip_hooks {
        return;
    }
    let Some(schema) = scope.statement.schema.clone() else {
        return;
    };
    let Some(hook) = schema.hook(kind) else {
        return;
    };

    let handle = scope.handle();
    let cx = scope.cx;
    let mut failed = None;
    for record in scope.statement.dest.records_mut() {
        if let Err(e) = hook(record, &handle, cx) {
            failed = Some(e);
            break;
        }
    }
    if let Some(e) = failed {
        tracing::debug!(model = %schema.name, hook = ?kind, error = %e, "Hook failed");
        scope.add_error(e);
    }
}

pub fn before_create(scope: &mut Scope<'_>) {
    call_hooks(scope, HookKind::BeforeCreate);
}

pub fn after_create(scope: &mut Scope<'_>) {
    call_hooks(scope, HookKind::AfterCreate);
}

pub fn before_update(scope: &mut Scope<'_>) {
    call_hooks(scope, HookKind::BeforeUpdate);
}

pub fn after_update(scope: &mut Scope<'_>) {
    call_hooks(scope, HookKind::AfterUpdate);
}

pub fn before_delete(scope: &mut Scope<'_>) {
    call_hooks(scope, HookKind::BeforeDelete);
}

pub fn after_delete(scope: &mut Scope<'_>) {
    call_hooks(scope, HookKind::AfterDelete);
}

pub fn after_query(scope: &mut Scope<'_>) {
    if scope.config.dry_run {
        return;
    }
    call_hooks(scope, HookKind::AfterFind);
}
