//! Delete processing.

use super::{
    Stage, check_access, check_writability, complete_write, controls, decode_target_dn,
    hook_outcome, missing_entry, run_pre_operation_plugins,
};
use crate::backend::{LockMode, TransactionMode, TransactionScope};
use crate::context::ServerContext;
use crate::error::{DirectoryError, ResultCode};
use crate::notify::ChangeRecord;
use crate::operation::Operation;
use crate::workflow::WorkflowElement;

pub(crate) async fn process(ctx: &ServerContext, element: &WorkflowElement, op: &mut Operation) {
    let mut scope = None;
    let mut pre_op_ran = false;
    let outcome = run(ctx, element, op, &mut scope, &mut pre_op_ran).await;
    complete_write(ctx, op, outcome, scope, pre_op_ran).await;
}

async fn run(
    ctx: &ServerContext,
    element: &WorkflowElement,
    op: &mut Operation,
    scope: &mut Option<TransactionScope>,
    pre_op_ran: &mut bool,
) -> Stage {
    super::checkpoint(op)?;
    let backend = element.backend();

    let dn = decode_target_dn(op)?;
    if dn.is_root() {
        return Err(DirectoryError::unwilling_to_perform("The root DSE cannot be deleted").into());
    }
    op.state_mut().entry_dn = Some(dn.clone());

    let scope = scope.insert(
        TransactionScope::open(backend, TransactionMode::ReadWrite, op.id()).await?,
    );
    let txn = scope.transaction();

    let verdict = ctx.replication().handle_conflict_resolution(op).await;
    hook_outcome(verdict, op)?;

    let Some(entry) = backend.get_entry(txn, &dn, LockMode::Write).await? else {
        return Err(missing_entry(
            backend,
            txn,
            &dn,
            format!("Entry {} cannot be deleted because it does not exist", dn),
        )
        .await);
    };
    op.state_mut().entry = Some(entry.clone());

    let requested = controls::process(ctx, backend, op, &dn, Some(&entry)).await?;

    check_access(ctx, op, &dn).await?;

    if !op.is_synchronization() {
        run_pre_operation_plugins(ctx, op, pre_op_ran).await?;
    }

    check_writability(ctx, backend, op, &dn)?;

    let not_leaf = || {
        DirectoryError::new(
            ResultCode::NotAllowedOnNonLeaf,
            format!("Entry {} cannot be deleted because it has subordinate entries", dn),
        )
    };
    let subordinate_backend = ctx
        .registry()
        .subordinate_elements(element)
        .into_iter()
        .any(|sub| {
            sub.backend()
                .base_dns()
                .iter()
                .any(|base| base.is_subordinate_or_equal(&dn))
        });
    if subordinate_backend {
        return Err(not_leaf().into());
    }
    if !requested.subtree_delete && backend.has_subordinates(txn, &dn).await? {
        return Err(not_leaf().into());
    }

    if !op.is_no_op() && !op.is_synchronization() {
        let verdict = ctx.replication().do_pre_operation(op).await;
        hook_outcome(verdict, op)?;
    }

    if op.is_no_op() {
        op.result_mut().set(
            ResultCode::NoOperation,
            "The delete operation was not actually performed because the No-Op control was present",
        );
        return Ok(());
    }

    super::checkpoint(op)?;
    backend
        .delete_entry(txn, &dn, requested.subtree_delete)
        .await?;
    op.result_mut().set(ResultCode::Success, "");
    op.queue_change(ChangeRecord::Delete { entry });
    Ok(())
}
