//! Modify DN processing.

use super::{
    Stage, check_access, check_writability, complete_write, controls, hook_outcome,
    missing_entry, run_pre_operation_plugins, unexpected_request,
};
use crate::backend::{LockMode, TransactionMode, TransactionScope};
use crate::context::ServerContext;
use crate::dn::{Dn, Rdn};
use crate::error::{DirectoryError, ResultCode};
use crate::notify::ChangeRecord;
use crate::operation::{Operation, OperationRequest};
use crate::workflow::WorkflowElement;
use log::debug;

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

    let OperationRequest::ModifyDn(request) = op.request() else {
        return Err(unexpected_request(op));
    };
    let dn = Dn::parse(&request.dn)?;
    let new_rdn = Rdn::parse(&request.new_rdn)?;
    let new_superior = request
        .new_superior
        .as_deref()
        .map(Dn::parse)
        .transpose()?;
    let delete_old_rdn = request.delete_old_rdn;
    let Some(parent) = new_superior.clone().or_else(|| dn.parent()) else {
        return Err(DirectoryError::unwilling_to_perform("The root DSE cannot be renamed").into());
    };
    let new_dn = parent.child(new_rdn.clone());
    {
        let state = op.state_mut();
        state.entry_dn = Some(dn.clone());
        state.new_dn = Some(new_dn.clone());
        state.new_superior = new_superior.clone();
    }

    let scope = scope.insert(
        TransactionScope::open(backend, TransactionMode::ReadWrite, op.id()).await?,
    );
    let txn = scope.transaction();

    let verdict = ctx.replication().handle_conflict_resolution(op).await;
    hook_outcome(verdict, op)?;

    let Some(current) = backend.get_entry(txn, &dn, LockMode::Write).await? else {
        return Err(missing_entry(
            backend,
            txn,
            &dn,
            format!("Entry {} cannot be renamed because it does not exist", dn),
        )
        .await);
    };
    op.state_mut().entry = Some(current.clone());

    let target = ctx.registry().element_for_dn(&new_dn);
    if target.as_ref().is_none_or(|t| t.id() != element.id()) {
        return Err(DirectoryError::unwilling_to_perform(format!(
            "Entry {} cannot be renamed to {} because the new name belongs to a different backend",
            dn, new_dn
        ))
        .into());
    }
    if let Some(superior) = &new_superior {
        if superior.is_subordinate_or_equal(&dn) {
            return Err(DirectoryError::unwilling_to_perform(format!(
                "Entry {} cannot be moved below itself or one of its subordinates",
                dn
            ))
            .into());
        }
        if !backend.base_dns().contains(superior)
            && backend.get_entry(txn, superior, LockMode::Read).await?.is_none()
        {
            return Err(missing_entry(
                backend,
                txn,
                &new_dn,
                format!(
                    "Entry {} cannot be moved because the new superior {} does not exist",
                    dn, superior
                ),
            )
            .await);
        }
    }
    if new_dn != dn && backend.entry_exists(txn, &new_dn).await? {
        return Err(DirectoryError::new(
            ResultCode::EntryAlreadyExists,
            format!("Entry {} cannot be renamed to {} because that entry already exists", dn, new_dn),
        )
        .into());
    }

    let mut modified = current.clone();
    modified.set_dn(new_dn.clone());
    if delete_old_rdn {
        if let Some(old_rdn) = dn.rdn() {
            for ava in old_rdn.avas() {
                let kept = new_rdn.avas().iter().any(|new| {
                    ctx.schema().same_attribute(new.attribute_type(), ava.attribute_type())
                        && crate::entry::values_match(new.value(), ava.value())
                });
                if !kept {
                    modified.remove_value(ava.attribute_type(), ava.value());
                }
            }
        }
    }
    for ava in new_rdn.avas() {
        if !op.is_internal()
            && !op.is_synchronization()
            && ctx.schema().is_no_user_modification(ava.attribute_type())
        {
            return Err(DirectoryError::unwilling_to_perform(format!(
                "Entry {} cannot be renamed because attribute {} in the new RDN is defined as NO-USER-MODIFICATION",
                dn,
                ava.attribute_type()
            ))
            .into());
        }
        let operational = ctx.schema().is_operational(ava.attribute_type());
        modified.add_value(ava.attribute_type(), ava.value(), operational);
    }

    if !op.is_synchronization() && ctx.config().check_schema {
        ctx.schema().validate_entry(&modified)?;
    }
    op.state_mut().modified_entry = Some(modified.clone());

    controls::process(ctx, backend, op, &dn, Some(&current)).await?;

    check_access(ctx, op, &dn).await?;

    if !op.is_synchronization() {
        run_pre_operation_plugins(ctx, op, pre_op_ran).await?;
    }

    check_writability(ctx, backend, op, &dn)?;

    if !op.is_no_op() && !op.is_synchronization() {
        let verdict = ctx.replication().do_pre_operation(op).await;
        hook_outcome(verdict, op)?;
    }

    if op.is_no_op() {
        op.result_mut().set(
            ResultCode::NoOperation,
            "The modify DN operation was not actually performed because the No-Op control was present",
        );
        return Ok(());
    }

    super::checkpoint(op)?;
    let modified = op.state().modified_entry.clone().unwrap_or(modified);
    backend.rename_entry(txn, &dn, &modified).await?;
    debug!("Renamed entry {} to {}", dn, modified.dn());
    op.result_mut().set(ResultCode::Success, "");
    op.queue_change(ChangeRecord::ModifyDn {
        old_entry: current,
        new_entry: modified,
    });
    Ok(())
}
