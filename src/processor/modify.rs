//! Modify processing.

use super::add::{PRIVILEGE_ATTRIBUTE, apply_password_policy};
use super::{
    Stage, check_access, check_writability, complete_write, controls, hook_outcome,
    missing_entry, run_pre_operation_plugins, unexpected_request,
};
use crate::auth::{Privilege, password};
use crate::backend::{LockMode, TransactionMode, TransactionScope};
use crate::context::ServerContext;
use crate::dn::Dn;
use crate::entry::{Attribute, Entry, values_match};
use crate::error::{DirectoryError, ResultCode};
use crate::notify::ChangeRecord;
use crate::operation::{Modification, ModificationType, Operation, OperationRequest};
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

    let OperationRequest::Modify(request) = op.request() else {
        return Err(unexpected_request(op));
    };
    let dn = Dn::parse(&request.dn)?;
    let modifications = request.modifications.clone();
    if dn.is_root() {
        return Err(DirectoryError::unwilling_to_perform(
            "The root DSE cannot be modified by this server",
        )
        .into());
    }
    if modifications.is_empty() {
        return Err(DirectoryError::new(
            ResultCode::ConstraintViolation,
            format!("Entry {} cannot be modified because no modifications were provided", dn),
        )
        .into());
    }
    op.state_mut().entry_dn = Some(dn.clone());

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
            format!("Entry {} cannot be modified because it does not exist", dn),
        )
        .await);
    };
    op.state_mut().entry = Some(current.clone());

    let user_change = !op.is_internal() && !op.is_synchronization();
    let may_change_privileges = !user_change || op.client().has_privilege(Privilege::PrivilegeChange);
    let mut modified = current.clone();
    let mut password_changed = false;
    for modification in &modifications {
        let name = modification.attribute.name();
        if user_change && ctx.schema().is_no_user_modification(name) {
            return Err(DirectoryError::unwilling_to_perform(format!(
                "Entry {} cannot be modified because attribute {} is defined as NO-USER-MODIFICATION",
                dn, name
            ))
            .into());
        }
        if !may_change_privileges && ctx.schema().same_attribute(name, PRIVILEGE_ATTRIBUTE) {
            return Err(DirectoryError::insufficient_access(format!(
                "Entry {} cannot be modified because you do not have the privilege to change {}",
                dn, PRIVILEGE_ATTRIBUTE
            ))
            .into());
        }
        if ctx
            .schema()
            .same_attribute(name, ctx.password_policy().password_attribute())
        {
            password_changed = true;
        }
        apply(ctx, &mut modified, &dn, modification)?;
    }

    if !op.is_synchronization() {
        if password_changed && modified.has_attribute(ctx.password_policy().password_attribute()) {
            apply_password_policy(ctx, &mut modified);
        }
        if ctx.config().check_schema {
            ctx.schema().validate_entry(&modified)?;
        }
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
            "The modify operation was not actually performed because the No-Op control was present",
        );
        return Ok(());
    }

    super::checkpoint(op)?;
    let modified = op.state().modified_entry.clone().unwrap_or(modified);
    backend.replace_entry(txn, &current, &modified).await?;
    op.result_mut().set(ResultCode::Success, "");
    op.queue_change(ChangeRecord::Modify {
        old_entry: current,
        new_entry: modified,
    });
    Ok(())
}

/// Whether `name: value` is part of the entry's RDN.
fn in_rdn(ctx: &ServerContext, dn: &Dn, name: &str, value: Option<&str>) -> bool {
    dn.rdn().is_some_and(|rdn| {
        rdn.avas().iter().any(|ava| {
            ctx.schema().same_attribute(ava.attribute_type(), name)
                && value.is_none_or(|v| values_match(ava.value(), v))
        })
    })
}

fn rdn_violation(dn: &Dn, name: &str) -> DirectoryError {
    DirectoryError::new(
        ResultCode::NotAllowedOnRdn,
        format!(
            "Entry {} cannot be modified because the change would remove an RDN value of attribute {}",
            dn, name
        ),
    )
}

/// Apply one modification to the working copy of the entry.
fn apply(ctx: &ServerContext, entry: &mut Entry, dn: &Dn, modification: &Modification) -> Stage {
    let attribute = &modification.attribute;
    let name = attribute.name();
    let values = attribute.values();
    let operational = ctx.schema().is_operational(name);
    let is_password = ctx
        .schema()
        .same_attribute(name, ctx.password_policy().password_attribute());

    match modification.modification_type {
        ModificationType::Add => {
            if values.is_empty() {
                return Err(DirectoryError::protocol_error(format!(
                    "The add modification of attribute {} contains no values",
                    name
                ))
                .into());
            }
            for value in values {
                if !entry.add_value(name, value.clone(), operational) {
                    return Err(DirectoryError::new(
                        ResultCode::AttributeOrValueExists,
                        format!("Entry {} already contains value {} for attribute {}", dn, value, name),
                    )
                    .into());
                }
            }
        }
        ModificationType::Delete => {
            if values.is_empty() {
                if in_rdn(ctx, dn, name, None) {
                    return Err(rdn_violation(dn, name).into());
                }
                if entry.remove_attribute(name).is_none_or(|a| a.is_empty()) {
                    return Err(no_such_attribute(dn, name));
                }
                return Ok(());
            }
            for value in values {
                if in_rdn(ctx, dn, name, Some(value)) {
                    return Err(rdn_violation(dn, name).into());
                }
                let stored = if is_password && !password::is_encoded(value) {
                    entry
                        .values(name)
                        .into_iter()
                        .find(|stored| password::matches(value, stored))
                        .map(str::to_string)
                } else {
                    Some(value.clone())
                };
                let removed = stored.is_some_and(|stored| entry.remove_value(name, &stored));
                if !removed {
                    return Err(DirectoryError::new(
                        ResultCode::NoSuchAttribute,
                        format!(
                            "Entry {} cannot be modified because it does not contain value {} for attribute {}",
                            dn, value, name
                        ),
                    )
                    .into());
                }
            }
        }
        ModificationType::Replace => {
            if let Some(rdn) = dn.rdn() {
                for ava in rdn.avas() {
                    if ctx.schema().same_attribute(ava.attribute_type(), name)
                        && !values.iter().any(|v| values_match(v, ava.value()))
                    {
                        return Err(rdn_violation(dn, name).into());
                    }
                }
            }
            entry.put_attribute(Attribute::new(name, values.to_vec()), operational);
        }
        ModificationType::Increment => {
            if in_rdn(ctx, dn, name, None) {
                return Err(rdn_violation(dn, name).into());
            }
            let [delta] = values else {
                return Err(DirectoryError::protocol_error(format!(
                    "The increment modification of attribute {} must contain exactly one value",
                    name
                ))
                .into());
            };
            let delta: i64 = delta.parse().map_err(|_| {
                DirectoryError::new(
                    ResultCode::InvalidAttributeSyntax,
                    format!("The increment value {} for attribute {} is not an integer", delta, name),
                )
            })?;
            let current = entry.values(name);
            if current.is_empty() {
                return Err(no_such_attribute(dn, name));
            }
            let incremented = current
                .iter()
                .map(|v| {
                    v.parse::<i64>()
                        .map(|n| n.saturating_add(delta).to_string())
                        .map_err(|_| {
                            DirectoryError::new(
                                ResultCode::ConstraintViolation,
                                format!(
                                    "Attribute {} of entry {} cannot be incremented because value {} is not an integer",
                                    name, dn, v
                                ),
                            )
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            entry.put_attribute(Attribute::new(name, incremented), operational);
        }
    }
    Ok(())
}

fn no_such_attribute(dn: &Dn, name: &str) -> super::Abort {
    DirectoryError::new(
        ResultCode::NoSuchAttribute,
        format!(
            "Entry {} cannot be modified because it does not contain attribute {}",
            dn, name
        ),
    )
    .into()
}
