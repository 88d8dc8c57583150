//! Add processing.

use super::{
    Stage, check_access, check_writability, complete_write, controls, hook_outcome,
    missing_entry, run_pre_operation_plugins, unexpected_request,
};
use crate::auth::Privilege;
use crate::auth::password;
use crate::backend::{LockMode, TransactionMode, TransactionScope};
use crate::context::ServerContext;
use crate::dn::Dn;
use crate::entry::{Attribute, Entry, OBJECT_CLASS};
use crate::error::{DirectoryError, ResultCode};
use crate::notify::ChangeRecord;
use crate::operation::{Operation, OperationRequest};
use crate::ports::password_policy::{GENERALIZED_TIME_FORMAT, PWD_CHANGED_TIME};
use crate::workflow::WorkflowElement;
use chrono::Utc;
use log::debug;

/// Operational attribute granting server privileges.
pub(crate) const PRIVILEGE_ATTRIBUTE: &str = "ds-privilege-name";

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

    let OperationRequest::Add(request) = op.request() else {
        return Err(unexpected_request(op));
    };
    let dn = Dn::parse(&request.dn)?;
    if dn.is_root() {
        return Err(DirectoryError::unwilling_to_perform(
            "The root DSE cannot be added",
        )
        .into());
    }
    let mut entry = build_entry(ctx, dn.clone(), &request.attributes)?;
    op.state_mut().entry_dn = Some(dn.clone());
    op.state_mut().entry = Some(entry.clone());

    let scope = scope.insert(
        TransactionScope::open(backend, TransactionMode::ReadWrite, op.id()).await?,
    );
    let txn = scope.transaction();

    let verdict = ctx.replication().handle_conflict_resolution(op).await;
    hook_outcome(verdict, op)?;

    if !op.is_internal() && !op.is_synchronization() {
        if let Some(attribute) = entry
            .attributes()
            .find(|a| ctx.schema().is_no_user_modification(a.name()))
        {
            return Err(DirectoryError::unwilling_to_perform(format!(
                "Entry {} cannot be added because it includes attribute {} which is defined as NO-USER-MODIFICATION",
                dn,
                attribute.name()
            ))
            .into());
        }
    }

    if backend.get_entry(txn, &dn, LockMode::Write).await?.is_some() {
        return Err(DirectoryError::new(
            ResultCode::EntryAlreadyExists,
            format!("The entry {} cannot be added because an entry with that name already exists", dn),
        )
        .into());
    }

    if !backend.base_dns().contains(&dn) {
        let parent = dn.parent().filter(|p| !p.is_root() && backend.handles_entry(p));
        let Some(parent) = parent else {
            return Err(DirectoryError::no_such_object(
                format!(
                    "Entry {} cannot be added because it is not below a base DN of backend {}",
                    dn,
                    backend.backend_id()
                ),
                None,
            )
            .into());
        };
        if backend.get_entry(txn, &parent, LockMode::Read).await?.is_none() {
            return Err(missing_entry(
                backend,
                txn,
                &dn,
                format!(
                    "Entry {} cannot be added because its parent entry {} does not exist",
                    dn, parent
                ),
            )
            .await);
        }
    }

    add_rdn_attributes(ctx, &mut entry, &dn);
    let added = ctx.schema().add_superior_object_classes(&mut entry);
    if !added.is_empty() {
        debug!("Added superior object classes {:?} to entry {}", added, dn);
    }

    if !op.is_synchronization() {
        if entry.has_attribute(PRIVILEGE_ATTRIBUTE)
            && !op.is_internal()
            && !op.client().has_privilege(Privilege::PrivilegeChange)
        {
            return Err(DirectoryError::insufficient_access(format!(
                "Entry {} cannot be added because you do not have the privilege to set {}",
                dn, PRIVILEGE_ATTRIBUTE
            ))
            .into());
        }
        apply_password_policy(ctx, &mut entry);
        if ctx.config().check_schema {
            ctx.schema().validate_entry(&entry)?;
        }
    }
    op.state_mut().entry = Some(entry.clone());

    controls::process(ctx, backend, op, &dn, Some(&entry)).await?;

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
            "The add operation was not actually performed because the No-Op control was present",
        );
        return Ok(());
    }

    super::checkpoint(op)?;
    // Plugins may have rewritten the entry.
    let entry = op.state().entry.clone().unwrap_or(entry);
    backend.add_entry(txn, &entry).await?;
    op.result_mut().set(ResultCode::Success, "");
    op.queue_change(ChangeRecord::Add { entry });
    Ok(())
}

/// Assemble the entry from the requested attributes.
fn build_entry(ctx: &ServerContext, dn: Dn, attributes: &[Attribute]) -> Stage<Entry> {
    let mut entry = Entry::new(dn);
    for attribute in attributes {
        if attribute.is_empty() {
            return Err(DirectoryError::new(
                ResultCode::ConstraintViolation,
                format!(
                    "Entry {} cannot be added because attribute {} has no values",
                    entry.dn(),
                    attribute.name()
                ),
            )
            .into());
        }
        if attribute.name().eq_ignore_ascii_case(OBJECT_CLASS) {
            for class in attribute.values() {
                entry.add_object_class(class.clone());
            }
            continue;
        }
        let operational = ctx.schema().is_operational(attribute.name());
        for value in attribute.values() {
            entry.add_value(attribute.name(), value.clone(), operational);
        }
    }
    Ok(entry)
}

/// Make sure every RDN value is present in the entry.
pub(crate) fn add_rdn_attributes(ctx: &ServerContext, entry: &mut Entry, dn: &Dn) {
    let Some(rdn) = dn.rdn() else {
        return;
    };
    for ava in rdn.avas() {
        let operational = ctx.schema().is_operational(ava.attribute_type());
        if entry.add_value(ava.attribute_type(), ava.value(), operational) {
            debug!(
                "Added RDN value {}={} to entry {}",
                ava.attribute_type(),
                ava.value(),
                dn
            );
        }
    }
}

/// Encode clear-text values of the password attribute and record when the
/// password was set.
pub(crate) fn apply_password_policy(ctx: &ServerContext, entry: &mut Entry) {
    let policy = ctx.password_policy();
    let name = policy.password_attribute();
    let Some(attribute) = entry.attribute(name) else {
        return;
    };
    let encoded: Vec<String> = attribute
        .values()
        .iter()
        .map(|v| {
            if password::is_encoded(v) {
                v.clone()
            } else {
                policy.encode_password(v)
            }
        })
        .collect();
    let attribute = Attribute::new(attribute.name(), encoded);
    let operational = entry.is_operational(name);
    entry.put_attribute(attribute, operational);

    let now = Utc::now().format(GENERALIZED_TIME_FORMAT).to_string();
    entry.put_attribute(Attribute::single(PWD_CHANGED_TIME, now), true);
}
