//! Compare processing.

use super::{
    Stage, check_access, complete_read, controls, missing_entry, run_pre_operation_plugins,
    unexpected_request,
};
use crate::auth::password;
use crate::backend::{LockMode, TransactionMode, TransactionScope};
use crate::context::ServerContext;
use crate::dn::Dn;
use crate::entry::values_match;
use crate::error::{DirectoryError, ResultCode};
use crate::operation::{Operation, OperationRequest};
use crate::workflow::WorkflowElement;

pub(crate) async fn process(ctx: &ServerContext, element: &WorkflowElement, op: &mut Operation) {
    let mut scope = None;
    let mut pre_op_ran = false;
    let outcome = run(ctx, element, op, &mut scope, &mut pre_op_ran).await;
    complete_read(ctx, op, outcome, scope, pre_op_ran).await;
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

    let OperationRequest::Compare(request) = op.request() else {
        return Err(unexpected_request(op));
    };
    let dn = Dn::parse(&request.dn)?;
    let attribute = request.attribute.clone();
    let value = request.value.clone();
    op.state_mut().entry_dn = Some(dn.clone());

    let scope = scope.insert(
        TransactionScope::open(backend, TransactionMode::ReadOnly, op.id()).await?,
    );
    let txn = scope.transaction();

    let Some(entry) = backend.get_entry(txn, &dn, LockMode::Read).await? else {
        return Err(missing_entry(
            backend,
            txn,
            &dn,
            format!("Entry {} cannot be compared because it does not exist", dn),
        )
        .await);
    };
    op.state_mut().entry = Some(entry.clone());

    controls::process(ctx, backend, op, &dn, Some(&entry)).await?;

    check_access(ctx, op, &dn).await?;

    run_pre_operation_plugins(ctx, op, pre_op_ran).await?;

    if !entry.has_attribute(&attribute) {
        return Err(DirectoryError::new(
            ResultCode::NoSuchAttribute,
            format!("Entry {} does not contain attribute {}", dn, attribute),
        )
        .into());
    }
    let is_password = ctx
        .schema()
        .same_attribute(&attribute, ctx.password_policy().password_attribute());
    let matched = entry.values(&attribute).into_iter().any(|stored| {
        if is_password && password::is_encoded(stored) {
            password::matches(&value, stored)
        } else {
            values_match(stored, &value)
        }
    });
    let code = if matched {
        ResultCode::CompareTrue
    } else {
        ResultCode::CompareFalse
    };
    op.result_mut().set(code, "");
    Ok(())
}
