//! Search processing. Searches never hold a transaction across the
//! streaming call; the backend streams matches straight into the operation.

use super::{
    Stage, check_access, complete_read, controls, run_pre_operation_plugins, unexpected_request,
};
use crate::backend::{LockMode, TransactionMode, TransactionScope};
use crate::context::ServerContext;
use crate::dn::Dn;
use crate::entry::Entry;
use crate::error::ResultCode;
use crate::filter::Filter;
use crate::operation::{Operation, OperationRequest, oids};
use crate::workflow::WorkflowElement;
use log::debug;

pub(crate) async fn process(ctx: &ServerContext, element: &WorkflowElement, op: &mut Operation) {
    let mut pre_op_ran = false;
    let outcome = run(ctx, element, op, &mut pre_op_ran).await;
    complete_read(ctx, op, outcome, None, pre_op_ran).await;
}

async fn run(
    ctx: &ServerContext,
    element: &WorkflowElement,
    op: &mut Operation,
    pre_op_ran: &mut bool,
) -> Stage {
    super::checkpoint(op)?;
    let backend = element.backend();

    let OperationRequest::Search(request) = op.request() else {
        return Err(unexpected_request(op));
    };
    let base_dn = Dn::parse(&request.base_dn)?;
    let filter = Filter::parse(&request.filter)?;
    let requested_limit = request.size_limit;
    {
        let search = op.search_state_mut();
        search.base_dn = Some(base_dn.clone());
        search.filter = Some(filter);
    }
    op.state_mut().entry_dn = Some(base_dn.clone());

    let base_entry = if op.controls().iter().any(|c| c.oid == oids::ASSERTION) {
        fetch_base_entry(element, op, &base_dn).await?
    } else {
        None
    };
    controls::process(ctx, backend, op, &base_dn, base_entry.as_ref()).await?;

    check_access(ctx, op, &base_dn).await?;

    run_pre_operation_plugins(ctx, op, pre_op_ran).await?;

    let limit = effective_size_limit(ctx, op, requested_limit);
    op.search_state_mut().size_limit = limit;

    backend.search(op).await?;
    super::checkpoint(op)?;
    debug!(
        "Search operation {} returned {} entries",
        op.id(),
        op.search_entries().len()
    );
    op.result_mut().set(ResultCode::Success, "");
    Ok(())
}

/// The requested size limit capped by the server default. Root users are
/// only bound by what they request.
fn effective_size_limit(ctx: &ServerContext, op: &Operation, requested: u32) -> u32 {
    let server = ctx.config().default_size_limit;
    if op.client().is_root || server == 0 {
        return requested;
    }
    if requested == 0 {
        server
    } else {
        requested.min(server)
    }
}

/// Read the base entry for the assertion control with a short read-only
/// transaction.
async fn fetch_base_entry(
    element: &WorkflowElement,
    op: &Operation,
    base_dn: &Dn,
) -> Stage<Option<Entry>> {
    let backend = element.backend();
    let scope = TransactionScope::open(backend, TransactionMode::ReadOnly, op.id()).await?;
    let entry = backend
        .get_entry(scope.transaction(), base_dn, LockMode::None)
        .await;
    scope.close();
    Ok(entry?)
}
