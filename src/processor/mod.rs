//! Per-operation processors.
//!
//! Every processor runs its stages inside an inner `async fn` returning
//! [`Stage`]. The first stage that fails returns an [`Abort`]; everything
//! after it is skipped except the completion steps in this module, which
//! record the result, run the replication post-operation hook, close the
//! transaction and invoke post-operation plugins.

pub(crate) mod add;
pub(crate) mod bind;
pub(crate) mod compare;
pub(crate) mod controls;
pub(crate) mod delete;
pub(crate) mod modify;
pub(crate) mod modify_dn;
pub(crate) mod search;

use crate::backend::{Backend, BackendError, BackendTransaction, TransactionScope, WritabilityMode};
use crate::context::ServerContext;
use crate::dn::{Dn, DnError};
use crate::error::{DirectoryError, ResultCode};
use crate::filter::FilterError;
use crate::operation::{Operation, OperationRequest};
use crate::ports::HookResult;
use log::{debug, warn};

/// Why a pipeline stopped early.
#[derive(Debug)]
pub(crate) enum Abort {
    Error(DirectoryError),
    /// The cancellation flag was observed at a checkpoint
    Canceled,
}

impl From<DirectoryError> for Abort {
    fn from(error: DirectoryError) -> Self {
        Abort::Error(error)
    }
}

impl From<BackendError> for Abort {
    fn from(error: BackendError) -> Self {
        Abort::Error(error.into())
    }
}

impl From<DnError> for Abort {
    fn from(error: DnError) -> Self {
        Abort::Error(error.into())
    }
}

impl From<FilterError> for Abort {
    fn from(error: FilterError) -> Self {
        Abort::Error(error.into())
    }
}

pub(crate) type Stage<T = ()> = Result<T, Abort>;

/// Stop if the operation has been canceled.
pub(crate) fn checkpoint(op: &Operation) -> Stage {
    if op.is_canceled() {
        Err(Abort::Canceled)
    } else {
        Ok(())
    }
}

/// Turn a hook verdict into a stage outcome and check for cancellation
/// once the hook has returned.
pub(crate) fn hook_outcome(result: HookResult, op: &Operation) -> Stage {
    result.into_result()?;
    checkpoint(op)
}

/// Raised when a processor is handed a request of another kind.
pub(crate) fn unexpected_request(op: &Operation) -> Abort {
    Abort::Error(DirectoryError::internal(format!(
        "Operation {} carries a {} request the processor cannot handle",
        op.id(),
        op.kind()
    )))
}

/// Decode the target DN of the operation.
pub(crate) fn decode_target_dn(op: &Operation) -> Stage<Dn> {
    let raw = match op.request() {
        OperationRequest::Add(r) => &r.dn,
        OperationRequest::Delete(r) => &r.dn,
        OperationRequest::Modify(r) => &r.dn,
        OperationRequest::ModifyDn(r) => &r.dn,
        OperationRequest::Compare(r) => &r.dn,
        OperationRequest::Search(r) => &r.base_dn,
        OperationRequest::Bind(r) => &r.dn,
        OperationRequest::Abandon(_) => return Err(unexpected_request(op)),
    };
    Ok(Dn::parse(raw)?)
}

/// The closest existing ancestor of `dn` held by the same backend.
pub(crate) async fn find_matched_dn(
    backend: &dyn Backend,
    txn: &dyn BackendTransaction,
    dn: &Dn,
) -> Result<Option<Dn>, BackendError> {
    let mut current = dn.parent();
    while let Some(candidate) = current {
        if candidate.is_root() || !backend.handles_entry(&candidate) {
            break;
        }
        if backend.entry_exists(txn, &candidate).await? {
            return Ok(Some(candidate));
        }
        current = candidate.parent();
    }
    Ok(None)
}

/// `NoSuchObject` for a missing target, carrying the nearest existing ancestor.
pub(crate) async fn missing_entry(
    backend: &dyn Backend,
    txn: &dyn BackendTransaction,
    dn: &Dn,
    message: String,
) -> Abort {
    match find_matched_dn(backend, txn, dn).await {
        Ok(matched) => Abort::Error(DirectoryError::no_such_object(message, matched)),
        Err(e) => e.into(),
    }
}

fn writability_allows(mode: WritabilityMode, op: &Operation) -> bool {
    match mode {
        WritabilityMode::Enabled => true,
        WritabilityMode::Disabled => false,
        WritabilityMode::InternalOnly => op.is_internal() || op.is_synchronization(),
    }
}

/// Enforce server-wide and backend writability. Private backends are exempt.
pub(crate) fn check_writability(
    ctx: &ServerContext,
    backend: &dyn Backend,
    op: &Operation,
    target: &Dn,
) -> Stage {
    if backend.is_private() {
        return Ok(());
    }
    if !writability_allows(ctx.writability_mode(), op) {
        return Err(DirectoryError::unwilling_to_perform(format!(
            "Unable to process the {} operation on entry {} because the server is read-only",
            op.kind(),
            target
        ))
        .into());
    }
    if !writability_allows(backend.writability_mode(), op) {
        return Err(DirectoryError::unwilling_to_perform(format!(
            "Unable to process the {} operation on entry {} because backend {} is read-only",
            op.kind(),
            target,
            backend.backend_id()
        ))
        .into());
    }
    Ok(())
}

/// Ask the access port whether the operation may proceed.
pub(crate) async fn check_access(ctx: &ServerContext, op: &Operation, target: &Dn) -> Stage {
    if !ctx.access().is_allowed(op).await {
        return Err(DirectoryError::insufficient_access(format!(
            "The entry {} cannot be processed by the {} operation due to insufficient access rights",
            target,
            op.kind()
        ))
        .into());
    }
    checkpoint(op)
}

/// Run pre-operation plugins, remembering that they ran so the matching
/// post-operation plugins are invoked later.
pub(crate) async fn run_pre_operation_plugins(
    ctx: &ServerContext,
    op: &mut Operation,
    pre_op_ran: &mut bool,
) -> Stage {
    *pre_op_ran = true;
    let verdict = ctx.plugins().pre_operation(op).await;
    hook_outcome(verdict, op)
}

/// Record the outcome on the operation. Returns `true` if it was canceled.
async fn record_outcome(ctx: &ServerContext, op: &mut Operation, outcome: Stage) -> bool {
    match outcome {
        Ok(()) => false,
        Err(Abort::Canceled) => {
            debug!("{} operation {} was canceled", op.kind(), op.id());
            op.result_mut()
                .set(ResultCode::Canceled, "The operation was canceled");
            true
        }
        Err(Abort::Error(error)) => {
            debug!("{} operation {} aborted: {}", op.kind(), op.id(), error);
            op.result_mut().fail(&error);
            if let Some(matched) = op.result().matched_dn().cloned() {
                if !ctx.access().can_disclose(&matched, op).await {
                    op.result_mut().clear_matched_dn();
                }
            }
            false
        }
    }
}

/// Post-operation or post-synchronization plugins, then drop queued change
/// records unless the operation succeeded.
async fn finish_plugins(ctx: &ServerContext, op: &mut Operation, canceled: bool, pre_op_ran: bool) {
    if !canceled {
        if op.is_synchronization() {
            if op.result().is_success() {
                if let HookResult::Abort(e) = ctx.plugins().post_synchronization(op).await {
                    warn!(
                        "Post-synchronization plugin failed for operation {}: {}",
                        op.id(),
                        e
                    );
                }
            }
        } else if pre_op_ran {
            if let HookResult::Abort(e) = ctx.plugins().post_operation(op).await {
                debug!(
                    "Post-operation plugin replaced the result of operation {}: {}",
                    op.id(),
                    e
                );
                op.result_mut().override_with(&e);
            }
        }
    }
    if !op.result().is_success() {
        op.take_changes();
    }
}

/// Completion for write operations: record the result, run the replication
/// post-operation hook and close the transaction, then run post-operation
/// plugins.
pub(crate) async fn complete_write(
    ctx: &ServerContext,
    op: &mut Operation,
    outcome: Stage,
    scope: Option<TransactionScope>,
    pre_op_ran: bool,
) {
    let canceled = record_outcome(ctx, op, outcome).await;
    if let Some(scope) = scope {
        if let Err(e) = ctx.replication().do_post_operation(op).await {
            warn!(
                "Replication post-operation failed for operation {}: {}",
                op.id(),
                e
            );
        }
        scope.close();
    }
    finish_plugins(ctx, op, canceled, pre_op_ran).await;
}

/// Completion for operations that never reach replication.
pub(crate) async fn complete_read(
    ctx: &ServerContext,
    op: &mut Operation,
    outcome: Stage,
    scope: Option<TransactionScope>,
    pre_op_ran: bool,
) {
    let canceled = record_outcome(ctx, op, outcome).await;
    if let Some(scope) = scope {
        scope.close();
    }
    finish_plugins(ctx, op, canceled, pre_op_ran).await;
}
