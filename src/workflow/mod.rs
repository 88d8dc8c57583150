//! Workflow elements: a backend plus the dispatch onto its processors.

pub mod registry;

pub use registry::WorkflowElementRegistry;

use crate::backend::Backend;
use crate::context::ServerContext;
use crate::operation::{Operation, OperationRequest};
use crate::processor;
use crate::error::DirectoryError;
use log::{error, trace};
use std::sync::Arc;

/// Runs operations against one local backend.
pub struct WorkflowElement {
    id: String,
    backend: Arc<dyn Backend>,
}

impl WorkflowElement {
    pub fn new(id: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            id: id.into(),
            backend,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Run the processor matching the operation kind. The result is left
    /// on the operation.
    pub async fn execute(&self, ctx: &ServerContext, op: &mut Operation) {
        trace!(
            "Workflow element {} executing {} operation {}",
            self.id,
            op.kind(),
            op.id()
        );
        match op.request() {
            OperationRequest::Add(_) => processor::add::process(ctx, self, op).await,
            OperationRequest::Delete(_) => processor::delete::process(ctx, self, op).await,
            OperationRequest::Modify(_) => processor::modify::process(ctx, self, op).await,
            OperationRequest::ModifyDn(_) => processor::modify_dn::process(ctx, self, op).await,
            OperationRequest::Search(_) => processor::search::process(ctx, self, op).await,
            OperationRequest::Bind(_) => processor::bind::process(ctx, self, op).await,
            OperationRequest::Compare(_) => processor::compare::process(ctx, self, op).await,
            OperationRequest::Abandon(_) => {
                error!(
                    "Workflow element {} has no processor for {} operation {}",
                    self.id,
                    op.kind(),
                    op.id()
                );
                let err = DirectoryError::internal(format!(
                    "No processor handles {} operation {}",
                    op.kind(),
                    op.id()
                ));
                op.result_mut().fail(&err);
            }
        }
    }
}

impl std::fmt::Debug for WorkflowElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowElement")
            .field("id", &self.id)
            .field("backend", &self.backend.backend_id())
            .finish()
    }
}
