//! Operation routing and execution.
//!
//! [`DirectoryServer::execute`] is the entry point the protocol layer calls
//! for every decoded request. It picks the workflow element whose base DN
//! holds the target, runs the element's processor, counts the outcome, and
//! fires the post-response notifier for successful writes.

use super::core::DirectoryServer;
use crate::auth::{AuthenticationInfo, ResourceLimits};
use crate::dn::Dn;
use crate::entry::Entry;
use crate::error::{DirectoryError, ResultCode};
use crate::operation::{BindCredentials, Operation, OperationKind, OperationRequest};
use crate::processor;
use crate::workflow::WorkflowElement;
use log::{debug, info, warn};
use std::sync::Arc;
use uuid::Uuid;

/// What the protocol layer sends back to the client, plus the bind outcome
/// it installs on the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResponse {
    pub operation_id: Uuid,
    pub kind: OperationKind,
    pub result_code: ResultCode,
    pub message: String,
    pub matched_dn: Option<Dn>,
    pub referrals: Vec<String>,
    pub entries: Vec<Entry>,
    pub authentication: Option<AuthenticationInfo>,
    pub resource_limits: Option<ResourceLimits>,
}

impl OperationResponse {
    pub fn is_success(&self) -> bool {
        self.result_code == ResultCode::Success
    }

    fn from_operation(mut op: Operation) -> Self {
        let entries = op.take_search_entries();
        let bind = op.bind_outcome().clone();
        let result = op.result();
        Self {
            operation_id: op.id(),
            kind: op.kind(),
            result_code: result.result_code().unwrap_or(ResultCode::Other),
            message: result.message().to_string(),
            matched_dn: result.matched_dn().cloned(),
            referrals: result.referrals().to_vec(),
            entries,
            authentication: bind.authentication,
            resource_limits: bind.resource_limits,
        }
    }
}

enum Route {
    Element(Arc<WorkflowElement>),
    WithoutBackend,
    Abandon(u32),
}

impl DirectoryServer {
    /// Process an operation and build its response.
    pub async fn execute(&self, mut op: Operation) -> OperationResponse {
        self.process(&mut op).await;
        OperationResponse::from_operation(op)
    }

    /// Process an operation in place. The result, processing state and
    /// queued changes stay on the operation for the caller to inspect.
    pub async fn process(&self, op: &mut Operation) {
        info!(
            "Processing {} operation {} (connection {}, message {}) target {}",
            op.kind(),
            op.id(),
            op.connection_id(),
            op.message_id(),
            op.request().target_dn().unwrap_or("-")
        );

        let tracked = op.connection_key().map(|key| {
            let flag = op.cancellation_handle();
            self.track(key, flag.clone());
            (key, flag)
        });
        match self.route(op) {
            Ok(Route::Element(element)) => element.execute(&self.context, op).await,
            Ok(Route::WithoutBackend) => {
                processor::bind::process_without_backend(&self.context, op).await
            }
            Ok(Route::Abandon(message_id)) => self.abandon(op, message_id),
            Err(error) => {
                op.result_mut().fail(&error);
            }
        }
        if let Some((key, flag)) = tracked {
            self.untrack(key, &flag);
        }

        let code = op.result().result_code();
        self.statistics.record(op.kind(), code);

        match code {
            Some(code) if code.is_non_error() => debug!(
                "{} operation {} completed: {}",
                op.kind(),
                op.id(),
                code
            ),
            Some(code) => debug!(
                "{} operation {} failed: {} {}",
                op.kind(),
                op.id(),
                code,
                op.result().message()
            ),
            None => warn!(
                "{} operation {} finished without a result",
                op.kind(),
                op.id()
            ),
        }

        let failures = self.notifier.notify(op).await;
        if failures > 0 {
            warn!(
                "{} change listener invocation(s) failed after {} operation {}",
                failures,
                op.kind(),
                op.id()
            );
        }
    }

    fn route(&self, op: &Operation) -> Result<Route, DirectoryError> {
        let registry = self.context.registry();
        let raw_dn = match op.request() {
            OperationRequest::Abandon(request) => return Ok(Route::Abandon(request.message_id)),
            OperationRequest::Bind(request) => {
                if request.has_empty_password()
                    || matches!(request.credentials, BindCredentials::Sasl { .. })
                {
                    return Ok(Route::WithoutBackend);
                }
                let bind_dn = Dn::parse(&request.dn)?;
                let user_dn = self
                    .context
                    .root_users()
                    .actual_dn(&bind_dn)
                    .cloned()
                    .unwrap_or(bind_dn);
                return registry
                    .element_for_dn(&user_dn)
                    .map(Route::Element)
                    .ok_or_else(|| {
                        DirectoryError::invalid_credentials("Invalid credentials")
                    });
            }
            request => request.target_dn().unwrap_or_default(),
        };

        let dn = Dn::parse(raw_dn)?;
        registry
            .element_for_dn(&dn)
            .map(Route::Element)
            .ok_or_else(|| {
                DirectoryError::no_such_object(
                    format!("No backend is configured to handle entry {}", dn),
                    None,
                )
            })
    }

    fn abandon(&self, op: &mut Operation, message_id: u32) {
        if self.cancel(op.connection_id(), message_id) {
            debug!(
                "Abandon operation {} canceled message {} on connection {}",
                op.id(),
                message_id,
                op.connection_id()
            );
        } else {
            debug!(
                "Abandon operation {} found no running message {} on connection {}",
                op.id(),
                message_id,
                op.connection_id()
            );
        }
        op.result_mut().set(ResultCode::Success, "");
    }
}
