//! Synchronization provider hooks.

use super::ProviderResult;
use crate::error::DirectoryError;
use crate::operation::Operation;
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;

/// A replication layer taking part in write operations.
#[async_trait]
pub trait ReplicationPort: Send + Sync {
    /// Runs right after the transaction is opened. A provider may veto the
    /// operation, e.g. because a later change already superseded it.
    async fn handle_conflict_resolution(&self, _op: &mut Operation) -> ProviderResult {
        ProviderResult::Continue
    }

    /// Runs just before the backend primitive, unless the operation is a no-op.
    async fn do_pre_operation(&self, _op: &mut Operation) -> ProviderResult {
        ProviderResult::Continue
    }

    /// Runs during cleanup on every exit path once the transaction was
    /// opened. Errors are logged by the caller and never change the result.
    async fn do_post_operation(&self, _op: &mut Operation) -> Result<(), DirectoryError> {
        Ok(())
    }
}

/// All registered synchronization providers, invoked in order.
#[derive(Clone, Default)]
pub struct ReplicationChain {
    providers: Vec<Arc<dyn ReplicationPort>>,
}

impl ReplicationChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn ReplicationPort>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl ReplicationPort for ReplicationChain {
    async fn handle_conflict_resolution(&self, op: &mut Operation) -> ProviderResult {
        for provider in &self.providers {
            let result = provider.handle_conflict_resolution(op).await;
            if !result.is_continue() {
                return result;
            }
        }
        ProviderResult::Continue
    }

    async fn do_pre_operation(&self, op: &mut Operation) -> ProviderResult {
        for provider in &self.providers {
            let result = provider.do_pre_operation(op).await;
            if !result.is_continue() {
                return result;
            }
        }
        ProviderResult::Continue
    }

    /// Every provider runs even if an earlier one fails; the first failure
    /// is returned.
    async fn do_post_operation(&self, op: &mut Operation) -> Result<(), DirectoryError> {
        let mut first_error = None;
        for provider in &self.providers {
            if let Err(error) = provider.do_post_operation(op).await {
                warn!(
                    "Synchronization provider post-operation failed for operation {}: {}",
                    op.id(),
                    error
                );
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
