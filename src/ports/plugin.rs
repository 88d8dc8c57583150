//! Plugin invocation.

use super::PluginResult;
use crate::operation::Operation;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

/// A plugin invoked at the pre-operation, post-operation and
/// post-synchronization checkpoints. The operation kind is available from
/// [`Operation::kind`]; a plugin ignores the kinds it does not handle.
#[async_trait]
pub trait PluginPort: Send + Sync {
    /// Runs before the backend is touched, for non-synchronization
    /// operations. An abort stops the pipeline with the plugin's result.
    async fn pre_operation(&self, _op: &mut Operation) -> PluginResult {
        PluginResult::Continue
    }

    /// Runs after the backend step when pre-operation plugins ran. An abort
    /// replaces the operation result.
    async fn post_operation(&self, _op: &mut Operation) -> PluginResult {
        PluginResult::Continue
    }

    /// Runs after a successful synchronization operation. The result cannot
    /// be changed at this point; aborts are logged.
    async fn post_synchronization(&self, _op: &mut Operation) -> PluginResult {
        PluginResult::Continue
    }
}

/// Ordered list of plugins invoked as one.
///
/// Pre- and post-operation invocation stops at the first abort.
/// Post-synchronization invocation runs every plugin.
#[derive(Clone, Default)]
pub struct PluginChain {
    plugins: Vec<Arc<dyn PluginPort>>,
}

impl PluginChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn PluginPort>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[async_trait]
impl PluginPort for PluginChain {
    async fn pre_operation(&self, op: &mut Operation) -> PluginResult {
        for plugin in &self.plugins {
            let result = plugin.pre_operation(op).await;
            if !result.is_continue() {
                debug!("Pre-operation plugin stopped {} operation {}", op.kind(), op.id());
                return result;
            }
        }
        PluginResult::Continue
    }

    async fn post_operation(&self, op: &mut Operation) -> PluginResult {
        for plugin in &self.plugins {
            let result = plugin.post_operation(op).await;
            if !result.is_continue() {
                debug!("Post-operation plugin stopped {} operation {}", op.kind(), op.id());
                return result;
            }
        }
        PluginResult::Continue
    }

    async fn post_synchronization(&self, op: &mut Operation) -> PluginResult {
        let mut first_abort = PluginResult::Continue;
        for plugin in &self.plugins {
            let result = plugin.post_synchronization(op).await;
            if first_abort.is_continue() && !result.is_continue() {
                first_abort = result;
            }
        }
        first_abort
    }
}
