//! Core server structure and runtime administration.

use super::builder::DirectoryServerBuilder;
use crate::backend::{Backend, WritabilityMode};
use crate::context::ServerContext;
use crate::error::ConfigError;
use crate::notify::{ChangeNotificationListener, PostResponseNotifier};
use crate::operation::CancellationFlag;
use crate::stats::OperationStatistics;
use crate::workflow::{WorkflowElement, WorkflowElementRegistry};
use log::info;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A directory server: workflow elements over local backends, the ports
/// the processors consult, and the post-response notifier.
///
/// # Examples
///
/// ```rust
/// use ldap_workflow::backend::{Backend, InMemoryBackend};
/// use ldap_workflow::dn::Dn;
/// use ldap_workflow::DirectoryServer;
/// use std::sync::Arc;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = Arc::new(InMemoryBackend::new("userRoot", vec![Dn::parse("dc=example,dc=com")?]));
/// let server = DirectoryServer::builder()
///     .with_backend("userRoot", backend as Arc<dyn Backend>)
///     .build()?;
/// assert_eq!(server.registry().len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct DirectoryServer {
    pub(super) context: Arc<ServerContext>,
    pub(super) notifier: PostResponseNotifier,
    pub(super) statistics: OperationStatistics,
    /// Cancellation handles of running operations, keyed by connection and
    /// message id, for abandon requests
    pub(super) in_flight: Mutex<HashMap<(u64, u32), CancellationFlag>>,
}

impl DirectoryServer {
    pub fn builder() -> DirectoryServerBuilder {
        DirectoryServerBuilder::new()
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    pub fn registry(&self) -> &WorkflowElementRegistry {
        self.context.registry()
    }

    /// Create a workflow element for a backend and make it routable.
    pub fn register_backend(
        &self,
        id: impl Into<String>,
        backend: Arc<dyn Backend>,
    ) -> Result<Arc<WorkflowElement>, ConfigError> {
        self.context.registry().create_and_register(id, backend)
    }

    pub fn notifier(&self) -> &PostResponseNotifier {
        &self.notifier
    }

    pub fn register_listener(&self, listener: Arc<dyn ChangeNotificationListener>) {
        self.notifier.register(listener);
    }

    pub fn statistics(&self) -> &OperationStatistics {
        &self.statistics
    }

    pub fn writability_mode(&self) -> WritabilityMode {
        self.context.writability_mode()
    }

    pub fn set_writability_mode(&self, mode: WritabilityMode) {
        info!("Server writability mode set to {}", mode);
        self.context.set_writability_mode(mode);
    }

    pub fn lockdown_mode(&self) -> bool {
        self.context.lockdown_mode()
    }

    pub fn set_lockdown_mode(&self, enabled: bool) {
        info!(
            "Lockdown mode {}",
            if enabled { "enabled" } else { "disabled" }
        );
        self.context.set_lockdown_mode(enabled);
    }

    pub(super) fn track(&self, key: (u64, u32), flag: CancellationFlag) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, flag);
    }

    /// Forget `key` only while it still maps to `flag`. A later operation
    /// reusing the message id keeps its own entry.
    pub(super) fn untrack(&self, key: (u64, u32), flag: &CancellationFlag) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if in_flight.get(&key).is_some_and(|tracked| tracked.same_as(flag)) {
            in_flight.remove(&key);
        }
    }

    /// Cancel the running operation with this connection and message id.
    pub fn cancel(&self, connection_id: u64, message_id: u32) -> bool {
        let flag = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(connection_id, message_id))
            .cloned();
        match flag {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }
}
