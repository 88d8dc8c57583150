//! Server-wide collaborators handed to every processor.

use crate::backend::WritabilityMode;
use crate::config::{RootUsers, ServerConfig};
use crate::ports::{
    AccessPort, AccountStatusNotification, AccountStatusNotificationHandler, PasswordPolicyPort,
    PluginPort, ReplicationPort,
};
use crate::schema::SchemaRegistry;
use crate::workflow::WorkflowElementRegistry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Everything a processor needs beyond the operation and its backend.
///
/// Passed explicitly down the call chain; nothing in the pipeline looks up
/// server state any other way.
pub struct ServerContext {
    pub(crate) config: ServerConfig,
    pub(crate) root_users: RootUsers,
    pub(crate) writability: AtomicU8,
    pub(crate) lockdown: AtomicBool,
    pub(crate) schema: Arc<SchemaRegistry>,
    pub(crate) plugins: Arc<dyn PluginPort>,
    pub(crate) replication: Arc<dyn ReplicationPort>,
    pub(crate) access: Arc<dyn AccessPort>,
    pub(crate) password_policy: Arc<dyn PasswordPolicyPort>,
    pub(crate) account_status: Arc<dyn AccountStatusNotificationHandler>,
    pub(crate) registry: WorkflowElementRegistry,
}

impl ServerContext {
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn root_users(&self) -> &RootUsers {
        &self.root_users
    }

    /// Server-wide writability, adjustable at runtime.
    pub fn writability_mode(&self) -> WritabilityMode {
        WritabilityMode::from_u8(self.writability.load(Ordering::SeqCst))
    }

    pub fn set_writability_mode(&self, mode: WritabilityMode) {
        self.writability.store(mode.as_u8(), Ordering::SeqCst);
    }

    pub fn lockdown_mode(&self) -> bool {
        self.lockdown.load(Ordering::SeqCst)
    }

    pub fn set_lockdown_mode(&self, enabled: bool) {
        self.lockdown.store(enabled, Ordering::SeqCst);
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn plugins(&self) -> &dyn PluginPort {
        self.plugins.as_ref()
    }

    pub fn replication(&self) -> &dyn ReplicationPort {
        self.replication.as_ref()
    }

    pub fn access(&self) -> &dyn AccessPort {
        self.access.as_ref()
    }

    pub fn password_policy(&self) -> &dyn PasswordPolicyPort {
        self.password_policy.as_ref()
    }

    pub async fn notify_account_status(&self, notification: AccountStatusNotification) {
        self.account_status.handle(notification).await;
    }

    pub fn registry(&self) -> &WorkflowElementRegistry {
        &self.registry
    }
}
