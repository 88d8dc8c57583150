//! Builder for assembling a [`DirectoryServer`].

use super::core::DirectoryServer;
use crate::backend::Backend;
use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::error::ConfigError;
use crate::notify::{ChangeNotificationListener, PostResponseNotifier};
use crate::ports::{
    AccessPort, AccountStatusNotificationHandler, AllowAll, InMemoryPasswordPolicy,
    LoggingNotificationHandler, PasswordPolicyPort, PluginChain, PluginPort, ReplicationChain,
    ReplicationPort,
};
use crate::schema::SchemaRegistry;
use crate::stats::OperationStatistics;
use crate::workflow::WorkflowElementRegistry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8};
use std::sync::{Arc, Mutex};

/// Fluent assembly of a server. Ports that are not supplied default to
/// permissive implementations: no plugins, no replication, allow-all access
/// control, and an in-memory password policy built from the configuration.
///
/// # Examples
///
/// ```rust
/// use ldap_workflow::{DirectoryServerBuilder, ServerConfig};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ServerConfig::from_json(r#"{"lockdownMode": true}"#)?;
/// let server = DirectoryServerBuilder::new().with_config(config).build()?;
/// assert!(server.lockdown_mode());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct DirectoryServerBuilder {
    config: ServerConfig,
    schema: Option<SchemaRegistry>,
    plugins: Vec<Arc<dyn PluginPort>>,
    replication: Vec<Arc<dyn ReplicationPort>>,
    access: Option<Arc<dyn AccessPort>>,
    password_policy: Option<Arc<dyn PasswordPolicyPort>>,
    account_status: Option<Arc<dyn AccountStatusNotificationHandler>>,
    listeners: Vec<Arc<dyn ChangeNotificationListener>>,
    backends: Vec<(String, Arc<dyn Backend>)>,
}

impl DirectoryServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom schema instead of the embedded one.
    pub fn with_schema(mut self, schema: SchemaRegistry) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Append a plugin. Plugins run in registration order.
    pub fn with_plugin(mut self, plugin: Arc<dyn PluginPort>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_replication_provider(mut self, provider: Arc<dyn ReplicationPort>) -> Self {
        self.replication.push(provider);
        self
    }

    pub fn with_access_port(mut self, access: Arc<dyn AccessPort>) -> Self {
        self.access = Some(access);
        self
    }

    pub fn with_password_policy(mut self, policy: Arc<dyn PasswordPolicyPort>) -> Self {
        self.password_policy = Some(policy);
        self
    }

    pub fn with_account_status_handler(
        mut self,
        handler: Arc<dyn AccountStatusNotificationHandler>,
    ) -> Self {
        self.account_status = Some(handler);
        self
    }

    pub fn with_change_listener(mut self, listener: Arc<dyn ChangeNotificationListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Register a backend under a workflow element id.
    pub fn with_backend(mut self, id: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        self.backends.push((id.into(), backend));
        self
    }

    /// Build the server.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a configured DN is invalid, the schema
    /// cannot be loaded, or two backends share a workflow element id.
    pub fn build(self) -> Result<DirectoryServer, ConfigError> {
        let root_users = self.config.root_users()?;
        let schema = match self.schema {
            Some(schema) => schema,
            None => SchemaRegistry::new()?,
        };

        let plugins: Arc<dyn PluginPort> = if self.plugins.len() == 1 {
            Arc::clone(&self.plugins[0])
        } else {
            Arc::new(
                self.plugins
                    .into_iter()
                    .fold(PluginChain::new(), PluginChain::with_plugin),
            )
        };
        let replication: Arc<dyn ReplicationPort> = Arc::new(
            self.replication
                .into_iter()
                .fold(ReplicationChain::new(), ReplicationChain::with_provider),
        );
        let password_policy = self.password_policy.unwrap_or_else(|| {
            Arc::new(InMemoryPasswordPolicy::new(
                self.config.password_policy.clone(),
            ))
        });

        let registry = WorkflowElementRegistry::new();
        for (id, backend) in self.backends {
            registry.create_and_register(id, backend)?;
        }

        let notifier = PostResponseNotifier::new();
        for listener in self.listeners {
            notifier.register(listener);
        }

        let context = ServerContext {
            writability: AtomicU8::new(self.config.writability_mode.as_u8()),
            lockdown: AtomicBool::new(self.config.lockdown_mode),
            config: self.config,
            root_users,
            schema: Arc::new(schema),
            plugins,
            replication,
            access: self.access.unwrap_or_else(|| Arc::new(AllowAll)),
            password_policy,
            account_status: self
                .account_status
                .unwrap_or_else(|| Arc::new(LoggingNotificationHandler)),
            registry,
        };

        Ok(DirectoryServer {
            context: Arc::new(context),
            notifier,
            statistics: OperationStatistics::new(),
            in_flight: Mutex::new(HashMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::config::RootUserConfig;
    use crate::dn::Dn;

    fn backend(id: &str, base: &str) -> Arc<dyn Backend> {
        Arc::new(InMemoryBackend::new(id, vec![Dn::parse(base).unwrap()]))
    }

    #[test]
    fn duplicate_backend_ids_fail_the_build() {
        let result = DirectoryServerBuilder::new()
            .with_backend("a", backend("a", "o=a"))
            .with_backend("a", backend("b", "o=b"))
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::DuplicateWorkflowElement { .. })
        ));
    }

    #[test]
    fn invalid_root_user_fails_the_build() {
        let config = ServerConfig {
            root_users: vec![RootUserConfig {
                dn: "missing equals".to_string(),
                alternate_bind_dns: Vec::new(),
            }],
            ..ServerConfig::default()
        };
        assert!(
            DirectoryServerBuilder::new()
                .with_config(config)
                .build()
                .is_err()
        );
    }
}
