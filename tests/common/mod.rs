//! Shared test utilities for the pipeline integration tests.
//!
//! Provides recording and fault-injecting implementations of every port,
//! plus a fixture directory tree loaded into an [`InMemoryBackend`].

#![allow(dead_code)]

pub mod fixtures;
pub mod ports;

use ldap_workflow::backend::{Backend, InMemoryBackend};
use ldap_workflow::{DirectoryServer, DirectoryServerBuilder, ServerConfig};
use std::sync::Arc;

pub use fixtures::*;
pub use ports::*;

/// A server with a single `o=test` backend holding the fixture tree, plus
/// handles on every recording port.
pub struct Harness {
    pub server: DirectoryServer,
    pub backend: Arc<InMemoryBackend>,
    /// Registered in front of `backend`; passes through until told to fail
    pub faults: Arc<FaultyBackend>,
    pub plugin: Arc<RecordingPlugin>,
    pub replication: Arc<RecordingReplication>,
    pub access: Arc<ScriptedAccess>,
    pub listener: Arc<RecordingListener>,
    pub account_status: Arc<RecordingStatusHandler>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(ServerConfig::default()).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        Self::build(config, |builder| builder).await
    }

    /// Build with extra builder steps applied before the recording ports.
    pub async fn build(
        config: ServerConfig,
        customize: impl FnOnce(DirectoryServerBuilder) -> DirectoryServerBuilder,
    ) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let backend = Arc::new(test_backend());
        backend
            .import(fixture_entries())
            .await
            .expect("fixture import should succeed");

        let faults = Arc::new(FaultyBackend::new(Arc::clone(&backend)));
        let plugin = Arc::new(RecordingPlugin::default());
        let replication = Arc::new(RecordingReplication::default());
        let access = Arc::new(ScriptedAccess::default());
        let listener = Arc::new(RecordingListener::new("recorder"));
        let account_status = Arc::new(RecordingStatusHandler::default());

        let builder = customize(DirectoryServerBuilder::new().with_config(config))
            .with_backend("userRoot", Arc::clone(&faults) as Arc<dyn Backend>)
            .with_plugin(plugin.clone())
            .with_replication_provider(replication.clone())
            .with_access_port(access.clone())
            .with_change_listener(listener.clone())
            .with_account_status_handler(account_status.clone());
        let server = builder.build().expect("server should build");

        Self {
            server,
            backend,
            faults,
            plugin,
            replication,
            access,
            listener,
            account_status,
        }
    }

    /// Transactions opened and closed on the fixture backend.
    pub async fn transactions(&self) -> (usize, usize) {
        let stats = self.backend.stats().await;
        (stats.transactions_opened, stats.transactions_closed)
    }

    pub async fn mutations(&self) -> usize {
        self.backend.stats().await.mutations
    }
}
