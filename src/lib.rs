//! Per-operation processing pipeline for an LDAP directory server.
//!
//! Every client request is decoded by the protocol layer into an
//! [`Operation`] and handed to [`DirectoryServer::execute`]. The server
//! routes it to the workflow element whose backend holds the target entry,
//! and that element's processor runs the staged pipeline: decode the target,
//! open a backend transaction, resolve replication conflicts, fetch and
//! check the entry, evaluate request controls, check access, run plugins,
//! commit, and release everything exactly once on every exit path.
//!
//! # Core Components
//!
//! - [`DirectoryServer`] - Routing, statistics and post-response notification
//! - [`Backend`] - Transactional entry store the processors drive
//! - [`PluginPort`], [`ReplicationPort`], [`AccessPort`], [`PasswordPolicyPort`] -
//!   Extension points consulted by every processor
//! - [`ChangeNotificationListener`] - Observers of committed writes
//!
//! # Quick Start
//!
//! ```rust
//! use ldap_workflow::backend::{Backend, InMemoryBackend};
//! use ldap_workflow::dn::Dn;
//! use ldap_workflow::entry::{Attribute, Entry};
//! use ldap_workflow::{DirectoryServer, Operation, ResultCode};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(InMemoryBackend::new("userRoot", vec![Dn::parse("o=example")?]));
//! backend
//!     .import([Entry::new(Dn::parse("o=example")?)
//!         .with_object_classes(["top", "organization"])
//!         .with_attribute("o", ["example"])])
//!     .await?;
//!
//! let server = DirectoryServer::builder()
//!     .with_backend("userRoot", backend as Arc<dyn Backend>)
//!     .build()?;
//!
//! let response = server
//!     .execute(Operation::add(
//!         "ou=people,o=example",
//!         vec![
//!             Attribute::single("objectClass", "organizationalUnit"),
//!             Attribute::single("ou", "people"),
//!         ],
//!     ))
//!     .await;
//! assert_eq!(response.result_code, ResultCode::Success);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod backend;
pub mod config;
pub mod context;
pub mod dn;
pub mod entry;
pub mod error;
pub mod filter;
pub mod notify;
pub mod operation;
pub mod ports;
mod processor;
pub mod schema;
pub mod server;
pub mod stats;
pub mod workflow;

// Re-export commonly used types for convenience
pub use backend::{Backend, BackendError, InMemoryBackend, WritabilityMode};
pub use config::{RootUserConfig, ServerConfig};
pub use context::ServerContext;
pub use dn::Dn;
pub use entry::{Attribute, Entry};
pub use error::{ConfigError, DirectoryError, DirectoryResult, ResultCode};
pub use notify::{ChangeNotificationListener, ChangeRecord, PostResponseNotifier};
pub use operation::{Control, Operation, OperationKind, OperationRequest};
pub use ports::{
    AccessPort, AccountStatusNotificationHandler, HookResult, PasswordPolicyPort, PluginPort,
    ReplicationPort,
};
pub use schema::SchemaRegistry;
pub use server::{DirectoryServer, DirectoryServerBuilder, OperationResponse};
pub use stats::OperationStatistics;
pub use workflow::{WorkflowElement, WorkflowElementRegistry};
