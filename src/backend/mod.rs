//! Backend abstraction for directory entries.
//!
//! The processing pipeline never touches stored data directly. It drives a
//! [`Backend`] through a small set of transactional primitives: open a
//! transaction, fetch an entry under a lock, add/delete/rename/replace an
//! entry, and stream search results into the operation.
//!
//! # Architecture
//!
//! The backend is responsible for:
//! - Entry storage and retrieval
//! - Serializing concurrent writers through its transaction/locking primitives
//! - Enforcing the tree structure (parents exist, no orphaned children)
//!
//! The backend is NOT responsible for:
//! - Access control, schema checking or password policy
//! - Plugins and replication hooks
//! - Result codes other than those implied by [`BackendError`]
//!
//! # Example Usage
//!
//! ```rust
//! use ldap_workflow::backend::{Backend, InMemoryBackend, LockMode, TransactionMode, TransactionScope};
//! use ldap_workflow::dn::Dn;
//! use ldap_workflow::entry::Entry;
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = InMemoryBackend::new("userRoot", vec![Dn::parse("o=example")?]);
//! let scope = TransactionScope::open(&backend, TransactionMode::ReadWrite, Uuid::new_v4()).await?;
//!
//! let entry = Entry::new(Dn::parse("o=example")?).with_object_classes(["top", "organization"]);
//! backend.add_entry(scope.transaction(), &entry).await?;
//! let fetched = backend
//!     .get_entry(scope.transaction(), entry.dn(), LockMode::Read)
//!     .await?;
//! assert!(fetched.is_some());
//! scope.close();
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod in_memory;
pub mod transaction;


pub use errors::BackendError;
pub use in_memory::{InMemoryBackend, InMemoryBackendStats};
pub use transaction::TransactionScope;

use crate::dn::Dn;
use crate::entry::Entry;
use crate::error::DirectoryResult;
use crate::operation::Operation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a server or backend accepts write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WritabilityMode {
    #[default]
    Enabled,
    Disabled,
    /// Only internal and synchronization operations may write
    InternalOnly,
}

impl WritabilityMode {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Enabled => 0,
            Self::Disabled => 1,
            Self::InternalOnly => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Disabled,
            2 => Self::InternalOnly,
            _ => Self::Enabled,
        }
    }
}

impl fmt::Display for WritabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::InternalOnly => "internal-only",
        };
        f.write_str(name)
    }
}

/// Kind of transaction to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

/// Lock requested when fetching an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    None,
    Read,
    /// Exclusive lock, held until the transaction closes
    Write,
}

/// A backend-native transaction handle.
pub trait BackendTransaction: Send + Sync + fmt::Debug {
    fn id(&self) -> u64;

    fn mode(&self) -> TransactionMode;

    fn is_open(&self) -> bool;

    /// Release the transaction and every lock it holds. Called exactly once,
    /// by [`TransactionScope`].
    fn close(&mut self);
}

/// Transactional entry store consumed by the processors.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Identifier used in logs and by the workflow element registry.
    fn backend_id(&self) -> &str;

    /// The suffixes this backend holds.
    fn base_dns(&self) -> &[Dn];

    /// Whether `dn` is at or below one of the base DNs.
    fn handles_entry(&self, dn: &Dn) -> bool {
        self.base_dns().iter().any(|base| dn.is_subordinate_or_equal(base))
    }

    fn writability_mode(&self) -> WritabilityMode;

    /// Private backends hold server-internal data and are exempt from
    /// writability checks.
    fn is_private(&self) -> bool {
        false
    }

    /// Whether the backend implements the request control with this OID.
    fn supports_control(&self, _oid: &str) -> bool {
        false
    }

    async fn begin_transaction(
        &self,
        mode: TransactionMode,
    ) -> Result<Box<dyn BackendTransaction>, BackendError>;

    /// Fetch an entry. Returns `Ok(None)` if it does not exist; absence is
    /// never an error.
    async fn get_entry(
        &self,
        txn: &dyn BackendTransaction,
        dn: &Dn,
        lock: LockMode,
    ) -> Result<Option<Entry>, BackendError>;

    async fn entry_exists(
        &self,
        txn: &dyn BackendTransaction,
        dn: &Dn,
    ) -> Result<bool, BackendError> {
        Ok(self.get_entry(txn, dn, LockMode::None).await?.is_some())
    }

    async fn has_subordinates(
        &self,
        txn: &dyn BackendTransaction,
        dn: &Dn,
    ) -> Result<bool, BackendError>;

    async fn add_entry(&self, txn: &dyn BackendTransaction, entry: &Entry)
    -> Result<(), BackendError>;

    /// Remove an entry; with `subtree` its subordinates go with it.
    async fn delete_entry(
        &self,
        txn: &dyn BackendTransaction,
        dn: &Dn,
        subtree: bool,
    ) -> Result<(), BackendError>;

    /// Move the entry at `current_dn`, and everything below it, to
    /// `entry.dn()`, storing `entry` as the new content of the moved entry.
    async fn rename_entry(
        &self,
        txn: &dyn BackendTransaction,
        current_dn: &Dn,
        entry: &Entry,
    ) -> Result<(), BackendError>;

    /// Store new content for an existing entry.
    async fn replace_entry(
        &self,
        txn: &dyn BackendTransaction,
        old_entry: &Entry,
        new_entry: &Entry,
    ) -> Result<(), BackendError>;

    /// Stream every entry matching the operation's decoded search state into
    /// [`Operation::return_search_entry`].
    async fn search(&self, op: &mut Operation) -> DirectoryResult<()>;

    /// Entries holding `value` for `attribute`, used for identity mapping.
    async fn find_entries_by_attribute(
        &self,
        attribute: &str,
        value: &str,
    ) -> Result<Vec<Entry>, BackendError>;
}
