//! Extension points consumed by the processors.
//!
//! Each port is an `async_trait` object the server holds as `Arc<dyn ..>`:
//!
//! - [`PluginPort`]: pre-operation, post-operation and post-synchronization plugins
//! - [`ReplicationPort`]: conflict resolution and replication pre/post hooks
//! - [`AccessPort`]: access control decisions
//! - [`PasswordPolicyPort`]: password encoding and bind-time account state
//!
//! Every port has a permissive default so a server can be assembled with
//! only the pieces a deployment needs.

pub mod access;
pub mod password_policy;
pub mod plugin;
pub mod replication;

pub use access::{AccessPort, AllowAll};
pub use password_policy::{
    AccountStatusNotification, AccountStatusNotificationHandler, AccountStatusNotificationType,
    BindPolicyState, InMemoryPasswordPolicy, LockoutStatus, LoggingNotificationHandler,
    PasswordPolicyConfig, PasswordPolicyPort,
};
pub use plugin::{PluginChain, PluginPort};
pub use replication::{ReplicationChain, ReplicationPort};

use crate::error::DirectoryError;

/// Outcome of a hook that may stop the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum HookResult {
    Continue,
    /// Stop processing with this result code, message, matched DN and referrals
    Abort(DirectoryError),
}

impl HookResult {
    pub fn abort(error: DirectoryError) -> Self {
        Self::Abort(error)
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Convert into a `Result` so processors can use `?`.
    pub fn into_result(self) -> Result<(), DirectoryError> {
        match self {
            Self::Continue => Ok(()),
            Self::Abort(error) => Err(error),
        }
    }
}

/// Result of a plugin invocation.
pub type PluginResult = HookResult;

/// Result of a replication provider invocation.
pub type ProviderResult = HookResult;
