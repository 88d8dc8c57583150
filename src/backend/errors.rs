//! Backend-specific error types.
//!
//! These errors describe storage failures without any knowledge of the
//! processing pipeline. The `From` conversion maps each failure to the LDAP
//! result code the client should see; anything unexpected becomes `Other`
//! with the original message attached.

use crate::dn::Dn;
use crate::error::{DirectoryError, ResultCode};

/// Errors raised by backend primitives.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// The entry to add, or the target of a rename, already exists.
    #[error("The entry {dn} already exists")]
    EntryAlreadyExists { dn: Dn },

    /// The entry, or the parent of a new entry, does not exist.
    #[error("The entry {dn} does not exist")]
    NoSuchEntry { dn: Dn, matched_dn: Option<Dn> },

    /// The entry has subordinates and the operation requires a leaf.
    #[error("The entry {dn} cannot be removed because it has subordinate entries")]
    NotAllowedOnNonLeaf { dn: Dn },

    /// The DN is outside every base DN of the backend.
    #[error("The entry {dn} does not belong in backend {backend_id}")]
    NotInBackend { dn: Dn, backend_id: String },

    /// A lock could not be obtained on the entry.
    #[error("Unable to obtain a lock on entry {dn}: {message}")]
    LockFailure { dn: Dn, message: String },

    /// The transaction handle has already been released.
    #[error("Transaction {id} has already been closed")]
    TransactionClosed { id: u64 },

    /// A write or write lock was attempted inside a read-only transaction.
    #[error("{operation} requires a read-write transaction")]
    ReadOnlyTransaction { operation: String },

    /// The backend cannot serve requests at the moment.
    #[error("Backend {backend_id} is unavailable: {message}")]
    Unavailable { backend_id: String, message: String },

    #[error("{message}")]
    Internal { message: String },
}

impl BackendError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The result code this failure maps to.
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::EntryAlreadyExists { .. } => ResultCode::EntryAlreadyExists,
            Self::NoSuchEntry { .. } => ResultCode::NoSuchObject,
            Self::NotAllowedOnNonLeaf { .. } => ResultCode::NotAllowedOnNonLeaf,
            Self::NotInBackend { .. } => ResultCode::UnwillingToPerform,
            Self::LockFailure { .. } => ResultCode::Busy,
            Self::Unavailable { .. } => ResultCode::Unavailable,
            Self::TransactionClosed { .. }
            | Self::ReadOnlyTransaction { .. }
            | Self::Internal { .. } => ResultCode::Other,
        }
    }
}

impl From<BackendError> for DirectoryError {
    fn from(error: BackendError) -> Self {
        let result_code = error.result_code();
        let matched_dn = match &error {
            BackendError::NoSuchEntry { matched_dn, .. } => matched_dn.clone(),
            _ => None,
        };
        let message = match result_code {
            ResultCode::Other => format!("An error occurred in the backend: {}", error),
            _ => error.to_string(),
        };
        DirectoryError::new(result_code, message).with_matched_dn(matched_dn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_map_to_result_codes() {
        let dn = Dn::parse("uid=x,o=test").unwrap();
        let err: DirectoryError = BackendError::NoSuchEntry {
            dn: dn.clone(),
            matched_dn: Some(Dn::parse("o=test").unwrap()),
        }
        .into();
        assert_eq!(err.result_code, ResultCode::NoSuchObject);
        assert_eq!(err.matched_dn.unwrap().to_string(), "o=test");

        let err: DirectoryError = BackendError::EntryAlreadyExists { dn }.into();
        assert_eq!(err.result_code, ResultCode::EntryAlreadyExists);
    }

    #[test]
    fn generic_failures_keep_the_original_message() {
        let err: DirectoryError = BackendError::internal("disk on fire").into();
        assert_eq!(err.result_code, ResultCode::Other);
        assert!(err.message.contains("disk on fire"));
        assert!(err.matched_dn.is_none());
    }
}
