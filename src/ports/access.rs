//! Access control decisions.

use crate::dn::Dn;
use crate::operation::{Control, Operation};
use async_trait::async_trait;

/// Authorization checks made by the processors. A `false` answer aborts
/// the operation with a fixed result code chosen by the caller.
#[async_trait]
pub trait AccessPort: Send + Sync {
    /// Whether the operation as a whole is allowed. Evaluated against the
    /// state recorded in [`Operation::state`], e.g. the entry being added.
    async fn is_allowed(&self, op: &Operation) -> bool;

    /// Whether the requester may use `control` against `dn`.
    async fn is_allowed_control(&self, _dn: &Dn, _op: &Operation, _control: &Control) -> bool {
        true
    }

    /// Whether `dn` may be returned to the requester as a matched DN.
    async fn can_disclose(&self, _dn: &Dn, _op: &Operation) -> bool {
        true
    }
}

/// Access port that allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AccessPort for AllowAll {
    async fn is_allowed(&self, _op: &Operation) -> bool {
        true
    }
}
