//! Transaction lifetime management.

use super::{Backend, BackendError, BackendTransaction, TransactionMode};
use log::{trace, warn};
use uuid::Uuid;

/// Owns one backend transaction for the duration of a write pipeline.
///
/// The scope is opened once, immediately before the first backend read, and
/// must be released with [`TransactionScope::close`] on every exit path. If a
/// scope is dropped without being closed (a panic unwinding through the
/// pipeline, or a future dropped mid-flight) the transaction is still
/// released and a warning is logged.
#[derive(Debug)]
pub struct TransactionScope {
    transaction: Box<dyn BackendTransaction>,
    backend_id: String,
    operation_id: Uuid,
    closed: bool,
}

impl TransactionScope {
    pub async fn open(
        backend: &dyn Backend,
        mode: TransactionMode,
        operation_id: Uuid,
    ) -> Result<Self, BackendError> {
        let transaction = backend.begin_transaction(mode).await?;
        trace!(
            "Opened {:?} transaction {} on backend {} for operation {}",
            mode,
            transaction.id(),
            backend.backend_id(),
            operation_id
        );
        Ok(Self {
            transaction,
            backend_id: backend.backend_id().to_string(),
            operation_id,
            closed: false,
        })
    }

    /// The backend-native handle, passed to every backend primitive.
    pub fn transaction(&self) -> &dyn BackendTransaction {
        self.transaction.as_ref()
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    /// Release the transaction.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.transaction.close();
        trace!(
            "Closed transaction {} on backend {} for operation {}",
            self.transaction.id(),
            self.backend_id,
            self.operation_id
        );
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                "Transaction {} on backend {} for operation {} was not closed explicitly; releasing it",
                self.transaction.id(),
                self.backend_id,
                self.operation_id
            );
            self.release();
        }
    }
}
