//! Post-response change notification.
//!
//! Processors queue a [`ChangeRecord`] on the operation when a write commits.
//! Once the response has been sent, the server hands the operation to the
//! [`PostResponseNotifier`], which fans the records out to every registered
//! [`ChangeNotificationListener`]. Nothing is delivered unless the final
//! result is `Success`, and a failing listener never affects the others or
//! the result.

use crate::entry::Entry;
use crate::error::DirectoryError;
use crate::operation::Operation;
use async_trait::async_trait;
use log::{debug, error};
use std::sync::{Arc, Mutex};

/// A committed change awaiting notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeRecord {
    Add { entry: Entry },
    Delete { entry: Entry },
    Modify { old_entry: Entry, new_entry: Entry },
    ModifyDn { old_entry: Entry, new_entry: Entry },
}

/// Receives committed changes. Every method defaults to doing nothing.
#[async_trait]
pub trait ChangeNotificationListener: Send + Sync {
    /// Name used for registration and in logs.
    fn name(&self) -> &str;

    async fn handle_add(&self, _op: &Operation, _entry: &Entry) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn handle_delete(&self, _op: &Operation, _entry: &Entry) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn handle_modify(
        &self,
        _op: &Operation,
        _old_entry: &Entry,
        _new_entry: &Entry,
    ) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn handle_modify_dn(
        &self,
        _op: &Operation,
        _old_entry: &Entry,
        _new_entry: &Entry,
    ) -> Result<(), DirectoryError> {
        Ok(())
    }
}

type ListenerList = Vec<Arc<dyn ChangeNotificationListener>>;

/// Registered change listeners plus the fan-out logic.
///
/// The listener list is replaced as a whole on every registration change, so
/// a notification in progress keeps iterating the snapshot it started with.
#[derive(Default)]
pub struct PostResponseNotifier {
    listeners: Mutex<Arc<ListenerList>>,
}

impl PostResponseNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<ListenerList> {
        let guard = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    fn update(&self, f: impl FnOnce(&mut ListenerList)) {
        let mut guard = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next: ListenerList = guard.as_ref().clone();
        f(&mut next);
        *guard = Arc::new(next);
    }

    pub fn register(&self, listener: Arc<dyn ChangeNotificationListener>) {
        debug!("Registering change notification listener {}", listener.name());
        self.update(|listeners| listeners.push(listener));
    }

    /// Remove every listener with the given name. Returns whether any was removed.
    pub fn deregister(&self, name: &str) -> bool {
        let mut removed = false;
        self.update(|listeners| {
            let before = listeners.len();
            listeners.retain(|l| l.name() != name);
            removed = listeners.len() != before;
        });
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.snapshot().len()
    }

    /// Deliver the operation's queued changes to every listener. Returns the
    /// number of listener invocations that failed.
    pub async fn notify(&self, op: &Operation) -> usize {
        if !op.result().is_success() || op.changes().is_empty() {
            return 0;
        }
        let listeners = self.snapshot();
        let mut failures = 0;
        for change in op.changes() {
            for listener in listeners.iter() {
                let outcome = match change {
                    ChangeRecord::Add { entry } => listener.handle_add(op, entry).await,
                    ChangeRecord::Delete { entry } => listener.handle_delete(op, entry).await,
                    ChangeRecord::Modify {
                        old_entry,
                        new_entry,
                    } => listener.handle_modify(op, old_entry, new_entry).await,
                    ChangeRecord::ModifyDn {
                        old_entry,
                        new_entry,
                    } => listener.handle_modify_dn(op, old_entry, new_entry).await,
                };
                if let Err(e) = outcome {
                    failures += 1;
                    error!(
                        "Change notification listener {} failed for {} operation {}: {}",
                        listener.name(),
                        op.kind(),
                        op.id(),
                        e
                    );
                }
            }
        }
        failures
    }
}
