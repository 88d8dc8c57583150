//! In-memory backend implementation.
//!
//! Entries live in an ordered map behind an async `RwLock`. Write
//! transactions take a backend-wide mutex for their whole lifetime, so
//! exclusive entry locks are trivially satisfied: at most one writer is
//! active at a time and it sees a stable tree until it closes.
//!
//! # Features
//!
//! * Subtree delete and subtree rename
//! * Transaction open/close counters for verifying pipeline cleanup
//! * Runtime writability switch
//! * Matched DN computation for missing entries

use super::{
    Backend, BackendError, BackendTransaction, LockMode, TransactionMode, WritabilityMode,
};
use crate::dn::Dn;
use crate::entry::{Entry, values_match};
use crate::error::{DirectoryError, DirectoryResult};
use crate::operation::Operation;
use async_trait::async_trait;
use log::{debug, trace};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Debug, Default)]
struct TransactionCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

#[derive(Debug)]
struct InMemoryTransaction {
    id: u64,
    mode: TransactionMode,
    write_guard: Option<OwnedMutexGuard<()>>,
    open: bool,
    counters: Arc<TransactionCounters>,
}

impl BackendTransaction for InMemoryTransaction {
    fn id(&self) -> u64 {
        self.id
    }

    fn mode(&self) -> TransactionMode {
        self.mode
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.write_guard.take();
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Thread-safe in-memory backend.
#[derive(Debug)]
pub struct InMemoryBackend {
    backend_id: String,
    base_dns: Vec<Dn>,
    entries: RwLock<BTreeMap<Dn, Entry>>,
    write_lock: Arc<Mutex<()>>,
    writability: AtomicU8,
    private: bool,
    supported_controls: Vec<String>,
    next_transaction_id: AtomicU64,
    counters: Arc<TransactionCounters>,
    mutations: AtomicUsize,
}

/// Counters describing backend activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InMemoryBackendStats {
    pub entry_count: usize,
    pub transactions_opened: usize,
    pub transactions_closed: usize,
    /// Number of successful add/delete/rename/replace primitives
    pub mutations: usize,
}

impl InMemoryBackend {
    pub fn new(backend_id: impl Into<String>, base_dns: Vec<Dn>) -> Self {
        Self {
            backend_id: backend_id.into(),
            base_dns,
            entries: RwLock::new(BTreeMap::new()),
            write_lock: Arc::new(Mutex::new(())),
            writability: AtomicU8::new(WritabilityMode::Enabled.as_u8()),
            private: false,
            supported_controls: Vec::new(),
            next_transaction_id: AtomicU64::new(1),
            counters: Arc::new(TransactionCounters::default()),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Mark the backend as holding server-private data.
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// Advertise support for a request control.
    pub fn with_supported_control(mut self, oid: impl Into<String>) -> Self {
        self.supported_controls.push(oid.into());
        self
    }

    pub fn set_writability_mode(&self, mode: WritabilityMode) {
        self.writability.store(mode.as_u8(), Ordering::SeqCst);
    }

    /// Load entries without going through a transaction. Entries are
    /// inserted in the given order and must be inside a base DN.
    pub async fn import<I>(&self, entries: I) -> Result<usize, BackendError>
    where
        I: IntoIterator<Item = Entry>,
    {
        let mut guard = self.entries.write().await;
        let mut count = 0;
        for entry in entries {
            self.check_in_backend(entry.dn())?;
            guard.insert(entry.dn().clone(), entry);
            count += 1;
        }
        debug!("Imported {} entries into backend {}", count, self.backend_id);
        Ok(count)
    }

    /// Direct lookup outside any transaction.
    pub async fn entry(&self, dn: &Dn) -> Option<Entry> {
        self.entries.read().await.get(dn).cloned()
    }

    pub async fn stats(&self) -> InMemoryBackendStats {
        InMemoryBackendStats {
            entry_count: self.entries.read().await.len(),
            transactions_opened: self.counters.opened.load(Ordering::SeqCst),
            transactions_closed: self.counters.closed.load(Ordering::SeqCst),
            mutations: self.mutations.load(Ordering::SeqCst),
        }
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    fn check_in_backend(&self, dn: &Dn) -> Result<(), BackendError> {
        if self.handles_entry(dn) {
            Ok(())
        } else {
            Err(BackendError::NotInBackend {
                dn: dn.clone(),
                backend_id: self.backend_id.clone(),
            })
        }
    }

    fn check_writable(txn: &dyn BackendTransaction, operation: &str) -> Result<(), BackendError> {
        if !txn.is_open() {
            return Err(BackendError::TransactionClosed { id: txn.id() });
        }
        if txn.mode() != TransactionMode::ReadWrite {
            return Err(BackendError::ReadOnlyTransaction {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    fn is_base_dn(&self, dn: &Dn) -> bool {
        self.base_dns.iter().any(|base| base == dn)
    }

    /// Nearest existing ancestor of `dn` within this backend.
    fn matched_dn(entries: &BTreeMap<Dn, Entry>, dn: &Dn) -> Option<Dn> {
        let mut current = dn.parent();
        while let Some(candidate) = current {
            if candidate.is_root() {
                return None;
            }
            if entries.contains_key(&candidate) {
                return Some(candidate);
            }
            current = candidate.parent();
        }
        None
    }

    fn check_parent(&self, entries: &BTreeMap<Dn, Entry>, dn: &Dn) -> Result<(), BackendError> {
        if self.is_base_dn(dn) {
            return Ok(());
        }
        match dn.parent() {
            Some(parent) if entries.contains_key(&parent) => Ok(()),
            Some(parent) => Err(BackendError::NoSuchEntry {
                matched_dn: Self::matched_dn(entries, &parent),
                dn: parent,
            }),
            None => Err(BackendError::NotInBackend {
                dn: dn.clone(),
                backend_id: self.backend_id.clone(),
            }),
        }
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    fn backend_id(&self) -> &str {
        &self.backend_id
    }

    fn base_dns(&self) -> &[Dn] {
        &self.base_dns
    }

    fn writability_mode(&self) -> WritabilityMode {
        WritabilityMode::from_u8(self.writability.load(Ordering::SeqCst))
    }

    fn is_private(&self) -> bool {
        self.private
    }

    fn supports_control(&self, oid: &str) -> bool {
        self.supported_controls.iter().any(|c| c == oid)
    }

    async fn begin_transaction(
        &self,
        mode: TransactionMode,
    ) -> Result<Box<dyn BackendTransaction>, BackendError> {
        let write_guard = match mode {
            TransactionMode::ReadWrite => Some(Arc::clone(&self.write_lock).lock_owned().await),
            TransactionMode::ReadOnly => None,
        };
        let id = self.next_transaction_id.fetch_add(1, Ordering::SeqCst);
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        trace!("Backend {} began transaction {}", self.backend_id, id);
        Ok(Box::new(InMemoryTransaction {
            id,
            mode,
            write_guard,
            open: true,
            counters: Arc::clone(&self.counters),
        }))
    }

    async fn get_entry(
        &self,
        txn: &dyn BackendTransaction,
        dn: &Dn,
        lock: LockMode,
    ) -> Result<Option<Entry>, BackendError> {
        if !txn.is_open() {
            return Err(BackendError::TransactionClosed { id: txn.id() });
        }
        if lock == LockMode::Write && txn.mode() != TransactionMode::ReadWrite {
            return Err(BackendError::LockFailure {
                dn: dn.clone(),
                message: "an exclusive lock requires a read-write transaction".to_string(),
            });
        }
        Ok(self.entries.read().await.get(dn).cloned())
    }

    async fn has_subordinates(
        &self,
        txn: &dyn BackendTransaction,
        dn: &Dn,
    ) -> Result<bool, BackendError> {
        if !txn.is_open() {
            return Err(BackendError::TransactionClosed { id: txn.id() });
        }
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .any(|candidate| candidate.is_child_of(dn)))
    }

    async fn add_entry(
        &self,
        txn: &dyn BackendTransaction,
        entry: &Entry,
    ) -> Result<(), BackendError> {
        Self::check_writable(txn, "add")?;
        let dn = entry.dn();
        self.check_in_backend(dn)?;
        let mut entries = self.entries.write().await;
        if entries.contains_key(dn) {
            return Err(BackendError::EntryAlreadyExists { dn: dn.clone() });
        }
        self.check_parent(&entries, dn)?;
        entries.insert(dn.clone(), entry.clone());
        self.record_mutation();
        Ok(())
    }

    async fn delete_entry(
        &self,
        txn: &dyn BackendTransaction,
        dn: &Dn,
        subtree: bool,
    ) -> Result<(), BackendError> {
        Self::check_writable(txn, "delete")?;
        let mut entries = self.entries.write().await;
        if !entries.contains_key(dn) {
            return Err(BackendError::NoSuchEntry {
                dn: dn.clone(),
                matched_dn: Self::matched_dn(&entries, dn),
            });
        }
        let below: Vec<Dn> = entries
            .keys()
            .filter(|candidate| candidate.is_descendant_of(dn))
            .cloned()
            .collect();
        if !below.is_empty() && !subtree {
            return Err(BackendError::NotAllowedOnNonLeaf { dn: dn.clone() });
        }
        for child in below {
            entries.remove(&child);
        }
        entries.remove(dn);
        self.record_mutation();
        Ok(())
    }

    async fn rename_entry(
        &self,
        txn: &dyn BackendTransaction,
        current_dn: &Dn,
        entry: &Entry,
    ) -> Result<(), BackendError> {
        Self::check_writable(txn, "rename")?;
        let new_dn = entry.dn();
        self.check_in_backend(new_dn)?;
        let mut entries = self.entries.write().await;
        if !entries.contains_key(current_dn) {
            return Err(BackendError::NoSuchEntry {
                dn: current_dn.clone(),
                matched_dn: Self::matched_dn(&entries, current_dn),
            });
        }
        if new_dn != current_dn && entries.contains_key(new_dn) {
            return Err(BackendError::EntryAlreadyExists { dn: new_dn.clone() });
        }
        self.check_parent(&entries, new_dn)?;

        let below: Vec<Dn> = entries
            .keys()
            .filter(|candidate| candidate.is_descendant_of(current_dn))
            .cloned()
            .collect();
        entries.remove(current_dn);
        for old_dn in below {
            if let Some(mut child) = entries.remove(&old_dn) {
                let Some(moved) = old_dn.rebase(current_dn, new_dn) else {
                    return Err(BackendError::internal(format!(
                        "entry {} is not below {}",
                        old_dn, current_dn
                    )));
                };
                child.set_dn(moved.clone());
                entries.insert(moved, child);
            }
        }
        entries.insert(new_dn.clone(), entry.clone());
        self.record_mutation();
        Ok(())
    }

    async fn replace_entry(
        &self,
        txn: &dyn BackendTransaction,
        old_entry: &Entry,
        new_entry: &Entry,
    ) -> Result<(), BackendError> {
        Self::check_writable(txn, "replace")?;
        if old_entry.dn() != new_entry.dn() {
            return Err(BackendError::internal(format!(
                "cannot replace {} with an entry named {}",
                old_entry.dn(),
                new_entry.dn()
            )));
        }
        let mut entries = self.entries.write().await;
        match entries.get_mut(new_entry.dn()) {
            Some(stored) => {
                *stored = new_entry.clone();
                self.record_mutation();
                Ok(())
            }
            None => Err(BackendError::NoSuchEntry {
                dn: new_entry.dn().clone(),
                matched_dn: Self::matched_dn(&entries, new_entry.dn()),
            }),
        }
    }

    async fn search(&self, op: &mut Operation) -> DirectoryResult<()> {
        let Some(base) = op.search_state().base_dn.clone() else {
            return Err(DirectoryError::internal("search base DN was not decoded"));
        };
        let mut matching: Vec<Entry> = {
            let entries = self.entries.read().await;
            if !entries.contains_key(&base) {
                return Err(BackendError::NoSuchEntry {
                    matched_dn: Self::matched_dn(&entries, &base),
                    dn: base,
                }
                .into());
            }
            let state = op.search_state();
            entries
                .values()
                .filter(|entry| state.in_scope(entry.dn()) && state.matches(entry))
                .cloned()
                .collect()
        };
        matching.sort_by(|a, b| {
            a.dn()
                .len()
                .cmp(&b.dn().len())
                .then_with(|| a.dn().cmp(b.dn()))
        });
        trace!(
            "Backend {} found {} candidate entries below {}",
            self.backend_id,
            matching.len(),
            base
        );
        for entry in matching {
            if !op.return_search_entry(entry)? {
                break;
            }
        }
        Ok(())
    }

    async fn find_entries_by_attribute(
        &self,
        attribute: &str,
        value: &str,
    ) -> Result<Vec<Entry>, BackendError> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|entry| entry.values(attribute).iter().any(|v| values_match(v, value)))
            .cloned()
            .collect())
    }
}
