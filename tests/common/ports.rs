//! Recording and fault-injecting port implementations.

use async_trait::async_trait;
use ldap_workflow::backend::{
    Backend, BackendError, BackendTransaction, InMemoryBackend, LockMode, TransactionMode,
    WritabilityMode,
};
use ldap_workflow::dn::Dn;
use ldap_workflow::entry::Entry;
use ldap_workflow::error::DirectoryResult;
use ldap_workflow::operation::{Control, Operation};
use ldap_workflow::ports::{
    AccessPort, AccountStatusNotification, AccountStatusNotificationHandler, HookResult,
    PluginPort, ReplicationPort,
};
use ldap_workflow::{ChangeNotificationListener, DirectoryError};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Where a hook should inject a failure.
#[derive(Debug, Clone, Default)]
pub struct Fault {
    pub error: Option<DirectoryError>,
    /// Cancel the operation instead of failing it
    pub cancel: bool,
}

impl Fault {
    fn apply(&self, op: &Operation) -> HookResult {
        if self.cancel {
            op.cancellation_handle().cancel();
        }
        match &self.error {
            Some(error) => HookResult::abort(error.clone()),
            None => HookResult::Continue,
        }
    }
}

fn event(stage: &str, op: &Operation) -> String {
    format!("{}:{}", stage, op.kind())
}

/// Plugin that records every invocation and injects configured faults.
#[derive(Default)]
pub struct RecordingPlugin {
    events: Mutex<Vec<String>>,
    pub pre_operation_fault: Mutex<Fault>,
    pub post_operation_fault: Mutex<Fault>,
    /// Replacement description written into the entry being added or
    /// modified during pre-operation
    pub rewrite_description: Mutex<Option<String>>,
}

impl RecordingPlugin {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, stage: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(&format!("{}:", stage)))
            .count()
    }

    pub fn fail_pre_operation(&self, error: DirectoryError) {
        self.pre_operation_fault.lock().unwrap().error = Some(error);
    }

    pub fn cancel_in_pre_operation(&self) {
        self.pre_operation_fault.lock().unwrap().cancel = true;
    }

    pub fn fail_post_operation(&self, error: DirectoryError) {
        self.post_operation_fault.lock().unwrap().error = Some(error);
    }

    pub fn reset(&self) {
        self.events.lock().unwrap().clear();
        *self.pre_operation_fault.lock().unwrap() = Fault::default();
        *self.post_operation_fault.lock().unwrap() = Fault::default();
    }

    fn record(&self, stage: &str, op: &Operation) {
        self.events.lock().unwrap().push(event(stage, op));
    }
}

#[async_trait]
impl PluginPort for RecordingPlugin {
    async fn pre_operation(&self, op: &mut Operation) -> HookResult {
        self.record("pre", op);
        let rewrite = self.rewrite_description.lock().unwrap().clone();
        if let Some(description) = rewrite {
            let state = op.state_mut();
            let target = state.modified_entry.as_mut().or(state.entry.as_mut());
            if let Some(entry) = target {
                entry.remove_attribute("description");
                entry.add_value("description", description, false);
            }
        }
        let fault = self.pre_operation_fault.lock().unwrap().clone();
        fault.apply(op)
    }

    async fn post_operation(&self, op: &mut Operation) -> HookResult {
        self.record("post", op);
        let fault = self.post_operation_fault.lock().unwrap().clone();
        fault.apply(op)
    }

    async fn post_synchronization(&self, op: &mut Operation) -> HookResult {
        self.record("post-sync", op);
        HookResult::Continue
    }
}

/// Replication provider that records every invocation and can veto.
#[derive(Default)]
pub struct RecordingReplication {
    events: Mutex<Vec<String>>,
    pub conflict_fault: Mutex<Fault>,
    pub pre_operation_fault: Mutex<Fault>,
    pub post_operation_error: Mutex<Option<DirectoryError>>,
}

impl RecordingReplication {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, stage: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(&format!("{}:", stage)))
            .count()
    }

    pub fn veto_conflict(&self, error: DirectoryError) {
        self.conflict_fault.lock().unwrap().error = Some(error);
    }

    pub fn veto_pre_operation(&self, error: DirectoryError) {
        self.pre_operation_fault.lock().unwrap().error = Some(error);
    }

    pub fn fail_post_operation(&self, error: DirectoryError) {
        *self.post_operation_error.lock().unwrap() = Some(error);
    }

    fn record(&self, stage: &str, op: &Operation) {
        self.events.lock().unwrap().push(event(stage, op));
    }
}

#[async_trait]
impl ReplicationPort for RecordingReplication {
    async fn handle_conflict_resolution(&self, op: &mut Operation) -> HookResult {
        self.record("conflict", op);
        let fault = self.conflict_fault.lock().unwrap().clone();
        fault.apply(op)
    }

    async fn do_pre_operation(&self, op: &mut Operation) -> HookResult {
        self.record("pre", op);
        let fault = self.pre_operation_fault.lock().unwrap().clone();
        fault.apply(op)
    }

    async fn do_post_operation(&self, op: &mut Operation) -> Result<(), DirectoryError> {
        self.record("post", op);
        match self.post_operation_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Access port whose answers are switched at runtime.
#[derive(Default)]
pub struct ScriptedAccess {
    pub deny_operations: AtomicBool,
    pub deny_controls: AtomicBool,
    pub hide_matched_dn: AtomicBool,
    pub checks: AtomicUsize,
}

impl ScriptedAccess {
    pub fn deny_all(&self) {
        self.deny_operations.store(true, Ordering::SeqCst);
    }

    pub fn deny_controls(&self) {
        self.deny_controls.store(true, Ordering::SeqCst);
    }

    pub fn hide_matched_dn(&self) {
        self.hide_matched_dn.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccessPort for ScriptedAccess {
    async fn is_allowed(&self, _op: &Operation) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        !self.deny_operations.load(Ordering::SeqCst)
    }

    async fn is_allowed_control(&self, _dn: &Dn, _op: &Operation, _control: &Control) -> bool {
        !self.deny_controls.load(Ordering::SeqCst)
    }

    async fn can_disclose(&self, _dn: &Dn, _op: &Operation) -> bool {
        !self.hide_matched_dn.load(Ordering::SeqCst)
    }
}

/// Change listener that records what it was told.
pub struct RecordingListener {
    name: String,
    pub fail: AtomicBool,
    changes: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: AtomicBool::new(false),
            changes: Mutex::new(Vec::new()),
        }
    }

    /// Recorded changes as `kind:dn` strings.
    pub fn changes(&self) -> Vec<String> {
        self.changes.lock().unwrap().clone()
    }

    fn record(&self, kind: &str, dn: &Dn) -> Result<(), DirectoryError> {
        self.changes.lock().unwrap().push(format!("{}:{}", kind, dn));
        if self.fail.load(Ordering::SeqCst) {
            Err(DirectoryError::internal("listener failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChangeNotificationListener for RecordingListener {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle_add(&self, _op: &Operation, entry: &Entry) -> Result<(), DirectoryError> {
        self.record("add", entry.dn())
    }

    async fn handle_delete(&self, _op: &Operation, entry: &Entry) -> Result<(), DirectoryError> {
        self.record("delete", entry.dn())
    }

    async fn handle_modify(
        &self,
        _op: &Operation,
        _old_entry: &Entry,
        new_entry: &Entry,
    ) -> Result<(), DirectoryError> {
        self.record("modify", new_entry.dn())
    }

    async fn handle_modify_dn(
        &self,
        _op: &Operation,
        old_entry: &Entry,
        new_entry: &Entry,
    ) -> Result<(), DirectoryError> {
        self.record(&format!("modify-dn:{}->", old_entry.dn()), new_entry.dn())
    }
}

/// Account status handler that keeps every notification.
#[derive(Default)]
pub struct RecordingStatusHandler {
    notifications: Mutex<Vec<AccountStatusNotification>>,
}

impl RecordingStatusHandler {
    pub fn notifications(&self) -> Vec<AccountStatusNotification> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountStatusNotificationHandler for RecordingStatusHandler {
    async fn handle(&self, notification: AccountStatusNotification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

/// Text carried by every failure a [`FaultyBackend`] injects.
pub const INJECTED_FAILURE: &str = "injected backend failure";

/// Backend primitives a [`FaultyBackend`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFault {
    /// Entry reads and subordinate checks
    Read,
    /// add, delete, rename and replace
    Commit,
}

/// Pass-through backend over the fixture store that fails one class of
/// primitives on demand.
pub struct FaultyBackend {
    inner: Arc<InMemoryBackend>,
    fault: Mutex<Option<BackendFault>>,
}

impl FaultyBackend {
    pub fn new(inner: Arc<InMemoryBackend>) -> Self {
        Self {
            inner,
            fault: Mutex::new(None),
        }
    }

    pub fn fail(&self, fault: BackendFault) {
        *self.fault.lock().unwrap() = Some(fault);
    }

    fn check(&self, stage: BackendFault) -> Result<(), BackendError> {
        if *self.fault.lock().unwrap() == Some(stage) {
            Err(BackendError::internal(format!("{} ({:?})", INJECTED_FAILURE, stage)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Backend for FaultyBackend {
    fn backend_id(&self) -> &str {
        self.inner.backend_id()
    }

    fn base_dns(&self) -> &[Dn] {
        self.inner.base_dns()
    }

    fn writability_mode(&self) -> WritabilityMode {
        self.inner.writability_mode()
    }

    fn is_private(&self) -> bool {
        self.inner.is_private()
    }

    fn supports_control(&self, oid: &str) -> bool {
        self.inner.supports_control(oid)
    }

    async fn begin_transaction(
        &self,
        mode: TransactionMode,
    ) -> Result<Box<dyn BackendTransaction>, BackendError> {
        self.inner.begin_transaction(mode).await
    }

    async fn get_entry(
        &self,
        txn: &dyn BackendTransaction,
        dn: &Dn,
        lock: LockMode,
    ) -> Result<Option<Entry>, BackendError> {
        self.check(BackendFault::Read)?;
        self.inner.get_entry(txn, dn, lock).await
    }

    async fn entry_exists(
        &self,
        txn: &dyn BackendTransaction,
        dn: &Dn,
    ) -> Result<bool, BackendError> {
        self.check(BackendFault::Read)?;
        self.inner.entry_exists(txn, dn).await
    }

    async fn has_subordinates(
        &self,
        txn: &dyn BackendTransaction,
        dn: &Dn,
    ) -> Result<bool, BackendError> {
        self.check(BackendFault::Read)?;
        self.inner.has_subordinates(txn, dn).await
    }

    async fn add_entry(
        &self,
        txn: &dyn BackendTransaction,
        entry: &Entry,
    ) -> Result<(), BackendError> {
        self.check(BackendFault::Commit)?;
        self.inner.add_entry(txn, entry).await
    }

    async fn delete_entry(
        &self,
        txn: &dyn BackendTransaction,
        dn: &Dn,
        subtree: bool,
    ) -> Result<(), BackendError> {
        self.check(BackendFault::Commit)?;
        self.inner.delete_entry(txn, dn, subtree).await
    }

    async fn rename_entry(
        &self,
        txn: &dyn BackendTransaction,
        current_dn: &Dn,
        entry: &Entry,
    ) -> Result<(), BackendError> {
        self.check(BackendFault::Commit)?;
        self.inner.rename_entry(txn, current_dn, entry).await
    }

    async fn replace_entry(
        &self,
        txn: &dyn BackendTransaction,
        old_entry: &Entry,
        new_entry: &Entry,
    ) -> Result<(), BackendError> {
        self.check(BackendFault::Commit)?;
        self.inner.replace_entry(txn, old_entry, new_entry).await
    }

    async fn search(&self, op: &mut Operation) -> DirectoryResult<()> {
        self.inner.search(op).await
    }

    async fn find_entries_by_attribute(
        &self,
        attribute: &str,
        value: &str,
    ) -> Result<Vec<Entry>, BackendError> {
        self.inner.find_entries_by_attribute(attribute, value).await
    }
}
