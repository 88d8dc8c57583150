//! Per-request operation state.
//!
//! An [`Operation`] is created by the protocol layer for every client request
//! and handed by exclusive reference through the processing pipeline. It
//! carries the decoded request, request controls, processing flags, the
//! client identity, a shared cancellation flag and the mutable result.
//! Processors record what they resolve along the way (target DN, fetched
//! entry, modified entry) in [`ProcessingState`] so plugins and providers can
//! inspect it.

pub mod control;
pub mod request;
pub mod result;
pub mod search;

pub use control::{Control, ControlValue, oids};
pub use request::{
    AbandonRequest, AddRequest, BindCredentials, BindRequest, CompareRequest, DeleteRequest,
    Modification, ModificationType, ModifyDnRequest, ModifyRequest, OperationKind,
    OperationRequest, SearchRequest, SearchScope,
};
pub use result::OperationResult;
pub use search::SearchState;

use crate::auth::{AuthenticationInfo, ClientInfo, ResourceLimits};
use crate::dn::Dn;
use crate::entry::{Attribute, Entry};
use crate::notify::ChangeRecord;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Cooperative cancellation signal shared between an operation and whoever
/// may cancel it (abandon requests, request deadlines, shutdown).
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Whether both handles share one signal.
    pub fn same_as(&self, other: &CancellationFlag) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// What the processor resolved while running the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingState {
    /// Decoded target DN
    pub entry_dn: Option<Dn>,
    /// Entry being added, or the current entry for every other kind
    pub entry: Option<Entry>,
    /// Entry as it will look after a modify or modify DN
    pub modified_entry: Option<Entry>,
    /// Decoded new DN of a modify DN
    pub new_dn: Option<Dn>,
    /// Decoded new superior of a modify DN
    pub new_superior: Option<Dn>,
}

/// What a bind established. Installed on the connection by the protocol
/// layer after the response is sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindOutcome {
    pub authentication: Option<AuthenticationInfo>,
    pub resource_limits: Option<ResourceLimits>,
}

/// A single client request travelling through the pipeline.
#[derive(Debug)]
pub struct Operation {
    id: Uuid,
    /// Connection and message id, when the operation came from a client
    connection: Option<(u64, u32)>,
    request: OperationRequest,
    controls: Vec<Control>,
    internal: bool,
    synchronization: bool,
    no_op: bool,
    client: ClientInfo,
    cancellation: CancellationFlag,
    result: OperationResult,
    state: ProcessingState,
    search: SearchState,
    bind: BindOutcome,
    changes: Vec<ChangeRecord>,
}

impl Operation {
    pub fn new(request: OperationRequest) -> Self {
        let search = match &request {
            OperationRequest::Search(search) => SearchState::for_request(search),
            _ => SearchState::default(),
        };
        Self {
            id: Uuid::new_v4(),
            connection: None,
            request,
            controls: Vec::new(),
            internal: false,
            synchronization: false,
            no_op: false,
            client: ClientInfo::anonymous(),
            cancellation: CancellationFlag::new(),
            result: OperationResult::default(),
            state: ProcessingState::default(),
            search,
            bind: BindOutcome::default(),
            changes: Vec::new(),
        }
    }

    pub fn add(dn: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self::new(OperationRequest::Add(AddRequest {
            dn: dn.into(),
            attributes,
        }))
    }

    pub fn add_entry(entry: &Entry) -> Self {
        Self::new(OperationRequest::Add(AddRequest::from_entry(entry)))
    }

    pub fn delete(dn: impl Into<String>) -> Self {
        Self::new(OperationRequest::Delete(DeleteRequest { dn: dn.into() }))
    }

    pub fn modify(dn: impl Into<String>, modifications: Vec<Modification>) -> Self {
        Self::new(OperationRequest::Modify(ModifyRequest {
            dn: dn.into(),
            modifications,
        }))
    }

    pub fn modify_dn(
        dn: impl Into<String>,
        new_rdn: impl Into<String>,
        delete_old_rdn: bool,
        new_superior: Option<String>,
    ) -> Self {
        Self::new(OperationRequest::ModifyDn(ModifyDnRequest {
            dn: dn.into(),
            new_rdn: new_rdn.into(),
            delete_old_rdn,
            new_superior,
        }))
    }

    pub fn search(
        base_dn: impl Into<String>,
        scope: SearchScope,
        filter: impl Into<String>,
    ) -> Self {
        Self::new(OperationRequest::Search(SearchRequest {
            base_dn: base_dn.into(),
            scope,
            filter: filter.into(),
            size_limit: 0,
            attributes: Vec::new(),
        }))
    }

    pub fn simple_bind(dn: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(OperationRequest::Bind(BindRequest {
            dn: dn.into(),
            credentials: BindCredentials::Simple(password.into()),
        }))
    }

    pub fn sasl_bind(mechanism: impl Into<String>, credentials: Option<Vec<u8>>) -> Self {
        Self::new(OperationRequest::Bind(BindRequest {
            dn: String::new(),
            credentials: BindCredentials::Sasl {
                mechanism: mechanism.into(),
                credentials,
            },
        }))
    }

    pub fn compare(
        dn: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(OperationRequest::Compare(CompareRequest {
            dn: dn.into(),
            attribute: attribute.into(),
            value: value.into(),
        }))
    }

    pub fn abandon(message_id: u32) -> Self {
        Self::new(OperationRequest::Abandon(AbandonRequest { message_id }))
    }

    pub fn with_connection(mut self, connection_id: u64, message_id: u32) -> Self {
        self.connection = Some((connection_id, message_id));
        self
    }

    pub fn with_control(mut self, control: Control) -> Self {
        self.controls.push(control);
        self
    }

    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    /// Mark the operation as issued by the server itself.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Mark the operation as a replayed replication change.
    pub fn synchronization(mut self) -> Self {
        self.synchronization = true;
        self
    }

    /// Request validation without mutation.
    pub fn no_op(mut self) -> Self {
        self.no_op = true;
        self
    }

    /// Limit the number of returned search entries.
    pub fn with_size_limit(mut self, size_limit: u32) -> Self {
        if let OperationRequest::Search(search) = &mut self.request {
            search.size_limit = size_limit;
            self.search.size_limit = size_limit;
        }
        self
    }

    /// Select the attributes returned by a search.
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let OperationRequest::Search(search) = &mut self.request {
            search.attributes = attributes.into_iter().map(Into::into).collect();
            self.search.attributes = search.attributes.clone();
        }
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Zero when no connection is set.
    pub fn connection_id(&self) -> u64 {
        self.connection.map_or(0, |(connection_id, _)| connection_id)
    }

    pub fn message_id(&self) -> u32 {
        self.connection.map_or(0, |(_, message_id)| message_id)
    }

    /// Key an abandon request can target, absent for operations built
    /// without a connection.
    pub fn connection_key(&self) -> Option<(u64, u32)> {
        self.connection
    }

    pub fn kind(&self) -> OperationKind {
        self.request.kind()
    }

    pub fn request(&self) -> &OperationRequest {
        &self.request
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn is_synchronization(&self) -> bool {
        self.synchronization
    }

    pub fn is_no_op(&self) -> bool {
        self.no_op
    }

    pub(crate) fn set_no_op(&mut self) {
        self.no_op = true;
    }

    pub fn client(&self) -> &ClientInfo {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut ClientInfo {
        &mut self.client
    }

    /// A handle that can cancel this operation from another task.
    pub fn cancellation_handle(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    pub fn is_canceled(&self) -> bool {
        self.cancellation.is_canceled()
    }

    pub fn result(&self) -> &OperationResult {
        &self.result
    }

    pub fn result_mut(&mut self) -> &mut OperationResult {
        &mut self.result
    }

    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ProcessingState {
        &mut self.state
    }

    pub fn search_state(&self) -> &SearchState {
        &self.search
    }

    pub fn search_state_mut(&mut self) -> &mut SearchState {
        &mut self.search
    }

    pub fn bind_outcome(&self) -> &BindOutcome {
        &self.bind
    }

    pub fn bind_outcome_mut(&mut self) -> &mut BindOutcome {
        &mut self.bind
    }

    /// Change records queued for post-response notification.
    pub fn changes(&self) -> &[ChangeRecord] {
        &self.changes
    }

    pub(crate) fn queue_change(&mut self, change: ChangeRecord) {
        self.changes.push(change);
    }

    pub(crate) fn take_changes(&mut self) -> Vec<ChangeRecord> {
        std::mem::take(&mut self.changes)
    }

    /// Hand one matching entry to the search result sink. See
    /// [`SearchState::return_entry`].
    pub fn return_search_entry(&mut self, entry: Entry) -> crate::error::DirectoryResult<bool> {
        if self.cancellation.is_canceled() {
            return Ok(false);
        }
        self.search.return_entry(entry)
    }

    pub fn search_entries(&self) -> &[Entry] {
        self.search.entries()
    }

    pub(crate) fn take_search_entries(&mut self) -> Vec<Entry> {
        self.search.take_entries()
    }
}
