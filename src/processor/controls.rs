//! Request control handling shared by the processors.

use super::{Abort, Stage};
use crate::auth::{ClientInfo, Privilege};
use crate::backend::{Backend, LockMode, TransactionMode, TransactionScope};
use crate::context::ServerContext;
use crate::dn::Dn;
use crate::entry::Entry;
use crate::error::{DirectoryError, ResultCode};
use crate::filter::Filter;
use crate::operation::{Control, ControlValue, Operation, OperationKind, oids};
use log::debug;
use uuid::Uuid;

/// Control outcomes the processor acts on itself.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RequestControls {
    pub subtree_delete: bool,
}

/// Apply every request control on the operation.
///
/// `target` is the entry assertion filters are evaluated against: the entry
/// being added, the current entry, or the search base.
pub(crate) async fn process(
    ctx: &ServerContext,
    backend: &dyn Backend,
    op: &mut Operation,
    target_dn: &Dn,
    target: Option<&Entry>,
) -> Stage<RequestControls> {
    let controls = op.controls().to_vec();
    let kind = op.kind();
    let mut outcome = RequestControls::default();
    let mut proxied = false;

    for control in &controls {
        match control.oid.as_str() {
            oids::ASSERTION if kind != OperationKind::Bind => {
                let ControlValue::Assertion(raw) = &control.value else {
                    return Err(DirectoryError::protocol_error(
                        "The assertion control does not contain a filter",
                    )
                    .into());
                };
                let filter = Filter::parse(raw).map_err(|e| {
                    DirectoryError::protocol_error(format!(
                        "Unable to decode the assertion control filter: {}",
                        e
                    ))
                })?;
                ensure_allowed(ctx, target_dn, op, control).await?;
                let Some(entry) = target else {
                    return Err(DirectoryError::no_such_object(
                        format!(
                            "Entry {} cannot be checked against the assertion filter because it does not exist",
                            target_dn
                        ),
                        None,
                    )
                    .into());
                };
                if !filter.matches(entry) {
                    return Err(DirectoryError::new(
                        ResultCode::AssertionFailed,
                        format!(
                            "Entry {} cannot be processed because it does not match the assertion filter {}",
                            target_dn, filter
                        ),
                    )
                    .into());
                }
            }
            oids::PROXIED_AUTH_V1 | oids::PROXIED_AUTH_V2 if supports_proxied_auth(kind) => {
                if proxied {
                    return Err(DirectoryError::protocol_error(
                        "Only one proxied authorization control may be included in a request",
                    )
                    .into());
                }
                proxied = true;
                if !op.client().has_privilege(Privilege::ProxiedAuth) {
                    return Err(authorization_denied(
                        "You do not have sufficient privileges to use the proxied authorization control",
                    ));
                }
                ensure_allowed(ctx, target_dn, op, control).await?;
                let identity = match &control.value {
                    ControlValue::ProxiedAuthV1(raw) => resolve_dn(ctx, op.id(), raw).await?,
                    ControlValue::ProxiedAuthV2(raw) => {
                        resolve_authz_id(ctx, op.id(), raw).await?
                    }
                    _ => {
                        return Err(DirectoryError::protocol_error(
                            "The proxied authorization control does not contain an identity",
                        )
                        .into());
                    }
                };
                match identity {
                    Some(dn) => {
                        debug!("Operation {} proxied as {}", op.id(), dn);
                        op.client_mut().proxied_dn = Some(dn);
                    }
                    None => *op.client_mut() = ClientInfo::anonymous(),
                }
            }
            oids::SUBENTRIES if kind == OperationKind::Search => {
                let ControlValue::Subentries(visible) = &control.value else {
                    return Err(malformed(control));
                };
                ensure_allowed(ctx, target_dn, op, control).await?;
                op.search_state_mut().return_subentries = *visible;
            }
            oids::MATCHED_VALUES if kind == OperationKind::Search => {
                let ControlValue::MatchedValues(raw) = &control.value else {
                    return Err(malformed(control));
                };
                let filters = raw
                    .iter()
                    .map(|f| Filter::parse(f))
                    .collect::<Result<Vec<_>, _>>()?;
                ensure_allowed(ctx, target_dn, op, control).await?;
                op.search_state_mut().matched_values = filters;
            }
            oids::REAL_ATTRS_ONLY if kind == OperationKind::Search => {
                ensure_allowed(ctx, target_dn, op, control).await?;
                op.search_state_mut().real_attributes_only = true;
            }
            oids::VIRTUAL_ATTRS_ONLY if kind == OperationKind::Search => {
                ensure_allowed(ctx, target_dn, op, control).await?;
                op.search_state_mut().virtual_attributes_only = true;
            }
            oids::NO_OP if kind.is_write() => {
                ensure_allowed(ctx, target_dn, op, control).await?;
                op.set_no_op();
            }
            oids::SUBTREE_DELETE if kind == OperationKind::Delete => {
                ensure_allowed(ctx, target_dn, op, control).await?;
                outcome.subtree_delete = true;
            }
            oid => {
                if control.critical && !backend.supports_control(oid) {
                    return Err(DirectoryError::new(
                        ResultCode::UnavailableCriticalExtension,
                        format!(
                            "Unable to process the {} operation on {} because it contains an unsupported critical control with OID {}",
                            kind, target_dn, oid
                        ),
                    )
                    .into());
                }
            }
        }
    }

    let search = op.search_state();
    if search.real_attributes_only && search.virtual_attributes_only {
        return Err(DirectoryError::protocol_error(
            "The real attributes only and virtual attributes only controls cannot be combined",
        )
        .into());
    }
    Ok(outcome)
}

fn supports_proxied_auth(kind: OperationKind) -> bool {
    kind.is_write() || matches!(kind, OperationKind::Search | OperationKind::Compare)
}

fn malformed(control: &Control) -> Abort {
    DirectoryError::protocol_error(format!(
        "The value of the control with OID {} cannot be decoded",
        control.oid
    ))
    .into()
}

fn authorization_denied(message: impl Into<String>) -> Abort {
    DirectoryError::new(ResultCode::AuthorizationDenied, message).into()
}

async fn ensure_allowed(
    ctx: &ServerContext,
    dn: &Dn,
    op: &Operation,
    control: &Control,
) -> Stage {
    if ctx.access().is_allowed_control(dn, op, control).await {
        Ok(())
    } else {
        Err(DirectoryError::insufficient_access(format!(
            "You do not have sufficient access rights to use the control with OID {}",
            control.oid
        ))
        .into())
    }
}

/// Resolve a proxied DN to an existing entry. An empty DN is anonymous.
async fn resolve_dn(ctx: &ServerContext, operation_id: Uuid, raw: &str) -> Stage<Option<Dn>> {
    let dn = Dn::parse(raw).map_err(|e| {
        authorization_denied(format!("Unable to decode the proxied authorization DN: {}", e))
    })?;
    if dn.is_root() {
        return Ok(None);
    }
    let exists = match ctx.registry().element_for_dn(&dn) {
        Some(element) => {
            let backend = element.backend();
            let scope =
                TransactionScope::open(backend, TransactionMode::ReadOnly, operation_id).await?;
            let found = backend
                .get_entry(scope.transaction(), &dn, LockMode::None)
                .await;
            scope.close();
            found?.is_some()
        }
        None => false,
    };
    if exists {
        Ok(Some(dn))
    } else {
        Err(authorization_denied(format!(
            "The proxied authorization identity {} does not exist",
            dn
        )))
    }
}

/// Resolve an RFC 4513 authorization id (`dn:` or `u:`).
async fn resolve_authz_id(
    ctx: &ServerContext,
    operation_id: Uuid,
    raw: &str,
) -> Stage<Option<Dn>> {
    if raw.is_empty() {
        return Ok(None);
    }
    if let Some(dn) = raw.strip_prefix("dn:") {
        return resolve_dn(ctx, operation_id, dn).await;
    }
    let Some(user) = raw.strip_prefix("u:") else {
        return Err(authorization_denied(format!(
            "Unsupported authorization id '{}'",
            raw
        )));
    };

    let attribute = &ctx.config().identity_mapping_attribute;
    let mut matches = Vec::new();
    for element in ctx.registry().snapshot().values() {
        let found = element
            .backend()
            .find_entries_by_attribute(attribute, user)
            .await?;
        matches.extend(found.into_iter().map(|entry| entry.dn().clone()));
    }
    match matches.len() {
        1 => Ok(matches.pop()),
        0 => Err(authorization_denied(format!(
            "No entry maps to the authorization id '{}'",
            raw
        ))),
        _ => Err(authorization_denied(format!(
            "Multiple entries map to the authorization id '{}'",
            raw
        ))),
    }
}
