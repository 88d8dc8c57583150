//! Bind processing.
//!
//! Binds that carry no password never reach a backend: the server hands them
//! to [`process_without_backend`]. Simple binds with a password are routed to
//! the workflow element holding the user entry and run through [`process`]:
//!
//! 1. resolve an alternate root DN to the actual root entry
//! 2. fetch the user entry and its stored passwords
//! 3. ask the password policy whether the account may bind at all
//! 4. run pre-operation plugins
//! 5. check the password and update the account state either way
//!
//! Clients only ever see a generic "invalid credentials" message; the real
//! reason is kept as the operation's authentication failure reason.

use super::{Abort, Stage, complete_read, run_pre_operation_plugins, unexpected_request};
use crate::auth::{AuthenticationInfo, ResourceLimits, password};
use crate::backend::{LockMode, TransactionMode, TransactionScope};
use crate::context::ServerContext;
use crate::dn::Dn;
use crate::entry::Entry;
use crate::error::{DirectoryError, ResultCode};
use crate::operation::{BindCredentials, Operation, OperationRequest};
use crate::ports::{
    AccountStatusNotification, AccountStatusNotificationType, LockoutStatus,
};
use crate::workflow::WorkflowElement;
use chrono::Utc;
use log::{debug, warn};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

const SIZE_LIMIT: &str = "ds-rlim-size-limit";
const TIME_LIMIT: &str = "ds-rlim-time-limit";
const LOOKTHROUGH_LIMIT: &str = "ds-rlim-lookthrough-limit";
const IDLE_TIME_LIMIT: &str = "ds-rlim-idle-time-limit";

pub(crate) async fn process(ctx: &ServerContext, element: &WorkflowElement, op: &mut Operation) {
    let mut scope = None;
    let mut pre_op_ran = false;
    let outcome = run(ctx, element, op, &mut scope, &mut pre_op_ran).await;
    complete_read(ctx, op, outcome, scope, pre_op_ran).await;
}

/// Anonymous binds, unauthenticated binds (a DN without a password) and
/// SASL binds.
pub(crate) async fn process_without_backend(ctx: &ServerContext, op: &mut Operation) {
    let mut pre_op_ran = false;
    let outcome = run_without_backend(ctx, op, &mut pre_op_ran).await;
    complete_read(ctx, op, outcome, None, pre_op_ran).await;
}

fn credentials_failure(op: &mut Operation, reason: impl Into<String>) -> Abort {
    let reason = reason.into();
    debug!("Bind operation {} failed: {}", op.id(), reason);
    op.result_mut().set_auth_failure_reason(reason);
    DirectoryError::invalid_credentials(INVALID_CREDENTIALS).into()
}

fn unsupported_mechanism(mechanism: &str) -> Abort {
    DirectoryError::new(
        ResultCode::AuthMethodNotSupported,
        format!("SASL mechanism {} is not supported by this server", mechanism),
    )
    .into()
}

async fn run_without_backend(
    ctx: &ServerContext,
    op: &mut Operation,
    pre_op_ran: &mut bool,
) -> Stage {
    super::checkpoint(op)?;
    let OperationRequest::Bind(request) = op.request() else {
        return Err(unexpected_request(op));
    };
    if let BindCredentials::Sasl { mechanism, .. } = &request.credentials {
        return Err(unsupported_mechanism(mechanism));
    }
    let dn = if request.dn.trim().is_empty() {
        None
    } else {
        Some(Dn::parse(&request.dn)?)
    };

    if ctx.lockdown_mode() {
        return Err(credentials_failure(
            op,
            "anonymous binds are rejected while the server is in lockdown mode",
        ));
    }
    if let Some(dn) = dn {
        op.state_mut().entry_dn = Some(dn.clone());
        if ctx.config().bind_with_dn_requires_password {
            op.result_mut()
                .set_auth_failure_reason(format!("unauthenticated bind as {}", dn));
            return Err(DirectoryError::new(
                ResultCode::InappropriateAuthentication,
                "Unauthenticated simple binds with a DN but no password are not allowed",
            )
            .into());
        }
    }

    run_pre_operation_plugins(ctx, op, pre_op_ran).await?;

    op.bind_outcome_mut().authentication = Some(AuthenticationInfo::Anonymous);
    op.result_mut().set(ResultCode::Success, "");
    Ok(())
}

async fn run(
    ctx: &ServerContext,
    element: &WorkflowElement,
    op: &mut Operation,
    scope: &mut Option<TransactionScope>,
    pre_op_ran: &mut bool,
) -> Stage {
    super::checkpoint(op)?;
    let backend = element.backend();

    let OperationRequest::Bind(request) = op.request() else {
        return Err(unexpected_request(op));
    };
    let supplied = match &request.credentials {
        BindCredentials::Simple(password) => password.clone(),
        BindCredentials::Sasl { mechanism, .. } => return Err(unsupported_mechanism(mechanism)),
    };
    let bind_dn = Dn::parse(&request.dn)?;
    let user_dn = ctx
        .root_users()
        .actual_dn(&bind_dn)
        .cloned()
        .unwrap_or(bind_dn);
    op.state_mut().entry_dn = Some(user_dn.clone());

    let scope = scope.insert(
        TransactionScope::open(backend, TransactionMode::ReadWrite, op.id()).await?,
    );
    let txn = scope.transaction();

    let Some(entry) = backend.get_entry(txn, &user_dn, LockMode::Read).await? else {
        return Err(credentials_failure(
            op,
            format!("no entry exists for {}", user_dn),
        ));
    };
    op.state_mut().entry = Some(entry.clone());

    let policy = ctx.password_policy();
    let password_attribute = policy.password_attribute().to_string();
    let stored: Vec<String> = entry
        .values(&password_attribute)
        .into_iter()
        .map(str::to_string)
        .collect();
    if stored.is_empty() {
        return Err(credentials_failure(
            op,
            format!("entry {} has no {} value", user_dn, password_attribute),
        ));
    }
    let is_root = ctx.root_users().is_root(&user_dn);

    let state = policy.bind_state(&entry).await;
    if state.disabled {
        return Err(credentials_failure(
            op,
            "the account has been administratively disabled",
        ));
    }
    if state.locked_due_to_failures {
        return Err(credentials_failure(
            op,
            "the account is locked after too many authentication failures",
        ));
    }
    let grace_login = state.password_expired && state.grace_logins_remaining > 0;
    if state.password_expired && !grace_login {
        ctx.notify_account_status(AccountStatusNotification::new(
            AccountStatusNotificationType::PasswordExpired,
            user_dn.clone(),
            "The password has expired and no grace logins remain",
        ))
        .await;
        return Err(credentials_failure(op, "the password has expired"));
    }

    run_pre_operation_plugins(ctx, op, pre_op_ran).await?;

    let Some(matched) = stored
        .iter()
        .find(|value| password::matches(&supplied, value))
        .cloned()
    else {
        let failure = credentials_failure(op, "wrong password");
        if policy.lockout_failure_count() > 0 {
            record_failure(ctx, &user_dn).await;
        }
        return Err(failure);
    };

    if ctx.lockdown_mode() && !is_root {
        return Err(credentials_failure(
            op,
            "only root users may bind while the server is in lockdown mode",
        ));
    }
    super::checkpoint(op)?;

    op.result_mut().set(ResultCode::Success, "");
    let outcome = op.bind_outcome_mut();
    outcome.authentication = Some(AuthenticationInfo::Simple {
        dn: user_dn.clone(),
        is_root,
    });
    outcome.resource_limits = Some(resource_limits(ctx, &entry));

    let (scheme, _) = password::split_stored(&matched);
    if scheme.is_deprecated() {
        let mut rehashed = entry.clone();
        let operational = entry.is_operational(&password_attribute);
        rehashed.remove_value(&password_attribute, &matched);
        rehashed.add_value(&password_attribute, policy.encode_password(&supplied), operational);
        match backend.replace_entry(txn, &entry, &rehashed).await {
            Ok(()) => debug!(
                "Rehashed the {} password of {} with the default scheme",
                scheme, user_dn
            ),
            Err(e) => warn!(
                "Unable to rehash the {} password of {}: {}",
                scheme, user_dn, e
            ),
        }
    }

    policy.clear_failure_lockout(&user_dn).await;
    if grace_login {
        policy.record_grace_login(&user_dn).await;
        ctx.notify_account_status(
            AccountStatusNotification::new(
                AccountStatusNotificationType::PasswordExpired,
                user_dn.clone(),
                "The password has expired; a grace login was used",
            )
            .with_property("graceLoginsRemaining", state.grace_logins_remaining - 1),
        )
        .await;
    } else if state.should_warn && state.first_warning {
        policy.set_warned(&user_dn).await;
        let mut notification = AccountStatusNotification::new(
            AccountStatusNotificationType::PasswordExpiring,
            user_dn.clone(),
            "The password is about to expire",
        );
        if let Some(seconds) = state.seconds_until_expiration {
            notification = notification.with_property("secondsUntilExpiration", seconds);
        }
        ctx.notify_account_status(notification).await;
    }
    policy.set_last_login(&user_dn, Utc::now()).await;
    Ok(())
}

async fn record_failure(ctx: &ServerContext, user_dn: &Dn) {
    let notification = match ctx.password_policy().record_auth_failure(user_dn).await {
        LockoutStatus::NotLocked => return,
        LockoutStatus::TemporarilyLocked {
            seconds_until_unlock,
        } => AccountStatusNotification::new(
            AccountStatusNotificationType::AccountTemporarilyLocked,
            user_dn.clone(),
            "The account has been locked after too many authentication failures",
        )
        .with_property("secondsUntilUnlock", seconds_until_unlock),
        LockoutStatus::PermanentlyLocked => AccountStatusNotification::new(
            AccountStatusNotificationType::AccountPermanentlyLocked,
            user_dn.clone(),
            "The account has been permanently locked after too many authentication failures",
        ),
    };
    ctx.notify_account_status(notification).await;
}

/// Limits from the entry's `ds-rlim-*` attributes, falling back to the
/// server defaults.
fn resource_limits(ctx: &ServerContext, entry: &Entry) -> ResourceLimits {
    let defaults = ctx.config().default_resource_limits();
    let read = |name: &str, default: u32| match entry.first_value(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(
                "Ignoring invalid {} value '{}' in entry {}",
                name,
                raw,
                entry.dn()
            );
            default
        }),
        None => default,
    };
    ResourceLimits {
        size_limit: read(SIZE_LIMIT, defaults.size_limit),
        time_limit_secs: read(TIME_LIMIT, defaults.time_limit_secs),
        lookthrough_limit: read(LOOKTHROUGH_LIMIT, defaults.lookthrough_limit),
        idle_time_limit_secs: read(IDLE_TIME_LIMIT, defaults.idle_time_limit_secs),
    }
}
