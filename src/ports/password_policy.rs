//! Password policy and account status notifications.
//!
//! The bind processor asks the policy for a [`BindPolicyState`] snapshot,
//! decides what the snapshot means for the bind, and reports back what
//! happened (failure, success, grace login). The policy owns the account
//! state; the processor owns the ordering of checks.

use crate::auth::password::{self, PasswordScheme};
use crate::dn::Dn;
use crate::entry::Entry;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;

/// Generalized time format used by the password policy attributes.
pub const GENERALIZED_TIME_FORMAT: &str = "%Y%m%d%H%M%SZ";

/// Operational attribute holding the time the password was last changed.
pub const PWD_CHANGED_TIME: &str = "pwdChangedTime";

/// Operational attribute that administratively disables an account.
pub const ACCOUNT_DISABLED: &str = "ds-pwp-account-disabled";

/// Account state relevant to a bind, computed before the password is checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindPolicyState {
    pub disabled: bool,
    pub locked_due_to_failures: bool,
    pub password_expired: bool,
    /// Grace logins left once the password has expired
    pub grace_logins_remaining: u32,
    /// Seconds until the password expires, if it expires at all
    pub seconds_until_expiration: Option<i64>,
    /// Whether the expiration is inside the warning interval
    pub should_warn: bool,
    /// Whether the user has not been warned yet
    pub first_warning: bool,
}

/// Lockout state after recording an authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutStatus {
    NotLocked,
    TemporarilyLocked { seconds_until_unlock: i64 },
    PermanentlyLocked,
}

/// Password policy consumed by the add, modify and bind processors.
#[async_trait]
pub trait PasswordPolicyPort: Send + Sync {
    fn password_attribute(&self) -> &str {
        "userPassword"
    }

    /// Number of failures that lock an account, 0 to disable lockout.
    fn lockout_failure_count(&self) -> u32;

    /// Encode a clear-text password for storage.
    fn encode_password(&self, clear: &str) -> String {
        password::encode(clear, PasswordScheme::SaltedSha256)
    }

    async fn bind_state(&self, entry: &Entry) -> BindPolicyState;

    async fn record_auth_failure(&self, dn: &Dn) -> LockoutStatus;

    async fn clear_failure_lockout(&self, dn: &Dn);

    async fn record_grace_login(&self, dn: &Dn);

    async fn set_warned(&self, dn: &Dn);

    async fn set_last_login(&self, dn: &Dn, at: DateTime<Utc>);
}

/// Configuration of [`InMemoryPasswordPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordPolicyConfig {
    pub lockout_failure_count: u32,
    /// `None` locks accounts until an administrator resets them
    pub lockout_duration_secs: Option<i64>,
    /// Failures older than this are forgotten
    pub lockout_failure_expiration_secs: Option<i64>,
    pub max_password_age_secs: Option<i64>,
    pub expire_warning_secs: i64,
    pub grace_login_count: u32,
}

impl Default for PasswordPolicyConfig {
    fn default() -> Self {
        Self {
            lockout_failure_count: 0,
            lockout_duration_secs: None,
            lockout_failure_expiration_secs: None,
            max_password_age_secs: None,
            expire_warning_secs: 0,
            grace_login_count: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct AccountState {
    failure_times: Vec<DateTime<Utc>>,
    locked_at: Option<DateTime<Utc>>,
    grace_login_times: Vec<DateTime<Utc>>,
    warned_at: Option<DateTime<Utc>>,
    last_login: Option<DateTime<Utc>>,
}

/// Password policy keeping account state in memory.
///
/// State is keyed by normalized DN and lives outside the entry. It does not
/// follow an entry through a modify DN, is not cleared by a delete, and is
/// lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryPasswordPolicy {
    config: PasswordPolicyConfig,
    accounts: Mutex<HashMap<Dn, AccountState>>,
}

impl InMemoryPasswordPolicy {
    pub fn new(config: PasswordPolicyConfig) -> Self {
        Self {
            config,
            accounts: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PasswordPolicyConfig {
        &self.config
    }

    /// Number of recorded authentication failures for an account.
    pub fn failure_count(&self, dn: &Dn) -> usize {
        self.with_account(dn, |account| account.failure_times.len())
    }

    pub fn is_locked(&self, dn: &Dn) -> bool {
        let now = Utc::now();
        self.with_account(dn, |account| self.locked(account, now))
    }

    pub fn grace_logins_used(&self, dn: &Dn) -> usize {
        self.with_account(dn, |account| account.grace_login_times.len())
    }

    pub fn last_login(&self, dn: &Dn) -> Option<DateTime<Utc>> {
        self.with_account(dn, |account| account.last_login)
    }

    fn with_account<T>(&self, dn: &Dn, f: impl FnOnce(&mut AccountState) -> T) -> T {
        let mut accounts = self
            .accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(accounts.entry(dn.clone()).or_default())
    }

    fn prune_failures(&self, account: &mut AccountState, now: DateTime<Utc>) {
        if let Some(expiration) = self.config.lockout_failure_expiration_secs {
            let cutoff = now - Duration::seconds(expiration);
            account.failure_times.retain(|t| *t > cutoff);
        }
    }

    /// Whether the account is currently locked. Temporary locks that have
    /// run out are cleared.
    fn locked(&self, account: &mut AccountState, now: DateTime<Utc>) -> bool {
        let Some(locked_at) = account.locked_at else {
            return false;
        };
        match self.config.lockout_duration_secs {
            Some(duration) if now >= locked_at + Duration::seconds(duration) => {
                account.locked_at = None;
                account.failure_times.clear();
                false
            }
            _ => true,
        }
    }

    fn password_expiration(&self, entry: &Entry) -> Option<DateTime<Utc>> {
        let max_age = self.config.max_password_age_secs?;
        let changed = entry.first_value(PWD_CHANGED_TIME)?;
        match NaiveDateTime::parse_from_str(changed, GENERALIZED_TIME_FORMAT) {
            Ok(changed) => Some(changed.and_utc() + Duration::seconds(max_age)),
            Err(e) => {
                warn!(
                    "Ignoring unparseable {} value '{}' in entry {}: {}",
                    PWD_CHANGED_TIME,
                    changed,
                    entry.dn(),
                    e
                );
                None
            }
        }
    }
}

#[async_trait]
impl PasswordPolicyPort for InMemoryPasswordPolicy {
    fn lockout_failure_count(&self) -> u32 {
        self.config.lockout_failure_count
    }

    async fn bind_state(&self, entry: &Entry) -> BindPolicyState {
        let now = Utc::now();
        let expiration = self.password_expiration(entry);
        let disabled = entry
            .first_value(ACCOUNT_DISABLED)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let grace_count = self.config.grace_login_count;
        let warning = Duration::seconds(self.config.expire_warning_secs);

        self.with_account(entry.dn(), |account| {
            self.prune_failures(account, now);
            let seconds_until_expiration = expiration.map(|at| (at - now).num_seconds());
            let password_expired = expiration.is_some_and(|at| now >= at);
            let should_warn = !password_expired
                && self.config.expire_warning_secs > 0
                && expiration.is_some_and(|at| now >= at - warning);
            BindPolicyState {
                disabled,
                locked_due_to_failures: self.locked(account, now),
                password_expired,
                grace_logins_remaining: grace_count
                    .saturating_sub(account.grace_login_times.len() as u32),
                seconds_until_expiration,
                should_warn,
                first_warning: should_warn && account.warned_at.is_none(),
            }
        })
    }

    async fn record_auth_failure(&self, dn: &Dn) -> LockoutStatus {
        let now = Utc::now();
        let threshold = self.config.lockout_failure_count;
        self.with_account(dn, |account| {
            self.prune_failures(account, now);
            account.failure_times.push(now);
            if threshold == 0 || (account.failure_times.len() as u32) < threshold {
                return LockoutStatus::NotLocked;
            }
            let locked_at = *account.locked_at.get_or_insert(now);
            match self.config.lockout_duration_secs {
                Some(duration) => LockoutStatus::TemporarilyLocked {
                    seconds_until_unlock: (locked_at + Duration::seconds(duration) - now)
                        .num_seconds(),
                },
                None => LockoutStatus::PermanentlyLocked,
            }
        })
    }

    async fn clear_failure_lockout(&self, dn: &Dn) {
        self.with_account(dn, |account| {
            account.failure_times.clear();
            account.locked_at = None;
        });
    }

    async fn record_grace_login(&self, dn: &Dn) {
        self.with_account(dn, |account| account.grace_login_times.push(Utc::now()));
    }

    async fn set_warned(&self, dn: &Dn) {
        self.with_account(dn, |account| account.warned_at = Some(Utc::now()));
    }

    async fn set_last_login(&self, dn: &Dn, at: DateTime<Utc>) {
        self.with_account(dn, |account| account.last_login = Some(at));
    }
}

/// Kinds of account status notifications raised during binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountStatusNotificationType {
    PasswordExpiring,
    PasswordExpired,
    AccountTemporarilyLocked,
    AccountPermanentlyLocked,
}

impl fmt::Display for AccountStatusNotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PasswordExpiring => "password-expiring",
            Self::PasswordExpired => "password-expired",
            Self::AccountTemporarilyLocked => "account-temporarily-locked",
            Self::AccountPermanentlyLocked => "account-permanently-locked",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStatusNotification {
    pub notification_type: AccountStatusNotificationType,
    pub user_dn: Dn,
    pub message: String,
    pub properties: BTreeMap<String, String>,
}

impl AccountStatusNotification {
    pub fn new(
        notification_type: AccountStatusNotificationType,
        user_dn: Dn,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            user_dn,
            message: message.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: &str, value: impl ToString) -> Self {
        self.properties.insert(name.to_string(), value.to_string());
        self
    }
}

/// Receives account status notifications.
#[async_trait]
pub trait AccountStatusNotificationHandler: Send + Sync {
    async fn handle(&self, notification: AccountStatusNotification);
}

/// Handler that writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotificationHandler;

#[async_trait]
impl AccountStatusNotificationHandler for LoggingNotificationHandler {
    async fn handle(&self, notification: AccountStatusNotification) {
        info!(
            "Account status notification {} for {}: {}",
            notification.notification_type, notification.user_dn, notification.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Dn {
        Dn::parse("uid=jdoe,o=test").unwrap()
    }

    #[tokio::test]
    async fn lockout_after_threshold() {
        let policy = InMemoryPasswordPolicy::new(PasswordPolicyConfig {
            lockout_failure_count: 3,
            lockout_duration_secs: Some(300),
            ..PasswordPolicyConfig::default()
        });
        assert_eq!(policy.record_auth_failure(&user()).await, LockoutStatus::NotLocked);
        assert_eq!(policy.record_auth_failure(&user()).await, LockoutStatus::NotLocked);
        match policy.record_auth_failure(&user()).await {
            LockoutStatus::TemporarilyLocked {
                seconds_until_unlock,
            } => assert!(seconds_until_unlock > 290),
            other => panic!("unexpected status {:?}", other),
        }
        assert!(policy.is_locked(&user()));

        policy.clear_failure_lockout(&user()).await;
        assert!(!policy.is_locked(&user()));
        assert_eq!(policy.failure_count(&user()), 0);
    }

    #[tokio::test]
    async fn account_state_is_keyed_by_normalized_dn() {
        let policy = InMemoryPasswordPolicy::new(PasswordPolicyConfig {
            lockout_failure_count: 1,
            ..PasswordPolicyConfig::default()
        });
        policy.record_auth_failure(&user()).await;

        assert!(policy.is_locked(&Dn::parse("UID=JDoe, O=Test").unwrap()));
        let renamed = Dn::parse("uid=jdoe2,o=test").unwrap();
        assert!(!policy.is_locked(&renamed));
        assert_eq!(policy.failure_count(&renamed), 0);
    }

    #[tokio::test]
    async fn permanent_lockout_without_duration() {
        let policy = InMemoryPasswordPolicy::new(PasswordPolicyConfig {
            lockout_failure_count: 1,
            ..PasswordPolicyConfig::default()
        });
        assert_eq!(
            policy.record_auth_failure(&user()).await,
            LockoutStatus::PermanentlyLocked
        );
    }

    #[tokio::test]
    async fn expiration_and_warning() {
        let policy = InMemoryPasswordPolicy::new(PasswordPolicyConfig {
            max_password_age_secs: Some(3600),
            expire_warning_secs: 7200,
            grace_login_count: 2,
            ..PasswordPolicyConfig::default()
        });
        let changed = (Utc::now() - Duration::seconds(60))
            .format(GENERALIZED_TIME_FORMAT)
            .to_string();
        let entry = Entry::new(user()).with_operational_attribute(PWD_CHANGED_TIME, [changed]);
        let state = policy.bind_state(&entry).await;
        assert!(!state.password_expired);
        assert!(state.should_warn);
        assert!(state.first_warning);

        policy.set_warned(&user()).await;
        assert!(!policy.bind_state(&entry).await.first_warning);

        let old = (Utc::now() - Duration::seconds(7200))
            .format(GENERALIZED_TIME_FORMAT)
            .to_string();
        let expired = Entry::new(user()).with_operational_attribute(PWD_CHANGED_TIME, [old]);
        let state = policy.bind_state(&expired).await;
        assert!(state.password_expired);
        assert_eq!(state.grace_logins_remaining, 2);
        policy.record_grace_login(&user()).await;
        assert_eq!(policy.bind_state(&expired).await.grace_logins_remaining, 1);
    }
}
