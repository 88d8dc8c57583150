//! Client identity, privileges and authentication state.
//!
//! Each operation carries a [`ClientInfo`] describing who issued it. Binds
//! produce an [`AuthenticationInfo`] and [`ResourceLimits`] that the protocol
//! layer installs on the connection once the bind response has been sent.

pub mod password;

use crate::dn::Dn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Server privileges relevant to operation processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Privilege {
    /// Use the proxied authorization controls
    ProxiedAuth,
    /// Add or change `ds-privilege-name` values
    PrivilegeChange,
    /// Bypass access control
    BypassAcl,
    /// Reset other users' passwords
    PasswordReset,
    /// Use the subtree-delete control
    SubtreeDelete,
}

impl Privilege {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "proxied-auth" => Some(Self::ProxiedAuth),
            "privilege-change" => Some(Self::PrivilegeChange),
            "bypass-acl" => Some(Self::BypassAcl),
            "password-reset" => Some(Self::PasswordReset),
            "subtree-delete" => Some(Self::SubtreeDelete),
            _ => None,
        }
    }
}

/// The identity an operation runs as.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// Authenticated DN, `None` for anonymous clients
    pub authenticated_dn: Option<Dn>,
    /// Whether the client authenticated as a root user
    pub is_root: bool,
    pub privileges: BTreeSet<Privilege>,
    /// Authorization identity established by a proxied authorization control
    pub proxied_dn: Option<Dn>,
}

impl ClientInfo {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(dn: Dn) -> Self {
        Self {
            authenticated_dn: Some(dn),
            ..Self::default()
        }
    }

    /// A root identity holding every privilege.
    pub fn root(dn: Dn) -> Self {
        Self {
            authenticated_dn: Some(dn),
            is_root: true,
            privileges: [
                Privilege::ProxiedAuth,
                Privilege::PrivilegeChange,
                Privilege::BypassAcl,
                Privilege::PasswordReset,
                Privilege::SubtreeDelete,
            ]
            .into_iter()
            .collect(),
            proxied_dn: None,
        }
    }

    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privileges.insert(privilege);
        self
    }

    pub fn has_privilege(&self, privilege: Privilege) -> bool {
        self.privileges.contains(&privilege)
    }

    /// The DN access control evaluates against: the proxied identity if one
    /// was established, otherwise the authenticated one.
    pub fn authorization_dn(&self) -> Option<&Dn> {
        self.proxied_dn.as_ref().or(self.authenticated_dn.as_ref())
    }

    pub fn is_anonymous(&self) -> bool {
        self.authorization_dn().is_none()
    }
}

/// The outcome of a successful bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationInfo {
    Anonymous,
    Simple {
        /// DN of the entry the credentials were checked against
        dn: Dn,
        is_root: bool,
    },
}

impl AuthenticationInfo {
    pub fn dn(&self) -> Option<&Dn> {
        match self {
            Self::Anonymous => None,
            Self::Simple { dn, .. } => Some(dn),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Self::Simple { is_root: true, .. })
    }
}

/// Per-connection resource limits applied after a successful bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    pub size_limit: u32,
    pub time_limit_secs: u32,
    pub lookthrough_limit: u32,
    pub idle_time_limit_secs: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            size_limit: 1000,
            time_limit_secs: 60,
            lookthrough_limit: 5000,
            idle_time_limit_secs: 0,
        }
    }
}
