//! Server configuration.
//!
//! A [`ServerConfig`] is plain serde data, typically loaded from JSON.
//! Server-wide writability and lockdown can be changed on the running server
//! (see [`crate::server::DirectoryServer`]); everything else is fixed when
//! the server is built.

use crate::auth::ResourceLimits;
use crate::backend::WritabilityMode;
use crate::dn::Dn;
use crate::error::ConfigError;
use crate::ports::PasswordPolicyConfig;
use serde::{Deserialize, Serialize};

/// A root user and the alternate DNs it may bind with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootUserConfig {
    pub dn: String,
    #[serde(default)]
    pub alternate_bind_dns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub writability_mode: WritabilityMode,
    /// Only root users may authenticate while lockdown mode is active
    pub lockdown_mode: bool,
    pub check_schema: bool,
    /// Reject simple binds that supply a DN but no password
    pub bind_with_dn_requires_password: bool,
    pub root_users: Vec<RootUserConfig>,
    pub default_size_limit: u32,
    pub default_time_limit_secs: u32,
    pub default_lookthrough_limit: u32,
    pub default_idle_time_limit_secs: u32,
    /// Attribute used to map `u:` authorization ids to entries
    pub identity_mapping_attribute: String,
    pub password_policy: PasswordPolicyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let limits = ResourceLimits::default();
        Self {
            writability_mode: WritabilityMode::Enabled,
            lockdown_mode: false,
            check_schema: true,
            bind_with_dn_requires_password: true,
            root_users: Vec::new(),
            default_size_limit: limits.size_limit,
            default_time_limit_secs: limits.time_limit_secs,
            default_lookthrough_limit: limits.lookthrough_limit,
            default_idle_time_limit_secs: limits.idle_time_limit_secs,
            identity_mapping_attribute: "uid".to_string(),
            password_policy: PasswordPolicyConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Limits applied to users whose entries carry no override.
    pub fn default_resource_limits(&self) -> ResourceLimits {
        ResourceLimits {
            size_limit: self.default_size_limit,
            time_limit_secs: self.default_time_limit_secs,
            lookthrough_limit: self.default_lookthrough_limit,
            idle_time_limit_secs: self.default_idle_time_limit_secs,
        }
    }

    /// Decode the configured root users.
    pub fn root_users(&self) -> Result<RootUsers, ConfigError> {
        let mut users = Vec::with_capacity(self.root_users.len());
        for user in &self.root_users {
            let dn = parse_dn(&user.dn)?;
            let alternates = user
                .alternate_bind_dns
                .iter()
                .map(|raw| parse_dn(raw))
                .collect::<Result<Vec<_>, _>>()?;
            users.push((dn, alternates));
        }
        Ok(RootUsers { users })
    }
}

fn parse_dn(raw: &str) -> Result<Dn, ConfigError> {
    Dn::parse(raw).map_err(|e| ConfigError::InvalidDn {
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Decoded root users.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootUsers {
    users: Vec<(Dn, Vec<Dn>)>,
}

impl RootUsers {
    pub fn is_root(&self, dn: &Dn) -> bool {
        self.users.iter().any(|(root, _)| root == dn)
    }

    /// The actual DN of a root user bound through one of its alternate DNs.
    pub fn actual_dn(&self, bind_dn: &Dn) -> Option<&Dn> {
        self.users
            .iter()
            .find(|(_, alternates)| alternates.contains(bind_dn))
            .map(|(root, _)| root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_json() {
        let config = ServerConfig::from_json(
            r#"{
                "writabilityMode": "internal-only",
                "lockdownMode": true,
                "rootUsers": [
                    {"dn": "cn=Directory Manager,cn=Root DNs,cn=config", "alternateBindDns": ["cn=Directory Manager"]}
                ],
                "passwordPolicy": {"lockoutFailureCount": 3}
            }"#,
        )
        .unwrap();
        assert_eq!(config.writability_mode, WritabilityMode::InternalOnly);
        assert!(config.lockdown_mode);
        assert!(config.check_schema);
        assert_eq!(config.password_policy.lockout_failure_count, 3);
        assert_eq!(config.identity_mapping_attribute, "uid");

        let roots = config.root_users().unwrap();
        let alias = Dn::parse("cn=directory manager").unwrap();
        let actual = roots.actual_dn(&alias).unwrap();
        assert!(roots.is_root(actual));
        assert!(!roots.is_root(&alias));
    }

    #[test]
    fn rejects_invalid_root_dn() {
        let config = ServerConfig {
            root_users: vec![RootUserConfig {
                dn: "not a dn".to_string(),
                alternate_bind_dns: Vec::new(),
            }],
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.root_users(),
            Err(ConfigError::InvalidDn { .. })
        ));
        assert!(ServerConfig::from_json("{ nope").is_err());
    }
}
