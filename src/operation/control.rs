//! Request controls attached to an operation.

use serde::{Deserialize, Serialize};

/// Object identifiers of the controls the processors understand.
pub mod oids {
    pub const ASSERTION: &str = "1.3.6.1.1.12";
    pub const PROXIED_AUTH_V1: &str = "2.16.840.1.113730.3.4.12";
    pub const PROXIED_AUTH_V2: &str = "2.16.840.1.113730.3.4.18";
    pub const SUBENTRIES: &str = "1.3.6.1.4.1.4203.1.10.1";
    pub const MATCHED_VALUES: &str = "1.2.826.0.1.3344810.2.3";
    pub const REAL_ATTRS_ONLY: &str = "2.16.840.1.113730.3.4.17";
    pub const VIRTUAL_ATTRS_ONLY: &str = "2.16.840.1.113730.3.4.19";
    pub const NO_OP: &str = "1.3.6.1.4.1.4203.1.10.2";
    pub const SUBTREE_DELETE: &str = "1.2.840.113556.1.4.805";
}

/// The decoded value of a control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlValue {
    None,
    /// Filter string of an assertion control
    Assertion(String),
    /// DN of a proxied authorization v1 control
    ProxiedAuthV1(String),
    /// `dn:` or `u:` authorization id of a proxied authorization v2 control
    ProxiedAuthV2(String),
    /// Whether subentries should be visible
    Subentries(bool),
    /// Filter strings of a matched-values control
    MatchedValues(Vec<String>),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub oid: String,
    pub critical: bool,
    pub value: ControlValue,
}

impl Control {
    pub fn new(oid: impl Into<String>, critical: bool, value: ControlValue) -> Self {
        Self {
            oid: oid.into(),
            critical,
            value,
        }
    }

    pub fn assertion(filter: impl Into<String>) -> Self {
        Self::new(oids::ASSERTION, true, ControlValue::Assertion(filter.into()))
    }

    pub fn proxied_auth_v1(dn: impl Into<String>) -> Self {
        Self::new(oids::PROXIED_AUTH_V1, true, ControlValue::ProxiedAuthV1(dn.into()))
    }

    pub fn proxied_auth_v2(authz_id: impl Into<String>) -> Self {
        Self::new(
            oids::PROXIED_AUTH_V2,
            true,
            ControlValue::ProxiedAuthV2(authz_id.into()),
        )
    }

    pub fn subentries(visible: bool) -> Self {
        Self::new(oids::SUBENTRIES, false, ControlValue::Subentries(visible))
    }

    pub fn matched_values<I, S>(filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            oids::MATCHED_VALUES,
            false,
            ControlValue::MatchedValues(filters.into_iter().map(Into::into).collect()),
        )
    }

    pub fn real_attributes_only() -> Self {
        Self::new(oids::REAL_ATTRS_ONLY, false, ControlValue::None)
    }

    pub fn virtual_attributes_only() -> Self {
        Self::new(oids::VIRTUAL_ATTRS_ONLY, false, ControlValue::None)
    }

    pub fn no_op() -> Self {
        Self::new(oids::NO_OP, true, ControlValue::None)
    }

    pub fn subtree_delete() -> Self {
        Self::new(oids::SUBTREE_DELETE, false, ControlValue::None)
    }

    /// An arbitrary control, typically one the server does not understand.
    pub fn other(oid: impl Into<String>, critical: bool) -> Self {
        Self::new(oid, critical, ControlValue::None)
    }
}
