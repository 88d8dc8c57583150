//! Decoded request payloads, one per operation kind.
//!
//! DNs and filters are carried in their raw string form: turning them into
//! [`Dn`](crate::dn::Dn) and [`Filter`](crate::filter::Filter) values is the
//! first stage of every processor, so malformed input is reported through the
//! normal result path.

use crate::entry::{Attribute, Entry, OBJECT_CLASS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Add,
    Delete,
    Modify,
    ModifyDn,
    Search,
    Bind,
    Compare,
    Abandon,
}

impl OperationKind {
    pub const ALL: [OperationKind; 8] = [
        Self::Add,
        Self::Delete,
        Self::Modify,
        Self::ModifyDn,
        Self::Search,
        Self::Bind,
        Self::Compare,
        Self::Abandon,
    ];

    /// Whether the operation mutates the backend.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Add | Self::Delete | Self::Modify | Self::ModifyDn)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Modify => "modify",
            Self::ModifyDn => "modifyDN",
            Self::Search => "search",
            Self::Bind => "bind",
            Self::Compare => "compare",
            Self::Abandon => "abandon",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddRequest {
    pub dn: String,
    /// Attributes as supplied by the client, `objectClass` included.
    pub attributes: Vec<Attribute>,
}

impl AddRequest {
    /// Build a request carrying every attribute of an existing entry.
    pub fn from_entry(entry: &Entry) -> Self {
        let mut attributes = Vec::new();
        if !entry.object_classes().is_empty() {
            attributes.push(Attribute::new(OBJECT_CLASS, entry.object_classes().to_vec()));
        }
        attributes.extend(entry.attributes().cloned());
        Self {
            dn: entry.dn().to_string(),
            attributes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub dn: String,
}

/// How a modification changes an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModificationType {
    Add,
    Delete,
    Replace,
    Increment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Modification {
    pub modification_type: ModificationType,
    /// The attribute and values the change applies to. A `Delete` without
    /// values removes the whole attribute; a `Replace` without values too.
    pub attribute: Attribute,
}

impl Modification {
    pub fn new(modification_type: ModificationType, attribute: Attribute) -> Self {
        Self {
            modification_type,
            attribute,
        }
    }

    pub fn add(name: &str, values: &[&str]) -> Self {
        Self::new(ModificationType::Add, attribute(name, values))
    }

    pub fn delete(name: &str, values: &[&str]) -> Self {
        Self::new(ModificationType::Delete, attribute(name, values))
    }

    pub fn replace(name: &str, values: &[&str]) -> Self {
        Self::new(ModificationType::Replace, attribute(name, values))
    }

    pub fn increment(name: &str, by: i64) -> Self {
        Self::new(ModificationType::Increment, Attribute::single(name, by.to_string()))
    }
}

fn attribute(name: &str, values: &[&str]) -> Attribute {
    Attribute::new(name, values.iter().map(|v| v.to_string()).collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModifyRequest {
    pub dn: String,
    pub modifications: Vec<Modification>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModifyDnRequest {
    pub dn: String,
    pub new_rdn: String,
    pub delete_old_rdn: bool,
    pub new_superior: Option<String>,
}

/// Search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchScope {
    /// Only the base entry
    Base,
    /// Immediate children of the base entry
    OneLevel,
    /// The base entry and everything below it
    Subtree,
    /// Everything below the base entry, excluding the base itself
    Subordinates,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub base_dn: String,
    pub scope: SearchScope,
    pub filter: String,
    /// Client-requested size limit, 0 for none
    pub size_limit: u32,
    /// Requested attribute names; empty means all user attributes. `*` and
    /// `+` select all user and all operational attributes respectively.
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindCredentials {
    Simple(String),
    Sasl {
        mechanism: String,
        credentials: Option<Vec<u8>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindRequest {
    pub dn: String,
    pub credentials: BindCredentials,
}

impl BindRequest {
    /// Whether this is an anonymous or unauthenticated simple bind.
    pub fn has_empty_password(&self) -> bool {
        matches!(&self.credentials, BindCredentials::Simple(password) if password.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompareRequest {
    pub dn: String,
    pub attribute: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbandonRequest {
    pub message_id: u32,
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationRequest {
    Add(AddRequest),
    Delete(DeleteRequest),
    Modify(ModifyRequest),
    ModifyDn(ModifyDnRequest),
    Search(SearchRequest),
    Bind(BindRequest),
    Compare(CompareRequest),
    Abandon(AbandonRequest),
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Add(_) => OperationKind::Add,
            Self::Delete(_) => OperationKind::Delete,
            Self::Modify(_) => OperationKind::Modify,
            Self::ModifyDn(_) => OperationKind::ModifyDn,
            Self::Search(_) => OperationKind::Search,
            Self::Bind(_) => OperationKind::Bind,
            Self::Compare(_) => OperationKind::Compare,
            Self::Abandon(_) => OperationKind::Abandon,
        }
    }

    /// The raw DN the request targets, used for routing. Abandon has none.
    pub fn target_dn(&self) -> Option<&str> {
        match self {
            Self::Add(r) => Some(&r.dn),
            Self::Delete(r) => Some(&r.dn),
            Self::Modify(r) => Some(&r.dn),
            Self::ModifyDn(r) => Some(&r.dn),
            Self::Search(r) => Some(&r.base_dn),
            Self::Bind(r) => Some(&r.dn),
            Self::Compare(r) => Some(&r.dn),
            Self::Abandon(_) => None,
        }
    }
}
