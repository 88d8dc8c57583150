//! Core schema type definitions.
//!
//! These mirror the subset of RFC 4512 attribute type and object class
//! characteristics that the operation processors consult.

use serde::{Deserialize, Serialize};

/// Definition of an attribute type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeTypeDefinition {
    /// Primary attribute name
    pub name: String,
    /// Alternative names resolving to the same type
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Whether the attribute holds at most one value
    #[serde(default)]
    pub single_value: bool,
    /// Whether only the server (or replication) may supply values
    #[serde(default)]
    pub no_user_modification: bool,
    /// Whether the attribute is operational rather than a user attribute
    #[serde(default)]
    pub operational: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Kind of an object class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClassKind {
    Abstract,
    Structural,
    Auxiliary,
}

/// Definition of an object class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectClassDefinition {
    pub name: String,
    pub kind: ObjectClassKind,
    /// Direct superior classes
    #[serde(default)]
    pub superiors: Vec<String>,
    /// Attributes every entry of this class must hold
    #[serde(default)]
    pub must: Vec<String>,
    /// Attributes entries of this class may hold
    #[serde(default)]
    pub may: Vec<String>,
}

/// A set of schema definitions as loaded from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinitions {
    #[serde(default)]
    pub attribute_types: Vec<AttributeTypeDefinition>,
    #[serde(default)]
    pub object_classes: Vec<ObjectClassDefinition>,
}
