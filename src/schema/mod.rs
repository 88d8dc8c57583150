//! Directory schema definitions and entry validation.
//!
//! The schema registry answers the questions the processing pipeline asks
//! about attribute types and object classes: whether an attribute may be
//! supplied by users, whether it is operational, which superior classes an
//! object class implies, and whether a complete entry satisfies its classes.
//!
//! # Key Types
//!
//! - [`SchemaRegistry`] - Registry of attribute types and object classes
//! - [`AttributeTypeDefinition`] - Characteristics of one attribute type
//! - [`ObjectClassDefinition`] - Kind, superiors and allowed attributes of a class
//!
//! # Examples
//!
//! ```rust
//! use ldap_workflow::schema::SchemaRegistry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SchemaRegistry::new()?;
//! assert!(registry.is_no_user_modification("createTimestamp"));
//! assert_eq!(registry.superior_chain("inetOrgPerson"), vec!["organizationalPerson", "person", "top"]);
//! # Ok(())
//! # }
//! ```

pub mod embedded;
pub mod registry;
pub mod types;
pub mod validation;


pub use registry::SchemaRegistry;
pub use types::{AttributeTypeDefinition, ObjectClassDefinition, ObjectClassKind, SchemaDefinitions};
