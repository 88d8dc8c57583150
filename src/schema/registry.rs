//! Schema registry for loading and querying directory schema.

use super::embedded;
use super::types::{AttributeTypeDefinition, ObjectClassDefinition, SchemaDefinitions};
use crate::entry::Entry;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of attribute types and object classes.
///
/// Lookups are case-insensitive and resolve attribute aliases. Unknown
/// attribute types are treated as ordinary user attributes.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    attribute_types: HashMap<String, Arc<AttributeTypeDefinition>>,
    object_classes: HashMap<String, Arc<ObjectClassDefinition>>,
}

impl SchemaRegistry {
    /// Create a registry containing the embedded core schema.
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_embedded_schema()
    }

    pub fn with_embedded_schema() -> Result<Self, ConfigError> {
        let mut registry = Self::empty();
        registry.extend_from_json(embedded::core_schema())?;
        Ok(registry)
    }

    /// A registry without any definitions.
    pub fn empty() -> Self {
        Self {
            attribute_types: HashMap::new(),
            object_classes: HashMap::new(),
        }
    }

    /// Add the definitions contained in a JSON schema document. Definitions
    /// replace existing ones with the same name.
    pub fn extend_from_json(&mut self, json: &str) -> Result<(), ConfigError> {
        let definitions: SchemaDefinitions = serde_json::from_str(json)?;
        self.extend(definitions)
    }

    pub fn extend(&mut self, definitions: SchemaDefinitions) -> Result<(), ConfigError> {
        for attribute_type in definitions.attribute_types {
            self.add_attribute_type(attribute_type);
        }
        for object_class in definitions.object_classes {
            self.object_classes
                .insert(object_class.name.to_ascii_lowercase(), Arc::new(object_class));
        }
        self.check_superiors()
    }

    pub fn add_attribute_type(&mut self, definition: AttributeTypeDefinition) {
        let definition = Arc::new(definition);
        self.attribute_types
            .insert(definition.name.to_ascii_lowercase(), Arc::clone(&definition));
        for alias in &definition.aliases {
            self.attribute_types
                .insert(alias.to_ascii_lowercase(), Arc::clone(&definition));
        }
    }

    fn check_superiors(&self) -> Result<(), ConfigError> {
        for class in self.object_classes.values() {
            for superior in &class.superiors {
                if !self.object_classes.contains_key(&superior.to_ascii_lowercase()) {
                    return Err(ConfigError::InvalidSchema {
                        message: format!(
                            "object class '{}' names unknown superior '{}'",
                            class.name, superior
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn attribute_type(&self, name: &str) -> Option<&AttributeTypeDefinition> {
        self.attribute_types
            .get(&name.to_ascii_lowercase())
            .map(|d| d.as_ref())
    }

    pub fn object_class(&self, name: &str) -> Option<&ObjectClassDefinition> {
        self.object_classes
            .get(&name.to_ascii_lowercase())
            .map(|d| d.as_ref())
    }

    pub fn is_no_user_modification(&self, attribute: &str) -> bool {
        self.attribute_type(attribute)
            .is_some_and(|d| d.no_user_modification)
    }

    pub fn is_operational(&self, attribute: &str) -> bool {
        self.attribute_type(attribute).is_some_and(|d| d.operational)
    }

    pub fn is_single_valued(&self, attribute: &str) -> bool {
        self.attribute_type(attribute).is_some_and(|d| d.single_value)
    }

    /// Whether two names refer to the same attribute type.
    pub fn same_attribute(&self, a: &str, b: &str) -> bool {
        if a.eq_ignore_ascii_case(b) {
            return true;
        }
        match (self.attribute_type(a), self.attribute_type(b)) {
            (Some(x), Some(y)) => x.name == y.name,
            _ => false,
        }
    }

    /// All transitive superiors of a class, nearest first, without duplicates.
    pub fn superior_chain(&self, class: &str) -> Vec<String> {
        let mut chain: Vec<String> = Vec::new();
        let mut pending: Vec<String> = self
            .object_class(class)
            .map(|c| c.superiors.clone())
            .unwrap_or_default();
        while !pending.is_empty() {
            let superior = pending.remove(0);
            if chain.iter().any(|c| c.eq_ignore_ascii_case(&superior)) {
                continue;
            }
            if let Some(definition) = self.object_class(&superior) {
                pending.extend(definition.superiors.iter().cloned());
                chain.push(definition.name.clone());
            } else {
                chain.push(superior);
            }
        }
        chain
    }

    /// Add to the entry every superior class implied by its current classes.
    /// Returns the names that were added.
    pub fn add_superior_object_classes(&self, entry: &mut Entry) -> Vec<String> {
        let mut added = Vec::new();
        let classes: Vec<String> = entry.object_classes().to_vec();
        for class in classes {
            for superior in self.superior_chain(&class) {
                if entry.add_object_class(superior.clone()) {
                    added.push(superior);
                }
            }
        }
        added
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::empty()
    }
}
