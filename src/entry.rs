//! Directory entries and attributes.
//!
//! An [`Entry`] keeps object classes apart from the other attributes and
//! splits the remaining attributes into user and operational maps keyed by
//! the lower-cased attribute name. Attribute value comparisons are
//! case-insensitive, which matches the default matching rules of the
//! attributes the processing pipeline inspects.

use crate::dn::Dn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const OBJECT_CLASS: &str = "objectClass";

/// A named, ordered set of attribute values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    values: Vec<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        let mut attribute = Self {
            name: name.into(),
            values: Vec::with_capacity(values.len()),
        };
        for value in values {
            attribute.add_value(value);
        }
        attribute
    }

    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, vec![value.into()])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains_value(&self, value: &str) -> bool {
        self.values.iter().any(|v| values_match(v, value))
    }

    /// Add a value; returns `false` if an equal value was already present.
    pub fn add_value(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.contains_value(&value) {
            return false;
        }
        self.values.push(value);
        true
    }

    /// Remove a value; returns `false` if no equal value was present.
    pub fn remove_value(&mut self, value: &str) -> bool {
        let before = self.values.len();
        self.values.retain(|v| !values_match(v, value));
        before != self.values.len()
    }
}

/// Case-insensitive, whitespace-collapsing value comparison.
pub fn values_match(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A directory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    dn: Dn,
    #[serde(default)]
    object_classes: Vec<String>,
    #[serde(default)]
    user_attributes: BTreeMap<String, Attribute>,
    #[serde(default)]
    operational_attributes: BTreeMap<String, Attribute>,
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            object_classes: Vec::new(),
            user_attributes: BTreeMap::new(),
            operational_attributes: BTreeMap::new(),
        }
    }

    /// Builder-style object class addition.
    pub fn with_object_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for class in classes {
            self.add_object_class(class);
        }
        self
    }

    /// Builder-style user attribute addition.
    pub fn with_attribute<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.add_value(name, value, false);
        }
        self
    }

    /// Builder-style operational attribute addition.
    pub fn with_operational_attribute<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.add_value(name, value, true);
        }
        self
    }

    /// Parse an entry from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn set_dn(&mut self, dn: Dn) {
        self.dn = dn;
    }

    pub fn object_classes(&self) -> &[String] {
        &self.object_classes
    }

    pub fn has_object_class(&self, name: &str) -> bool {
        self.object_classes.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn add_object_class(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.has_object_class(&name) {
            return false;
        }
        self.object_classes.push(name);
        true
    }

    pub fn remove_object_class(&mut self, name: &str) -> bool {
        let before = self.object_classes.len();
        self.object_classes.retain(|c| !c.eq_ignore_ascii_case(name));
        before != self.object_classes.len()
    }

    /// Look up a user or operational attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        let key = name.to_ascii_lowercase();
        self.user_attributes
            .get(&key)
            .or_else(|| self.operational_attributes.get(&key))
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        (name.eq_ignore_ascii_case(OBJECT_CLASS) && !self.object_classes.is_empty())
            || self.attribute(name).is_some()
    }

    /// All values of an attribute, including `objectClass`.
    pub fn values(&self, name: &str) -> Vec<&str> {
        if name.eq_ignore_ascii_case(OBJECT_CLASS) {
            return self.object_classes.iter().map(String::as_str).collect();
        }
        self.attribute(name)
            .map(|a| a.values().iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.values(name).into_iter().next()
    }

    pub fn is_operational(&self, name: &str) -> bool {
        self.operational_attributes
            .contains_key(&name.to_ascii_lowercase())
    }

    /// Add one value, creating the attribute if needed. An attribute already
    /// present in either map keeps its classification.
    pub fn add_value(&mut self, name: &str, value: impl Into<String>, operational: bool) -> bool {
        if name.eq_ignore_ascii_case(OBJECT_CLASS) {
            return self.add_object_class(value);
        }
        let key = name.to_ascii_lowercase();
        let map = if self.operational_attributes.contains_key(&key)
            || (operational && !self.user_attributes.contains_key(&key))
        {
            &mut self.operational_attributes
        } else {
            &mut self.user_attributes
        };
        map.entry(key)
            .or_insert_with(|| Attribute::new(name, Vec::new()))
            .add_value(value)
    }

    /// Remove one value; the attribute disappears with its last value.
    pub fn remove_value(&mut self, name: &str, value: &str) -> bool {
        if name.eq_ignore_ascii_case(OBJECT_CLASS) {
            let before = self.object_classes.len();
            self.object_classes.retain(|c| !values_match(c, value));
            return before != self.object_classes.len();
        }
        let key = name.to_ascii_lowercase();
        for map in [&mut self.user_attributes, &mut self.operational_attributes] {
            if let Some(attribute) = map.get_mut(&key) {
                let removed = attribute.remove_value(value);
                if attribute.is_empty() {
                    map.remove(&key);
                }
                return removed;
            }
        }
        false
    }

    /// Replace all values of an attribute. An empty attribute removes it.
    pub fn put_attribute(&mut self, attribute: Attribute, operational: bool) {
        if attribute.name().eq_ignore_ascii_case(OBJECT_CLASS) {
            self.object_classes.clear();
            for value in attribute.values() {
                self.add_object_class(value.clone());
            }
            return;
        }
        let was_operational = self.is_operational(attribute.name());
        self.remove_attribute(attribute.name());
        if attribute.is_empty() {
            return;
        }
        let key = attribute.name().to_ascii_lowercase();
        if operational || was_operational {
            self.operational_attributes.insert(key, attribute);
        } else {
            self.user_attributes.insert(key, attribute);
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        if name.eq_ignore_ascii_case(OBJECT_CLASS) {
            let values = std::mem::take(&mut self.object_classes);
            return Some(Attribute::new(OBJECT_CLASS, values));
        }
        let key = name.to_ascii_lowercase();
        self.user_attributes
            .remove(&key)
            .or_else(|| self.operational_attributes.remove(&key))
    }

    pub fn user_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.user_attributes.values()
    }

    pub fn operational_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.operational_attributes.values()
    }

    /// User attributes followed by operational attributes.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.user_attributes().chain(self.operational_attributes())
    }

    /// Keep only attribute values accepted by `keep`. Attributes left without
    /// values are dropped.
    pub fn retain_values<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str, &str) -> bool,
    {
        for map in [&mut self.user_attributes, &mut self.operational_attributes] {
            for attribute in map.values_mut() {
                let name = attribute.name.clone();
                attribute.values.retain(|v| keep(&name, v));
            }
            map.retain(|_, a| !a.is_empty());
        }
    }
}
