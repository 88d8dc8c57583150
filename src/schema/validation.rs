//! Entry validation against the registered object classes.
//!
//! The checks are intentionally basic: known object classes, a structural
//! class, MUST attributes present, user attributes allowed by some class,
//! and single-valued attributes holding one value.

use super::registry::SchemaRegistry;
use super::types::ObjectClassKind;
use crate::entry::{Entry, OBJECT_CLASS};
use crate::error::{DirectoryError, DirectoryResult, ResultCode};

impl SchemaRegistry {
    /// Validate a complete entry.
    pub fn validate_entry(&self, entry: &Entry) -> DirectoryResult<()> {
        let dn = entry.dn();
        if entry.object_classes().is_empty() {
            return Err(DirectoryError::new(
                ResultCode::ObjectClassViolation,
                format!("Entry {} does not contain any object classes", dn),
            ));
        }

        let mut classes = Vec::new();
        for name in entry.object_classes() {
            let class = self.object_class(name).ok_or_else(|| {
                DirectoryError::new(
                    ResultCode::ObjectClassViolation,
                    format!("Entry {} references undefined object class {}", dn, name),
                )
            })?;
            classes.push(class);
        }

        if !classes.iter().any(|c| c.kind == ObjectClassKind::Structural) {
            return Err(DirectoryError::new(
                ResultCode::ObjectClassViolation,
                format!("Entry {} does not contain a structural object class", dn),
            ));
        }

        for class in &classes {
            for required in &class.must {
                if !entry.has_attribute(required) {
                    return Err(DirectoryError::new(
                        ResultCode::ObjectClassViolation,
                        format!(
                            "Entry {} violates object class {}: required attribute {} is missing",
                            dn, class.name, required
                        ),
                    ));
                }
            }
        }

        let extensible = entry.has_object_class("extensibleObject");
        for attribute in entry.user_attributes() {
            let name = attribute.name();
            if !extensible && !name.eq_ignore_ascii_case(OBJECT_CLASS) {
                let allowed = classes.iter().any(|class| {
                    class
                        .must
                        .iter()
                        .chain(class.may.iter())
                        .any(|a| self.same_attribute(a, name))
                });
                if !allowed {
                    return Err(DirectoryError::new(
                        ResultCode::ObjectClassViolation,
                        format!(
                            "Entry {} contains attribute {} which is not allowed by its object classes",
                            dn, name
                        ),
                    ));
                }
            }
        }

        for attribute in entry.attributes() {
            if attribute.values().len() > 1 && self.is_single_valued(attribute.name()) {
                return Err(DirectoryError::new(
                    ResultCode::ConstraintViolation,
                    format!(
                        "Entry {} has multiple values for single-valued attribute {}",
                        dn,
                        attribute.name()
                    ),
                ));
            }
        }

        Ok(())
    }
}
