//! Registry of active workflow elements.

use super::WorkflowElement;
use crate::backend::Backend;
use crate::dn::Dn;
use crate::error::ConfigError;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

type Snapshot = BTreeMap<String, Arc<WorkflowElement>>;

/// Workflow elements keyed by identifier.
///
/// Updates build a new map and swap it in under a mutex; lookups clone the
/// current `Arc` and never observe a half-applied change.
#[derive(Default)]
pub struct WorkflowElementRegistry {
    snapshot: Mutex<Arc<Snapshot>>,
}

impl WorkflowElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current set of elements.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let guard = self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    fn update<T>(&self, f: impl FnOnce(&mut Snapshot) -> T) -> T {
        let mut guard = self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = guard.as_ref().clone();
        let out = f(&mut next);
        *guard = Arc::new(next);
        out
    }

    /// Create a workflow element for a backend and register it.
    pub fn create_and_register(
        &self,
        id: impl Into<String>,
        backend: Arc<dyn Backend>,
    ) -> Result<Arc<WorkflowElement>, ConfigError> {
        let element = Arc::new(WorkflowElement::new(id, backend));
        self.register(Arc::clone(&element))?;
        Ok(element)
    }

    pub fn register(&self, element: Arc<WorkflowElement>) -> Result<(), ConfigError> {
        let id = element.id().to_string();
        self.update(|elements| {
            if elements.contains_key(&id) {
                return Err(ConfigError::DuplicateWorkflowElement { id: id.clone() });
            }
            elements.insert(id.clone(), element);
            Ok(())
        })?;
        info!("Registered workflow element {}", id);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<WorkflowElement>> {
        let removed = self.update(|elements| elements.remove(id));
        if removed.is_some() {
            info!("Deregistered workflow element {}", id);
        }
        removed
    }

    pub fn remove_all(&self) {
        let count = self.update(|elements| {
            let count = elements.len();
            elements.clear();
            count
        });
        debug!("Deregistered all {} workflow elements", count);
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkflowElement>> {
        self.snapshot().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// The element whose backend holds `dn`: the one with the longest
    /// base DN at or above it.
    pub fn element_for_dn(&self, dn: &Dn) -> Option<Arc<WorkflowElement>> {
        let snapshot = self.snapshot();
        let mut best: Option<(&Arc<WorkflowElement>, usize)> = None;
        for element in snapshot.values() {
            for base in element.backend().base_dns() {
                if dn.is_subordinate_or_equal(base)
                    && best.is_none_or(|(_, depth)| base.len() > depth)
                {
                    best = Some((element, base.len()));
                }
            }
        }
        best.map(|(element, _)| Arc::clone(element))
    }

    /// Elements whose base DNs lie strictly below a base DN of `parent`.
    pub fn subordinate_elements(&self, parent: &WorkflowElement) -> Vec<Arc<WorkflowElement>> {
        self.snapshot()
            .values()
            .filter(|element| element.id() != parent.id())
            .filter(|element| {
                element.backend().base_dns().iter().any(|base| {
                    parent
                        .backend()
                        .base_dns()
                        .iter()
                        .any(|parent_base| base.is_descendant_of(parent_base))
                })
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;

    fn backend(id: &str, base: &str) -> Arc<dyn Backend> {
        Arc::new(InMemoryBackend::new(id, vec![Dn::parse(base).unwrap()]))
    }

    #[test]
    fn longest_base_dn_wins() {
        let registry = WorkflowElementRegistry::new();
        registry.create_and_register("root", backend("root", "o=test")).unwrap();
        registry
            .create_and_register("people", backend("people", "ou=people,o=test"))
            .unwrap();

        let dn = Dn::parse("uid=x,ou=people,o=test").unwrap();
        assert_eq!(registry.element_for_dn(&dn).unwrap().id(), "people");
        let dn = Dn::parse("ou=groups,o=test").unwrap();
        assert_eq!(registry.element_for_dn(&dn).unwrap().id(), "root");
        assert!(registry.element_for_dn(&Dn::parse("o=other").unwrap()).is_none());

        let root = registry.get("root").unwrap();
        let subordinates = registry.subordinate_elements(&root);
        assert_eq!(subordinates.len(), 1);
        assert_eq!(subordinates[0].id(), "people");
    }

    #[test]
    fn duplicate_identifiers_are_rejected() {
        let registry = WorkflowElementRegistry::new();
        registry.create_and_register("a", backend("a", "o=a")).unwrap();
        let err = registry
            .create_and_register("a", backend("a2", "o=a2"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateWorkflowElement { .. }));
    }

    #[test]
    fn snapshots_are_stable_across_updates() {
        let registry = WorkflowElementRegistry::new();
        registry.create_and_register("a", backend("a", "o=a")).unwrap();
        let before = registry.snapshot();
        registry.create_and_register("b", backend("b", "o=b")).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(registry.len(), 2);

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        registry.remove_all();
        assert!(registry.is_empty());
    }
}
