//! Search processing flags and the result sink backends stream into.

use super::request::{SearchRequest, SearchScope};
use crate::dn::Dn;
use crate::entry::{Attribute, Entry, OBJECT_CLASS};
use crate::error::{DirectoryError, DirectoryResult, ResultCode};
use crate::filter::Filter;

/// Name of the virtual attribute holding an entry's own DN.
pub const ENTRY_DN: &str = "entryDN";

const SUBENTRY_CLASS: &str = "ldapSubentry";

/// Search parameters decoded by the search processor, plus the entries
/// returned so far.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    pub base_dn: Option<Dn>,
    pub scope: SearchScope,
    pub filter: Option<Filter>,
    /// Effective size limit, 0 for none
    pub size_limit: u32,
    pub attributes: Vec<String>,
    pub return_subentries: bool,
    pub matched_values: Vec<Filter>,
    pub real_attributes_only: bool,
    pub virtual_attributes_only: bool,
    entries: Vec<Entry>,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            base_dn: None,
            scope: SearchScope::Base,
            filter: None,
            size_limit: 0,
            attributes: Vec::new(),
            return_subentries: false,
            matched_values: Vec::new(),
            real_attributes_only: false,
            virtual_attributes_only: false,
            entries: Vec::new(),
        }
    }
}

impl SearchState {
    pub(crate) fn for_request(request: &SearchRequest) -> Self {
        Self {
            scope: request.scope,
            size_limit: request.size_limit,
            attributes: request.attributes.clone(),
            ..Self::default()
        }
    }

    /// Whether an entry lies within the base DN and scope.
    pub fn in_scope(&self, dn: &Dn) -> bool {
        let Some(base) = &self.base_dn else {
            return false;
        };
        match self.scope {
            SearchScope::Base => dn == base,
            SearchScope::OneLevel => dn.is_child_of(base),
            SearchScope::Subtree => dn.is_subordinate_or_equal(base),
            SearchScope::Subordinates => dn.is_descendant_of(base),
        }
    }

    /// Whether an entry matches the decoded filter.
    pub fn matches(&self, entry: &Entry) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(entry))
    }

    /// Accept one matching entry. Returns `Ok(true)` to ask for more and
    /// `SizeLimitExceeded` once the size limit has already been reached.
    /// Subentries are skipped unless requested or targeted by a base search.
    pub fn return_entry(&mut self, entry: Entry) -> DirectoryResult<bool> {
        if !self.return_subentries
            && self.scope != SearchScope::Base
            && entry.has_object_class(SUBENTRY_CLASS)
        {
            return Ok(true);
        }
        if self.size_limit > 0 && self.entries.len() >= self.size_limit as usize {
            return Err(DirectoryError::new(
                ResultCode::SizeLimitExceeded,
                format!(
                    "This search operation has sent the maximum of {} entries to the client",
                    self.size_limit
                ),
            ));
        }
        let shaped = self.shape(&entry);
        self.entries.push(shaped);
        Ok(true)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub(crate) fn take_entries(&mut self) -> Vec<Entry> {
        std::mem::take(&mut self.entries)
    }

    fn requested(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    /// Reduce an entry to what the client asked for.
    fn shape(&self, entry: &Entry) -> Entry {
        let all_user = self.attributes.is_empty() || self.requested("*");
        let all_operational = self.requested("+");
        let mut shaped = Entry::new(entry.dn().clone());

        if !self.virtual_attributes_only {
            if all_user || self.requested(OBJECT_CLASS) {
                for class in entry.object_classes() {
                    shaped.add_object_class(class.clone());
                }
            }
            for attribute in entry.user_attributes() {
                if all_user || self.requested(attribute.name()) {
                    shaped.put_attribute(attribute.clone(), false);
                }
            }
            for attribute in entry.operational_attributes() {
                if all_operational || self.requested(attribute.name()) {
                    shaped.put_attribute(attribute.clone(), true);
                }
            }
        }

        if !self.real_attributes_only && (all_operational || self.requested(ENTRY_DN)) {
            shaped.put_attribute(Attribute::single(ENTRY_DN, entry.dn().to_string()), true);
        }

        if !self.matched_values.is_empty() {
            let filters = &self.matched_values;
            shaped.retain_values(|name, value| {
                let referenced = filters
                    .iter()
                    .any(|f| f.attribute().is_some_and(|a| a.eq_ignore_ascii_case(name)));
                !referenced || filters.iter().any(|f| f.matches_value(name, value))
            });
        }
        shaped
    }
}
