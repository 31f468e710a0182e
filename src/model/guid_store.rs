use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::Revision;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct GuidEntry {
    revision: Revision,
    is_new: bool,
}

/// Guid → revision map for one content level (master feed, gallery or album).
///
/// Stores are never shared across levels. A gallery guid in the master feed's
/// store says nothing about the albums inside that gallery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GuidStore {
    entries: HashMap<String, GuidEntry>,
}

impl GuidStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a guid. Returns `false` and leaves the store untouched when
    /// the guid is already present (first occurrence wins).
    pub fn insert(&mut self, guid: &str, revision: Revision) -> bool {
        if self.entries.contains_key(guid) {
            return false;
        }
        self.entries.insert(
            guid.to_string(),
            GuidEntry {
                revision,
                is_new: false,
            },
        );
        true
    }

    pub fn contains(&self, guid: &str) -> bool {
        self.entries.contains_key(guid)
    }

    pub fn revision(&self, guid: &str) -> Option<Revision> {
        self.entries.get(guid).map(|e| e.revision)
    }

    pub fn is_new(&self, guid: &str) -> bool {
        self.entries.get(guid).is_some_and(|e| e.is_new)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Marks every entry that is absent from `previous`, or whose revision
    /// differs from it, as new. Returns the set of new guids.
    pub fn mark_changed_since(&mut self, previous: &GuidStore) -> BTreeSet<String> {
        let mut changed = BTreeSet::new();
        for (guid, entry) in &mut self.entries {
            entry.is_new = previous.revision(guid) != Some(entry.revision);
            if entry.is_new {
                changed.insert(guid.clone());
            }
        }
        changed
    }

    pub fn new_guids(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|(_, e)| e.is_new)
            .map(|(guid, _)| guid.clone())
            .collect()
    }

    pub fn reset_is_new(&mut self) {
        for entry in self.entries.values_mut() {
            entry.is_new = false;
        }
    }
}
