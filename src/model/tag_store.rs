use std::collections::HashMap;

/// Short integer id assigned to an interned tag string.
pub type TagId = u16;

/// Append-only, bidirectional map between tag strings and [`TagId`]s.
///
/// Owned by the data manager and handed to the converter explicitly. Ids are
/// dense and assigned in first-seen order; tags are never removed.
#[derive(Debug, Clone, Default)]
pub struct TagStore {
    names: Vec<String>,
    ids: HashMap<String, TagId>,
}

impl TagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `tag`, allocating one on first sight.
    ///
    /// Returns `None` for an empty tag or when the id space is exhausted.
    pub fn intern(&mut self, tag: &str) -> Option<TagId> {
        if tag.is_empty() {
            return None;
        }
        if let Some(id) = self.ids.get(tag) {
            return Some(*id);
        }
        let id = match TagId::try_from(self.names.len()) {
            Ok(id) => id,
            Err(_) => {
                tracing::error!(tag = %tag, "Tag store is full, dropping tag");
                return None;
            }
        };
        self.names.push(tag.to_string());
        self.ids.insert(tag.to_string(), id);
        Some(id)
    }

    pub fn id(&self, tag: &str) -> Option<TagId> {
        self.ids.get(tag).copied()
    }

    pub fn name(&self, id: TagId) -> Option<&str> {
        self.names.get(usize::from(id)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
