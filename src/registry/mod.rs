//! URL entry registry
//!
//! Owns the ordered list of submitted links. The registry never drops below
//! one entry, and every mutation writes the `{id, url}` projection to the
//! local store when one is attached. A failed write detaches the store, so
//! the registry keeps working in memory only.

pub mod entry;
pub mod validation;

pub use entry::{Resolution, UrlEntry, Validity};

use crate::api::VideoMetadata;
use crate::persistence::{LocalStore, StoredEntry};
use uuid::Uuid;

#[derive(Debug)]
pub struct UrlRegistry {
    entries: Vec<UrlEntry>,
    store: Option<LocalStore>,
}

impl UrlRegistry {
    /// In-memory registry holding one empty bootstrap entry
    pub fn new() -> Self {
        Self {
            entries: vec![UrlEntry::new()],
            store: None,
        }
    }

    /// Restore entries from `store` and keep persisting into it
    ///
    /// Absent, corrupt or empty data falls back to one empty entry.
    pub fn load(store: LocalStore) -> Self {
        let entries = match store.load_entries() {
            Ok(Some(stored)) if !stored.is_empty() => {
                tracing::debug!("Restored {} URL entries from {:?}", stored.len(), store.path());
                stored
                    .into_iter()
                    .map(|StoredEntry { id, url }| UrlEntry::with_id(id, url))
                    .collect()
            }
            Ok(_) => vec![UrlEntry::new()],
            Err(e) => {
                tracing::warn!("Ignoring unreadable URL entries: {}", e);
                vec![UrlEntry::new()]
            }
        };

        Self {
            entries,
            store: Some(store),
        }
    }

    pub fn entries(&self) -> &[UrlEntry] {
        &self.entries
    }

    pub fn get(&self, id: Uuid) -> Option<&UrlEntry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false once constructed; present for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a blank entry and return its id
    pub fn add_entry(&mut self) -> Uuid {
        let entry = UrlEntry::new();
        let id = entry.id();
        self.entries.push(entry);
        tracing::debug!("Added URL entry {}", id);
        self.persist();
        id
    }

    /// Remove an entry; refuses to remove the last remaining one
    pub fn remove_entry(&mut self, id: Uuid) -> bool {
        if self.entries.len() <= 1 {
            tracing::debug!("Refusing to remove last URL entry {}", id);
            return false;
        }

        let before = self.entries.len();
        self.entries.retain(|e| e.id() != id);
        let removed = self.entries.len() != before;
        if removed {
            tracing::debug!("Removed URL entry {}", id);
            self.persist();
        }
        removed
    }

    /// Replace an entry's link and return its new validity
    ///
    /// Returns `None` for an unknown id. Any previous lookup result is
    /// cleared; scheduling the next lookup is the resolver's job.
    pub fn update_url(&mut self, id: Uuid, text: &str) -> Option<Validity> {
        let entry = self.entries.iter_mut().find(|e| e.id() == id)?;
        entry.set_url(text);
        let validity = entry.validity();
        tracing::trace!("Entry {} now {:?}: {:?}", id, validity, text);
        self.persist();
        Some(validity)
    }

    /// Keep only the first entry; returns the ids that were dropped
    pub fn clear_all_but_first(&mut self) -> Vec<Uuid> {
        let removed: Vec<Uuid> = self.entries.iter().skip(1).map(UrlEntry::id).collect();
        self.entries.truncate(1);
        if !removed.is_empty() {
            tracing::debug!("Cleared {} URL entries", removed.len());
        }
        self.persist();
        removed
    }

    /// Links of entries whose metadata resolved, in registry order
    pub fn resolved_urls(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.is_resolved())
            .map(|e| e.url().trim().to_string())
            .collect()
    }

    /// Number of entries ready for conversion
    pub fn ready_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_resolved()).count()
    }

    /// Mark an entry as awaiting its lookup, if it still shows `url`
    pub(crate) fn mark_pending(&mut self, id: Uuid, url: &str) -> bool {
        match self.current_entry_mut(id, url) {
            Some(entry) => {
                entry.mark_pending();
                true
            }
            None => false,
        }
    }

    /// Apply a lookup result, if the entry still shows the link that was looked up
    pub(crate) fn apply_resolution(
        &mut self,
        id: Uuid,
        url: &str,
        result: Result<VideoMetadata, ()>,
    ) -> bool {
        match self.current_entry_mut(id, url) {
            Some(entry) => {
                match result {
                    Ok(metadata) => entry.resolve(metadata),
                    Err(()) => entry.fail(),
                }
                true
            }
            None => false,
        }
    }

    fn current_entry_mut(&mut self, id: Uuid, url: &str) -> Option<&mut UrlEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.id() == id && e.url() == url)
    }

    fn persist(&mut self) {
        let Some(store) = &self.store else {
            return;
        };

        let stored: Vec<StoredEntry> = self.entries.iter().map(UrlEntry::to_stored).collect();
        if let Err(e) = store.save_entries(&stored) {
            tracing::warn!("Failed to persist URL entries, continuing without storage: {}", e);
            self.store = None;
        }
    }

    /// Whether mutations are still written to the local store
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }
}

impl Default for UrlRegistry {
    fn default() -> Self {
        Self::new()
    }
}
