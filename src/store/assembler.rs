//! Rebuilds full snapshots from per-document changes
//!
//! Keeps a keyed map from identity to fields plus insertion order, so every
//! change can be followed by a complete, ordered snapshot.

use serde_json::{Map, Value};
use std::collections::HashMap;

use super::{RemoteDocument, Snapshot};
use crate::model::EventId;

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentChange {
    Added(RemoteDocument),
    Modified(RemoteDocument),
    Removed(EventId),
}

#[derive(Debug, Default)]
pub struct SnapshotAssembler {
    order: Vec<EventId>,
    by_id: HashMap<EventId, Map<String, Value>>,
}

impl SnapshotAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one change. Returns whether the collection actually changed.
    ///
    /// An add for a known key replaces its fields in place; a modify for an
    /// unknown key appends it.
    pub fn apply(&mut self, change: DocumentChange) -> bool {
        match change {
            DocumentChange::Added(doc) | DocumentChange::Modified(doc) => {
                match self.by_id.get_mut(&doc.id) {
                    Some(existing) if *existing == doc.data => false,
                    Some(existing) => {
                        *existing = doc.data;
                        true
                    }
                    None => {
                        self.order.push(doc.id.clone());
                        self.by_id.insert(doc.id, doc.data);
                        true
                    }
                }
            }
            DocumentChange::Removed(id) => {
                if self.by_id.remove(&id).is_some() {
                    self.order.retain(|k| k != &id);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn snapshot(&self) -> Snapshot {
        let documents = self
            .order
            .iter()
            .filter_map(|id| {
                self.by_id
                    .get(id)
                    .map(|data| RemoteDocument::new(id.clone(), data.clone()))
            })
            .collect();
        Snapshot::new(documents)
    }
}
