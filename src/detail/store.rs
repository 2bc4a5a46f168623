use std::collections::HashMap;

use slotmap::SlotMap;

use super::{Detail, DetailCore};
use crate::scene::{AttachmentRef, NodeId};

slotmap::new_key_type! {
    /// Unique identifier for a detail within its store.
    pub struct DetailKey;
}

/// Arena of details of one kind, indexed by the tracked attachment.
///
/// A node maps to at most one detail per attachment slot.
#[derive(Debug, Clone)]
pub struct DetailStore<K> {
    details: SlotMap<DetailKey, Detail<K>>,
    index: HashMap<(NodeId, AttachmentRef), DetailKey>,
}

impl<K> Default for DetailStore<K> {
    fn default() -> Self {
        Self {
            details: SlotMap::with_key(),
            index: HashMap::new(),
        }
    }
}

impl<K> DetailStore<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.details.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    /// Returns the detail tracking `slot` on `node`.
    #[must_use]
    pub fn find(&self, node: NodeId, slot: AttachmentRef) -> Option<DetailKey> {
        self.index.get(&(node, slot)).copied()
    }

    #[must_use]
    pub fn get(&self, key: DetailKey) -> Option<&Detail<K>> {
        self.details.get(key)
    }

    pub fn get_mut(&mut self, key: DetailKey) -> Option<&mut Detail<K>> {
        self.details.get_mut(key)
    }

    /// Starts tracking `slot` on `node`. If it is already tracked, the
    /// payload is replaced and the existing key returned.
    pub fn insert(&mut self, node: NodeId, slot: AttachmentRef, kind: K) -> DetailKey {
        if let Some(key) = self.find(node, slot) {
            if let Some(detail) = self.details.get_mut(key) {
                detail.kind = kind;
                detail.core.pending_removal = false;
                return key;
            }
        }
        let key = self.details.insert(Detail {
            core: DetailCore::new(node, slot),
            kind,
        });
        self.index.insert((node, slot), key);
        key
    }

    pub fn iter(&self) -> impl Iterator<Item = (DetailKey, &Detail<K>)> {
        self.details.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (DetailKey, &mut Detail<K>)> {
        self.details.iter_mut()
    }

    // --- Mark and sweep ---

    /// Marks every detail pending removal.
    pub fn mark_all(&mut self) {
        for detail in self.details.values_mut() {
            detail.core.pending_removal = true;
        }
    }

    /// Clears the removal mark of a rediscovered detail.
    pub fn keep(&mut self, key: DetailKey) {
        if let Some(detail) = self.details.get_mut(key) {
            detail.core.pending_removal = false;
        }
    }

    /// Removes every detail still marked and hands them back so the caller
    /// can revert what they changed.
    pub fn sweep(&mut self) -> Vec<Detail<K>> {
        let stale: Vec<DetailKey> = self
            .details
            .iter()
            .filter(|(_, d)| d.core.pending_removal)
            .map(|(key, _)| key)
            .collect();
        stale.into_iter().filter_map(|key| self.remove(key)).collect()
    }

    /// Removes one detail.
    pub fn remove(&mut self, key: DetailKey) -> Option<Detail<K>> {
        let detail = self.details.remove(key)?;
        self.index.remove(&(detail.core.node(), detail.core.slot()));
        Some(detail)
    }

    /// Removes every detail.
    pub fn drain(&mut self) -> Vec<Detail<K>> {
        self.index.clear();
        self.details.drain().map(|(_, detail)| detail).collect()
    }
}
