use std::collections::HashSet;

use super::item::ItemId;

/// Distinct item ids awaiting submission.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    ids: HashSet<ItemId>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the id was already pending.
    pub fn insert(&mut self, id: ItemId) -> bool {
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Copy of the current contents, sorted so batches are reproducible.
    /// The set itself is left untouched.
    pub fn snapshot(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.ids.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Removes exactly the given ids. Ids added after the snapshot was taken stay pending.
    pub fn remove_all(&mut self, batch: &[ItemId]) -> usize {
        batch.iter().filter(|id| self.ids.remove(*id)).count()
    }
}
