use std::collections::{HashMap, HashSet};

use super::item::ItemId;

/// Last server-confirmed view count per item, plus the one-time seeding guard.
///
/// The server is authoritative: a confirmed count replaces whatever is stored,
/// seeded or locally incremented.
#[derive(Debug, Clone, Default)]
pub struct ConfirmedCountStore {
    counts: HashMap<ItemId, u64>,
    seeded: HashSet<ItemId>,
}

impl ConfirmedCountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 0 when the item was never seeded or confirmed.
    pub fn get(&self, id: &str) -> u64 {
        self.counts.get(id).copied().unwrap_or(0)
    }

    /// Primes the count once per item. Returns true if the value was stored.
    ///
    /// The id is marked seeded even when a confirmed count already exists; in that
    /// case the confirmed count wins and the seed is discarded.
    pub fn seed(&mut self, id: ItemId, count: u64) -> bool {
        if !self.seeded.insert(id.clone()) {
            return false;
        }
        if self.counts.contains_key(&id) {
            return false;
        }
        self.counts.insert(id, count);
        true
    }

    /// Last-writer overwrite with the server's value.
    pub fn confirm(&mut self, id: ItemId, count: u64) {
        self.counts.insert(id, count);
    }

    /// Local optimistic bump, used when the server acknowledges without counts.
    pub fn increment(&mut self, id: ItemId) -> u64 {
        let slot = self.counts.entry(id).or_insert(0);
        *slot = slot.saturating_add(1);
        *slot
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
