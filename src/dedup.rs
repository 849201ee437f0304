//! Bounded deduplication cache for processed review items
//!
//! Per-account FIFO set of recently processed item ids. Capacity equals the
//! account's daily review limit, so a full day of reviews fits without ever
//! reprocessing an item. Oldest entries are evicted first.
//!
//! The cache is owned by the account's single polling worker and is not
//! internally synchronized; the registry enforces the one-worker-per-account
//! invariant.

use std::collections::{HashSet, VecDeque};

use crate::types::ItemId;

#[derive(Debug)]
pub struct DedupCache {
    capacity: usize,
    order: VecDeque<ItemId>,
    seen: HashSet<ItemId>,
}

impl DedupCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn contains(&self, id: ItemId) -> bool {
        self.seen.contains(&id)
    }

    /// Record an item as processed. Returns `false` if it was already known.
    /// Evicts the oldest entry when the cache is at capacity.
    pub fn insert(&mut self, id: ItemId) -> bool {
        if !self.seen.insert(id) {
            return false;
        }

        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(id);
        true
    }

    /// Grow or shrink the capacity (daily limits change with queue backlog).
    /// Shrinking evicts oldest entries until the new bound holds.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_contains() {
        let mut cache = DedupCache::new(4);
        assert!(!cache.contains(ItemId(1)));
        assert!(cache.insert(ItemId(1)));
        assert!(cache.contains(ItemId(1)));
        assert!(!cache.insert(ItemId(1)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_oldest_first() {
        let mut cache = DedupCache::new(3);
        for id in 1..=3 {
            cache.insert(ItemId(id));
        }
        assert_eq!(cache.len(), 3);

        cache.insert(ItemId(4));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(ItemId(1)));
        assert!(cache.contains(ItemId(2)));
        assert!(cache.contains(ItemId(4)));
    }

    #[test]
    fn shrinking_capacity_evicts() {
        let mut cache = DedupCache::new(5);
        for id in 1..=5 {
            cache.insert(ItemId(id));
        }

        cache.set_capacity(2);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(ItemId(4)));
        assert!(cache.contains(ItemId(5)));
        assert!(!cache.contains(ItemId(3)));
    }

    #[test]
    fn clear_resets_everything() {
        let mut cache = DedupCache::new(3);
        cache.insert(ItemId(7));
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.contains(ItemId(7)));
        assert!(cache.insert(ItemId(7)));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut cache = DedupCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(ItemId(1));
        cache.insert(ItemId(2));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(ItemId(2)));
    }
}
