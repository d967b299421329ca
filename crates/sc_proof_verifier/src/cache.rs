//! Capacity-bounded cache ordered by value
//!
//! Keeps two indices over the same entries: key → value for lookups and
//! (value, insertion sequence) → key for eviction. When full, the entry with
//! the smallest value is evicted; equal values are evicted in insertion order.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    seq: u64,
}

/// Bounded cache evicting its smallest value first.
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    by_key: BTreeMap<K, Slot<V>>,
    by_value: BTreeSet<(V, u64, K)>,
    next_seq: u64,
}

impl<K, V> BoundedCache<K, V>
where
    K: Ord + Clone,
    V: Ord + Clone,
{
    /// Create an empty cache holding at most `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            by_key: BTreeMap::new(),
            by_value: BTreeSet::new(),
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn try_get(&self, key: &K) -> Option<&V> {
        self.by_key.get(key).map(|slot| &slot.value)
    }

    /// Insert a new entry; an existing key is left untouched.
    ///
    /// Returns `false` if the key was already cached. At capacity, the entry
    /// with the smallest value is evicted first.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if self.by_key.contains_key(&key) {
            return false;
        }
        if self.by_key.len() >= self.capacity {
            self.evict_min();
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_value.insert((value.clone(), seq, key.clone()));
        self.by_key.insert(key, Slot { value, seq });
        true
    }

    /// Replace the value of a cached key, re-indexing it.
    ///
    /// Returns `false` if the key is not cached.
    pub fn update(&mut self, key: &K, value: V) -> bool {
        let Some(slot) = self.by_key.get_mut(key) else {
            return false;
        };
        self.by_value
            .remove(&(slot.value.clone(), slot.seq, key.clone()));
        slot.value = value.clone();
        self.by_value.insert((value, slot.seq, key.clone()));
        true
    }

    /// Remove a key, returning its value
    pub fn erase(&mut self, key: &K) -> Option<V> {
        let slot = self.by_key.remove(key)?;
        self.by_value
            .remove(&(slot.value.clone(), slot.seq, key.clone()));
        Some(slot.value)
    }

    /// Entry with the smallest value
    pub fn min_entry(&self) -> Option<(&K, &V)> {
        self.by_value.first().map(|(value, _, key)| (key, value))
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
        self.by_value.clear();
    }

    fn evict_min(&mut self) {
        if let Some((_, _, key)) = self.by_value.pop_first() {
            self.by_key.remove(&key);
        }
        debug_assert_eq!(self.by_key.len(), self.by_value.len());
    }
}
