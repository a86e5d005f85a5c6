//! LiveIndex: insertion-ordered identity table with stable slots.
//!
//! Storage is a `SlotMap` of slots, each carrying the key's identity, its
//! weak handle and the value. A `HashTable` of slot keys indexes them by
//! identity, and an intrusive doubly-linked list through the slots records
//! first-insertion order for enumeration.

use crate::weak_key::Identity;
use core::hash::BuildHasher;
use core::mem;
use hashbrown::hash_table::Entry;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;

#[derive(Debug)]
struct Slot<W, V> {
    identity: Identity,
    weak: W,
    value: V,
    hash: u64,
    prev: Option<DefaultKey>,
    next: Option<DefaultKey>,
}

pub(crate) struct LiveIndex<W, V, S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Slot<W, V>>,
    head: Option<DefaultKey>,
    tail: Option<DefaultKey>,
}

impl<W, V> LiveIndex<W, V> {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::with_capacity_and_hasher(0, RandomState::new())
    }
}

impl<W, V, S> LiveIndex<W, V, S> {
    pub(crate) fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            hasher,
            index: HashTable::with_capacity(capacity),
            slots: SlotMap::with_capacity_and_key(capacity),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn hasher(&self) -> &S {
        &self.hasher
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate `(weak, value)` pairs in first-insertion order.
    pub(crate) fn iter(&self) -> Iter<'_, W, V> {
        Iter {
            slots: &self.slots,
            next: self.head,
            remaining: self.slots.len(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.index.clear();
        self.head = None;
        self.tail = None;
        // Values drop last, after the structure is already empty.
        self.slots.clear();
    }

    /// Keep the slots for which `keep` returns true, visiting in order.
    ///
    /// Evicted pairs are returned rather than dropped so the caller decides
    /// when user `Drop` code runs; the index is consistent on return.
    pub(crate) fn retain<F>(&mut self, mut keep: F) -> Vec<(W, V)>
    where
        F: FnMut(&W, &mut V) -> bool,
    {
        let mut doomed = Vec::new();
        let mut cursor = self.head;
        while let Some(k) = cursor {
            let Some(slot) = self.slots.get_mut(k) else {
                break;
            };
            cursor = slot.next;
            if !keep(&slot.weak, &mut slot.value) {
                doomed.push(k);
            }
        }

        let mut evicted = Vec::with_capacity(doomed.len());
        for k in doomed {
            if let Some(pair) = self.evict(k) {
                evicted.push(pair);
            }
        }
        evicted
    }

    // Unlink from hash index and order list, then free the slot.
    fn evict(&mut self, k: DefaultKey) -> Option<(W, V)> {
        let hash = self.slots.get(k)?.hash;
        if let Ok(entry) = self.index.find_entry(hash, |&kk| kk == k) {
            entry.remove();
        }
        self.detach(k)
    }

    fn detach(&mut self, k: DefaultKey) -> Option<(W, V)> {
        let slot = self.slots.remove(k)?;
        match slot.prev {
            Some(p) => {
                if let Some(prev) = self.slots.get_mut(p) {
                    prev.next = slot.next;
                }
            }
            None => self.head = slot.next,
        }
        match slot.next {
            Some(n) => {
                if let Some(next) = self.slots.get_mut(n) {
                    next.prev = slot.prev;
                }
            }
            None => self.tail = slot.prev,
        }
        Some((slot.weak, slot.value))
    }

    fn link_back(&mut self, k: DefaultKey) {
        let old_tail = self.tail.replace(k);
        if let Some(slot) = self.slots.get_mut(k) {
            slot.prev = old_tail;
            slot.next = None;
        }
        match old_tail {
            Some(t) => {
                if let Some(tail) = self.slots.get_mut(t) {
                    tail.next = Some(k);
                }
            }
            None => self.head = Some(k),
        }
    }
}

impl<W, V, S> LiveIndex<W, V, S>
where
    S: BuildHasher,
{
    fn find_slot(&self, id: Identity) -> Option<DefaultKey> {
        let hash = self.hasher.hash_one(id);
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|s| s.identity == id)
                    .unwrap_or(false)
            })
            .copied()
    }

    pub(crate) fn get(&self, id: Identity) -> Option<&V> {
        let k = self.find_slot(id)?;
        self.slots.get(k).map(|s| &s.value)
    }

    pub(crate) fn get_mut(&mut self, id: Identity) -> Option<&mut V> {
        let k = self.find_slot(id)?;
        self.slots.get_mut(k).map(|s| &mut s.value)
    }

    /// Insert at the back of the order, or replace the value in place.
    ///
    /// `weak` is only called for a new slot, so an existing registration is
    /// never duplicated. Returns the replaced value, if any.
    pub(crate) fn upsert<F>(&mut self, id: Identity, weak: F, value: V) -> Option<V>
    where
        F: FnOnce() -> W,
    {
        let hash = self.hasher.hash_one(id);
        let slots = &self.slots;
        match self.index.entry(
            hash,
            |&k| slots.get(k).map(|s| s.identity == id).unwrap_or(false),
            |&k| slots.get(k).map(|s| s.hash).unwrap_or(0),
        ) {
            Entry::Occupied(o) => {
                let k = *o.get();
                self.slots
                    .get_mut(k)
                    .map(|s| mem::replace(&mut s.value, value))
            }
            Entry::Vacant(v) => {
                let k = self.slots.insert(Slot {
                    identity: id,
                    weak: weak(),
                    value,
                    hash,
                    prev: None,
                    next: None,
                });
                v.insert(k);
                self.link_back(k);
                None
            }
        }
    }

    pub(crate) fn remove(&mut self, id: Identity) -> Option<(W, V)> {
        let hash = self.hasher.hash_one(id);
        let slots = &self.slots;
        let entry = self
            .index
            .find_entry(hash, |&k| {
                slots.get(k).map(|s| s.identity == id).unwrap_or(false)
            })
            .ok()?;
        let (k, _) = entry.remove();
        self.detach(k)
    }
}

/// Ordered iterator over `(weak, value)` pairs of a `LiveIndex`.
pub(crate) struct Iter<'a, W, V> {
    slots: &'a SlotMap<DefaultKey, Slot<W, V>>,
    next: Option<DefaultKey>,
    remaining: usize,
}

impl<W, V> Clone for Iter<'_, W, V> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots,
            next: self.next,
            remaining: self.remaining,
        }
    }
}

impl<'a, W, V> Iterator for Iter<'a, W, V> {
    type Item = (&'a W, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.slots.get(self.next?)?;
        self.next = slot.next;
        self.remaining = self.remaining.saturating_sub(1);
        Some((&slot.weak, &slot.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> Identity {
        Identity::from_raw(n)
    }

    fn order<W, V: Copy, S>(m: &LiveIndex<W, V, S>) -> Vec<V> {
        m.iter().map(|(_, v)| *v).collect()
    }

    /// Invariant: new identities append; upserts of known identities keep
    /// their position and return the old value.
    #[test]
    fn upsert_appends_then_replaces_in_place() {
        let mut m: LiveIndex<(), i32> = LiveIndex::new();
        assert_eq!(m.upsert(id(1), || (), 10), None);
        assert_eq!(m.upsert(id(2), || (), 20), None);
        assert_eq!(m.upsert(id(3), || (), 30), None);
        assert_eq!(m.upsert(id(1), || (), 11), Some(10));
        assert_eq!(m.len(), 3);
        assert_eq!(order(&m), vec![11, 20, 30]);
    }

    /// Invariant: replacing an existing slot never creates a second weak
    /// registration.
    #[test]
    fn upsert_does_not_reregister() {
        let mut m: LiveIndex<u8, i32> = LiveIndex::new();
        m.upsert(id(7), || 1, 0);
        m.upsert(id(7), || panic!("registered twice"), 1);
        assert_eq!(m.get(id(7)), Some(&1));
    }

    /// Invariant: `get(id).is_some()` tracks membership across removals;
    /// removing the head, middle and tail keeps the list intact.
    #[test]
    fn remove_relinks_order() {
        let mut m: LiveIndex<(), i32> = LiveIndex::new();
        for i in 0..5 {
            m.upsert(id(i), || (), i as i32);
        }
        assert_eq!(m.remove(id(0)), Some(((), 0)));
        assert_eq!(m.remove(id(2)), Some(((), 2)));
        assert_eq!(m.remove(id(4)), Some(((), 4)));
        assert_eq!(m.remove(id(4)), None);
        assert_eq!(order(&m), vec![1, 3]);
        assert!(m.get(id(2)).is_none());
        assert!(m.get(id(3)).is_some());

        // Re-insert lands at the back.
        m.upsert(id(0), || (), 0);
        assert_eq!(order(&m), vec![1, 3, 0]);
    }

    #[test]
    fn retain_evicts_in_order_and_returns_pairs() {
        let mut m: LiveIndex<bool, i32> = LiveIndex::new();
        for i in 0..6 {
            m.upsert(id(i), || i % 2 == 0, i as i32);
        }
        let evicted = m.retain(|dead, _| !*dead);
        let values: Vec<i32> = evicted.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![0, 2, 4]);
        assert_eq!(order(&m), vec![1, 3, 5]);
        for i in [0, 2, 4] {
            assert!(m.get(id(i)).is_none());
        }
    }

    #[test]
    fn retain_can_mutate_survivors() {
        let mut m: LiveIndex<(), i32> = LiveIndex::new();
        m.upsert(id(1), || (), 1);
        m.upsert(id(2), || (), 2);
        let evicted = m.retain(|_, v| {
            *v *= 10;
            true
        });
        assert!(evicted.is_empty());
        assert_eq!(order(&m), vec![10, 20]);
    }

    #[test]
    fn clear_then_reuse() {
        let mut m: LiveIndex<(), i32> = LiveIndex::new();
        m.upsert(id(1), || (), 1);
        m.upsert(id(2), || (), 2);
        m.clear();
        assert!(m.is_empty());
        assert_eq!(m.iter().count(), 0);
        m.upsert(id(2), || (), 3);
        assert_eq!(order(&m), vec![3]);
    }

    /// Invariant: iterators are restartable snapshots and report an exact
    /// length.
    #[test]
    fn iter_clone_restarts() {
        let mut m: LiveIndex<(), i32> = LiveIndex::new();
        for i in 0..3 {
            m.upsert(id(i), || (), i as i32);
        }
        let mut it = m.iter();
        assert_eq!(it.size_hint(), (3, Some(3)));
        it.next();
        let rest = it.clone();
        assert_eq!(it.map(|(_, v)| *v).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(rest.map(|(_, v)| *v).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn custom_hasher_is_used() {
        use core::hash::{BuildHasherDefault, Hasher};

        #[derive(Default)]
        struct Constant;
        impl Hasher for Constant {
            fn finish(&self) -> u64 {
                0
            }
            fn write(&mut self, _bytes: &[u8]) {}
        }

        // Every identity collides; lookups must still compare identities.
        let mut m: LiveIndex<(), i32, BuildHasherDefault<Constant>> =
            LiveIndex::with_capacity_and_hasher(4, BuildHasherDefault::default());
        for i in 0..8 {
            m.upsert(id(i), || (), i as i32);
        }
        for i in 0..8 {
            assert_eq!(m.get(id(i)), Some(&(i as i32)));
        }
        assert_eq!(m.remove(id(3)), Some(((), 3)));
        assert_eq!(m.get(id(3)), None);
        assert_eq!(m.len(), 7);
    }
}
