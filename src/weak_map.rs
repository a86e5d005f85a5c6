use crate::error::Error;
use crate::live_index::{self, LiveIndex};
use crate::weak_key::WeakKey;
use core::fmt;
use core::hash::BuildHasher;
use std::collections::hash_map::RandomState;
use tracing::trace;

/// A map from weakly-held key objects to values that can be enumerated.
///
/// Keys are compared by identity (the allocation they point at), never by
/// value. The map stores only a weak handle per key, so dropping the last
/// outside strong handle reclaims the key; its entry disappears at the next
/// call into the map.
///
/// Every operation takes `&mut self` and starts by draining reclaimed keys
/// (see [`purge`](Self::purge)), so no reclaimed key is ever observed.
pub struct WeakEnumerableMap<K: WeakKey, V, S = RandomState> {
    index: LiveIndex<K::Weak, V, S>,
}

impl<K: WeakKey, V> WeakEnumerableMap<K, V> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }
}

impl<K: WeakKey, V, S> WeakEnumerableMap<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(0, hasher)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            index: LiveIndex::with_capacity_and_hasher(capacity, hasher),
        }
    }

    pub fn hasher(&self) -> &S {
        self.index.hasher()
    }

    /// Drain reclaimed keys, returning how many entries were removed.
    ///
    /// Dropping a removed value may release the last strong handle of
    /// another key, so sweeps repeat until one removes nothing.
    pub fn purge(&mut self) -> usize {
        let mut reclaimed = 0;
        loop {
            let evicted = self.index.retain(|weak, _| !K::is_reclaimed(weak));
            if evicted.is_empty() {
                break;
            }
            reclaimed += evicted.len();
            drop(evicted);
        }
        if reclaimed > 0 {
            trace!(reclaimed, live = self.index.len(), "drained reclaimed keys");
        }
        reclaimed
    }

    /// Number of live entries.
    pub fn len(&mut self) -> usize {
        self.purge();
        self.index.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.purge();
        self.index.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        let dropped = self.index.len();
        self.index.clear();
        trace!(dropped, "cleared map");
    }

    /// Keep only the entries for which `f` returns true.
    ///
    /// Entries are visited in insertion order with a strong handle to the
    /// key, which is released before `retain` returns.
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.purge();
        let evicted = self.index.retain(|weak, value| match K::upgrade(weak) {
            Some(key) => f(&key, value),
            None => false,
        });
        if !evicted.is_empty() {
            drop(evicted);
            self.purge();
        }
    }

    /// Keys in first-insertion order, as strong handles.
    ///
    /// Each key is re-checked as it is yielded; a key reclaimed while the
    /// iterator is alive is skipped.
    pub fn keys(&mut self) -> Keys<'_, K, V> {
        self.purge();
        Keys {
            inner: self.index.iter(),
        }
    }

    /// Values in first-insertion order of their keys.
    pub fn values(&mut self) -> Values<'_, K, V> {
        self.purge();
        Values {
            inner: self.index.iter(),
        }
    }

    /// `(key, value)` pairs in first-insertion order.
    pub fn entries(&mut self) -> Entries<'_, K, V> {
        self.purge();
        Entries {
            inner: self.index.iter(),
        }
    }
}

impl<K: WeakKey, V, S: BuildHasher> WeakEnumerableMap<K, V, S> {
    /// Associate `value` with `key`, returning the value it replaced.
    ///
    /// A key seen for the first time is appended to the enumeration order;
    /// an existing key keeps its position.
    pub fn set(&mut self, key: &K, value: V) -> Option<V> {
        self.purge();
        self.index
            .upsert(K::identity(key), || K::downgrade(key), value)
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.purge();
        self.index.get(K::identity(key))
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.purge();
        self.index.get_mut(K::identity(key))
    }

    pub fn has(&mut self, key: &K) -> bool {
        self.purge();
        self.index.get(K::identity(key)).is_some()
    }

    /// Remove the entry for `key` and hand back its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.purge();
        // The weak handle is dropped here, deregistering the key.
        self.index.remove(K::identity(key)).map(|(_, value)| value)
    }

    /// Remove the entry for `key`; returns whether one existed.
    pub fn delete(&mut self, key: &K) -> bool {
        match self.remove(key) {
            Some(value) => {
                drop(value);
                trace!(live = self.index.len(), "deleted entry");
                self.purge();
                true
            }
            None => false,
        }
    }

    /// [`set`](Self::set) through a weak handle.
    ///
    /// Fails with [`Error::InvalidKey`] if `key` does not upgrade.
    pub fn set_weak(&mut self, key: &K::Weak, value: V) -> Result<Option<V>, Error> {
        let key = K::upgrade(key).ok_or(Error::InvalidKey)?;
        Ok(self.set(&key, value))
    }

    pub fn get_weak(&mut self, key: &K::Weak) -> Result<Option<&V>, Error> {
        let key = K::upgrade(key).ok_or(Error::InvalidKey)?;
        Ok(self.get(&key))
    }

    pub fn has_weak(&mut self, key: &K::Weak) -> Result<bool, Error> {
        let key = K::upgrade(key).ok_or(Error::InvalidKey)?;
        Ok(self.has(&key))
    }

    pub fn delete_weak(&mut self, key: &K::Weak) -> Result<bool, Error> {
        let key = K::upgrade(key).ok_or(Error::InvalidKey)?;
        Ok(self.delete(&key))
    }
}

impl<K: WeakKey, V, S: Default> Default for WeakEnumerableMap<K, V, S> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> fmt::Debug for WeakEnumerableMap<K, V, S>
where
    K: WeakKey + fmt::Debug,
    V: fmt::Debug,
{
    // Only `&self` here, so filter instead of draining.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.index
                    .iter()
                    .filter_map(|(weak, value)| K::upgrade(weak).map(|key| (key, value))),
            )
            .finish()
    }
}

impl<'a, K: WeakKey, V, S> IntoIterator for &'a mut WeakEnumerableMap<K, V, S> {
    type Item = (K, &'a V);
    type IntoIter = Entries<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries()
    }
}

/// Iterator over the live keys of a [`WeakEnumerableMap`].
pub struct Keys<'a, K: WeakKey, V> {
    inner: live_index::Iter<'a, K::Weak, V>,
}

impl<'a, K: WeakKey, V> Iterator for Keys<'a, K, V> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        self.inner.by_ref().find_map(|(weak, _)| K::upgrade(weak))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.inner.size_hint().1)
    }
}

impl<K: WeakKey, V> Clone for Keys<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Iterator over the values of live entries in a [`WeakEnumerableMap`].
pub struct Values<'a, K: WeakKey, V> {
    inner: live_index::Iter<'a, K::Weak, V>,
}

impl<'a, K: WeakKey, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        self.inner
            .by_ref()
            .find_map(|(weak, value)| (!K::is_reclaimed(weak)).then_some(value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.inner.size_hint().1)
    }
}

impl<K: WeakKey, V> Clone for Values<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Iterator over live `(key, value)` pairs of a [`WeakEnumerableMap`].
pub struct Entries<'a, K: WeakKey, V> {
    inner: live_index::Iter<'a, K::Weak, V>,
}

impl<'a, K: WeakKey, V> Iterator for Entries<'a, K, V> {
    type Item = (K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .by_ref()
            .find_map(|(weak, value)| K::upgrade(weak).map(|key| (key, value)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.inner.size_hint().1)
    }
}

impl<K: WeakKey, V> Clone for Entries<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
