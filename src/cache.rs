//! Time-to-live resource cache.
//!
//! [`ResourceCache`] owns every value stored in it. Entries carry a remaining
//! lifetime that is decremented by [`ResourceCache::tick`]; an entry whose
//! lifetime runs out is disposed and removed. Reading an entry through
//! [`ResourceCache::get`] restores its lifetime to the cache default, so data
//! that is used at least once per TTL window stays resident while everything
//! else ages out.
//!
//! References returned by `get` are only valid until the next call that takes
//! `&mut self`; consumers look values up again every frame instead of holding
//! on to them.

use std::{collections::HashMap, hash::Hash};

use instant::Duration;

use crate::lifecycle::Lifecycle;

/// Values that release something when they leave the cache.
///
/// The default implementation does nothing, so plain data opts in with an
/// empty `impl Disposable for T {}`.
pub trait Disposable {
    fn dispose(&mut self) {}
}

/// Remaining lifetime of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifetime {
    /// Never evicted by `tick`.
    Persistent,
    /// Evicted once more than this much time has elapsed.
    Expiring(Duration),
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    lifetime: Lifetime,
}

#[derive(Debug)]
pub struct ResourceCache<K, V>
where
    K: Eq + Hash,
    V: Disposable,
{
    entries: HashMap<K, CacheEntry<V>>,
    default_ttl: Duration,
    state: Lifecycle,
}

impl<K, V> ResourceCache<K, V>
where
    K: Eq + Hash + std::fmt::Debug,
    V: Disposable,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
            state: Lifecycle::Active,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Applies from the next `store`/`get` on; existing lifetimes are kept.
    pub fn set_default_ttl(&mut self, ttl: Duration) {
        self.default_ttl = ttl;
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores `value` with the default TTL, disposing any value it replaces.
    pub fn store(&mut self, key: K, value: V) {
        let ttl = self.default_ttl;
        self.store_with_lifetime(key, value, Lifetime::Expiring(ttl));
    }

    /// Stores `value` with an explicit lifetime.
    ///
    /// A disposed cache disposes `value` right away instead of keeping it.
    pub fn store_with_lifetime(&mut self, key: K, mut value: V, lifetime: Lifetime) {
        if !self.state.is_active() {
            log::warn!("store of {:?} into a disposed cache; value is dropped", key);
            value.dispose();
            return;
        }
        let entry = CacheEntry { value, lifetime };
        if let Some(mut replaced) = self.entries.insert(key, entry) {
            replaced.value.dispose();
        }
    }

    /// Returns the value under `key` and restores its TTL to the default.
    ///
    /// Persistent entries stay persistent.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.get_mut(key).map(|value| &*value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        if !self.state.is_active() {
            log::warn!("stale lookup of {:?} after the cache was disposed", key);
            return None;
        }
        let ttl = self.default_ttl;
        self.entries.get_mut(key).map(|entry| {
            if let Lifetime::Expiring(_) = entry.lifetime {
                entry.lifetime = Lifetime::Expiring(ttl);
            }
            &mut entry.value
        })
    }

    /// Existence check that leaves the entry's lifetime untouched.
    pub fn contains(&self, key: &K) -> bool {
        self.state.is_active() && self.entries.contains_key(key)
    }

    /// Remaining lifetime of `key` without refreshing it.
    pub fn lifetime(&self, key: &K) -> Option<Lifetime> {
        if !self.state.is_active() {
            return None;
        }
        self.entries.get(key).map(|entry| entry.lifetime)
    }

    /// Removes and disposes `key` regardless of its remaining lifetime.
    pub fn delete(&mut self, key: &K) -> bool {
        if !self.state.is_active() {
            return false;
        }
        match self.entries.remove(key) {
            Some(mut entry) => {
                entry.value.dispose();
                true
            }
            None => false,
        }
    }

    /// Ages every expiring entry by `dt` and evicts the ones that ran out.
    ///
    /// An entry survives while the time elapsed since its last refresh is at
    /// most its TTL; the first tick that takes it past zero evicts it.
    /// Returns the number of evicted entries.
    pub fn tick(&mut self, dt: Duration) -> usize {
        if !self.state.is_active() {
            return 0;
        }
        let mut evicted = 0;
        self.entries.retain(|key, entry| {
            let Lifetime::Expiring(remaining) = entry.lifetime else {
                return true;
            };
            match remaining.checked_sub(dt) {
                Some(left) => {
                    entry.lifetime = Lifetime::Expiring(left);
                    true
                }
                None => {
                    log::debug!("evicting {:?}", key);
                    entry.value.dispose();
                    evicted += 1;
                    false
                }
            }
        });
        evicted
    }

    /// Evicts and disposes every entry. Later calls are no-ops.
    pub fn dispose(&mut self) {
        if !self.state.begin_dispose() {
            return;
        }
        let count = self.entries.len();
        for (_, mut entry) in self.entries.drain() {
            entry.value.dispose();
        }
        self.state.finish_dispose();
        log::info!("resource cache disposed ({} entries)", count);
    }
}

impl<K, V> Drop for ResourceCache<K, V>
where
    K: Eq + Hash,
    V: Disposable,
{
    fn drop(&mut self) {
        for (_, mut entry) in self.entries.drain() {
            entry.value.dispose();
        }
    }
}
