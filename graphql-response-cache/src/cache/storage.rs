use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;
use std::time::Instant;

use lru::LruCache;

pub(crate) trait KeyType: Clone + fmt::Debug + Hash + Eq + Send + Sync {}
pub(crate) trait ValueType: Clone + fmt::Debug + Send + Sync {}

// Blanket implementation which satisfies the compiler
impl<K> KeyType for K
where
    K: Clone + fmt::Debug + Hash + Eq + Send + Sync,
{
    // Nothing to implement, since K already supports the other traits.
    // It has the functions it needs already
}

// Blanket implementation which satisfies the compiler
impl<V> ValueType for V
where
    V: Clone + fmt::Debug + Send + Sync,
{
    // Nothing to implement, since V already supports the other traits.
    // It has the functions it needs already
}

/// Why an entry left the storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RemovalCause {
    /// The storage was full and this was the least recently used entry.
    Capacity,
    /// The entry outlived its time to live.
    Expired,
    /// A new value was inserted under the same key.
    Replaced,
    /// The entry was removed on request.
    Explicit,
}

/// Disposal hook, called synchronously for every entry leaving the storage.
pub(crate) trait RemovalListener<K, V> {
    fn on_removal(&mut self, key: &K, value: &V, cause: RemovalCause);
}

impl<K, V> RemovalListener<K, V> for () {
    fn on_removal(&mut self, _key: &K, _value: &V, _cause: RemovalCause) {}
}

#[derive(Debug)]
struct Expiring<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Expiring<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Bounded in memory storage with least recently used eviction and per entry expiration.
///
/// Whatever the reason an entry goes away (capacity, expiration, replacement or explicit
/// removal), the listener is notified before the call returns.
pub(crate) struct CacheStorage<K: KeyType, V: ValueType, L = ()> {
    inner: LruCache<K, Expiring<V>>,
    default_ttl: Option<Duration>,
    listener: L,
}

impl<K, V, L> CacheStorage<K, V, L>
where
    K: KeyType,
    V: ValueType,
    L: RemovalListener<K, V>,
{
    pub(crate) fn new(
        max_capacity: NonZeroUsize,
        default_ttl: Option<Duration>,
        listener: L,
    ) -> Self {
        Self {
            inner: LruCache::new(max_capacity),
            default_ttl,
            listener,
        }
    }

    /// Get a live entry, marking it as recently used. An expired entry is removed instead.
    pub(crate) fn get(&mut self, key: &K) -> Option<V> {
        let now = Instant::now();
        if self.inner.peek(key)?.is_expired(now) {
            if let Some(entry) = self.inner.pop(key) {
                self.listener.on_removal(key, &entry.value, RemovalCause::Expired);
            }
            return None;
        }
        self.inner.get(key).map(|entry| entry.value.clone())
    }

    pub(crate) fn insert(&mut self, key: K, value: V) {
        let ttl = self.default_ttl;
        self.insert_with_ttl(key, value, ttl)
    }

    /// Insert with a specific time to live. `None` keeps the entry until it is evicted.
    pub(crate) fn insert_with_ttl(&mut self, key: K, value: V, ttl: Option<Duration>) {
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        if let Some((previous_key, previous)) =
            self.inner.push(key, Expiring { value, expires_at })
        {
            // `push` hands back the old entry for the same key, or the evicted one
            let cause = if self.inner.contains(&previous_key) {
                RemovalCause::Replaced
            } else {
                RemovalCause::Capacity
            };
            self.listener.on_removal(&previous_key, &previous.value, cause);
        }
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.inner.pop(key)?;
        self.listener.on_removal(key, &entry.value, RemovalCause::Explicit);
        Some(entry.value)
    }

    /// Remove every expired entry, returning how many were removed.
    pub(crate) fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<K> = self
            .inner
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            if let Some(entry) = self.inner.pop(key) {
                self.listener.on_removal(key, &entry.value, RemovalCause::Expired);
            }
        }
        expired.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    pub(crate) fn listener(&self) -> &L {
        &self.listener
    }

    pub(crate) fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }
}
