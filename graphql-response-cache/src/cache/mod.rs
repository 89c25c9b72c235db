use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use self::index::DependencyIndex;
use self::storage::CacheStorage;
use crate::graphql;

pub(crate) mod index;
pub(crate) mod storage;

/// A response stored in the cache.
#[derive(Clone, Debug)]
pub(crate) struct CachedResponse {
    pub(crate) response: graphql::Response,
    /// Time to live the entry was inserted with, `None` if it never expires.
    pub(crate) ttl: Option<Duration>,
}

/// Response storage and dependency index, kept consistent under a single lock.
///
/// The index is the storage's removal listener: every entry leaving the storage, for whatever
/// reason, has its edges dropped before the lock is released.
#[derive(Clone)]
pub(crate) struct EntityCache {
    inner: Arc<Mutex<CacheStorage<String, CachedResponse, DependencyIndex>>>,
}

impl EntityCache {
    pub(crate) fn new(max_entries: NonZeroUsize, default_ttl: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheStorage::new(
                max_entries,
                default_ttl,
                DependencyIndex::default(),
            ))),
        }
    }

    pub(crate) fn get(&self, cache_key: &str) -> Option<CachedResponse> {
        self.inner.lock().get(&cache_key.to_string())
    }

    /// Store a response and record the entities it depends on.
    ///
    /// `ttl` overrides the default time to live of the storage when set.
    pub(crate) fn insert(
        &self,
        cache_key: String,
        response: graphql::Response,
        entities: HashSet<String>,
        ttl: Option<Duration>,
    ) {
        let mut storage = self.inner.lock();
        match ttl {
            Some(ttl) => storage.insert_with_ttl(
                cache_key.clone(),
                CachedResponse {
                    response,
                    ttl: Some(ttl),
                },
                Some(ttl),
            ),
            None => {
                let ttl = storage.default_ttl();
                storage.insert(cache_key.clone(), CachedResponse { response, ttl })
            }
        }
        storage.listener_mut().record_response(&cache_key, entities);
    }

    /// Remove every response depending on one of the entities, returning how many were removed.
    pub(crate) fn invalidate<'a, I>(&self, entities: I) -> u64
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut storage = self.inner.lock();
        let mut count = 0;
        for entity in entities {
            for cache_key in storage.listener().dependents(entity) {
                if storage.remove(&cache_key).is_some() {
                    count += 1;
                } else {
                    // the storage lost the entry without telling the index
                    storage.listener_mut().remove_response(&cache_key);
                }
            }
            tracing::debug!(entity, "invalidated cached responses");
        }
        count
    }

    /// Remove every expired response, returning how many were removed.
    pub(crate) fn purge_expired(&self) -> usize {
        self.inner.lock().purge_expired()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, cache_key: &str) -> bool {
        self.inner.lock().contains(&cache_key.to_string())
    }

    /// Panics if the index and the storage disagree.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let storage = self.inner.lock();
        storage.listener().assert_consistent();
        for cache_key in storage.listener().cache_keys() {
            assert!(
                storage.contains(cache_key),
                "indexed response {cache_key} is not stored"
            );
        }
    }
}

impl fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("len", &self.len())
            .finish()
    }
}
