//! LRU cache of compiled queries, keyed by fingerprint.
//!
//! Entries may also expire after a time-to-live. Evicting an entry only
//! drops the cache's handle; callers holding an `Arc<Query>` keep it.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::RwLock;

use crate::fingerprint::Fingerprint;
use crate::query::Query;
use crate::schema::RecordType;

struct Entry {
    query: Arc<Query>,
    inserted: Instant,
}

pub struct QueryCache {
    inner: RwLock<LruCache<Fingerprint, Entry>>,
    ttl: Option<Duration>,
}

impl QueryCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: RwLock::new(LruCache::new(capacity)),
            ttl,
        }
    }

    fn expired(&self, entry: &Entry) -> bool {
        self.ttl.is_some_and(|ttl| entry.inserted.elapsed() >= ttl)
    }

    /// Returns the cached query and marks it recently used. Expired entries
    /// are dropped and reported as misses.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<Query>> {
        let mut cache = self.inner.write();
        let expired = match cache.get(fingerprint) {
            Some(entry) if !self.expired(entry) => return Some(entry.query.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(fingerprint);
            tracing::debug!(%fingerprint, "cache entry expired");
        }
        None
    }

    /// Looks without touching recency.
    pub fn peek(&self, fingerprint: &Fingerprint) -> Option<Arc<Query>> {
        let cache = self.inner.read();
        cache
            .peek(fingerprint)
            .filter(|entry| !self.expired(entry))
            .map(|entry| entry.query.clone())
    }

    /// Returns the live query for `fingerprint`, or stores the one `make`
    /// builds. The check and the insert share one write lock, so concurrent
    /// misses end up holding the same query.
    pub fn get_or_insert_with(&self, fingerprint: &Fingerprint, make: impl FnOnce() -> Arc<Query>) -> Arc<Query> {
        let mut cache = self.inner.write();
        match cache.get(fingerprint) {
            Some(entry) if !self.expired(entry) => return entry.query.clone(),
            Some(_) => tracing::debug!(%fingerprint, "cache entry expired"),
            None => {}
        }
        let query = make();
        let entry = Entry {
            query: query.clone(),
            inserted: Instant::now(),
        };
        if let Some((evicted, _)) = cache.push(fingerprint.clone(), entry) {
            if evicted != *fingerprint {
                tracing::debug!(fingerprint = %evicted, "evicted least recently used query");
            }
        }
        query
    }

    pub fn insert(&self, query: Arc<Query>) {
        let fingerprint = query.fingerprint().clone();
        let entry = Entry {
            query,
            inserted: Instant::now(),
        };
        if let Some((evicted, _)) = self.inner.write().push(fingerprint.clone(), entry) {
            if evicted != fingerprint {
                tracing::debug!(fingerprint = %evicted, "evicted least recently used query");
            }
        }
    }

    /// Drops every query whose predicate or order reads `record_type`.
    /// Returns how many were dropped.
    pub fn invalidate(&self, record_type: RecordType) -> usize {
        let mut cache = self.inner.write();
        let stale: Vec<Fingerprint> = cache
            .iter()
            .filter(|(_, entry)| entry.query.spec().touched_types().contains(&record_type))
            .map(|(fingerprint, _)| fingerprint.clone())
            .collect();
        for fingerprint in &stale {
            cache.pop(fingerprint);
        }
        tracing::debug!(%record_type, dropped = stale.len(), "invalidated cached queries");
        stale.len()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.read().cap().get()
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{QueryBuilder, QuerySpec};
    use crate::error::Result;
    use crate::param::ParamMap;
    use crate::predicate::Predicate;
    use crate::schema;
    use crate::store::Store;
    use crate::value::Id;
    use crate::params;

    struct Nothing;

    impl Store for Nothing {
        fn execute(&self, _: &QuerySpec) -> Result<Vec<Id>> {
            Ok(Vec::new())
        }
    }

    fn query(record_type: RecordType, params: ParamMap, predicate: Predicate) -> Arc<Query> {
        let mut builder = QueryBuilder::new(record_type);
        builder.filter(predicate);
        Arc::new(Query::new(builder.finish(params, ParamMap::new(), Vec::new()), Arc::new(Nothing)))
    }

    fn plain(n: i64) -> Arc<Query> {
        query(RecordType::User, params! { "id_in_set" => vec![n] }, Predicate::True)
    }

    #[test]
    fn lru_eviction() {
        let cache = QueryCache::new(2, None);
        let (a, b, c) = (plain(1), plain(2), plain(3));
        cache.insert(a.clone());
        cache.insert(b.clone());
        assert!(cache.get(a.fingerprint()).is_some());
        cache.insert(c.clone());

        assert_eq!(cache.len(), 2);
        assert!(cache.peek(b.fingerprint()).is_none());
        assert!(cache.peek(a.fingerprint()).is_some());
        assert!(cache.peek(c.fingerprint()).is_some());
    }

    #[test]
    fn evicted_handles_stay_usable() {
        let cache = QueryCache::new(1, None);
        let a = plain(1);
        cache.insert(a.clone());
        cache.insert(plain(2));
        assert!(cache.get(a.fingerprint()).is_none());
        assert!(a.result_ids().unwrap().is_empty());
    }

    #[test]
    fn get_or_insert_keeps_the_first() {
        let cache = QueryCache::new(4, None);
        let first = plain(1);
        let fingerprint = first.fingerprint().clone();

        let stored = cache.get_or_insert_with(&fingerprint, || first.clone());
        assert!(Arc::ptr_eq(&stored, &first));
        let again = cache.get_or_insert_with(&fingerprint, || plain(1));
        assert!(Arc::ptr_eq(&again, &first));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn get_or_insert_replaces_expired() {
        let cache = QueryCache::new(4, Some(Duration::ZERO));
        let first = plain(1);
        let fingerprint = first.fingerprint().clone();
        cache.get_or_insert_with(&fingerprint, || first.clone());

        let second = cache.get_or_insert_with(&fingerprint, || plain(1));
        assert!(!Arc::ptr_eq(&second, &first));
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let cache = QueryCache::new(4, Some(Duration::ZERO));
        let a = plain(1);
        cache.insert(a.clone());
        assert!(cache.get(a.fingerprint()).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_by_touched_type() {
        let cache = QueryCache::new(8, None);
        let images = schema::association(RecordType::Observation, "images").unwrap();
        let joined = query(
            RecordType::Observation,
            params! { "image_query" => params! {} },
            Predicate::exists(images, Predicate::True),
        );
        let users = plain(1);
        cache.insert(joined.clone());
        cache.insert(users.clone());

        assert_eq!(cache.invalidate(RecordType::Image), 1);
        assert!(cache.peek(joined.fingerprint()).is_none());
        assert!(cache.peek(users.fingerprint()).is_some());

        assert_eq!(cache.invalidate(RecordType::User), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_holds_one() {
        assert_eq!(QueryCache::new(0, None).capacity(), 1);
    }
}
