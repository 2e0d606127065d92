use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;

use super::{CacheKind, CacheManager, CachedInstance};
use crate::uri::Uri;

/// Bounded cache evicting the least recently used instance.
pub struct LruCacheManager {
    entries: Mutex<LruCache<Uri, (CachedInstance, Instant)>>,
    ttl: Option<Duration>,
}

impl LruCacheManager {
    pub fn new(capacity: NonZeroUsize) -> Self {
        LruCacheManager {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn capacity(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cap()
            .get()
    }

    fn is_fresh(&self, stored_at: Instant) -> bool {
        self.ttl.map_or(true, |ttl| stored_at.elapsed() < ttl)
    }
}

impl CacheManager for LruCacheManager {
    fn put(&self, uri: &Uri, instance: CachedInstance) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.put(uri.clone(), (instance, Instant::now()));
    }

    fn has(&self, uri: &Uri) -> bool {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .peek(uri)
            .is_some_and(|(_, stored_at)| self.is_fresh(*stored_at))
    }

    fn get(&self, uri: &Uri) -> Option<CachedInstance> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = match entries.get(uri) {
            None => return None,
            Some((instance, stored_at)) if self.is_fresh(*stored_at) => Some(instance.clone()),
            Some(_) => None,
        };
        if fresh.is_none() {
            entries.pop(uri);
        }
        fresh
    }

    fn remove(&self, uri: &Uri) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.pop(uri);
    }

    fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn kind(&self) -> CacheKind {
        CacheKind::Lru
    }
}
