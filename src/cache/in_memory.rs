use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use super::{CacheKind, CacheManager, CachedInstance};
use crate::uri::Uri;

/// Unbounded map cache with an optional time-to-live.
#[derive(Debug, Default)]
pub struct InMemoryCacheManager {
    entries: RwLock<HashMap<Uri, (CachedInstance, Instant)>>,
    ttl: Option<Duration>,
}

impl InMemoryCacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        InMemoryCacheManager {
            entries: RwLock::default(),
            ttl: Some(ttl),
        }
    }

    fn is_fresh(&self, stored_at: Instant) -> bool {
        self.ttl.map_or(true, |ttl| stored_at.elapsed() < ttl)
    }
}

// Poisoning is recovered from: a stale entry that survives a panic would
// outlive its invalidation.
impl CacheManager for InMemoryCacheManager {
    fn put(&self, uri: &Uri, instance: CachedInstance) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(uri.clone(), (instance, Instant::now()));
    }

    fn has(&self, uri: &Uri) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(uri)
            .is_some_and(|(_, stored_at)| self.is_fresh(*stored_at))
    }

    fn get(&self, uri: &Uri) -> Option<CachedInstance> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(uri) {
                None => return None,
                Some((instance, stored_at)) if self.is_fresh(*stored_at) => {
                    return Some(instance.clone())
                }
                Some(_) => {}
            }
        }
        self.remove(uri);
        None
    }

    fn remove(&self, uri: &Uri) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(uri);
    }

    fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn kind(&self) -> CacheKind {
        CacheKind::InMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn uri(s: &str) -> Uri {
        Uri::parse(s).unwrap()
    }

    #[test]
    fn put_overwrites_and_remove_is_idempotent() {
        let cache = InMemoryCacheManager::new();
        let u = uri("http://example.org/plot1");
        cache.put(&u, CachedInstance::from_bytes(vec![1]));
        cache.put(&u, CachedInstance::from_bytes(vec![2]));
        assert!(cache.has(&u));
        assert_eq!(cache.get(&u).unwrap().as_bytes(), &[2]);
        assert_eq!(cache.len(), 1);

        cache.remove(&u);
        cache.remove(&u);
        assert!(!cache.has(&u));
        assert!(cache.get(&u).is_none());
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache = InMemoryCacheManager::with_ttl(Duration::from_millis(10));
        let u = uri("http://example.org/plot1");
        cache.put(&u, CachedInstance::from_bytes(vec![1]));
        thread::sleep(Duration::from_millis(20));
        assert!(!cache.has(&u));
        assert!(cache.get(&u).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = InMemoryCacheManager::new();
        cache.put(&uri("http://example.org/a"), CachedInstance::from_bytes(vec![1]));
        cache.put(&uri("http://example.org/b"), CachedInstance::from_bytes(vec![1]));
        cache.clear();
        assert!(cache.is_empty());
    }
}
