use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{CacheKind, CacheManager, CacheSettings, CachedInstance, NoCacheManager};
use crate::model::GraphModel;
use crate::uri::Uri;

/// One cache per model class, fixed when the store is built.
#[derive(Clone, Default)]
pub struct CacheRegistry {
    caches: HashMap<&'static str, Arc<dyn CacheManager>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class: &'static str, cache: Arc<dyn CacheManager>) {
        debug!(class, kind = %cache.kind(), "cache registered");
        self.caches.insert(class, cache);
    }

    pub fn configure(&mut self, class: &'static str, settings: &CacheSettings) {
        let cache = settings.build(class);
        self.insert(class, cache);
    }

    /// Cache of `class`; classes without one share a no-op cache.
    pub fn cache(&self, class: &str) -> Arc<dyn CacheManager> {
        self.caches
            .get(class)
            .cloned()
            .unwrap_or_else(|| Arc::new(NoCacheManager))
    }

    pub fn kind(&self, class: &str) -> CacheKind {
        self.caches
            .get(class)
            .map_or(CacheKind::None, |c| c.kind())
    }

    pub fn model<M: GraphModel>(&self) -> ModelCache<M> {
        ModelCache::new(self.cache(M::NAME))
    }

    pub fn classes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.caches.keys().copied()
    }

    /// Empty every cache.
    pub fn clear_all(&self) {
        for (class, cache) in &self.caches {
            debug!(class, entries = cache.len(), "clearing cache");
            cache.clear();
        }
    }
}

/// Typed view over the cache of one class.
pub struct ModelCache<M> {
    cache: Arc<dyn CacheManager>,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for ModelCache<M> {
    fn clone(&self) -> Self {
        ModelCache {
            cache: self.cache.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: GraphModel> ModelCache<M> {
    pub fn new(cache: Arc<dyn CacheManager>) -> Self {
        ModelCache {
            cache,
            _model: PhantomData,
        }
    }

    pub fn has(&self, uri: &Uri) -> bool {
        self.cache.has(uri)
    }

    /// Cached copy of the instance. A snapshot that no longer decodes is
    /// evicted and reported as a miss.
    pub fn get(&self, uri: &Uri) -> Option<M> {
        let Some(snapshot) = self.cache.get(uri) else {
            debug!(class = M::NAME, %uri, "cache miss");
            return None;
        };
        match snapshot.decode::<M>() {
            Ok(mut model) => {
                debug!(class = M::NAME, %uri, "cache hit");
                model.identity_mut().mark_persisted();
                Some(model)
            }
            Err(e) => {
                warn!(class = M::NAME, %uri, error = %e, "evicting undecodable cache entry");
                self.cache.remove(uri);
                None
            }
        }
    }

    pub fn put(&self, uri: &Uri, model: &M) {
        if self.cache.kind() == CacheKind::None {
            return;
        }
        match CachedInstance::encode(model) {
            Ok(snapshot) => self.cache.put(uri, snapshot),
            Err(e) => {
                warn!(class = M::NAME, %uri, error = %e, "cannot cache instance");
                self.cache.remove(uri);
            }
        }
    }

    pub fn remove(&self, uri: &Uri) {
        debug!(class = M::NAME, %uri, "cache invalidated");
        self.cache.remove(uri);
    }

    pub fn kind(&self) -> CacheKind {
        self.cache.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheManager;
    use crate::model::Identity;
    use crate::Backend;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Plot {
        uri: Identity,
        name: Option<String>,
    }

    impl GraphModel for Plot {
        const NAME: &'static str = "plot";
        const GRAPH_PREFIX: &'static str = "plot";
        const BACKEND: Backend = Backend::Triple;

        fn identity(&self) -> &Identity {
            &self.uri
        }

        fn identity_mut(&mut self) -> &mut Identity {
            &mut self.uri
        }

        fn uri_segments(&self) -> Vec<Option<String>> {
            vec![self.name.clone()]
        }

        fn update(&mut self, other: Self) -> &mut Self {
            if other.name.is_some() {
                self.name = other.name;
            }
            self
        }
    }

    fn uri() -> Uri {
        Uri::parse("http://example.org/plot1").unwrap()
    }

    fn plot() -> Plot {
        Plot {
            uri: Identity::with_uri(uri()),
            name: Some("plot1".into()),
        }
    }

    #[test]
    fn unknown_class_gets_no_cache() {
        let registry = CacheRegistry::new();
        assert_eq!(registry.kind("plot"), CacheKind::None);
        let cache = registry.model::<Plot>();
        cache.put(&uri(), &plot());
        assert!(cache.get(&uri()).is_none());
    }

    #[test]
    fn cached_instances_come_back_persisted() {
        let mut registry = CacheRegistry::new();
        registry.insert("plot", Arc::new(InMemoryCacheManager::new()));
        let cache = registry.model::<Plot>();

        cache.put(&uri(), &plot());
        let hit = cache.get(&uri()).unwrap();
        assert_eq!(hit.name, plot().name);
        assert!(hit.uri.is_persisted());
    }

    #[test]
    fn undecodable_entry_is_evicted() {
        let raw = Arc::new(InMemoryCacheManager::new());
        let cache = ModelCache::<Plot>::new(raw.clone());
        raw.put(&uri(), CachedInstance::from_bytes(vec![0xde, 0xad]));

        assert!(cache.get(&uri()).is_none());
        assert!(!raw.has(&uri()));
    }

    #[test]
    fn clear_all_empties_every_cache() {
        let mut registry = CacheRegistry::new();
        registry.configure("plot", &CacheSettings::of(CacheKind::InMemory));
        registry.model::<Plot>().put(&uri(), &plot());
        assert_eq!(registry.cache("plot").len(), 1);
        registry.clear_all();
        assert!(registry.cache("plot").is_empty());
        assert_eq!(registry.classes().collect::<Vec<_>>(), vec!["plot"]);
    }
}
