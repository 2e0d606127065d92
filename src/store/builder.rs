use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::UriStore;
use crate::backend::StorageBackend;
use crate::cache::{CacheRegistry, CacheSettings};
use crate::config::StoreConfig;
use crate::dispatch::DispatcherBuilder;
use crate::error::StoreError;
use crate::lock::{InMemoryLockManager, LockManager};
use crate::model::GraphModel;

/// Assembles a [`UriStore`]: backends, registered classes, their caches
/// and the lock manager. Everything is fixed once `build` returns.
pub struct UriStoreBuilder<L: LockManager = InMemoryLockManager> {
    config: StoreConfig,
    dispatcher: DispatcherBuilder,
    classes: Vec<&'static str>,
    cache_overrides: HashMap<&'static str, CacheSettings>,
    locks: L,
}

impl UriStoreBuilder<InMemoryLockManager> {
    pub fn new(config: StoreConfig) -> Self {
        UriStoreBuilder {
            dispatcher: DispatcherBuilder::new(&config.base_uri),
            config,
            classes: Vec::new(),
            cache_overrides: HashMap::new(),
            locks: InMemoryLockManager::new(),
        }
    }
}

impl<L: LockManager> UriStoreBuilder<L> {
    pub fn backend<B: StorageBackend + 'static>(mut self, backend: B) -> Self {
        self.dispatcher = self.dispatcher.backend(backend);
        self
    }

    pub fn shared_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.dispatcher = self.dispatcher.shared_backend(backend);
        self
    }

    /// Make `M` storable. Its cache comes from the configuration unless
    /// overridden with [`UriStoreBuilder::cache`].
    pub fn register<M: GraphModel>(mut self) -> Self {
        self.dispatcher = self.dispatcher.register::<M>();
        if !self.classes.contains(&M::NAME) {
            self.classes.push(M::NAME);
        }
        self
    }

    /// Cache settings for `M`, taking precedence over the configuration.
    pub fn cache<M: GraphModel>(mut self, settings: CacheSettings) -> Self {
        self.cache_overrides.insert(M::NAME, settings);
        self
    }

    pub fn lock_manager<L2: LockManager>(self, locks: L2) -> UriStoreBuilder<L2> {
        UriStoreBuilder {
            config: self.config,
            dispatcher: self.dispatcher,
            classes: self.classes,
            cache_overrides: self.cache_overrides,
            locks,
        }
    }

    pub fn build(self) -> Result<UriStore<L>, StoreError> {
        let dispatcher = self.dispatcher.build()?;
        let mut caches = CacheRegistry::new();
        for &class in &self.classes {
            let settings = match self.cache_overrides.get(&class) {
                Some(settings) => settings.clone(),
                None => self.config.cache.settings_for(class),
            };
            caches.configure(class, &settings);
        }
        info!(
            base_uri = %self.config.base_uri,
            classes = self.classes.len(),
            "store ready"
        );
        Ok(UriStore::from_parts(self.config, dispatcher, caches, self.locks))
    }
}
