use tracing::{debug, info, instrument, warn};

use super::{Page, Paged, UriStoreBuilder};
use crate::cache::{CacheRegistry, ModelCache};
use crate::config::StoreConfig;
use crate::context::RequestContext;
use crate::dispatch::BackendDispatcher;
use crate::error::StoreError;
use crate::lock::{InMemoryLockManager, LockGuard, LockManager};
use crate::model::{from_record, to_record, Collision, Expr, GraphModel};
use crate::uri::{Uri, UriGenerator, MAX_GENERATION_ATTEMPTS};

/// URI-indexed store for graph-scoped models.
///
/// Every operation on a URI runs under that URI's lock, so a read-through
/// cache fill can never race with a write or an invalidation of the same
/// instance. Operations on distinct URIs run in parallel.
pub struct UriStore<L: LockManager = InMemoryLockManager> {
    config: StoreConfig,
    generator: UriGenerator,
    dispatcher: BackendDispatcher,
    caches: CacheRegistry,
    locks: L,
}

impl UriStore<InMemoryLockManager> {
    pub fn builder(config: StoreConfig) -> UriStoreBuilder<InMemoryLockManager> {
        UriStoreBuilder::new(config)
    }
}

impl<L: LockManager> UriStore<L> {
    pub(crate) fn from_parts(
        config: StoreConfig,
        dispatcher: BackendDispatcher,
        caches: CacheRegistry,
        locks: L,
    ) -> Self {
        UriStore {
            generator: dispatcher.generator().clone(),
            config,
            dispatcher,
            caches,
            locks,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn generator(&self) -> &UriGenerator {
        &self.generator
    }

    pub fn dispatcher(&self) -> &BackendDispatcher {
        &self.dispatcher
    }

    pub fn caches(&self) -> &CacheRegistry {
        &self.caches
    }

    pub fn locks(&self) -> &L {
        &self.locks
    }

    /// Context with the configured default timeout, if any.
    pub fn default_context(&self) -> RequestContext {
        match self.config.default_timeout {
            Some(timeout) => RequestContext::with_timeout(timeout),
            None => RequestContext::background(),
        }
    }

    fn cache<M: GraphModel>(&self) -> ModelCache<M> {
        self.caches.model::<M>()
    }

    /// Run `f` holding the lock of `uri`. The idle lock is dropped afterwards.
    fn with_lock<M, T, F>(&self, ctx: &RequestContext, uri: &Uri, f: F) -> Result<T, StoreError>
    where
        M: GraphModel,
        F: FnOnce() -> Result<T, StoreError>,
    {
        ctx.check("lock")?;
        let key = format!("{}:{}", M::NAME, uri);
        let lock = self.locks.get_lock(&key)?;
        let guard = LockGuard::acquire(lock, &key, ctx.deadline())?;
        let result = ctx.check("locked section").map_err(StoreError::from).and_then(|()| f());
        drop(guard);
        if let Err(e) = self.locks.release_idle(&key) {
            warn!(%key, error = %e, "cannot release idle lock");
        }
        result
    }

    /// Fetch an instance; `NotFound` when absent.
    pub fn get<M: GraphModel>(&self, ctx: &RequestContext, uri: &Uri) -> Result<M, StoreError> {
        self.find_by_uri(ctx, uri)?
            .ok_or_else(|| StoreError::not_found(M::NAME, uri))
    }

    /// Fetch an instance, cache first. A backend hit fills the cache; a
    /// failure evicts it.
    #[instrument(skip_all, fields(class = M::NAME, uri = %uri))]
    pub fn find_by_uri<M: GraphModel>(&self, ctx: &RequestContext, uri: &Uri) -> Result<Option<M>, StoreError> {
        self.with_lock::<M, _, _>(ctx, uri, || {
            let cache = self.cache::<M>();
            if let Some(hit) = cache.get(uri) {
                return Ok(Some(hit));
            }
            let loaded = self
                .dispatcher
                .fetch(ctx, M::NAME, uri)
                .and_then(|stored| stored.map(|s| from_record::<M>(s.record)).transpose());
            match loaded {
                Ok(Some(model)) => {
                    cache.put(uri, &model);
                    Ok(Some(model))
                }
                Ok(None) => Ok(None),
                Err(e) => {
                    cache.remove(uri);
                    Err(e)
                }
            }
        })
    }

    pub fn exists<M: GraphModel>(&self, ctx: &RequestContext, uri: &Uri) -> Result<bool, StoreError> {
        self.with_lock::<M, _, _>(ctx, uri, || {
            if self.cache::<M>().has(uri) {
                return Ok(true);
            }
            self.dispatcher.exists(ctx, M::NAME, uri)
        })
    }

    /// URI `model` would receive, without writing anything. Classes that
    /// accept homonyms get the first free suffix.
    pub fn generate_uri<M: GraphModel>(&self, ctx: &RequestContext, model: &M) -> Result<Uri, StoreError> {
        match M::ON_COLLISION {
            Collision::Merge => self.generator.generate(model),
            Collision::Suffix => self
                .generator
                .generate_unique(model, |candidate| self.dispatcher.exists(ctx, M::NAME, candidate)),
        }
    }

    /// Persist `model` and return its URI.
    ///
    /// Without a URI one is generated. When the URI is already taken the
    /// incoming fields are merged into the existing instance, except for
    /// classes declaring [`Collision::Suffix`], which get the next free
    /// `-n` suffix instead. On success `model` holds the stored state and
    /// its URI can no longer change.
    #[instrument(skip_all, fields(class = M::NAME, uri = ?model.uri()))]
    pub fn persist<M: GraphModel>(&self, ctx: &RequestContext, model: &mut M) -> Result<Uri, StoreError> {
        let (uri, stored) = match model.uri().cloned() {
            Some(uri) => {
                let persisted = model.identity().is_persisted();
                let stored = self.write_locked::<M, _, _>(ctx, &uri, |exists| {
                    if exists {
                        self.merge_existing(ctx, &uri, model.clone())
                    } else if persisted {
                        // loaded once, deleted since
                        Err(StoreError::not_found(M::NAME, &uri))
                    } else {
                        self.insert_new(ctx, &uri, model)
                    }
                })?;
                (uri, stored)
            }
            None if M::ON_COLLISION == Collision::Suffix => self.persist_with_suffix(ctx, model)?,
            None => {
                let uri = self.generator.generate(model)?;
                let stored = self.write_locked::<M, _, _>(ctx, &uri, |exists| {
                    if exists {
                        debug!(class = M::NAME, %uri, "generated URI taken, merging");
                        self.merge_existing(ctx, &uri, model.clone())
                    } else {
                        self.insert_new(ctx, &uri, model)
                    }
                })?;
                (uri, stored)
            }
        };
        *model = stored;
        Ok(uri)
    }

    fn persist_with_suffix<M: GraphModel>(
        &self,
        ctx: &RequestContext,
        model: &M,
    ) -> Result<(Uri, M), StoreError> {
        for retry in 0..MAX_GENERATION_ATTEMPTS {
            let candidate = self.generator.generate_with_retry(model, retry)?;
            let stored = self.write_locked::<M, _, _>(ctx, &candidate, |exists| {
                if exists {
                    Ok(None)
                } else {
                    self.insert_new(ctx, &candidate, model).map(Some)
                }
            })?;
            if let Some(stored) = stored {
                return Ok((candidate, stored));
            }
        }
        Err(StoreError::ambiguous(
            M::NAME,
            format!("no free URI after {} attempts", MAX_GENERATION_ATTEMPTS),
        ))
    }

    /// Under the lock of `uri`: check existence, run the write, evict the
    /// cache entry whatever the outcome.
    fn write_locked<M, T, F>(&self, ctx: &RequestContext, uri: &Uri, write: F) -> Result<T, StoreError>
    where
        M: GraphModel,
        F: FnOnce(bool) -> Result<T, StoreError>,
    {
        self.with_lock::<M, _, _>(ctx, uri, || {
            let result = self
                .dispatcher
                .exists(ctx, M::NAME, uri)
                .and_then(write);
            self.cache::<M>().remove(uri);
            result
        })
    }

    fn insert_new<M: GraphModel>(&self, ctx: &RequestContext, uri: &Uri, model: &M) -> Result<M, StoreError> {
        let record = to_record(model, uri)?;
        self.dispatcher.insert(ctx, M::NAME, &record)?;
        let mut stored = model.clone();
        if !stored.identity().is_persisted() {
            stored.set_uri(uri.clone())?;
        }
        stored.identity_mut().mark_persisted();
        debug!(class = M::NAME, %uri, "inserted");
        Ok(stored)
    }

    fn merge_existing<M: GraphModel>(&self, ctx: &RequestContext, uri: &Uri, incoming: M) -> Result<M, StoreError> {
        let stored = self
            .dispatcher
            .fetch(ctx, M::NAME, uri)?
            .ok_or_else(|| StoreError::not_found(M::NAME, uri))?;
        let mut existing = from_record::<M>(stored.record)?;
        existing.update(incoming);
        let record = to_record(&existing, uri)?;
        self.dispatcher.replace(ctx, M::NAME, &record)?;
        debug!(class = M::NAME, %uri, "merged into existing instance");
        Ok(existing)
    }

    /// Merge `payload` into the instance at `uri` and return the result.
    /// `NotFound` when absent; a payload naming another URI is rejected.
    #[instrument(skip_all, fields(class = M::NAME, uri = %uri))]
    pub fn update<M: GraphModel>(&self, ctx: &RequestContext, uri: &Uri, payload: M) -> Result<M, StoreError> {
        if let Some(requested) = payload.uri() {
            if requested != uri {
                return Err(StoreError::ImmutableIdentity {
                    current: uri.clone(),
                    requested: requested.clone(),
                });
            }
        }
        self.write_locked::<M, _, _>(ctx, uri, |exists| {
            if !exists {
                return Err(StoreError::not_found(M::NAME, uri));
            }
            self.merge_existing(ctx, uri, payload)
        })
    }

    /// Delete the instance at `uri`. The cache entry is evicted even when
    /// the backend fails or holds nothing.
    #[instrument(skip_all, fields(class = M::NAME, uri = %uri))]
    pub fn delete<M: GraphModel>(&self, ctx: &RequestContext, uri: &Uri) -> Result<(), StoreError> {
        self.with_lock::<M, _, _>(ctx, uri, || {
            let result = self.dispatcher.delete(ctx, M::NAME, uri);
            self.cache::<M>().remove(uri);
            if result? {
                Ok(())
            } else {
                Err(StoreError::not_found(M::NAME, uri))
            }
        })
    }

    /// Instances of `M` matching `expr`, straight from the backend.
    pub fn find<M: GraphModel>(&self, ctx: &RequestContext, expr: &Expr) -> Result<Vec<M>, StoreError> {
        self.dispatcher
            .find(ctx, M::NAME, expr)?
            .into_iter()
            .map(|stored| from_record::<M>(stored.record))
            .collect()
    }

    /// Matches of `expr` in the backend, without loading them.
    pub fn count<M: GraphModel>(&self, ctx: &RequestContext, expr: &Expr) -> Result<u64, StoreError> {
        self.dispatcher.count(ctx, M::NAME, expr)
    }

    /// One page of the instances matching `expr`, ordered by URI, with the
    /// total number of matches. A page past the end is empty.
    #[instrument(skip_all, fields(class = M::NAME, page = page.page, size = page.size))]
    pub fn find_page<M: GraphModel>(
        &self,
        ctx: &RequestContext,
        expr: &Expr,
        page: Page,
    ) -> Result<Paged<M>, StoreError> {
        let total = self.dispatcher.count(ctx, M::NAME, expr)?;
        let items = if page.limit().is_some() && page.offset() as u64 >= total {
            Vec::new()
        } else {
            self.dispatcher
                .find_range(ctx, M::NAME, expr, page.offset(), page.limit())?
                .into_iter()
                .map(|stored| from_record::<M>(stored.record))
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(Paged { items, page, total })
    }

    /// Instances found at `uris`, in input order. Absent URIs are skipped;
    /// each lookup reads through the cache under its own lock.
    pub fn get_many<M: GraphModel>(&self, ctx: &RequestContext, uris: &[Uri]) -> Result<Vec<M>, StoreError> {
        let mut found = Vec::with_capacity(uris.len());
        for uri in uris {
            if let Some(model) = self.find_by_uri::<M>(ctx, uri)? {
                found.push(model);
            }
        }
        Ok(found)
    }

    /// The subset of `uris` holding no instance of `M`.
    pub fn missing_uris<M: GraphModel>(&self, ctx: &RequestContext, uris: &[Uri]) -> Result<Vec<Uri>, StoreError> {
        let mut missing = Vec::new();
        for uri in uris {
            if !self.exists::<M>(ctx, uri)? {
                missing.push(uri.clone());
            }
        }
        Ok(missing)
    }

    /// Persist every model in order and return their URIs. Not atomic: on
    /// error the models before the failing one stay persisted.
    pub fn persist_all<M: GraphModel>(&self, ctx: &RequestContext, models: &mut [M]) -> Result<Vec<Uri>, StoreError> {
        let mut uris = Vec::with_capacity(models.len());
        for model in models.iter_mut() {
            uris.push(self.persist(ctx, model)?);
        }
        debug!(class = M::NAME, count = uris.len(), "persisted batch");
        Ok(uris)
    }

    /// Delete every instance at `uris` and return how many existed. Absent
    /// URIs are skipped; every cache entry is evicted.
    pub fn delete_many<M: GraphModel>(&self, ctx: &RequestContext, uris: &[Uri]) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for uri in uris {
            match self.delete::<M>(ctx, uri) {
                Ok(()) => deleted += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }

    /// Re-copy the primary backend's state of `uri` to the class mirror.
    pub fn reconcile<M: GraphModel>(&self, ctx: &RequestContext, uri: &Uri) -> Result<(), StoreError> {
        self.with_lock::<M, _, _>(ctx, uri, || {
            let result = self.dispatcher.reconcile(ctx, M::NAME, uri);
            self.cache::<M>().remove(uri);
            result
        })
    }

    /// Drop every cached instance.
    pub fn shutdown(&self) {
        self.caches.clear_all();
        info!("store shut down, caches cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, InMemoryTripleStore};
    use crate::cache::{CacheKind, CacheSettings};
    use crate::model::Identity;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Plot {
        uri: Identity,
        name: Option<String>,
        description: Option<String>,
    }

    impl Plot {
        fn named(name: &str) -> Self {
            Plot {
                uri: Identity::new(),
                name: Some(name.to_string()),
                description: None,
            }
        }
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
            if other.description.is_some() {
                self.description = other.description;
            }
            self
        }
    }

    fn store() -> UriStore {
        UriStore::builder(StoreConfig::default())
            .backend(InMemoryTripleStore::new())
            .register::<Plot>()
            .cache::<Plot>(CacheSettings::of(CacheKind::InMemory))
            .build()
            .unwrap()
    }

    #[test]
    fn persist_generates_and_marks_persisted() {
        let store = store();
        let ctx = RequestContext::background();
        let mut plot = Plot::named("Plot 1");

        let uri = store.persist(&ctx, &mut plot).unwrap();
        assert_eq!(uri.as_str(), "http://example.org/plot/plot_1");
        assert_eq!(plot.uri(), Some(&uri));
        assert!(plot.identity().is_persisted());
        assert!(plot.set_uri(Uri::parse("http://example.org/other").unwrap()).is_err());
    }

    #[test]
    fn get_reads_through_cache() {
        let store = store();
        let ctx = RequestContext::background();
        let mut plot = Plot::named("a");
        let uri = store.persist(&ctx, &mut plot).unwrap();

        let cache = store.caches().cache("plot");
        assert!(!cache.has(&uri));
        let loaded: Plot = store.get(&ctx, &uri).unwrap();
        assert_eq!(loaded, plot);
        assert!(cache.has(&uri));
    }

    #[test]
    fn second_persist_of_same_identity_merges() {
        let store = store();
        let ctx = RequestContext::background();
        let mut first = Plot::named("a");
        let uri = store.persist(&ctx, &mut first).unwrap();

        let mut again = Plot::named("a");
        again.description = Some("north field".into());
        assert_eq!(store.persist(&ctx, &mut again).unwrap(), uri);

        let loaded: Plot = store.get(&ctx, &uri).unwrap();
        assert_eq!(loaded.description.as_deref(), Some("north field"));
        assert_eq!(store.find::<Plot>(&ctx, &Expr::All).unwrap().len(), 1);
    }

    #[test]
    fn update_rejects_foreign_uri_and_missing_target() {
        let store = store();
        let ctx = RequestContext::background();
        let uri = Uri::parse("http://example.org/plot/none").unwrap();

        let err = store.update(&ctx, &uri, Plot::named("x")).unwrap_err();
        assert!(err.is_not_found());

        let mut payload = Plot::named("x");
        payload.uri = Identity::with_uri(Uri::parse("http://example.org/plot/other").unwrap());
        let err = store.update(&ctx, &uri, payload).unwrap_err();
        assert!(matches!(err, StoreError::ImmutableIdentity { .. }));
    }

    #[test]
    fn delete_evicts_and_reports_missing() {
        let store = store();
        let ctx = RequestContext::background();
        let mut plot = Plot::named("a");
        let uri = store.persist(&ctx, &mut plot).unwrap();
        let _: Plot = store.get(&ctx, &uri).unwrap();

        store.delete::<Plot>(&ctx, &uri).unwrap();
        assert!(!store.caches().cache("plot").has(&uri));
        assert!(store.delete::<Plot>(&ctx, &uri).unwrap_err().is_not_found());
        assert!(store.find_by_uri::<Plot>(&ctx, &uri).unwrap().is_none());
        assert!(store.locks().is_empty());
    }

    #[test]
    fn persisted_instance_deleted_since_is_not_found() {
        let store = store();
        let ctx = RequestContext::background();
        let mut plot = Plot::named("a");
        let uri = store.persist(&ctx, &mut plot).unwrap();
        store.delete::<Plot>(&ctx, &uri).unwrap();

        let err = store.persist(&ctx, &mut plot).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn expired_context_fails_without_touching_backend() {
        let store = store();
        let ctx = RequestContext::background();
        ctx.cancellation().cancel();
        let mut plot = Plot::named("a");
        assert!(matches!(
            store.persist(&ctx, &mut plot).unwrap_err(),
            StoreError::Cancelled
        ));
        assert!(plot.uri().is_none());
    }
}
