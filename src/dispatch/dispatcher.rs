use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::{Route, WriteOp};
use crate::backend::{Backend, BackendError, Record, StorageBackend, Stored};
use crate::context::RequestContext;
use crate::error::StoreError;
use crate::model::Expr;
use crate::uri::{Uri, UriGenerator};

/// Sends each operation of a class to the backend that owns it.
///
/// Writes go to the primary backend first, then to the mirror if the class
/// declares one. A mirror failure after a primary success is reported as
/// `PartialPersist` and left as is; [`BackendDispatcher::reconcile`] copies
/// the primary's state over again.
pub struct BackendDispatcher {
    generator: UriGenerator,
    backends: HashMap<Backend, Arc<dyn StorageBackend>>,
    routes: HashMap<&'static str, Route>,
}

impl BackendDispatcher {
    pub(crate) fn new(
        generator: UriGenerator,
        backends: HashMap<Backend, Arc<dyn StorageBackend>>,
        routes: HashMap<&'static str, Route>,
    ) -> Self {
        BackendDispatcher {
            generator,
            backends,
            routes,
        }
    }

    pub fn generator(&self) -> &UriGenerator {
        &self.generator
    }

    pub fn route(&self, class: &'static str) -> Result<&Route, StoreError> {
        self.routes
            .get(class)
            .ok_or(StoreError::UnregisteredModel(class))
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn backend(&self, kind: Backend) -> Option<Arc<dyn StorageBackend>> {
        self.backends.get(&kind).cloned()
    }

    fn resolve(&self, class: &'static str, kind: Backend) -> Result<&dyn StorageBackend, StoreError> {
        self.backends
            .get(&kind)
            .map(|b| b.as_ref())
            .ok_or(StoreError::BackendNotConfigured {
                class,
                backend: kind,
            })
    }

    #[instrument(skip_all, fields(class = class, uri = %uri))]
    pub fn fetch(
        &self,
        ctx: &RequestContext,
        class: &'static str,
        uri: &Uri,
    ) -> Result<Option<Stored>, StoreError> {
        let route = self.route(class)?;
        let primary = self.resolve(class, route.primary)?;
        Ok(primary.fetch(ctx, &route.scope, uri)?)
    }

    pub fn exists(&self, ctx: &RequestContext, class: &'static str, uri: &Uri) -> Result<bool, StoreError> {
        let route = self.route(class)?;
        let primary = self.resolve(class, route.primary)?;
        Ok(primary.exists(ctx, &route.scope, uri)?)
    }

    pub fn find(&self, ctx: &RequestContext, class: &'static str, expr: &Expr) -> Result<Vec<Stored>, StoreError> {
        let route = self.route(class)?;
        let primary = self.resolve(class, route.primary)?;
        Ok(primary.find(ctx, &route.scope, expr)?)
    }

    pub fn find_range(
        &self,
        ctx: &RequestContext,
        class: &'static str,
        expr: &Expr,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Stored>, StoreError> {
        let route = self.route(class)?;
        let primary = self.resolve(class, route.primary)?;
        Ok(primary.find_range(ctx, &route.scope, expr, offset, limit)?)
    }

    pub fn count(&self, ctx: &RequestContext, class: &'static str, expr: &Expr) -> Result<u64, StoreError> {
        let route = self.route(class)?;
        let primary = self.resolve(class, route.primary)?;
        Ok(primary.count(ctx, &route.scope, expr)?)
    }

    /// Insert a new record. A taken URI fails with `AlreadyExists`.
    #[instrument(skip_all, fields(class = class, uri = %record.uri))]
    pub fn insert(&self, ctx: &RequestContext, class: &'static str, record: &Record) -> Result<u64, StoreError> {
        let route = self.route(class)?;
        let primary = self.resolve(class, route.primary)?;
        let version = primary
            .insert(ctx, &route.scope, record)
            .map_err(|e| classify(class, &record.uri, e))?;
        self.mirror_write(ctx, route, WriteOp::Insert, record)?;
        Ok(version)
    }

    /// Replace an existing record. An absent URI fails with `NotFound`.
    #[instrument(skip_all, fields(class = class, uri = %record.uri))]
    pub fn replace(&self, ctx: &RequestContext, class: &'static str, record: &Record) -> Result<u64, StoreError> {
        let route = self.route(class)?;
        let primary = self.resolve(class, route.primary)?;
        let version = primary
            .replace(ctx, &route.scope, record)
            .map_err(|e| classify(class, &record.uri, e))?;
        self.mirror_write(ctx, route, WriteOp::Replace, record)?;
        Ok(version)
    }

    /// Delete from the primary and the mirror. Returns whether the primary
    /// held the record.
    #[instrument(skip_all, fields(class = class, uri = %uri))]
    pub fn delete(&self, ctx: &RequestContext, class: &'static str, uri: &Uri) -> Result<bool, StoreError> {
        let route = self.route(class)?;
        let primary = self.resolve(class, route.primary)?;
        let existed = primary.delete(ctx, &route.scope, uri)?;
        if let Some(kind) = route.mirror {
            let mirror = self.resolve(class, kind)?;
            if let Err(source) = mirror.delete(ctx, &route.scope, uri) {
                return Err(partial(route, uri, WriteOp::Delete, kind, source));
            }
        }
        Ok(existed)
    }

    /// Copy the primary's state of `uri` to the mirror: upsert when the
    /// primary holds it, delete otherwise. No-op for classes without a
    /// mirror. Safe to repeat.
    #[instrument(skip_all, fields(class = class, uri = %uri))]
    pub fn reconcile(&self, ctx: &RequestContext, class: &'static str, uri: &Uri) -> Result<(), StoreError> {
        let route = self.route(class)?;
        let Some(kind) = route.mirror else {
            return Ok(());
        };
        let primary = self.resolve(class, route.primary)?;
        let mirror = self.resolve(class, kind)?;
        match primary.fetch(ctx, &route.scope, uri)? {
            Some(stored) => {
                upsert(mirror, ctx, route, &stored.record)?;
                debug!(class, mirror = %kind, "mirror reconciled");
            }
            None => {
                mirror.delete(ctx, &route.scope, uri)?;
                debug!(class, mirror = %kind, "mirror copy removed");
            }
        }
        Ok(())
    }

    fn mirror_write(
        &self,
        ctx: &RequestContext,
        route: &Route,
        op: WriteOp,
        record: &Record,
    ) -> Result<(), StoreError> {
        let Some(kind) = route.mirror else {
            return Ok(());
        };
        let mirror = self.resolve(route.class(), kind)?;
        upsert(mirror, ctx, route, record)
            .map_err(|source| partial(route, &record.uri, op, kind, source))?;
        Ok(())
    }
}

/// The mirror may be ahead of or behind the primary after a partial write,
/// so it is always written as an upsert.
fn upsert(
    backend: &dyn StorageBackend,
    ctx: &RequestContext,
    route: &Route,
    record: &Record,
) -> Result<u64, BackendError> {
    match backend.replace(ctx, &route.scope, record) {
        Err(BackendError::Missing { .. }) => backend.insert(ctx, &route.scope, record),
        other => other,
    }
}

fn partial(route: &Route, uri: &Uri, op: WriteOp, failed: Backend, source: BackendError) -> StoreError {
    warn!(
        class = route.class(),
        %uri,
        %op,
        succeeded = %route.primary,
        %failed,
        error = %source,
        "partial persist: mirror out of sync"
    );
    StoreError::PartialPersist {
        uri: uri.clone(),
        op,
        succeeded: route.primary,
        failed,
        source,
    }
}

fn classify(class: &'static str, uri: &Uri, err: BackendError) -> StoreError {
    match err {
        BackendError::Conflict { .. } => StoreError::AlreadyExists {
            class: class.to_string(),
            uri: uri.clone(),
        },
        BackendError::Missing { .. } => StoreError::not_found(class, uri),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryDocumentStore, InMemoryTripleStore};
    use crate::dispatch::DispatcherBuilder;
    use crate::model::Identity;
    use crate::GraphModel;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Plot {
        uri: Identity,
        name: Option<String>,
    }

    impl GraphModel for Plot {
        const NAME: &'static str = "plot";
        const GRAPH_PREFIX: &'static str = "plot";
        const BACKEND: Backend = Backend::Triple;
        const MIRROR: Option<Backend> = Some(Backend::Document);

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

    /// Document store that can be switched off.
    #[derive(Default)]
    struct Flaky {
        inner: InMemoryDocumentStore,
        down: AtomicBool,
    }

    impl Flaky {
        fn gate(&self) -> Result<(), BackendError> {
            if self.down.load(Ordering::SeqCst) {
                Err(BackendError::Unavailable {
                    backend: Backend::Document,
                    message: "connection refused".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl StorageBackend for Flaky {
        fn kind(&self) -> Backend {
            Backend::Document
        }
        fn fetch(&self, ctx: &RequestContext, scope: &crate::Scope, uri: &Uri) -> Result<Option<Stored>, BackendError> {
            self.gate()?;
            self.inner.fetch(ctx, scope, uri)
        }
        fn insert(&self, ctx: &RequestContext, scope: &crate::Scope, record: &Record) -> Result<u64, BackendError> {
            self.gate()?;
            self.inner.insert(ctx, scope, record)
        }
        fn replace(&self, ctx: &RequestContext, scope: &crate::Scope, record: &Record) -> Result<u64, BackendError> {
            self.gate()?;
            self.inner.replace(ctx, scope, record)
        }
        fn delete(&self, ctx: &RequestContext, scope: &crate::Scope, uri: &Uri) -> Result<bool, BackendError> {
            self.gate()?;
            self.inner.delete(ctx, scope, uri)
        }
        fn find(&self, ctx: &RequestContext, scope: &crate::Scope, expr: &Expr) -> Result<Vec<Stored>, BackendError> {
            self.gate()?;
            self.inner.find(ctx, scope, expr)
        }
    }

    fn base() -> Uri {
        Uri::parse("http://example.org/").unwrap()
    }

    fn record(name: &str) -> Record {
        let mut fields = Map::new();
        fields.insert("name".into(), Value::String(name.into()));
        Record {
            uri: Uri::parse(format!("http://example.org/plot/{}", name)).unwrap(),
            fields,
        }
    }

    fn setup() -> (BackendDispatcher, Arc<Flaky>) {
        let mirror = Arc::new(Flaky::default());
        let dispatcher = DispatcherBuilder::new(&base())
            .backend(InMemoryTripleStore::new())
            .shared_backend(mirror.clone())
            .register::<Plot>()
            .build()
            .unwrap();
        (dispatcher, mirror)
    }

    fn mirror_copy(mirror: &Flaky, dispatcher: &BackendDispatcher, uri: &Uri) -> Option<Stored> {
        let route = dispatcher.route("plot").unwrap();
        mirror
            .inner
            .fetch(&RequestContext::background(), &route.scope, uri)
            .unwrap()
    }

    #[test]
    fn unregistered_class_is_rejected() {
        let (dispatcher, _) = setup();
        let err = dispatcher
            .fetch(&RequestContext::background(), "sensor", &base())
            .unwrap_err();
        assert!(matches!(err, StoreError::UnregisteredModel("sensor")));
    }

    #[test]
    fn missing_backend_fails_build() {
        let err = DispatcherBuilder::new(&base())
            .backend(InMemoryTripleStore::new())
            .register::<Plot>()
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            StoreError::BackendNotConfigured { class: "plot", backend: Backend::Document }
        ));
    }

    #[test]
    fn route_uses_graph_of_prefix() {
        let (dispatcher, _) = setup();
        let route = dispatcher.route("plot").unwrap();
        assert_eq!(route.scope.graph.as_str(), "http://example.org/set/plot");
        assert_eq!(route.primary, Backend::Triple);
        assert_eq!(route.mirror, Some(Backend::Document));
    }

    #[test]
    fn writes_reach_primary_and_mirror() {
        let (dispatcher, mirror) = setup();
        let ctx = RequestContext::background();
        let rec = record("a");

        dispatcher.insert(&ctx, "plot", &rec).unwrap();
        assert!(dispatcher.exists(&ctx, "plot", &rec.uri).unwrap());
        assert_eq!(mirror_copy(&mirror, &dispatcher, &rec.uri).unwrap().record, rec);

        assert!(matches!(
            dispatcher.insert(&ctx, "plot", &rec).unwrap_err(),
            StoreError::AlreadyExists { .. }
        ));

        assert!(dispatcher.delete(&ctx, "plot", &rec.uri).unwrap());
        assert!(mirror_copy(&mirror, &dispatcher, &rec.uri).is_none());
        assert!(matches!(
            dispatcher.replace(&ctx, "plot", &rec).unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[test]
    fn mirror_failure_is_partial_and_reconcile_repairs() {
        let (dispatcher, mirror) = setup();
        let ctx = RequestContext::background();
        let rec = record("a");

        mirror.down.store(true, Ordering::SeqCst);
        let err = dispatcher.insert(&ctx, "plot", &rec).unwrap_err();
        match &err {
            StoreError::PartialPersist {
                uri,
                op,
                succeeded,
                failed,
                ..
            } => {
                assert_eq!(uri, &rec.uri);
                assert_eq!(*op, WriteOp::Insert);
                assert_eq!(*succeeded, Backend::Triple);
                assert_eq!(*failed, Backend::Document);
            }
            other => panic!("expected PartialPersist, got {other:?}"),
        }
        // primary kept the write
        assert!(dispatcher.exists(&ctx, "plot", &rec.uri).unwrap());

        mirror.down.store(false, Ordering::SeqCst);
        assert!(mirror_copy(&mirror, &dispatcher, &rec.uri).is_none());
        dispatcher.reconcile(&ctx, "plot", &rec.uri).unwrap();
        dispatcher.reconcile(&ctx, "plot", &rec.uri).unwrap();
        assert_eq!(mirror_copy(&mirror, &dispatcher, &rec.uri).unwrap().record, rec);
    }

    #[test]
    fn reconcile_removes_orphaned_mirror_copy() {
        let (dispatcher, mirror) = setup();
        let ctx = RequestContext::background();
        let rec = record("a");
        dispatcher.insert(&ctx, "plot", &rec).unwrap();

        mirror.down.store(true, Ordering::SeqCst);
        assert!(matches!(
            dispatcher.delete(&ctx, "plot", &rec.uri).unwrap_err(),
            StoreError::PartialPersist { op: WriteOp::Delete, .. }
        ));
        mirror.down.store(false, Ordering::SeqCst);
        assert!(mirror_copy(&mirror, &dispatcher, &rec.uri).is_some());

        dispatcher.reconcile(&ctx, "plot", &rec.uri).unwrap();
        assert!(mirror_copy(&mirror, &dispatcher, &rec.uri).is_none());
    }

    #[test]
    fn ranges_and_counts_come_from_primary() {
        let (dispatcher, mirror) = setup();
        let ctx = RequestContext::background();
        for name in ["a", "b", "c", "d"] {
            dispatcher.insert(&ctx, "plot", &record(name)).unwrap();
        }
        mirror.down.store(true, Ordering::SeqCst);

        assert_eq!(dispatcher.count(&ctx, "plot", &Expr::All).unwrap(), 4);
        let window = dispatcher
            .find_range(&ctx, "plot", &Expr::All, 1, Some(2))
            .unwrap();
        let uris: Vec<_> = window.iter().map(|s| s.record.uri.as_str()).collect();
        assert_eq!(uris, ["http://example.org/plot/b", "http://example.org/plot/c"]);
        assert!(dispatcher
            .find_range(&ctx, "plot", &Expr::All, 9, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn find_reads_primary() {
        let (dispatcher, _) = setup();
        let ctx = RequestContext::background();
        dispatcher.insert(&ctx, "plot", &record("a")).unwrap();
        dispatcher.insert(&ctx, "plot", &record("b")).unwrap();
        let found = dispatcher
            .find(&ctx, "plot", &Expr::field_eq("name", json!("b")))
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
