use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{BackendDispatcher, Route};
use crate::backend::{Backend, Scope, StorageBackend};
use crate::error::StoreError;
use crate::model::GraphModel;
use crate::uri::{Uri, UriGenerator};

/// Collects backends and class routes, then freezes them into a
/// [`BackendDispatcher`].
pub struct DispatcherBuilder {
    generator: UriGenerator,
    backends: HashMap<Backend, Arc<dyn StorageBackend>>,
    routes: HashMap<&'static str, Route>,
}

impl DispatcherBuilder {
    pub fn new(base: &Uri) -> Self {
        DispatcherBuilder {
            generator: UriGenerator::new(base),
            backends: HashMap::new(),
            routes: HashMap::new(),
        }
    }

    /// Add a backend under its own kind, replacing any previous one.
    pub fn backend<B: StorageBackend + 'static>(self, backend: B) -> Self {
        self.shared_backend(Arc::new(backend))
    }

    pub fn shared_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        let kind = backend.kind();
        if self.backends.insert(kind, backend).is_some() {
            warn!(backend = %kind, "backend replaced");
        }
        self
    }

    /// Route `M` to its declared backend (and mirror).
    pub fn register<M: GraphModel>(self) -> Self {
        let scope = Scope {
            class: M::NAME,
            graph_prefix: M::GRAPH_PREFIX,
            graph: self.generator.graph_uri(M::GRAPH_PREFIX),
        };
        self.route(Route {
            scope,
            primary: M::BACKEND,
            mirror: M::MIRROR,
        })
    }

    pub fn route(mut self, route: Route) -> Self {
        debug!(
            class = route.class(),
            primary = %route.primary,
            mirror = ?route.mirror,
            graph = %route.scope.graph,
            "route registered"
        );
        if let Some(previous) = self.routes.insert(route.class(), route) {
            warn!(class = previous.class(), "route replaced");
        }
        self
    }

    /// Fails when a route names a backend that was never added.
    pub fn build(self) -> Result<BackendDispatcher, StoreError> {
        let mut routes = self.routes;
        for route in routes.values_mut() {
            if !self.backends.contains_key(&route.primary) {
                return Err(StoreError::BackendNotConfigured {
                    class: route.class(),
                    backend: route.primary,
                });
            }
            match route.mirror {
                Some(mirror) if mirror == route.primary => {
                    warn!(class = route.class(), backend = %mirror, "mirror equals primary, ignored");
                    route.mirror = None;
                }
                Some(mirror) if !self.backends.contains_key(&mirror) => {
                    return Err(StoreError::BackendNotConfigured {
                        class: route.class(),
                        backend: mirror,
                    });
                }
                _ => {}
            }
        }
        Ok(BackendDispatcher::new(self.generator, self.backends, routes))
    }
}
