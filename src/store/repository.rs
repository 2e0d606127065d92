//! ModelRepository - typed accessor bound to one model class and one request.

use std::marker::PhantomData;

use super::{Page, Paged, UriStore};
use crate::context::RequestContext;
use crate::error::StoreError;
use crate::lock::LockManager;
use crate::model::{Expr, GraphModel};
use crate::uri::Uri;

/// Typed view of a [`UriStore`] for models of type `M`.
pub struct ModelRepository<'a, L: LockManager, M> {
    store: &'a UriStore<L>,
    ctx: RequestContext,
    _marker: PhantomData<fn() -> M>,
}

impl<'a, L: LockManager, M: GraphModel> ModelRepository<'a, L, M> {
    pub fn new(store: &'a UriStore<L>, ctx: RequestContext) -> Self {
        Self {
            store,
            ctx,
            _marker: PhantomData,
        }
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    pub fn get(&self, uri: &Uri) -> Result<M, StoreError> {
        self.store.get(&self.ctx, uri)
    }

    pub fn find_by_uri(&self, uri: &Uri) -> Result<Option<M>, StoreError> {
        self.store.find_by_uri(&self.ctx, uri)
    }

    pub fn exists(&self, uri: &Uri) -> Result<bool, StoreError> {
        self.store.exists::<M>(&self.ctx, uri)
    }

    pub fn persist(&self, model: &mut M) -> Result<Uri, StoreError> {
        self.store.persist(&self.ctx, model)
    }

    pub fn update(&self, uri: &Uri, payload: M) -> Result<M, StoreError> {
        self.store.update(&self.ctx, uri, payload)
    }

    pub fn delete(&self, uri: &Uri) -> Result<(), StoreError> {
        self.store.delete::<M>(&self.ctx, uri)
    }

    pub fn find(&self, expr: &Expr) -> Result<Vec<M>, StoreError> {
        self.store.find(&self.ctx, expr)
    }

    pub fn find_page(&self, expr: &Expr, page: Page) -> Result<Paged<M>, StoreError> {
        self.store.find_page(&self.ctx, expr, page)
    }

    pub fn count(&self, expr: &Expr) -> Result<u64, StoreError> {
        self.store.count::<M>(&self.ctx, expr)
    }

    pub fn get_many(&self, uris: &[Uri]) -> Result<Vec<M>, StoreError> {
        self.store.get_many(&self.ctx, uris)
    }

    pub fn persist_all(&self, models: &mut [M]) -> Result<Vec<Uri>, StoreError> {
        self.store.persist_all(&self.ctx, models)
    }

    pub fn delete_many(&self, uris: &[Uri]) -> Result<usize, StoreError> {
        self.store.delete_many::<M>(&self.ctx, uris)
    }

    pub fn reconcile(&self, uri: &Uri) -> Result<(), StoreError> {
        self.store.reconcile::<M>(&self.ctx, uri)
    }

    pub fn generate_uri(&self, model: &M) -> Result<Uri, StoreError> {
        self.store.generate_uri(&self.ctx, model)
    }
}

/// Typed model access on a store.
pub trait ModelsExt {
    type Locks: LockManager;

    /// Repository for `M` using the store's default context.
    fn models<M: GraphModel>(&self) -> ModelRepository<'_, Self::Locks, M>;

    /// Repository for `M` bound to `ctx`.
    fn models_with<M: GraphModel>(&self, ctx: RequestContext) -> ModelRepository<'_, Self::Locks, M>;
}

impl<L: LockManager> ModelsExt for UriStore<L> {
    type Locks = L;

    fn models<M: GraphModel>(&self) -> ModelRepository<'_, L, M> {
        ModelRepository::new(self, self.default_context())
    }

    fn models_with<M: GraphModel>(&self, ctx: RequestContext) -> ModelRepository<'_, L, M> {
        ModelRepository::new(self, ctx)
    }
}
