//! Backend wrapper counting calls and simulating outages.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use uri_store::{
    Backend, BackendError, Expr, Record, RequestContext, Scope, StorageBackend, Stored, Uri,
};

pub struct Instrumented<B> {
    inner: B,
    fetches: AtomicUsize,
    writes: AtomicUsize,
    down: AtomicBool,
}

impl<B: StorageBackend> Instrumented<B> {
    pub fn new(inner: B) -> Arc<Self> {
        Arc::new(Instrumented {
            inner,
            fetches: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            down: AtomicBool::new(false),
        })
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn gate(&self) -> Result<(), BackendError> {
        if self.down.load(Ordering::SeqCst) {
            Err(BackendError::Unavailable {
                backend: self.inner.kind(),
                message: "connection refused".into(),
            })
        } else {
            Ok(())
        }
    }
}

impl<B: StorageBackend> StorageBackend for Instrumented<B> {
    fn kind(&self) -> Backend {
        self.inner.kind()
    }

    fn fetch(&self, ctx: &RequestContext, scope: &Scope, uri: &Uri) -> Result<Option<Stored>, BackendError> {
        self.gate()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(ctx, scope, uri)
    }

    fn exists(&self, ctx: &RequestContext, scope: &Scope, uri: &Uri) -> Result<bool, BackendError> {
        self.gate()?;
        self.inner.exists(ctx, scope, uri)
    }

    fn insert(&self, ctx: &RequestContext, scope: &Scope, record: &Record) -> Result<u64, BackendError> {
        self.gate()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(ctx, scope, record)
    }

    fn replace(&self, ctx: &RequestContext, scope: &Scope, record: &Record) -> Result<u64, BackendError> {
        self.gate()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.replace(ctx, scope, record)
    }

    fn delete(&self, ctx: &RequestContext, scope: &Scope, uri: &Uri) -> Result<bool, BackendError> {
        self.gate()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(ctx, scope, uri)
    }

    fn find(&self, ctx: &RequestContext, scope: &Scope, expr: &Expr) -> Result<Vec<Stored>, BackendError> {
        self.gate()?;
        self.inner.find(ctx, scope, expr)
    }
}
