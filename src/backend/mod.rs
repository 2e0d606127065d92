//! Storage backends - the stores that own persisted records.
//!
//! Backends work on type-erased [`Record`]s so the dispatcher can hold them
//! as `Arc<dyn StorageBackend>`; the typed layer above converts models to
//! and from records.

mod document;
pub(crate) mod relational;
mod triple;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::context::RequestContext;
use crate::model::Expr;
use crate::uri::Uri;

pub use document::InMemoryDocumentStore;
pub use relational::{Column, InMemoryRelationalStore};
pub use triple::{InMemoryTripleStore, Term, Triple, RDF_TYPE};

/// Storage technology owning a model class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// RDF triple store (SPARQL).
    Triple,
    /// NoSQL document store.
    Document,
    /// Relational store.
    Relational,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Triple => "triple",
            Backend::Document => "document",
            Backend::Relational => "relational",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a class lives inside a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    /// Class name (`GraphModel::NAME`).
    pub class: &'static str,
    /// Graph prefix (`GraphModel::GRAPH_PREFIX`).
    pub graph_prefix: &'static str,
    /// Named graph / collection / table URI derived from the prefix.
    pub graph: Uri,
}

/// A model flattened for storage.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub uri: Uri,
    pub fields: Map<String, Value>,
}

/// A record as returned by a backend, with its write version.
#[derive(Clone, Debug, PartialEq)]
pub struct Stored {
    pub record: Record,
    pub version: u64,
}

/// Error type for backend operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// Transient I/O failure; the caller may retry.
    #[error("{backend} unavailable: {message}")]
    Unavailable { backend: Backend, message: String },
    /// Insert of a URI the backend already holds.
    #[error("{uri} already exists in {graph}")]
    Conflict { graph: String, uri: Uri },
    /// Replace of a URI the backend does not hold.
    #[error("{uri} not found in {graph}")]
    Missing { graph: String, uri: Uri },
    /// A record the backend cannot represent.
    #[error("unsupported record: {0}")]
    Unsupported(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("cancelled")]
    Cancelled,
    /// Internal lock of an in-memory backend was poisoned.
    #[error("storage lock poisoned during {0}")]
    Poisoned(&'static str),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Unavailable { .. } | BackendError::Timeout(_))
    }
}

/// Abstract record storage. One implementation per storage technology.
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> Backend;

    /// Get a record by URI. Returns `None` if not found.
    fn fetch(
        &self,
        ctx: &RequestContext,
        scope: &Scope,
        uri: &Uri,
    ) -> Result<Option<Stored>, BackendError>;

    fn exists(&self, ctx: &RequestContext, scope: &Scope, uri: &Uri) -> Result<bool, BackendError> {
        Ok(self.fetch(ctx, scope, uri)?.is_some())
    }

    /// Insert a new record. Fails with `Conflict` if the URI is taken.
    fn insert(&self, ctx: &RequestContext, scope: &Scope, record: &Record) -> Result<u64, BackendError>;

    /// Replace an existing record. Fails with `Missing` if absent.
    fn replace(&self, ctx: &RequestContext, scope: &Scope, record: &Record) -> Result<u64, BackendError>;

    /// Delete a record. Returns true if it existed.
    fn delete(&self, ctx: &RequestContext, scope: &Scope, uri: &Uri) -> Result<bool, BackendError>;

    /// Find records of the scope matching a predicate, ordered by URI.
    fn find(&self, ctx: &RequestContext, scope: &Scope, expr: &Expr) -> Result<Vec<Stored>, BackendError>;

    /// One window of [`StorageBackend::find`]: skip `offset` matches, keep at
    /// most `limit`.
    fn find_range(
        &self,
        ctx: &RequestContext,
        scope: &Scope,
        expr: &Expr,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Stored>, BackendError> {
        let found = self.find(ctx, scope, expr)?.into_iter().skip(offset);
        Ok(match limit {
            Some(limit) => found.take(limit).collect(),
            None => found.collect(),
        })
    }

    fn count(&self, ctx: &RequestContext, scope: &Scope, expr: &Expr) -> Result<u64, BackendError> {
        Ok(self.find(ctx, scope, expr)?.len() as u64)
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for std::sync::Arc<B> {
    fn kind(&self) -> Backend {
        (**self).kind()
    }

    fn fetch(&self, ctx: &RequestContext, scope: &Scope, uri: &Uri) -> Result<Option<Stored>, BackendError> {
        (**self).fetch(ctx, scope, uri)
    }

    fn exists(&self, ctx: &RequestContext, scope: &Scope, uri: &Uri) -> Result<bool, BackendError> {
        (**self).exists(ctx, scope, uri)
    }

    fn insert(&self, ctx: &RequestContext, scope: &Scope, record: &Record) -> Result<u64, BackendError> {
        (**self).insert(ctx, scope, record)
    }

    fn replace(&self, ctx: &RequestContext, scope: &Scope, record: &Record) -> Result<u64, BackendError> {
        (**self).replace(ctx, scope, record)
    }

    fn delete(&self, ctx: &RequestContext, scope: &Scope, uri: &Uri) -> Result<bool, BackendError> {
        (**self).delete(ctx, scope, uri)
    }

    fn find(&self, ctx: &RequestContext, scope: &Scope, expr: &Expr) -> Result<Vec<Stored>, BackendError> {
        (**self).find(ctx, scope, expr)
    }

    fn find_range(
        &self,
        ctx: &RequestContext,
        scope: &Scope,
        expr: &Expr,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Stored>, BackendError> {
        (**self).find_range(ctx, scope, expr, offset, limit)
    }

    fn count(&self, ctx: &RequestContext, scope: &Scope, expr: &Expr) -> Result<u64, BackendError> {
        (**self).count(ctx, scope, expr)
    }
}
