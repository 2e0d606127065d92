//! URI-indexed persistence for graph-scoped models.
//!
//! Every model is identified by one canonical [`Uri`], generated
//! deterministically from its graph prefix and disambiguating fields,
//! persisted in whichever backend owns its class (triple, document or
//! relational store), and cached per class behind a [`CacheManager`].
//!
//! ## Example
//!
//! ```ignore
//! use uri_store::{GraphModel, Identity, InMemoryTripleStore, RequestContext, StoreConfig, UriStore};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize, GraphModel)]
//! #[model(graph = "plot", backend = "rdf")]
//! struct Plot {
//!     #[model(identity)]
//!     uri: Identity,
//!     #[model(segment)]
//!     name: Option<String>,
//!     description: Option<String>,
//! }
//!
//! let store = UriStore::builder(StoreConfig::default())
//!     .backend(InMemoryTripleStore::new())
//!     .register::<Plot>()
//!     .build()?;
//!
//! let ctx = RequestContext::background();
//! let mut plot = Plot { uri: Identity::new(), name: Some("Plot 1".into()), description: None };
//! let uri = store.persist(&ctx, &mut plot)?;
//! let loaded: Plot = store.get(&ctx, &uri)?;
//! ```

extern crate self as uri_store;

mod backend;
mod cache;
mod config;
mod context;
mod dispatch;
mod error;
mod lock;
mod model;
mod query;
mod store;
mod uri;

pub use backend::{
    Backend, BackendError, Column, InMemoryDocumentStore, InMemoryRelationalStore,
    InMemoryTripleStore, Record, Scope, StorageBackend, Stored, Term, Triple, RDF_TYPE,
};
pub use cache::{
    CacheKind, CacheManager, CacheOption, CacheRegistry, CacheSettings, CachedInstance,
    InMemoryCacheManager, ModelCache, NoCacheManager,
};
#[cfg(feature = "lru-cache")]
pub use cache::LruCacheManager;
pub use config::{CacheConfig, ClassCacheConfig, ConfigError, StoreConfig};
pub use context::{CancellationToken, RequestContext};
pub use dispatch::{BackendDispatcher, DispatcherBuilder, Route, WriteOp};
pub use error::StoreError;
pub use lock::{InMemoryLock, InMemoryLockManager, Lock, LockError, LockGuard, LockManager};
pub use model::{Collision, Expr, GraphModel, Identity};
pub use query::{JoinKind, Order, SqlOperator, SqlQueryBuilder};
pub use store::{ModelRepository, ModelsExt, Page, Paged, UriStore, UriStoreBuilder};
pub use uri::{normalize_segment, Uri, UriGenerator, MAX_GENERATION_ATTEMPTS};

// Re-export the derive macro so `#[derive(GraphModel)]` works from the crate root.
pub use uri_store_macros::GraphModel;
