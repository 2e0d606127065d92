//! Per-class instance caches keyed by URI.
//!
//! A cache never fetches on its own: the store reads through it on `get`
//! and invalidates it after every write. Turning a cache off only changes
//! how often backends are hit, never what callers observe.

mod in_memory;
#[cfg(feature = "lru-cache")]
mod lru_cache;
mod no_cache;
mod options;
mod registry;

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;
use crate::uri::Uri;

pub use in_memory::InMemoryCacheManager;
#[cfg(feature = "lru-cache")]
pub use lru_cache::LruCacheManager;
pub use no_cache::NoCacheManager;
pub use options::{CacheKind, CacheOption, CacheSettings};
pub use registry::{CacheRegistry, ModelCache};

/// Encoded snapshot of a model instance.
///
/// Cached values are bytes, so a caller holding a model can never mutate
/// what the cache returns to the next reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedInstance {
    bytes: Arc<[u8]>,
}

impl CachedInstance {
    pub fn encode<M: Serialize>(model: &M) -> Result<Self, StoreError> {
        let bytes = bitcode::serialize(model)
            .map_err(|e| StoreError::Serialization(format!("cache encode: {}", e)))?;
        Ok(CachedInstance {
            bytes: bytes.into(),
        })
    }

    pub fn decode<M: DeserializeOwned>(&self) -> Result<M, StoreError> {
        bitcode::deserialize(&self.bytes)
            .map_err(|e| StoreError::Serialization(format!("cache decode: {}", e)))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        CachedInstance {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Cache of one model class.
///
/// `put` overwrites, `get` and `has` never reach a backend, `remove` is
/// idempotent.
pub trait CacheManager: Send + Sync {
    fn put(&self, uri: &Uri, instance: CachedInstance);

    fn has(&self, uri: &Uri) -> bool;

    fn get(&self, uri: &Uri) -> Option<CachedInstance>;

    fn remove(&self, uri: &Uri);

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> CacheKind;
}
