use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{CacheManager, InMemoryCacheManager, NoCacheManager};

/// Capacity used by LRU caches configured without a `capacity` option.
pub const DEFAULT_LRU_CAPACITY: usize = 1024;

/// Cache implementation selected for a class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    #[default]
    None,
    InMemory,
    Lru,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheKind::None => "none",
            CacheKind::InMemory => "in_memory",
            CacheKind::Lru => "lru",
        })
    }
}

/// One key/value setting of a cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOption {
    pub key: String,
    pub value: String,
}

impl CacheOption {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        CacheOption {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// How the cache of one class is built.
///
/// Options are applied in order; a later option overrides an earlier one
/// with the same key. Recognized keys: `ttl_ms` (in-memory and LRU) and
/// `capacity` (LRU).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheSettings {
    pub kind: CacheKind,
    pub enabled: bool,
    pub options: Vec<CacheOption>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings::disabled()
    }
}

impl CacheSettings {
    pub fn disabled() -> Self {
        CacheSettings {
            kind: CacheKind::None,
            enabled: false,
            options: Vec::new(),
        }
    }

    pub fn of(kind: CacheKind) -> Self {
        CacheSettings {
            kind,
            enabled: kind != CacheKind::None,
            options: Vec::new(),
        }
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push(CacheOption::new(key, value));
        self
    }

    /// Build the cache for `class`. Settings that cannot be honored log a
    /// warning and yield a [`NoCacheManager`].
    pub fn build(&self, class: &str) -> Arc<dyn CacheManager> {
        match self.try_build() {
            Ok(cache) => cache,
            Err(reason) => {
                warn!(
                    class,
                    kind = %self.kind,
                    %reason,
                    "cannot build cache, caching disabled for this class"
                );
                Arc::new(NoCacheManager)
            }
        }
    }

    fn try_build(&self) -> Result<Arc<dyn CacheManager>, String> {
        if !self.enabled || self.kind == CacheKind::None {
            return Ok(Arc::new(NoCacheManager));
        }
        let mut ttl = None;
        let mut capacity = None;
        for opt in &self.options {
            match opt.key.as_str() {
                "ttl_ms" => {
                    let ms: u64 = opt
                        .value
                        .trim()
                        .parse()
                        .map_err(|_| format!("ttl_ms must be an integer, got {:?}", opt.value))?;
                    ttl = Some(Duration::from_millis(ms));
                }
                "capacity" if self.kind == CacheKind::Lru => {
                    let n: usize = opt
                        .value
                        .trim()
                        .parse()
                        .map_err(|_| format!("capacity must be an integer, got {:?}", opt.value))?;
                    capacity = Some(n);
                }
                other => return Err(format!("unknown option {:?} for {} cache", other, self.kind)),
            }
        }

        match self.kind {
            CacheKind::None => Ok(Arc::new(NoCacheManager)),
            CacheKind::InMemory => Ok(Arc::new(match ttl {
                Some(ttl) => InMemoryCacheManager::with_ttl(ttl),
                None => InMemoryCacheManager::new(),
            })),
            CacheKind::Lru => build_lru(capacity.unwrap_or(DEFAULT_LRU_CAPACITY), ttl),
        }
    }
}

#[cfg(feature = "lru-cache")]
fn build_lru(capacity: usize, ttl: Option<Duration>) -> Result<Arc<dyn CacheManager>, String> {
    let capacity = std::num::NonZeroUsize::new(capacity)
        .ok_or_else(|| "capacity must be greater than zero".to_string())?;
    let cache = super::LruCacheManager::new(capacity);
    Ok(Arc::new(match ttl {
        Some(ttl) => cache.with_ttl(ttl),
        None => cache,
    }))
}

#[cfg(not(feature = "lru-cache"))]
fn build_lru(_capacity: usize, _ttl: Option<Duration>) -> Result<Arc<dyn CacheManager>, String> {
    Err("built without the lru-cache feature".to_string())
}
