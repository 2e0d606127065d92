use super::{CacheKind, CacheManager, CachedInstance};
use crate::uri::Uri;

/// Cache that stores nothing. Used when caching is disabled or a
/// configured cache could not be built.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCacheManager;

impl CacheManager for NoCacheManager {
    fn put(&self, _uri: &Uri, _instance: CachedInstance) {}

    fn has(&self, _uri: &Uri) -> bool {
        false
    }

    fn get(&self, _uri: &Uri) -> Option<CachedInstance> {
        None
    }

    fn remove(&self, _uri: &Uri) {}

    fn kind(&self) -> CacheKind {
        CacheKind::None
    }
}
