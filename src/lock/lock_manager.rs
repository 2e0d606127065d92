use std::sync::Arc;

use super::{Lock, LockError};

/// Factory for per-key locks.
///
/// The store asks for one lock per URI so that concurrent reads and writes
/// of the same entity are serialized while distinct URIs proceed in
/// parallel.
pub trait LockManager: Send + Sync {
    /// The concrete lock type returned by this manager.
    type Lock: Lock;

    /// Get (or create) the lock for `key`.
    ///
    /// Repeated calls with the same key must return the same logical lock.
    fn get_lock(&self, key: &str) -> Result<Arc<Self::Lock>, LockError>;

    /// Forget the lock for `key` if nobody holds or waits on it.
    fn release_idle(&self, _key: &str) -> Result<(), LockError> {
        Ok(())
    }
}
