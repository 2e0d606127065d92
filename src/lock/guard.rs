use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use super::{Lock, LockError};

/// Holds a lock until dropped.
pub struct LockGuard<L: Lock + ?Sized> {
    lock: Arc<L>,
    key: String,
}

impl<L: Lock + ?Sized> LockGuard<L> {
    /// Wait for `lock` until `deadline`. A timeout reports `key`.
    pub fn acquire(lock: Arc<L>, key: &str, deadline: Option<Instant>) -> Result<Self, LockError> {
        lock.lock_until(deadline).map_err(|e| match e {
            LockError::TimedOut(_) => LockError::TimedOut(key.to_string()),
            other => other,
        })?;
        Ok(LockGuard {
            lock,
            key: key.to_string(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<L: Lock + ?Sized> Drop for LockGuard<L> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            warn!(key = %self.key, error = %e, "failed to release lock");
        }
    }
}
