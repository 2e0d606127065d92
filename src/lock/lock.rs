use std::time::Instant;

use super::LockError;

/// Exclusive lock guarding one key.
///
/// In-memory locks use `Mutex` + `Condvar`; a distributed store would back
/// this with advisory locks or leases.
pub trait Lock: Send + Sync {
    /// Acquire the lock, waiting at most until `deadline`.
    /// `None` waits forever.
    fn lock_until(&self, deadline: Option<Instant>) -> Result<(), LockError>;

    /// Acquire the lock, blocking until it becomes available.
    fn lock(&self) -> Result<(), LockError> {
        self.lock_until(None)
    }

    /// Non-blocking acquire; `Ok(false)` when someone else holds it.
    fn try_lock(&self) -> Result<bool, LockError>;

    /// Release the lock.
    fn unlock(&self) -> Result<(), LockError>;

    fn is_locked(&self) -> Result<bool, LockError>;
}
