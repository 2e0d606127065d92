use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use super::{Lock, LockError, LockManager};

/// Per-URI lock for a single process. Waiters park on a `Condvar` until
/// the holder unlocks or their deadline passes.
pub struct InMemoryLock {
    state: Mutex<bool>,
    wake: Condvar,
}

impl InMemoryLock {
    pub fn new() -> Self {
        InMemoryLock {
            state: Mutex::new(false),
            wake: Condvar::new(),
        }
    }
}

impl Default for InMemoryLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock for InMemoryLock {
    fn lock_until(&self, deadline: Option<Instant>) -> Result<(), LockError> {
        let mut locked = self
            .state
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))?;
        while *locked {
            locked = match deadline {
                None => self
                    .wake
                    .wait(locked)
                    .map_err(|e| LockError::Poisoned(e.to_string()))?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(LockError::TimedOut("in-memory lock".into()));
                    }
                    self.wake
                        .wait_timeout(locked, deadline - now)
                        .map_err(|e| LockError::Poisoned(e.to_string()))?
                        .0
                }
            };
        }
        *locked = true;
        Ok(())
    }

    fn try_lock(&self) -> Result<bool, LockError> {
        let mut locked = self
            .state
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))?;
        if *locked {
            Ok(false)
        } else {
            *locked = true;
            Ok(true)
        }
    }

    fn unlock(&self) -> Result<(), LockError> {
        let mut locked = self
            .state
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))?;
        if *locked {
            *locked = false;
            self.wake.notify_one();
        }
        Ok(())
    }

    fn is_locked(&self) -> Result<bool, LockError> {
        self.state
            .lock()
            .map(|locked| *locked)
            .map_err(|e| LockError::Poisoned(e.to_string()))
    }
}

/// Hands out one [`InMemoryLock`] per key. Keys are dropped again by
/// `release_idle`, so the map only grows with the URIs in flight.
pub struct InMemoryLockManager {
    locks: Mutex<HashMap<String, Arc<InMemoryLock>>>,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        InMemoryLockManager {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager for InMemoryLockManager {
    type Lock = InMemoryLock;

    fn get_lock(&self, key: &str) -> Result<Arc<InMemoryLock>, LockError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| LockError::Poisoned("lock manager map poisoned".into()))?;
        Ok(locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(InMemoryLock::new()))
            .clone())
    }

    fn release_idle(&self, key: &str) -> Result<(), LockError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| LockError::Poisoned("lock manager map poisoned".into()))?;
        // Only the map holds a reference: no holder, no waiter.
        let idle = match locks.get(key) {
            Some(lock) => Arc::strong_count(lock) == 1 && !lock.is_locked()?,
            None => false,
        };
        if idle {
            locks.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn try_lock_reports_holder() {
        let lock = InMemoryLock::new();
        assert!(!lock.is_locked().unwrap());
        assert!(lock.try_lock().unwrap());
        assert!(!lock.try_lock().unwrap());
        assert!(lock.is_locked().unwrap());

        lock.unlock().unwrap();
        lock.unlock().unwrap();
        assert!(!lock.is_locked().unwrap());
    }

    #[test]
    fn lock_until_times_out_while_held() {
        let lock = InMemoryLock::new();
        lock.lock().unwrap();
        let deadline = Instant::now() + Duration::from_millis(20);
        let err = lock.lock_until(Some(deadline)).unwrap_err();
        assert!(matches!(err, LockError::TimedOut(_)));
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn waiter_wakes_on_unlock() {
        let lock = Arc::new(InMemoryLock::new());
        lock.lock().unwrap();

        let waiter = {
            let lock = lock.clone();
            thread::spawn(move || {
                lock.lock_until(Some(Instant::now() + Duration::from_secs(5)))
                    .unwrap();
                lock.unlock().unwrap();
            })
        };
        thread::sleep(Duration::from_millis(10));
        lock.unlock().unwrap();
        waiter.join().unwrap();
    }

    #[test]
    fn lock_serializes_critical_sections() {
        let lock = Arc::new(InMemoryLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let inside = inside.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        lock.lock().unwrap();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                        lock.unlock().unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn one_lock_per_key() {
        let manager = InMemoryLockManager::new();
        let a = manager.get_lock("plot:http://example.org/plot/a").unwrap();
        let again = manager.get_lock("plot:http://example.org/plot/a").unwrap();
        let b = manager.get_lock("plot:http://example.org/plot/b").unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn release_idle_keeps_referenced_locks() {
        let manager = InMemoryLockManager::new();
        let held = manager.get_lock("a").unwrap();
        manager.release_idle("a").unwrap();
        assert_eq!(manager.len(), 1);

        drop(held);
        manager.release_idle("a").unwrap();
        assert!(manager.is_empty());

        manager.release_idle("never-created").unwrap();
    }
}
