//! In-process named locks
//!
//! One mutex+condvar pair per key name, created on first use and dropped
//! once nobody holds or waits for it.

use super::{LockManager, LockRef};
use crate::error::{Error, Result};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Default)]
struct KeyLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl KeyLock {
    fn acquire(&self, deadline: Instant) -> bool {
        let mut held = self.held.lock();
        while *held {
            if self.released.wait_until(&mut held, deadline).timed_out() && *held {
                return false;
            }
        }
        *held = true;
        true
    }

    fn release(&self) {
        *self.held.lock() = false;
        self.released.notify_one();
    }
}

pub struct LocalLockManager {
    keys: DashMap<String, Arc<KeyLock>>,
    /// lock ref -> keys it holds, in acquisition order
    active: DashMap<LockRef, Vec<(String, Arc<KeyLock>)>>,
    next_ref: AtomicU64,
}

impl LocalLockManager {
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
            active: DashMap::new(),
            next_ref: AtomicU64::new(1),
        }
    }

    fn key_lock(&self, key: &str) -> Arc<KeyLock> {
        if let Some(kl) = self.keys.get(key) {
            return Arc::clone(kl.value());
        }
        Arc::clone(self.keys.entry(key.to_string()).or_default().value())
    }

    /// Releases one key and forgets it when no other holder or waiter has a handle.
    fn release(&self, key: &str, kl: Arc<KeyLock>) {
        kl.release();
        drop(kl);
        self.keys.remove_if(key, |_, kl| Arc::strong_count(kl) == 1);
    }

    #[cfg(test)]
    fn key_count(&self) -> usize {
        self.keys.len()
    }
}

impl Default for LocalLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager for LocalLockManager {
    fn guard_ids(&self, keys: &[String], timeout: Duration) -> Result<LockRef> {
        let mut sorted: Vec<&String> = keys.iter().collect();
        sorted.sort();
        sorted.dedup();

        let deadline = Instant::now() + timeout;
        let mut taken: Vec<(String, Arc<KeyLock>)> = Vec::with_capacity(sorted.len());
        for key in sorted {
            let kl = self.key_lock(key);
            if !kl.acquire(deadline) {
                drop(kl);
                self.keys.remove_if(key.as_str(), |_, kl| Arc::strong_count(kl) == 1);
                for (k, t) in taken.into_iter().rev() {
                    self.release(&k, t);
                }
                warn!(lock = %key, ?timeout, "timeout acquiring index lock");
                return Err(Error::LockTimeout(key.clone()));
            }
            taken.push((key.clone(), kl));
        }

        let id = self.next_ref.fetch_add(1, Ordering::Relaxed);
        self.active.insert(id, taken);
        Ok(id)
    }

    fn unguard(&self, lock: LockRef) {
        if let Some((_, taken)) = self.active.remove(&lock) {
            for (key, kl) in taken.into_iter().rev() {
                self.release(&key, kl);
            }
        }
    }

    fn held_count(&self) -> usize {
        self.active.iter().map(|e| e.value().len()).sum()
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_same_key_serializes() {
        let mgr = Arc::new(LocalLockManager::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mgr = Arc::clone(&mgr);
                let counter = Arc::clone(&counter);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let id = mgr.guard_ids(&["tenant".to_string()], Duration::from_secs(5)).unwrap();
                        let inside = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(inside, Ordering::SeqCst);
                        counter.fetch_sub(1, Ordering::SeqCst);
                        mgr.unguard(id);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.held_count(), 0);
    }

    #[test]
    fn test_timeout_releases_partial_guard() {
        let mgr = LocalLockManager::new();
        let held = mgr.guard_ids(&["b".to_string()], Duration::from_millis(10)).unwrap();

        let err = mgr
            .guard_ids(&["a".to_string(), "b".to_string()], Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, Error::LockTimeout(ref k) if k == "b"));

        // "a" was released after the failed attempt
        let a = mgr.guard_ids(&["a".to_string()], Duration::from_millis(10)).unwrap();
        mgr.unguard(a);
        mgr.unguard(held);
        assert_eq!(mgr.held_count(), 0);
    }

    #[test]
    fn test_released_keys_are_forgotten() {
        let mgr = Arc::new(LocalLockManager::new());
        let first = mgr.guard_ids(&["a".to_string(), "b".to_string()], Duration::from_millis(10)).unwrap();
        assert_eq!(mgr.key_count(), 2);

        // a waiter keeps "b" alive after the holder lets go
        let waiter = {
            let mgr = Arc::clone(&mgr);
            thread::spawn(move || {
                let id = mgr.guard_ids(&["b".to_string()], Duration::from_secs(5)).unwrap();
                mgr.unguard(id);
            })
        };
        thread::sleep(Duration::from_millis(20));
        mgr.unguard(first);
        waiter.join().unwrap();
        assert_eq!(mgr.key_count(), 0);

        let _ = mgr.guard_ids(&["c".to_string()], Duration::from_millis(10)).unwrap();
        let err = mgr.guard_ids(&["c".to_string()], Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, Error::LockTimeout(_)));
        assert_eq!(mgr.key_count(), 1);
    }

    #[test]
    fn test_different_keys_do_not_block() {
        let mgr = LocalLockManager::new();
        let a = mgr.guard_ids(&["a".to_string()], Duration::from_millis(10)).unwrap();
        let b = mgr.guard_ids(&["b".to_string()], Duration::from_millis(10)).unwrap();
        assert_eq!(mgr.held_count(), 2);
        mgr.unguard(a);
        mgr.unguard(b);
    }
}
