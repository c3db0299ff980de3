//! Named Lock Module
//!
//! Advisory mutual exclusion keyed by string. Index writers take the region
//! `partition+tntCtx` before a read-modify-write of a forward index and
//! `reverse+tenant:filterID` before touching a reverse index, so edits to
//! different filters or partitions never block each other.
//!
//! # Example
//! ```ignore
//! use filterindex::lock::{create_lock_manager, with_lock};
//! use filterindex::config::LockMode;
//!
//! let locks = create_lock_manager(LockMode::Local);
//! with_lock(&*locks, "*threshold_filter_indexescgrates.org", timeout, || Ok(()))?;
//! ```

mod local;
mod noop;

pub use local::LocalLockManager;
pub use noop::NoOpLockManager;

use crate::config::LockMode;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Handle of one successful `guard_ids` call.
pub type LockRef = u64;

/// Named lock service.
///
/// Implementations:
/// - `NoOpLockManager`: never blocks (single writer)
/// - `LocalLockManager`: in-process named mutexes
pub trait LockManager: Send + Sync {
    /// Acquires every key, waiting at most `timeout` for each.
    /// Keys are taken in sorted order so overlapping guards cannot deadlock.
    fn guard_ids(&self, keys: &[String], timeout: Duration) -> Result<LockRef>;

    /// Releases all keys taken by `lock`.
    fn unguard(&self, lock: LockRef);

    /// Number of keys currently held
    fn held_count(&self) -> usize;

    fn is_enabled(&self) -> bool;
}

/// Releases its keys when dropped.
pub struct LockGuard<'a> {
    manager: &'a dyn LockManager,
    lock: LockRef,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.manager.unguard(self.lock);
    }
}

pub fn guard<'a>(manager: &'a dyn LockManager, keys: &[String], timeout: Duration) -> Result<LockGuard<'a>> {
    let lock = manager.guard_ids(keys, timeout)?;
    Ok(LockGuard { manager, lock })
}

/// Runs `f` while holding `key`.
pub fn with_lock<T>(
    manager: &dyn LockManager,
    key: &str,
    timeout: Duration,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let _guard = guard(manager, &[key.to_string()], timeout)?;
    f()
}

/// Create a lock manager based on mode
pub fn create_lock_manager(mode: LockMode) -> Arc<dyn LockManager> {
    match mode {
        LockMode::Disabled => Arc::new(NoOpLockManager::new()),
        LockMode::Local => Arc::new(LocalLockManager::new()),
    }
}
