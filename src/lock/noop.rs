//! No-Op Lock Manager
//!
//! Never blocks. Use when a single writer owns the index (bulk loads, tests).

use super::{LockManager, LockRef};
use crate::error::Result;
use std::time::Duration;

pub struct NoOpLockManager;

impl NoOpLockManager {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoOpLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager for NoOpLockManager {
    fn guard_ids(&self, _keys: &[String], _timeout: Duration) -> Result<LockRef> {
        Ok(0)
    }

    fn unguard(&self, _lock: LockRef) {}

    fn held_count(&self) -> usize {
        0
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
