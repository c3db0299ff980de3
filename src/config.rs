//! Indexing configuration.
//!
//! # Example
//! ```ignore
//! use filterindex::config::{IndexConfig, LockMode};
//!
//! let cfg = IndexConfig::default().lock_mode(LockMode::Local).locking_timeout_ms(500);
//! let cfg = IndexConfig::from_json(r#"{"indexed_selects": false}"#)?;
//! ```

use crate::error::Result;
use serde::Deserialize;
use std::time::Duration;

/// How named index locks are taken - selectable at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum LockMode {
    /// In-process named mutexes (default)
    #[default]
    Local,
    /// No locking; single writer only
    Disabled,
}

impl LockMode {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "off" | "disabled" | "none" | "noop" => LockMode::Disabled,
            "local" | "mutex" | "in_process" | "on" => LockMode::Local,
            _ => LockMode::default(),
        }
    }
}

impl From<String> for LockMode {
    fn from(s: String) -> Self {
        LockMode::from_str(&s)
    }
}

/// Event fields looked up per index type. `None` means every field of the event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IndexedFields {
    pub string: Option<Vec<String>>,
    pub prefix: Option<Vec<String>>,
    pub suffix: Option<Vec<String>>,
}

impl IndexedFields {
    pub(crate) fn allows(list: &Option<Vec<String>>, field: &str) -> bool {
        list.as_ref().map_or(true, |l| l.iter().any(|f| f == field))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Max wait for a named index lock
    pub locking_timeout_ms: u64,
    pub lock_mode: LockMode,
    /// When false the matcher skips the index and returns every object in scope
    pub indexed_selects: bool,
    pub indexed_fields: IndexedFields,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            locking_timeout_ms: 2_000,
            lock_mode: LockMode::default(),
            indexed_selects: true,
            indexed_fields: IndexedFields::default(),
        }
    }
}

impl IndexConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn lock_mode(mut self, mode: LockMode) -> Self {
        self.lock_mode = mode;
        self
    }

    pub fn locking_timeout_ms(mut self, ms: u64) -> Self {
        self.locking_timeout_ms = ms;
        self
    }

    pub fn indexed_selects(mut self, on: bool) -> Self {
        self.indexed_selects = on;
        self
    }

    pub fn indexed_fields(mut self, fields: IndexedFields) -> Self {
        self.indexed_fields = fields;
        self
    }

    pub fn locking_timeout(&self) -> Duration {
        Duration::from_millis(self.locking_timeout_ms)
    }
}
