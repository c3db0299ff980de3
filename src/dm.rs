use crate::config::IndexConfig;
use crate::health::IndexHealth;
use crate::index::{EventMatcher, FilterIndexer};
use crate::kind::ProfileKind;
use crate::lock::{create_lock_manager, LockManager};
use crate::store::DataStore;
use crate::stores::{FilterStore, ProfileStore};
use std::sync::Arc;

/// Entry point owning the storage facade, the lock service and the index
/// settings. Components are handed out as cheap borrowing views.
pub struct DataManager {
    store: Arc<dyn DataStore>,
    locks: Arc<dyn LockManager>,
    config: IndexConfig,
}

impl DataManager {
    /// Lock service is picked from `config.lock_mode`.
    pub fn new(store: Arc<dyn DataStore>, config: IndexConfig) -> Self {
        let locks = create_lock_manager(config.lock_mode);
        Self::with_lock_manager(store, locks, config)
    }

    /// Shares a lock service with other managers writing the same store.
    pub fn with_lock_manager(store: Arc<dyn DataStore>, locks: Arc<dyn LockManager>, config: IndexConfig) -> Self {
        Self { store, locks, config }
    }

    pub fn store(&self) -> &dyn DataStore {
        &*self.store
    }

    pub fn lock_manager(&self) -> &dyn LockManager {
        &*self.locks
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    // --- Components ---
    pub fn indexer(&self) -> FilterIndexer<'_> {
        FilterIndexer::new(&*self.store, &*self.locks, self.config.locking_timeout())
    }

    pub fn matcher(&self) -> EventMatcher<'_> {
        EventMatcher::new(&*self.store, &self.config)
    }

    pub fn health(&self) -> IndexHealth<'_> {
        IndexHealth::new(&*self.store)
    }

    // --- Resource Accessors ---
    pub fn filters(&self) -> FilterStore<'_> {
        FilterStore::new(self)
    }

    pub fn profiles(&self, kind: ProfileKind) -> ProfileStore<'_> {
        ProfileStore::new(self, kind)
    }
}
