// filterindex v0.4.0 - Inverted Filter Indexes for Tenant-Scoped Profiles
// Index maintenance, event matching and consistency audits

pub mod config;
pub mod error;
pub mod event;
pub mod keys;
pub mod kind;
pub mod types;
pub mod lock;
pub mod store;
pub mod index;
pub mod health;
pub mod dm;
pub mod stores;

// Re-export main types
pub use config::{IndexConfig, IndexedFields, LockMode};
pub use dm::DataManager;
pub use error::{Error, Result};
pub use event::FlatEvent;
pub use health::{
    AccountActionPlanIHReply, CacheArgs, FilterIHReply, HealthArgs, IndexHealth, ReverseDestinationsIHReply,
    ReverseFilterIHReply,
};
pub use index::{EventMatcher, FilterIndexer};
pub use kind::{IndexPartition, ProfileKind};
pub use lock::{LocalLockManager, LockManager, NoOpLockManager};
pub use store::{DataStore, MemoryStore};
pub use stores::{FilterStore, ProfileStore};
pub use types::{ActionPlan, Destination, Filter, FilterRule, IndexMap, ProfileRecord, RuleType, StringSet};
