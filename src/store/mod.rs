//! Storage Facade
//!
//! The indexer, matcher and auditor never talk to a database directly; they go
//! through [`DataStore`]. Keys listed by `get_keys_for_prefix` use the layout:
//!
//! | category | key |
//! |---|---|
//! | filter | `ftr_` + `tenant:id` |
//! | profile | kind object prefix (`thp_`, `alp_`, ...) + `tenant:id` |
//! | forward index | kind index prefix (`tfi_`, `afi_`, ...) + `tntCtx:type:field:value` |
//! | reverse index | `fii_` + `tenant:filterID:` + kind cache ID |
//! | action plan | `apl_` + plan ID |
//! | account action plans | `aap_` + account ID |
//! | destination | `dst_` + destination ID |
//! | reverse destination | `rds_` + prefix |

mod memory;

pub use memory::MemoryStore;

use crate::error::{optional, Result};
use crate::keys::CONCATENATED_KEY_SEP;
use crate::kind::{IndexPartition, ProfileKind};
use crate::types::{ActionPlan, Destination, Filter, IndexMap, ProfileRecord};

/// Persistence contract consumed by the index subsystem.
///
/// Every getter returns `Error::NotFound` on a miss.
pub trait DataStore: Send + Sync {
    fn get_filter(&self, tenant: &str, id: &str) -> Result<Filter>;
    fn set_filter(&self, filter: &Filter) -> Result<()>;
    fn remove_filter(&self, tenant: &str, id: &str) -> Result<()>;

    fn get_profile(&self, kind: ProfileKind, tenant: &str, id: &str) -> Result<ProfileRecord>;
    fn set_profile(&self, profile: &ProfileRecord) -> Result<()>;
    fn remove_profile(&self, kind: ProfileKind, tenant: &str, id: &str) -> Result<()>;

    /// Reads one partition, or a single key of it when `key` is given.
    /// `NotFound` when the partition (or the key) holds nothing.
    fn get_indexes(&self, partition: IndexPartition, tnt_ctx: &str, key: Option<&str>) -> Result<IndexMap>;

    /// `merge = false` replaces the whole partition with `indexes`.
    /// `merge = true` replaces only the listed keys; an empty bucket deletes its key.
    /// One call is applied atomically.
    fn set_indexes(&self, partition: IndexPartition, tnt_ctx: &str, indexes: &IndexMap, merge: bool) -> Result<()>;

    fn remove_indexes(&self, partition: IndexPartition, tnt_ctx: &str) -> Result<()>;

    /// Full keys (prefix included) starting with `prefix`, sorted.
    fn get_keys_for_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    fn get_action_plan(&self, id: &str) -> Result<ActionPlan>;
    fn get_account_action_plans(&self, account_id: &str) -> Result<Vec<String>>;
    fn get_destination(&self, id: &str) -> Result<Destination>;
    fn get_reverse_destination(&self, prefix: &str) -> Result<Vec<String>>;

    /// Whether any index was ever built for the partition.
    fn has_indexes(&self, partition: IndexPartition, tnt_ctx: &str) -> Result<bool> {
        Ok(optional(self.get_indexes(partition, tnt_ctx, None))?.is_some())
    }

    /// IDs of every stored object of `kind` in `tenant`.
    fn get_object_ids(&self, kind: ProfileKind, tenant: &str) -> Result<Vec<String>> {
        let prefix = format!("{}{}{}", kind.object_prefix(), tenant, CONCATENATED_KEY_SEP);
        Ok(self
            .get_keys_for_prefix(&prefix)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }
}
