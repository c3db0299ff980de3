//! In-memory DataStore
//!
//! Sharded maps (DashMap) per key category. Used by tests and by embedders that
//! keep their profile data in process.

use super::DataStore;
use crate::error::{Error, Result};
use crate::keys::{
    concatenated_key, ACCOUNT_ACTION_PLANS_PREFIX, ACTION_PLAN_PREFIX, CONCATENATED_KEY_SEP, DESTINATION_PREFIX,
    FILTER_PREFIX, REVERSE_DESTINATION_PREFIX,
};
use crate::kind::{IndexPartition, ProfileKind};
use crate::types::{ActionPlan, Destination, Filter, IndexMap, ProfileRecord};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    /// tenant:id -> filter
    filters: DashMap<String, Filter>,
    profiles: DashMap<(ProfileKind, String), ProfileRecord>,
    /// (partition, tntCtx) -> index key -> bucket
    indexes: DashMap<(IndexPartition, String), IndexMap>,
    action_plans: DashMap<String, ActionPlan>,
    account_action_plans: DashMap<String, Vec<String>>,
    destinations: DashMap<String, Destination>,
    reverse_destinations: DashMap<String, Vec<String>>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls served so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    // ============ NON-FILTER INDEXES ============

    pub fn set_action_plan(&self, plan: ActionPlan) {
        self.touch();
        self.action_plans.insert(plan.id.clone(), plan);
    }

    pub fn remove_action_plan(&self, id: &str) {
        self.touch();
        self.action_plans.remove(id);
    }

    pub fn set_account_action_plans(&self, account_id: &str, plan_ids: &[&str]) {
        self.touch();
        self.account_action_plans
            .insert(account_id.to_string(), plan_ids.iter().map(|p| p.to_string()).collect());
    }

    pub fn set_destination(&self, dest: Destination) {
        self.touch();
        self.destinations.insert(dest.id.clone(), dest);
    }

    pub fn set_reverse_destination(&self, prefix: &str, dest_ids: &[&str]) {
        self.touch();
        self.reverse_destinations
            .insert(prefix.to_string(), dest_ids.iter().map(|d| d.to_string()).collect());
    }

    fn all_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        keys.extend(self.filters.iter().map(|e| format!("{FILTER_PREFIX}{}", e.key())));
        keys.extend(
            self.profiles
                .iter()
                .map(|e| format!("{}{}", e.key().0.object_prefix(), e.key().1)),
        );
        for e in self.indexes.iter() {
            let (partition, tnt_ctx) = e.key();
            keys.extend(
                e.value()
                    .keys()
                    .map(|k| format!("{}{}{}{}", partition.prefix(), tnt_ctx, CONCATENATED_KEY_SEP, k)),
            );
        }
        keys.extend(self.action_plans.iter().map(|e| format!("{ACTION_PLAN_PREFIX}{}", e.key())));
        keys.extend(
            self.account_action_plans
                .iter()
                .map(|e| format!("{ACCOUNT_ACTION_PLANS_PREFIX}{}", e.key())),
        );
        keys.extend(self.destinations.iter().map(|e| format!("{DESTINATION_PREFIX}{}", e.key())));
        keys.extend(
            self.reverse_destinations
                .iter()
                .map(|e| format!("{REVERSE_DESTINATION_PREFIX}{}", e.key())),
        );
        keys
    }
}

impl DataStore for MemoryStore {
    fn get_filter(&self, tenant: &str, id: &str) -> Result<Filter> {
        self.filters
            .get(&concatenated_key(&[tenant, id]))
            .map(|f| f.clone())
            .ok_or(Error::NotFound)
    }

    fn set_filter(&self, filter: &Filter) -> Result<()> {
        self.touch();
        self.filters.insert(filter.tenant_id(), filter.clone());
        Ok(())
    }

    fn remove_filter(&self, tenant: &str, id: &str) -> Result<()> {
        self.touch();
        self.filters
            .remove(&concatenated_key(&[tenant, id]))
            .map(|_| ())
            .ok_or(Error::NotFound)
    }

    fn get_profile(&self, kind: ProfileKind, tenant: &str, id: &str) -> Result<ProfileRecord> {
        self.profiles
            .get(&(kind, concatenated_key(&[tenant, id])))
            .map(|p| p.clone())
            .ok_or(Error::NotFound)
    }

    fn set_profile(&self, profile: &ProfileRecord) -> Result<()> {
        self.touch();
        self.profiles
            .insert((profile.kind, profile.tenant_id()), profile.clone());
        Ok(())
    }

    fn remove_profile(&self, kind: ProfileKind, tenant: &str, id: &str) -> Result<()> {
        self.touch();
        self.profiles
            .remove(&(kind, concatenated_key(&[tenant, id])))
            .map(|_| ())
            .ok_or(Error::NotFound)
    }

    fn get_indexes(&self, partition: IndexPartition, tnt_ctx: &str, key: Option<&str>) -> Result<IndexMap> {
        let part = self
            .indexes
            .get(&(partition, tnt_ctx.to_string()))
            .ok_or(Error::NotFound)?;
        let out: IndexMap = match key {
            None => part.clone(),
            Some(k) => part
                .get(k)
                .map(|bucket| IndexMap::from([(k.to_string(), bucket.clone())]))
                .unwrap_or_default(),
        };
        if out.is_empty() {
            return Err(Error::NotFound);
        }
        Ok(out)
    }

    fn set_indexes(&self, partition: IndexPartition, tnt_ctx: &str, indexes: &IndexMap, merge: bool) -> Result<()> {
        self.touch();
        let pkey = (partition, tnt_ctx.to_string());
        if !merge {
            let fresh: IndexMap = indexes
                .iter()
                .filter(|(_, bucket)| !bucket.is_empty())
                .map(|(k, bucket)| (k.clone(), bucket.clone()))
                .collect();
            if fresh.is_empty() {
                self.indexes.remove(&pkey);
            } else {
                self.indexes.insert(pkey, fresh);
            }
            return Ok(());
        }

        let mut part = self.indexes.entry(pkey.clone()).or_default();
        for (k, bucket) in indexes {
            if bucket.is_empty() {
                part.remove(k);
            } else {
                part.insert(k.clone(), bucket.clone());
            }
        }
        let now_empty = part.is_empty();
        drop(part);
        if now_empty {
            self.indexes.remove_if(&pkey, |_, p| p.is_empty());
        }
        Ok(())
    }

    fn remove_indexes(&self, partition: IndexPartition, tnt_ctx: &str) -> Result<()> {
        self.touch();
        self.indexes.remove(&(partition, tnt_ctx.to_string()));
        Ok(())
    }

    fn get_keys_for_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .all_keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn get_action_plan(&self, id: &str) -> Result<ActionPlan> {
        self.action_plans.get(id).map(|p| p.clone()).ok_or(Error::NotFound)
    }

    fn get_account_action_plans(&self, account_id: &str) -> Result<Vec<String>> {
        self.account_action_plans
            .get(account_id)
            .map(|p| p.clone())
            .ok_or(Error::NotFound)
    }

    fn get_destination(&self, id: &str) -> Result<Destination> {
        self.destinations.get(id).map(|d| d.clone()).ok_or(Error::NotFound)
    }

    fn get_reverse_destination(&self, prefix: &str) -> Result<Vec<String>> {
        self.reverse_destinations
            .get(prefix)
            .map(|d| d.clone())
            .ok_or(Error::NotFound)
    }
}
