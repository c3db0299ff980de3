//! Index Health Module
//!
//! Read-only consistency audits over persisted indexes. Findings are the
//! normal result; only malformed keys and storage failures abort a scan.
//!
//! - filter indexes, both directions (`get_fltr_idx_health`)
//! - reverse filter indexes for every kind (`get_rev_fltr_idx_health`)
//! - account ↔ action plan membership (`get_account_action_plans_index_health`)
//! - destination ↔ reverse destination prefixes (`get_reverse_destinations_index_health`)
//!
//! Every scan owns its caches, sized by [`HealthArgs`], so one pass never
//! reads the same filter, bucket or object twice.

mod action_plans;
mod cache;
mod destinations;
mod filters;
mod reverse;

pub use cache::HealthCache;

use crate::index::object_index_keys;
use crate::keys::{concatenated_key, CATCH_ALL_KEY};
use crate::kind::{IndexPartition, ProfileKind};
use crate::error::{Error, Result};
use crate::store::DataStore;
use crate::types::{Filter, ProfileRecord, StringSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

// ============ ARGS ============

/// Sizing of one scan cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheArgs {
    /// Max entries; negative means unbounded, 0 disables the cache
    pub limit: i64,
    /// 0 means entries never expire
    pub ttl_ms: u64,
    /// Expire after `ttl_ms` from insertion instead of from last access
    pub static_ttl: bool,
}

impl Default for CacheArgs {
    fn default() -> Self {
        Self {
            limit: -1,
            ttl_ms: 0,
            static_ttl: false,
        }
    }
}

impl CacheArgs {
    pub fn disabled() -> Self {
        Self {
            limit: 0,
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn ttl_ms(mut self, ttl_ms: u64, static_ttl: bool) -> Self {
        self.ttl_ms = ttl_ms;
        self.static_ttl = static_ttl;
        self
    }

    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_ms > 0).then(|| Duration::from_millis(self.ttl_ms))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HealthArgs {
    pub filter_cache: CacheArgs,
    /// Index buckets, account plan lists and reverse destinations
    pub index_cache: CacheArgs,
    /// Profiles, action plans and destinations
    pub object_cache: CacheArgs,
}

// ============ REPLIES ============

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterIHReply {
    /// `tntCtx:objectID` found in a bucket but not in storage
    pub missing_objects: Vec<String>,
    /// `tntCtx:key` → objects expected in that bucket but absent
    pub missing_indexes: BTreeMap<String, Vec<String>>,
    /// `tntCtx:key` → objects present in that bucket without a supporting filter
    pub broken_indexes: BTreeMap<String, Vec<String>>,
    /// `tenant:filterID` → objects referencing a filter that does not exist
    pub missing_filters: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReverseFilterIHReply {
    pub missing_objects: Vec<String>,
    /// `tenant:objectID` → filters whose reverse index lacks the object
    pub missing_reverse_indexes: BTreeMap<String, Vec<String>>,
    /// `tenant:item` → filters whose reverse index lists an object that no longer uses them
    pub broken_reverse_indexes: BTreeMap<String, Vec<String>>,
    pub missing_filters: BTreeMap<String, Vec<String>>,
}

impl ReverseFilterIHReply {
    pub fn is_empty(&self) -> bool {
        self.missing_objects.is_empty()
            && self.missing_reverse_indexes.is_empty()
            && self.broken_reverse_indexes.is_empty()
            && self.missing_filters.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountActionPlanIHReply {
    /// account → plans listing it while the account index does not reference them
    pub missing_account_action_plans: BTreeMap<String, Vec<String>>,
    /// plan → accounts referencing it that it does not list; empty when the plan is gone
    pub broken_references: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReverseDestinationsIHReply {
    /// prefix → destinations owning it that the reverse entry lacks
    pub missing_reverse_destinations: BTreeMap<String, Vec<String>>,
    /// destination → prefixes pointing at it that it does not own; empty when gone
    pub broken_references: BTreeMap<String, Vec<String>>,
}

/// Findings accumulated during a scan; lists come out sorted and unique.
type Findings = BTreeMap<String, BTreeSet<String>>;

fn add_finding(findings: &mut Findings, key: String, item: impl Into<String>) {
    findings.entry(key).or_default().insert(item.into());
}

fn into_lists(findings: Findings) -> BTreeMap<String, Vec<String>> {
    findings
        .into_iter()
        .map(|(k, items)| (k, items.into_iter().collect()))
        .collect()
}

// ============ AUDITOR ============

/// Runs audits against one store.
pub struct IndexHealth<'a> {
    store: &'a dyn DataStore,
}

impl<'a> IndexHealth<'a> {
    pub fn new(store: &'a dyn DataStore) -> Self {
        Self { store }
    }

    /// Stored keys under `prefix`, with the prefix stripped.
    fn ids_for_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .store
            .get_keys_for_prefix(prefix)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(prefix).map(str::to_string))
            .collect())
    }
}

/// The three caches shared by the filter index audits.
struct FilterCaches<'a> {
    store: &'a dyn DataStore,
    filters: HealthCache<Filter>,
    indexes: HealthCache<StringSet>,
    objects: HealthCache<ProfileRecord>,
}

/// Keys an object is expected under, plus the filter IDs that could not be resolved.
struct ExpectedKeys {
    keys: BTreeSet<String>,
    missing_filters: Vec<String>,
}

impl<'a> FilterCaches<'a> {
    fn new(store: &'a dyn DataStore, args: &HealthArgs) -> Self {
        Self {
            store,
            filters: HealthCache::new(&args.filter_cache),
            indexes: HealthCache::new(&args.index_cache),
            objects: HealthCache::new(&args.object_cache),
        }
    }

    /// Unparsable inline filters count as missing.
    fn filter(&self, tenant: &str, id: &str) -> Result<Option<Arc<Filter>>> {
        let key = concatenated_key(&[tenant, id]);
        if Filter::is_inline_id(id) {
            return self
                .filters
                .get_or_load(&key, || Filter::from_inline(tenant, id).map_err(|_| Error::NotFound));
        }
        self.filters.get_or_load(&key, || self.store.get_filter(tenant, id))
    }

    fn bucket(&self, partition: IndexPartition, tnt_ctx: &str, key: &str) -> Result<Option<Arc<StringSet>>> {
        let cache_key = concatenated_key(&[partition.cache_id(), tnt_ctx, key]);
        self.indexes.get_or_load(&cache_key, || {
            self.store
                .get_indexes(partition, tnt_ctx, Some(key))?
                .remove(key)
                .ok_or(Error::NotFound)
        })
    }

    fn object(&self, kind: ProfileKind, tenant: &str, id: &str) -> Result<Option<Arc<ProfileRecord>>> {
        let cache_key = concatenated_key(&[kind.cache_id(), tenant, id]);
        self.objects
            .get_or_load(&cache_key, || self.store.get_profile(kind, tenant, id))
    }

    /// Catch-all is expected only when every filter resolved and none is indexable.
    fn expected_keys(&self, profile: &ProfileRecord) -> Result<ExpectedKeys> {
        let mut filters = Vec::with_capacity(profile.filter_ids.len());
        let mut missing_filters = Vec::new();
        for id in &profile.filter_ids {
            match self.filter(&profile.tenant, id)? {
                Some(f) => filters.push(f),
                None => missing_filters.push(id.clone()),
            }
        }
        let mut keys = object_index_keys(filters.iter().map(|f| &**f));
        if !missing_filters.is_empty() {
            keys.remove(CATCH_ALL_KEY);
        }
        Ok(ExpectedKeys { keys, missing_filters })
    }
}
