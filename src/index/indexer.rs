//! Forward and reverse index writer.

use super::builder::object_index_keys;
use crate::error::{optional, Error, Result};
use crate::keys::{concatenated_key, tenant_ctx};
use crate::kind::{IndexPartition, ProfileKind};
use crate::lock::{self, LockGuard, LockManager};
use crate::store::DataStore;
use crate::types::{Filter, IndexMap, StringSet};
use std::borrow::Cow;
use std::collections::btree_map::Entry;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnMissingFilter {
    /// Abort with `BrokenReference`
    Fail,
    /// Log and index without the filter
    Skip,
}

/// Resolves one filter ID of an object. Inline IDs are parsed in place and
/// `replacement` stands in for the stored copy of a filter being rewritten.
pub(crate) fn resolve_filter<'r>(
    store: &dyn DataStore,
    tenant: &str,
    filter_id: &str,
    replacement: Option<&'r Filter>,
) -> Result<Cow<'r, Filter>> {
    if Filter::is_inline_id(filter_id) {
        return Filter::from_inline(tenant, filter_id).map(Cow::Owned);
    }
    match replacement {
        Some(f) if f.tenant == tenant && f.id == filter_id => Ok(Cow::Borrowed(f)),
        _ => store.get_filter(tenant, filter_id).map(Cow::Owned),
    }
}

/// Member stored in a reverse index: `id`, or `id:ctx` for context kinds.
pub(crate) fn reverse_item(kind: ProfileKind, object_id: &str, context: &str) -> String {
    if kind.has_context() {
        concatenated_key(&[object_id, context])
    } else {
        object_id.to_string()
    }
}

/// Write path for filter indexes. Borrowed from a `DataManager`.
pub struct FilterIndexer<'a> {
    store: &'a dyn DataStore,
    locks: &'a dyn LockManager,
    timeout: Duration,
}

impl<'a> FilterIndexer<'a> {
    pub fn new(store: &'a dyn DataStore, locks: &'a dyn LockManager, timeout: Duration) -> Self {
        Self { store, locks, timeout }
    }

    pub(crate) fn store(&self) -> &'a dyn DataStore {
        self.store
    }

    pub(crate) fn guard(&self, keys: &[String]) -> Result<LockGuard<'a>> {
        lock::guard(self.locks, keys, self.timeout)
    }

    /// Reverse locks of the stored filters among `filter_ids`. While held,
    /// none of those filters can be rewritten, so an object's keys stay valid
    /// between computing and writing them.
    ///
    /// Lock order: reverse locks first, partition locks after.
    pub(crate) fn guard_filters<'f>(
        &self,
        tenant: &str,
        filter_ids: impl IntoIterator<Item = &'f String>,
    ) -> Result<LockGuard<'a>> {
        let keys: Vec<String> = filter_ids
            .into_iter()
            .filter(|id| !Filter::is_inline_id(id))
            .map(|id| IndexPartition::Reverse.lock_key(&concatenated_key(&[tenant, id])))
            .collect();
        self.guard(&keys)
    }

    /// Keys the object is expected under, given its filter IDs.
    pub(crate) fn object_keys(
        &self,
        kind: ProfileKind,
        tenant: &str,
        object_id: &str,
        filter_ids: &[String],
        replacement: Option<&Filter>,
        on_missing: OnMissingFilter,
    ) -> Result<BTreeSet<String>> {
        let mut filters = Vec::with_capacity(filter_ids.len());
        for filter_id in filter_ids {
            match resolve_filter(self.store, tenant, filter_id, replacement) {
                Ok(f) => filters.push(f),
                Err(Error::NotFound) if on_missing == OnMissingFilter::Skip => {
                    warn!(%kind, object = object_id, filter = %filter_id, "filter not found, indexing without it");
                }
                Err(Error::NotFound) => {
                    return Err(Error::BrokenReference {
                        kind: kind.cache_id().to_string(),
                        item_id: object_id.to_string(),
                        filter_id: filter_id.clone(),
                    })
                }
                Err(e) => return Err(e),
            }
        }
        Ok(object_index_keys(filters.iter().map(|f| &**f)))
    }

    /// Fails with `BrokenReference` on the first filter ID that does not resolve.
    pub fn check_references(&self, kind: ProfileKind, tenant: &str, object_id: &str, filter_ids: &[String]) -> Result<()> {
        self.object_keys(kind, tenant, object_id, filter_ids, None, OnMissingFilter::Fail)
            .map(|_| ())
    }

    /// Current bucket of one key, empty when the key does not exist yet.
    pub(crate) fn load_bucket(&self, partition: IndexPartition, tnt_ctx: &str, key: &str) -> Result<StringSet> {
        Ok(optional(self.store.get_indexes(partition, tnt_ctx, Some(key)))?
            .and_then(|mut found| found.remove(key))
            .unwrap_or_default())
    }

    // ============ OBJECT WRITES ============

    /// Adds an object to the forward index of `tenant[:context]` and to the
    /// reverse index of each stored filter it references.
    pub fn index_object(
        &self,
        kind: ProfileKind,
        tenant: &str,
        context: &str,
        object_id: &str,
        filter_ids: &[String],
    ) -> Result<()> {
        let _filters = self.guard_filters(tenant, filter_ids)?;
        self.index_object_held(kind, tenant, context, object_id, filter_ids)
    }

    pub(crate) fn index_object_held(
        &self,
        kind: ProfileKind,
        tenant: &str,
        context: &str,
        object_id: &str,
        filter_ids: &[String],
    ) -> Result<()> {
        let keys = self.object_keys(kind, tenant, object_id, filter_ids, None, OnMissingFilter::Fail)?;
        self.apply_delta(kind, &tenant_ctx(tenant, context), object_id, &BTreeSet::new(), &keys)?;
        let item = reverse_item(kind, object_id, context);
        self.edit_reverse(kind, tenant, &item, filter_ids, true)
    }

    /// Drops an object from every bucket it is expected under and from the
    /// reverse indexes of its filters. Filters deleted meanwhile are skipped.
    pub fn remove_object(
        &self,
        kind: ProfileKind,
        tenant: &str,
        context: &str,
        object_id: &str,
        filter_ids: &[String],
    ) -> Result<()> {
        let _filters = self.guard_filters(tenant, filter_ids)?;
        self.remove_object_held(kind, tenant, context, object_id, filter_ids)
    }

    pub(crate) fn remove_object_held(
        &self,
        kind: ProfileKind,
        tenant: &str,
        context: &str,
        object_id: &str,
        filter_ids: &[String],
    ) -> Result<()> {
        let keys = self.object_keys(kind, tenant, object_id, filter_ids, None, OnMissingFilter::Skip)?;
        self.apply_delta(kind, &tenant_ctx(tenant, context), object_id, &keys, &BTreeSet::new())?;
        let item = reverse_item(kind, object_id, context);
        self.edit_reverse(kind, tenant, &item, filter_ids, false)
    }

    /// Applies the change of an object's filter list. `old = None` means the
    /// object is new in this scope.
    pub fn update_object_indexes(
        &self,
        kind: ProfileKind,
        tenant: &str,
        context: &str,
        object_id: &str,
        old_filter_ids: Option<&[String]>,
        new_filter_ids: &[String],
    ) -> Result<()> {
        let old = old_filter_ids.unwrap_or_default();
        let _filters = self.guard_filters(tenant, old.iter().chain(new_filter_ids))?;
        self.update_object_indexes_held(kind, tenant, context, object_id, old_filter_ids, new_filter_ids)
    }

    /// [`update_object_indexes`](Self::update_object_indexes) for a caller
    /// holding [`guard_filters`](Self::guard_filters) over the old and new IDs.
    pub(crate) fn update_object_indexes_held(
        &self,
        kind: ProfileKind,
        tenant: &str,
        context: &str,
        object_id: &str,
        old_filter_ids: Option<&[String]>,
        new_filter_ids: &[String],
    ) -> Result<()> {
        let Some(old_filter_ids) = old_filter_ids else {
            return self.index_object_held(kind, tenant, context, object_id, new_filter_ids);
        };
        if old_filter_ids.is_empty() && new_filter_ids.is_empty() {
            return Ok(());
        }

        let new_keys = self.object_keys(kind, tenant, object_id, new_filter_ids, None, OnMissingFilter::Fail)?;
        let old_keys = self.object_keys(kind, tenant, object_id, old_filter_ids, None, OnMissingFilter::Skip)?;

        let old_ids: BTreeSet<&String> = old_filter_ids.iter().collect();
        let new_ids: BTreeSet<&String> = new_filter_ids.iter().collect();
        let removed: Vec<String> = old_ids.difference(&new_ids).map(|s| (*s).clone()).collect();
        let added: Vec<String> = new_ids.difference(&old_ids).map(|s| (*s).clone()).collect();
        let to_remove: BTreeSet<String> = old_keys.difference(&new_keys).cloned().collect();
        let to_add: BTreeSet<String> = new_keys.difference(&old_keys).cloned().collect();

        if removed.is_empty() && added.is_empty() && to_remove.is_empty() && to_add.is_empty() {
            debug!(%kind, object = object_id, "filter list unchanged");
            return Ok(());
        }

        self.apply_delta(kind, &tenant_ctx(tenant, context), object_id, &to_remove, &to_add)?;
        let item = reverse_item(kind, object_id, context);
        self.edit_reverse(kind, tenant, &item, &removed, false)?;
        self.edit_reverse(kind, tenant, &item, &added, true)
    }

    /// Rebuilds the forward index of one scope.
    ///
    /// `ids = None` recomputes every stored object of the tenant and replaces
    /// the partition, so stale keys disappear. `Some(ids)` merges only those
    /// objects into the existing buckets. Returns the `tntCtx:key` entries written.
    pub fn compute_indexes(
        &self,
        kind: ProfileKind,
        tenant: &str,
        context: &str,
        ids: Option<&[String]>,
    ) -> Result<BTreeSet<String>> {
        let tnt_ctx = tenant_ctx(tenant, context);
        let partition = IndexPartition::Filter(kind);
        let merge = ids.is_some();
        let ids: Vec<String> = match ids {
            Some(ids) => ids.to_vec(),
            None => self.store.get_object_ids(kind, tenant)?,
        };

        let _guard = self.guard(&[partition.lock_key(&tnt_ctx)])?;
        let mut indexes = IndexMap::new();
        let mut touched = BTreeSet::new();
        for id in &ids {
            let Some(profile) = optional(self.store.get_profile(kind, tenant, id))? else {
                warn!(%kind, tenant, object = %id, "object not found, not indexed");
                continue;
            };
            if !profile.index_contexts().iter().any(|c| c == context) {
                continue;
            }
            let keys = self.object_keys(kind, tenant, id, &profile.filter_ids, None, OnMissingFilter::Fail)?;
            for key in keys {
                touched.insert(concatenated_key(&[&tnt_ctx, &key]));
                let bucket = match indexes.entry(key) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        let current = if merge {
                            self.load_bucket(partition, &tnt_ctx, e.key())?
                        } else {
                            StringSet::default()
                        };
                        e.insert(current)
                    }
                };
                bucket.insert(id.clone());
            }
        }
        self.store.set_indexes(partition, &tnt_ctx, &indexes, merge)?;
        info!(%kind, tnt_ctx = %tnt_ctx, objects = ids.len(), keys = indexes.len(), merge, "computed filter indexes");
        Ok(touched)
    }

    // ============ INTERNALS ============

    /// Removes `object_id` from `remove` buckets and adds it to `add` buckets
    /// under the partition lock, in one `set_indexes` call.
    fn apply_delta(
        &self,
        kind: ProfileKind,
        tnt_ctx: &str,
        object_id: &str,
        remove: &BTreeSet<String>,
        add: &BTreeSet<String>,
    ) -> Result<()> {
        if remove.is_empty() && add.is_empty() {
            return Ok(());
        }
        let partition = IndexPartition::Filter(kind);
        let _guard = self.guard(&[partition.lock_key(tnt_ctx)])?;

        let mut delta = IndexMap::new();
        for key in remove.iter().chain(add) {
            let mut bucket = self.load_bucket(partition, tnt_ctx, key)?;
            if add.contains(key) {
                bucket.insert(object_id.to_string());
            } else {
                bucket.remove(object_id);
            }
            delta.insert(key.clone(), bucket);
        }
        self.store.set_indexes(partition, tnt_ctx, &delta, true)?;
        debug!(%kind, tnt_ctx, object = object_id, removed = remove.len(), added = add.len(), "updated filter indexes");
        Ok(())
    }

    /// Adds or removes `item` in the reverse index of every stored filter.
    /// The caller holds the reverse locks of `filter_ids`.
    fn edit_reverse(&self, kind: ProfileKind, tenant: &str, item: &str, filter_ids: &[String], insert: bool) -> Result<()> {
        for filter_id in filter_ids.iter().filter(|id| !Filter::is_inline_id(id)) {
            let tnt_fltr = concatenated_key(&[tenant, filter_id]);
            let mut bucket = self.load_bucket(IndexPartition::Reverse, &tnt_fltr, kind.cache_id())?;
            let changed = if insert {
                bucket.insert(item.to_string())
            } else {
                bucket.remove(item)
            };
            if !changed {
                continue;
            }
            let update = IndexMap::from([(kind.cache_id().to_string(), bucket)]);
            self.store.set_indexes(IndexPartition::Reverse, &tnt_fltr, &update, true)?;
        }
        Ok(())
    }
}
