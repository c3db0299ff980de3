//! Incremental index maintenance when a stored filter is rewritten in place.
//!
//! Only the key delta is applied. Objects are found through the reverse index
//! of the filter, so nothing outside the affected partitions is read.

use super::builder::filter_index_keys;
use super::indexer::{FilterIndexer, OnMissingFilter};
use crate::error::{optional, Result};
use crate::keys::{split_item_context, tenant_ctx, CATCH_ALL_KEY};
use crate::kind::{IndexPartition, ProfileKind};
use crate::types::{Filter, IndexMap};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Objects referencing a filter, keyed by (kind, context).
type AffectedObjects = BTreeMap<(ProfileKind, String), BTreeSet<String>>;

impl FilterIndexer<'_> {
    /// Moves every object that references `new` from the keys the old rules
    /// produced to the keys the new rules produce.
    ///
    /// A rewrite that neither drops nor adds a key touches no storage.
    pub fn update_filter_indexes(&self, old: Option<&Filter>, new: &Filter) -> Result<()> {
        let _reverse_guard = self.guard(&[IndexPartition::Reverse.lock_key(&new.tenant_id())])?;
        self.apply_filter_change(old, new, || Ok(()))
    }

    /// Body of [`update_filter_indexes`](Self::update_filter_indexes) for a
    /// caller that already holds the reverse lock of `new`.
    ///
    /// `persist` runs once the index writes landed, before the partition locks
    /// are released. It is not called when computing or writing the indexes fails.
    pub(crate) fn apply_filter_change(
        &self,
        old: Option<&Filter>,
        new: &Filter,
        persist: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        let Some(old) = old else {
            return persist();
        };
        let old_keys = filter_index_keys(old);
        let new_keys = filter_index_keys(new);
        let to_remove: BTreeSet<String> = old_keys.difference(&new_keys).cloned().collect();
        let tnt_fltr = new.tenant_id();
        if to_remove.is_empty() && new_keys.is_subset(&old_keys) {
            debug!(filter = %tnt_fltr, "index keys unchanged");
            return persist();
        }

        let Some(reverse) = optional(self.store().get_indexes(IndexPartition::Reverse, &tnt_fltr, None))? else {
            debug!(filter = %tnt_fltr, "filter not referenced");
            return persist();
        };
        let affected = group_affected(&reverse)?;

        let lock_keys: Vec<String> = affected
            .keys()
            .map(|(kind, ctx)| IndexPartition::Filter(*kind).lock_key(&tenant_ctx(&new.tenant, ctx)))
            .collect();
        let _guard = self.guard(&lock_keys)?;

        // compute every partition first so a failed read leaves storage untouched
        let mut writes = Vec::with_capacity(affected.len());
        for ((kind, ctx), objects) in &affected {
            let tnt_ctx = tenant_ctx(&new.tenant, ctx);
            let update = self.reindex_objects(*kind, ctx, &tnt_ctx, objects, &to_remove, new)?;
            writes.push((IndexPartition::Filter(*kind), tnt_ctx, update));
        }
        for (partition, tnt_ctx, update) in &writes {
            self.store().set_indexes(*partition, tnt_ctx, update, true)?;
        }
        persist()?;

        info!(
            filter = %tnt_fltr,
            removed = to_remove.len(),
            partitions = writes.len(),
            "filter indexes updated"
        );
        Ok(())
    }

    fn reindex_objects(
        &self,
        kind: ProfileKind,
        context: &str,
        tnt_ctx: &str,
        objects: &BTreeSet<String>,
        to_remove: &BTreeSet<String>,
        new: &Filter,
    ) -> Result<IndexMap> {
        let partition = IndexPartition::Filter(kind);
        let tenant = new.tenant.as_str();

        // Objects leave the dropped keys and the catch-all, then rejoin the
        // buckets their current filters produce.
        let mut update = IndexMap::new();
        for key in to_remove.iter().map(String::as_str).chain([CATCH_ALL_KEY]) {
            let mut bucket = self.load_bucket(partition, tnt_ctx, key)?;
            bucket.retain(|id| !objects.contains(id));
            update.insert(key.to_string(), bucket);
        }

        for id in objects {
            let Some(profile) = optional(self.store().get_profile(kind, tenant, id))? else {
                warn!(%kind, tenant, object = %id, filter = %new.id, "object in reverse index not found");
                continue;
            };
            if !profile.index_contexts().iter().any(|c| c == context) {
                continue;
            }
            let keys = self.object_keys(kind, tenant, id, &profile.filter_ids, Some(new), OnMissingFilter::Skip)?;
            for key in keys {
                let bucket = match update.entry(key) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        let current = self.load_bucket(partition, tnt_ctx, e.key())?;
                        e.insert(current)
                    }
                };
                bucket.insert(id.clone());
            }
        }
        Ok(update)
    }
}

fn group_affected(reverse: &IndexMap) -> Result<AffectedObjects> {
    let mut affected = AffectedObjects::new();
    for (cache_id, items) in reverse {
        let kind = ProfileKind::from_cache_id(cache_id)?;
        for item in items {
            let (id, ctx) = if kind.has_context() {
                split_item_context(item)?
            } else {
                (item.as_str(), "")
            };
            affected
                .entry((kind, ctx.to_string()))
                .or_default()
                .insert(id.to_string());
        }
    }
    Ok(affected)
}
