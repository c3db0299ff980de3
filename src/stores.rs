use crate::dm::DataManager;
use crate::error::{optional, Error, Result};
use crate::event::FlatEvent;
use crate::keys::{concatenated_key, META_ANY};
use crate::kind::{IndexPartition, ProfileKind};
use crate::types::{Filter, ProfileRecord, StringSet};
use tracing::debug;

// ============ FILTER STORE ============

/// Filter writes that keep every dependent index in step.
pub struct FilterStore<'dm>(&'dm DataManager);

impl<'dm> FilterStore<'dm> {
    pub(crate) fn new(dm: &'dm DataManager) -> Self {
        Self(dm)
    }

    pub fn get(&self, tenant: &str, id: &str) -> Result<Filter> {
        self.0.store().get_filter(tenant, id)
    }

    /// Moves the objects referencing the filter to the keys the new rules
    /// produce, then persists the filter. On error the stored filter is left
    /// as it was, so the call can be retried.
    pub fn set(&self, filter: &Filter) -> Result<()> {
        filter.validate()?;
        let indexer = self.0.indexer();
        let _guard = indexer.guard(&[IndexPartition::Reverse.lock_key(&filter.tenant_id())])?;
        let old = optional(self.0.store().get_filter(&filter.tenant, &filter.id))?;
        indexer.apply_filter_change(old.as_ref(), filter, || self.0.store().set_filter(filter))
    }

    /// Refused with `FilterInUse` while any object still references the filter.
    pub fn remove(&self, tenant: &str, id: &str) -> Result<()> {
        let tnt_fltr = concatenated_key(&[tenant, id]);
        let indexer = self.0.indexer();
        let _guard = indexer.guard(&[IndexPartition::Reverse.lock_key(&tnt_fltr)])?;
        if let Some(reverse) = optional(self.0.store().get_indexes(IndexPartition::Reverse, &tnt_fltr, None))? {
            let mut items: Vec<String> = reverse
                .iter()
                .flat_map(|(cache_id, bucket)| bucket.iter().map(move |item| concatenated_key(&[cache_id, item])))
                .collect();
            if !items.is_empty() {
                items.sort();
                return Err(Error::FilterInUse { filter: tnt_fltr, items });
            }
        }
        self.0.store().remove_indexes(IndexPartition::Reverse, &tnt_fltr)?;
        self.0.store().remove_filter(tenant, id)
    }
}

// ============ PROFILE STORE ============

/// Indexed objects of one kind.
pub struct ProfileStore<'dm> {
    dm: &'dm DataManager,
    kind: ProfileKind,
}

impl<'dm> ProfileStore<'dm> {
    pub(crate) fn new(dm: &'dm DataManager, kind: ProfileKind) -> Self {
        Self { dm, kind }
    }

    pub fn get(&self, tenant: &str, id: &str) -> Result<ProfileRecord> {
        self.dm.store().get_profile(self.kind, tenant, id)
    }

    /// Re-indexes the object in every context it is scoped to, then persists it.
    ///
    /// Fails with `BrokenReference` before writing anything if a filter is
    /// missing. The filters of the old and new version stay locked until the
    /// object is stored. A failed call leaves the old object in place, and a
    /// retry diffs against it again.
    pub fn set(&self, profile: &ProfileRecord) -> Result<()> {
        if profile.kind != self.kind {
            return Err(Error::UnsupportedIndexType(profile.kind.cache_id().to_string()));
        }
        let (tenant, id) = (profile.tenant.as_str(), profile.id.as_str());
        let indexer = self.dm.indexer();
        indexer.check_references(self.kind, tenant, id, &profile.filter_ids)?;
        let old = optional(self.dm.store().get_profile(self.kind, tenant, id))?;

        let old_ids = old.as_ref().map(|o| o.filter_ids.as_slice()).unwrap_or_default();
        let _filters = indexer.guard_filters(tenant, old_ids.iter().chain(&profile.filter_ids))?;
        let contexts = profile.index_contexts();
        let old_contexts = old.as_ref().map(|o| o.index_contexts()).unwrap_or_default();
        if let Some(old) = &old {
            for ctx in old_contexts.iter().filter(|c| !contexts.contains(c)) {
                indexer.remove_object_held(self.kind, tenant, ctx, id, &old.filter_ids)?;
            }
        }
        for ctx in &contexts {
            let old_ids = old
                .as_ref()
                .filter(|_| old_contexts.contains(ctx))
                .map(|o| o.filter_ids.as_slice());
            indexer.update_object_indexes_held(self.kind, tenant, ctx, id, old_ids, &profile.filter_ids)?;
        }
        self.dm.store().set_profile(profile)?;
        debug!(kind = %self.kind, object = %profile.tenant_id(), contexts = contexts.len(), "stored profile");
        Ok(())
    }

    pub fn remove(&self, tenant: &str, id: &str) -> Result<()> {
        let profile = self.get(tenant, id)?;
        let indexer = self.dm.indexer();
        let _filters = indexer.guard_filters(tenant, &profile.filter_ids)?;
        for ctx in profile.index_contexts() {
            indexer.remove_object_held(self.kind, tenant, &ctx, id, &profile.filter_ids)?;
        }
        self.dm.store().remove_profile(self.kind, tenant, id)
    }

    /// Candidate IDs for `event`. Context kinds also pick up objects scoped
    /// to `*any`; `NotFound` only when neither scope has an index.
    pub fn matching_ids(&self, event: &FlatEvent, tenant: &str, context: &str) -> Result<StringSet> {
        let matcher = self.dm.matcher();
        if !self.kind.has_context() {
            return matcher.matching_item_ids_for_event(self.kind, event, tenant, "");
        }
        let context = if context.is_empty() { META_ANY } else { context };
        let in_context = optional(matcher.matching_item_ids_for_event(self.kind, event, tenant, context))?;
        if context == META_ANY {
            return in_context.ok_or(Error::NotFound);
        }
        let in_any = optional(matcher.matching_item_ids_for_event(self.kind, event, tenant, META_ANY))?;
        match (in_context, in_any) {
            (None, None) => Err(Error::NotFound),
            (Some(ids), None) | (None, Some(ids)) => Ok(ids),
            (Some(mut ids), Some(any)) => {
                ids.extend(any);
                Ok(ids)
            }
        }
    }
}
