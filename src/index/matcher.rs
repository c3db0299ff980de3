//! Candidate lookup for an event.
//!
//! The result is a shortlist: every returned ID still has to pass full
//! filter evaluation, since non-indexable rules are not represented here.

use crate::config::{IndexConfig, IndexedFields};
use crate::error::{optional, Error, Result};
use crate::event::FlatEvent;
use crate::keys::{concatenated_key, tenant_ctx, value_prefixes, value_suffixes, CATCH_ALL_KEY};
use crate::kind::{IndexPartition, ProfileKind};
use crate::store::DataStore;
use crate::types::{RuleType, StringSet};
use tracing::trace;

pub struct EventMatcher<'a> {
    store: &'a dyn DataStore,
    config: &'a IndexConfig,
}

impl<'a> EventMatcher<'a> {
    pub fn new(store: &'a dyn DataStore, config: &'a IndexConfig) -> Self {
        Self { store, config }
    }

    /// IDs of `kind` objects in `tenant[:context]` that may match `event`.
    ///
    /// `NotFound` only when no index exists for the scope; an index without a
    /// hit yields an empty set.
    pub fn matching_item_ids_for_event(
        &self,
        kind: ProfileKind,
        event: &FlatEvent,
        tenant: &str,
        context: &str,
    ) -> Result<StringSet> {
        if !self.config.indexed_selects {
            return self.all_in_scope(kind, tenant, context);
        }
        let partition = IndexPartition::Filter(kind);
        let tnt_ctx = tenant_ctx(tenant, context);
        if !self.store.has_indexes(partition, &tnt_ctx)? {
            return Err(Error::NotFound);
        }

        let fields = &self.config.indexed_fields;
        let string_type = RuleType::String.as_str();
        let prefix_type = RuleType::Prefix.as_str();
        let suffix_type = RuleType::Suffix.as_str();

        let mut ids = StringSet::default();
        for (field, value) in event.iter() {
            if IndexedFields::allows(&fields.string, field) {
                self.collect(&mut ids, partition, &tnt_ctx, &concatenated_key(&[&*string_type, field, value]))?;
            }
            if IndexedFields::allows(&fields.prefix, field) {
                for prefix in value_prefixes(value) {
                    self.collect(&mut ids, partition, &tnt_ctx, &concatenated_key(&[&*prefix_type, field, prefix]))?;
                }
            }
            if IndexedFields::allows(&fields.suffix, field) {
                for suffix in value_suffixes(value) {
                    self.collect(&mut ids, partition, &tnt_ctx, &concatenated_key(&[&*suffix_type, field, suffix]))?;
                }
            }
        }
        self.collect(&mut ids, partition, &tnt_ctx, CATCH_ALL_KEY)?;
        trace!(%kind, tnt_ctx = %tnt_ctx, candidates = ids.len(), "matched event against index");
        Ok(ids)
    }

    fn collect(&self, ids: &mut StringSet, partition: IndexPartition, tnt_ctx: &str, key: &str) -> Result<()> {
        if let Some(found) = optional(self.store.get_indexes(partition, tnt_ctx, Some(key)))? {
            for bucket in found.into_values() {
                ids.extend(bucket);
            }
        }
        Ok(())
    }

    /// Full scan used when indexed selects are disabled.
    fn all_in_scope(&self, kind: ProfileKind, tenant: &str, context: &str) -> Result<StringSet> {
        let mut ids = StringSet::default();
        for id in self.store.get_object_ids(kind, tenant)? {
            let Some(profile) = optional(self.store.get_profile(kind, tenant, &id))? else {
                continue;
            };
            if profile.index_contexts().iter().any(|c| c == context) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }
}
