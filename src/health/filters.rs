//! Forward filter index audit, object → index and index → object.

use super::{add_finding, into_lists, FilterCaches, FilterIHReply, Findings, HealthArgs, IndexHealth};
use crate::error::Result;
use crate::keys::{concatenated_key, split_filter_index, tenant_ctx, TenantId, CONCATENATED_KEY_SEP};
use crate::kind::{IndexPartition, ProfileKind};
use std::collections::BTreeSet;
use tracing::info;

/// Splits a partition name into tenant and context.
pub(super) fn split_scope(kind: ProfileKind, tnt_ctx: &str) -> (&str, &str) {
    if kind.has_context() {
        tnt_ctx.split_once(CONCATENATED_KEY_SEP).unwrap_or((tnt_ctx, ""))
    } else {
        (tnt_ctx, "")
    }
}

impl IndexHealth<'_> {
    /// Audits the forward index of `kind` against its stored objects.
    pub fn get_fltr_idx_health(&self, kind: ProfileKind, args: &HealthArgs) -> Result<FilterIHReply> {
        let caches = FilterCaches::new(self.store, args);
        let partition = IndexPartition::Filter(kind);
        let mut missing_indexes = Findings::new();
        let mut missing_filters = Findings::new();
        let mut broken_indexes = Findings::new();
        let mut missing_objects = BTreeSet::new();

        // every object must sit in each bucket its filters produce
        for raw in self.ids_for_prefix(kind.object_prefix())? {
            let tnt_id = TenantId::parse(&raw)?;
            let Some(profile) = caches.object(kind, &tnt_id.tenant, &tnt_id.id)? else {
                continue;
            };
            let expected = caches.expected_keys(&profile)?;
            for filter_id in &expected.missing_filters {
                add_finding(&mut missing_filters, concatenated_key(&[&tnt_id.tenant, filter_id]), &tnt_id.id);
            }
            for ctx in profile.index_contexts() {
                let tnt_ctx = tenant_ctx(&tnt_id.tenant, &ctx);
                for key in &expected.keys {
                    let indexed = caches
                        .bucket(partition, &tnt_ctx, key)?
                        .is_some_and(|bucket| bucket.contains(&tnt_id.id));
                    if !indexed {
                        add_finding(&mut missing_indexes, concatenated_key(&[&tnt_ctx, key]), &tnt_id.id);
                    }
                }
            }
        }

        // every bucket member must exist and still produce the key
        for data_id in self.ids_for_prefix(kind.index_prefix())? {
            let (tnt_ctx, idx_key) = split_filter_index(&data_id)?;
            let (tenant, context) = split_scope(kind, &tnt_ctx);
            let Some(bucket) = caches.bucket(partition, &tnt_ctx, &idx_key)? else {
                continue;
            };
            for item in bucket.iter() {
                let Some(profile) = caches.object(kind, tenant, item)? else {
                    missing_objects.insert(concatenated_key(&[&tnt_ctx, item]));
                    continue;
                };
                let in_scope = profile.index_contexts().iter().any(|c| c == context);
                if !in_scope || !caches.expected_keys(&profile)?.keys.contains(&idx_key) {
                    add_finding(&mut broken_indexes, concatenated_key(&[&tnt_ctx, &idx_key]), item.as_str());
                }
            }
        }

        info!(
            %kind,
            missing_objects = missing_objects.len(),
            missing_indexes = missing_indexes.len(),
            broken_indexes = broken_indexes.len(),
            missing_filters = missing_filters.len(),
            "filter index health checked"
        );
        Ok(FilterIHReply {
            missing_objects: missing_objects.into_iter().collect(),
            missing_indexes: into_lists(missing_indexes),
            broken_indexes: into_lists(broken_indexes),
            missing_filters: into_lists(missing_filters),
        })
    }
}
