//! Reverse filter index audit across every kind.

use super::{add_finding, into_lists, FilterCaches, Findings, HealthArgs, IndexHealth, ReverseFilterIHReply};
use crate::error::{Error, Result};
use crate::index::reverse_item;
use crate::keys::{concatenated_key, split_item_context, TenantId, CONCATENATED_KEY_SEP, REVERSE_FILTER_INDEX_PREFIX};
use crate::kind::{IndexPartition, ProfileKind};
use crate::types::Filter;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// One persisted reverse index: `fii_tenant:filterID:cacheID`.
struct ReverseKey {
    tenant: String,
    filter_id: String,
    kind: ProfileKind,
}

impl ReverseKey {
    fn parse(raw: &str) -> Result<Self> {
        let malformed = || Error::MalformedKey(raw.to_string());
        let (tenant, rest) = raw.split_once(CONCATENATED_KEY_SEP).ok_or_else(malformed)?;
        let (filter_id, cache_id) = rest.rsplit_once(CONCATENATED_KEY_SEP).ok_or_else(malformed)?;
        if tenant.is_empty() || filter_id.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            tenant: tenant.to_string(),
            filter_id: filter_id.to_string(),
            kind: ProfileKind::from_cache_id(cache_id)?,
        })
    }

    fn tenant_filter(&self) -> String {
        concatenated_key(&[&self.tenant, &self.filter_id])
    }
}

impl IndexHealth<'_> {
    /// Audits reverse indexes for all kinds in parallel. Kinds without findings
    /// are left out; the map is keyed by the kind's index cache ID.
    pub fn get_rev_fltr_idx_health(&self, args: &HealthArgs) -> Result<BTreeMap<String, ReverseFilterIHReply>> {
        let caches = FilterCaches::new(self.store, args);
        let reverse_keys = self
            .ids_for_prefix(REVERSE_FILTER_INDEX_PREFIX)?
            .iter()
            .map(|raw| ReverseKey::parse(raw))
            .collect::<Result<Vec<_>>>()?;

        let reports = ProfileKind::ALL
            .par_iter()
            .map(|&kind| {
                self.reverse_health_for_kind(kind, &caches, &reverse_keys)
                    .map(|reply| (kind, reply))
            })
            .collect::<Result<Vec<_>>>()?;

        let reports: BTreeMap<String, ReverseFilterIHReply> = reports
            .into_iter()
            .filter(|(_, reply)| !reply.is_empty())
            .map(|(kind, reply)| (kind.cache_id().to_string(), reply))
            .collect();
        info!(kinds_with_findings = reports.len(), "reverse filter index health checked");
        Ok(reports)
    }

    fn reverse_health_for_kind(
        &self,
        kind: ProfileKind,
        caches: &FilterCaches<'_>,
        reverse_keys: &[ReverseKey],
    ) -> Result<ReverseFilterIHReply> {
        let mut missing_reverse = Findings::new();
        let mut broken_reverse = Findings::new();
        let mut missing_filters = Findings::new();
        let mut missing_objects = BTreeSet::new();

        // objects → reverse index of each stored filter they reference
        for raw in self.ids_for_prefix(kind.object_prefix())? {
            let tnt_id = TenantId::parse(&raw)?;
            let Some(profile) = caches.object(kind, &tnt_id.tenant, &tnt_id.id)? else {
                continue;
            };
            for filter_id in profile.filter_ids.iter().filter(|id| !Filter::is_inline_id(id)) {
                if caches.filter(&tnt_id.tenant, filter_id)?.is_none() {
                    add_finding(&mut missing_filters, concatenated_key(&[&tnt_id.tenant, filter_id]), &tnt_id.id);
                    continue;
                }
                let tnt_fltr = concatenated_key(&[&tnt_id.tenant, filter_id]);
                let bucket = caches.bucket(IndexPartition::Reverse, &tnt_fltr, kind.cache_id())?;
                let listed = profile.index_contexts().iter().all(|ctx| {
                    bucket
                        .as_ref()
                        .is_some_and(|b| b.contains(&reverse_item(kind, &tnt_id.id, ctx)))
                });
                if !listed {
                    add_finding(&mut missing_reverse, tnt_id.to_string(), filter_id.as_str());
                }
            }
        }

        // reverse index members → objects that still use the filter
        for rev in reverse_keys.iter().filter(|rev| rev.kind == kind) {
            let Some(bucket) = caches.bucket(IndexPartition::Reverse, &rev.tenant_filter(), kind.cache_id())? else {
                continue;
            };
            let filter_exists = caches.filter(&rev.tenant, &rev.filter_id)?.is_some();
            for item in bucket.iter() {
                let (id, ctx) = if kind.has_context() {
                    split_item_context(item)?
                } else {
                    (item.as_str(), "")
                };
                let Some(profile) = caches.object(kind, &rev.tenant, id)? else {
                    missing_objects.insert(concatenated_key(&[&rev.tenant, item]));
                    continue;
                };
                if !filter_exists {
                    add_finding(&mut missing_filters, rev.tenant_filter(), id);
                }
                let uses_filter = profile.filter_ids.contains(&rev.filter_id);
                let in_scope = profile.index_contexts().iter().any(|c| c == ctx);
                if !uses_filter || !in_scope {
                    add_finding(
                        &mut broken_reverse,
                        concatenated_key(&[&rev.tenant, item]),
                        rev.filter_id.as_str(),
                    );
                }
            }
        }

        Ok(ReverseFilterIHReply {
            missing_objects: missing_objects.into_iter().collect(),
            missing_reverse_indexes: into_lists(missing_reverse),
            broken_reverse_indexes: into_lists(broken_reverse),
            missing_filters: into_lists(missing_filters),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FilterIndexer;
    use crate::lock::NoOpLockManager;
    use crate::store::{DataStore, MemoryStore};
    use crate::types::{string_set, Filter, FilterRule, IndexMap, ProfileRecord};
    use std::time::Duration;

    const TNT: &str = "cgrates.org";

    fn store_with(profiles: &[ProfileRecord]) -> MemoryStore {
        let store = MemoryStore::new();
        let locks = NoOpLockManager::new();
        let idx = FilterIndexer::new(&store, &locks, Duration::ZERO);
        for id in ["FLTR_1", "FLTR_2"] {
            store
                .set_filter(&Filter::new(TNT, id, vec![FilterRule::new("*string", "~*req.Account", &["1001"])]))
                .unwrap();
        }
        for profile in profiles {
            store.set_profile(profile).unwrap();
            for ctx in profile.index_contexts() {
                idx.index_object(profile.kind, TNT, &ctx, &profile.id, &profile.filter_ids)
                    .unwrap();
            }
        }
        store
    }

    #[test]
    fn test_healthy_reverse_indexes() {
        let store = store_with(&[
            ProfileRecord::new(ProfileKind::Charger, TNT, "CH_1", &["FLTR_1", "*string:~*req.Tenant:x"]),
            ProfileRecord::new(ProfileKind::Dispatcher, TNT, "DSP_1", &["FLTR_1"]).with_contexts(&["*sessions"]),
        ]);
        let reply = IndexHealth::new(&store)
            .get_rev_fltr_idx_health(&HealthArgs::default())
            .unwrap();
        assert!(reply.is_empty(), "{reply:?}");
    }

    #[test]
    fn test_missing_and_broken_reverse() {
        let store = store_with(&[ProfileRecord::new(ProfileKind::Charger, TNT, "CH_1", &["FLTR_1"])]);
        // CH_1 now also references FLTR_2 without a reverse entry
        store
            .set_profile(&ProfileRecord::new(ProfileKind::Charger, TNT, "CH_1", &["FLTR_1", "FLTR_2"]))
            .unwrap();
        // FLTR_1 now lists only a deleted charger
        let rev = IndexMap::from([(
            "*charger_filter_indexes".to_string(),
            string_set(["CH_GONE"]),
        )]);
        store
            .set_indexes(IndexPartition::Reverse, "cgrates.org:FLTR_1", &rev, true)
            .unwrap();

        let reply = IndexHealth::new(&store)
            .get_rev_fltr_idx_health(&HealthArgs::default())
            .unwrap();
        let charger = &reply["*charger_filter_indexes"];
        assert_eq!(
            charger.missing_reverse_indexes["cgrates.org:CH_1"],
            vec!["FLTR_1", "FLTR_2"]
        );
        assert_eq!(charger.missing_objects, vec!["cgrates.org:CH_GONE"]);
        assert_eq!(reply.len(), 1);
    }

    #[test]
    fn test_deleted_filter_and_wrong_context() {
        let store = store_with(&[
            ProfileRecord::new(ProfileKind::Attribute, TNT, "ATTR_1", &["FLTR_1"]).with_contexts(&["*sessions"]),
            ProfileRecord::new(ProfileKind::Route, TNT, "RT_1", &["FLTR_2"]),
        ]);
        store.remove_filter(TNT, "FLTR_2").unwrap();
        let rev = IndexMap::from([(
            "*attribute_filter_indexes".to_string(),
            string_set(["ATTR_1:*sessions", "ATTR_1:*cdrs"]),
        )]);
        store
            .set_indexes(IndexPartition::Reverse, "cgrates.org:FLTR_1", &rev, true)
            .unwrap();

        let reply = IndexHealth::new(&store)
            .get_rev_fltr_idx_health(&HealthArgs::default())
            .unwrap();
        assert_eq!(
            reply["*attribute_filter_indexes"].broken_reverse_indexes["cgrates.org:ATTR_1:*cdrs"],
            vec!["FLTR_1"]
        );
        assert_eq!(
            reply["*route_filter_indexes"].missing_filters["cgrates.org:FLTR_2"],
            vec!["RT_1"]
        );
    }

    #[test]
    fn test_reverse_key_parse() {
        let k = ReverseKey::parse("cgrates.org:FLTR_1:*stat_filter_indexes").unwrap();
        assert_eq!(k.tenant_filter(), "cgrates.org:FLTR_1");
        assert_eq!(k.kind, ProfileKind::StatQueue);
        assert!(matches!(ReverseKey::parse("cgrates.org"), Err(Error::MalformedKey(_))));
    }
}
