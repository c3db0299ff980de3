//! Tests for M2: Filter Rewrites
//! Covers TC-2.1, TC-2.2, TC-2.3
//!
//! Run individual tests with:
//! cargo test tc_2_1 -- --nocapture
//! cargo test m2_filter_updates -- --nocapture

use filterindex::{
    DataManager, DataStore, Filter, FilterRule, IndexConfig, IndexPartition, MemoryStore, ProfileKind, ProfileRecord,
};
use std::sync::Arc;

const TNT: &str = "cgrates.org";

fn setup_dm() -> (DataManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (DataManager::new(store.clone(), IndexConfig::default()), store)
}

fn account_filter(accounts: &[&str]) -> Filter {
    Filter::new(TNT, "FLTR_ACC", vec![FilterRule::new("*string", "~*req.Account", accounts)])
}

fn keys_of(store: &MemoryStore, kind: ProfileKind, tnt_ctx: &str) -> Vec<String> {
    store
        .get_indexes(IndexPartition::Filter(kind), tnt_ctx, None)
        .map(|m| m.into_keys().collect())
        .unwrap_or_default()
}

mod tc_2_1_noop_rewrite {
    use super::*;

    #[test]
    fn test_unchanged_keys_touch_no_index() {
        let (dm, store) = setup_dm();
        dm.filters().set(&account_filter(&["1001", "1002"])).unwrap();
        dm.profiles(ProfileKind::Threshold)
            .set(&ProfileRecord::new(ProfileKind::Threshold, TNT, "TH_1", &["FLTR_ACC"]))
            .unwrap();

        // same keys in another order, plus a rule that is never indexed
        let mut rewritten = account_filter(&["1002", "1001"]);
        rewritten.rules.push(FilterRule::new("*gte", "~*req.Usage", &["1m"]));
        let before = store.write_count();
        dm.filters().set(&rewritten).unwrap();
        println!("writes: {} -> {}", before, store.write_count());
        assert_eq!(store.write_count(), before + 1, "only the filter itself is written");
    }
}

mod tc_2_2_key_delta {
    use super::*;

    #[test]
    fn test_delta_applied_to_every_referencing_object() {
        let (dm, store) = setup_dm();
        dm.filters().set(&account_filter(&["A", "B"])).unwrap();
        for (kind, id) in [(ProfileKind::Threshold, "TH_1"), (ProfileKind::Charger, "CH_1")] {
            dm.profiles(kind)
                .set(&ProfileRecord::new(kind, TNT, id, &["FLTR_ACC"]))
                .unwrap();
        }
        dm.profiles(ProfileKind::Dispatcher)
            .set(
                &ProfileRecord::new(ProfileKind::Dispatcher, TNT, "DSP_1", &["FLTR_ACC"])
                    .with_contexts(&["*sessions", "*cdrs"]),
            )
            .unwrap();

        dm.filters().set(&account_filter(&["B", "C"])).unwrap();

        let expected = vec!["*string:*req.Account:B", "*string:*req.Account:C"];
        assert_eq!(keys_of(&store, ProfileKind::Threshold, TNT), expected);
        assert_eq!(keys_of(&store, ProfileKind::Charger, TNT), expected);
        assert_eq!(keys_of(&store, ProfileKind::Dispatcher, "cgrates.org:*sessions"), expected);
        assert_eq!(keys_of(&store, ProfileKind::Dispatcher, "cgrates.org:*cdrs"), expected);

        let report = dm.health().get_rev_fltr_idx_health(&Default::default()).unwrap();
        assert!(report.is_empty(), "{:?}", report);
    }
}

mod tc_2_3_catch_all_transitions {
    use super::*;

    #[test]
    fn test_filter_becoming_unindexable_moves_to_catch_all() {
        let (dm, store) = setup_dm();
        dm.filters().set(&account_filter(&["1001"])).unwrap();
        dm.profiles(ProfileKind::StatQueue)
            .set(&ProfileRecord::new(ProfileKind::StatQueue, TNT, "SQ_1", &["FLTR_ACC"]))
            .unwrap();

        dm.filters()
            .set(&Filter::new(TNT, "FLTR_ACC", vec![FilterRule::new("*exists", "~*req.Account", &[])]))
            .unwrap();
        assert_eq!(keys_of(&store, ProfileKind::StatQueue, TNT), vec!["*none:*any:*any"]);

        dm.filters().set(&account_filter(&["1002"])).unwrap();
        assert_eq!(keys_of(&store, ProfileKind::StatQueue, TNT), vec!["*string:*req.Account:1002"]);

        let health = dm
            .health()
            .get_fltr_idx_health(ProfileKind::StatQueue, &Default::default())
            .unwrap();
        assert_eq!(health, Default::default());
    }

    #[test]
    fn test_unreferenced_filter_rewrite() {
        let (dm, store) = setup_dm();
        dm.filters().set(&account_filter(&["1001"])).unwrap();
        dm.filters().set(&account_filter(&["1003"])).unwrap();
        assert_eq!(dm.filters().get(TNT, "FLTR_ACC").unwrap(), account_filter(&["1003"]));
        assert!(keys_of(&store, ProfileKind::Threshold, TNT).is_empty());
    }
}
