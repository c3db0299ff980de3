//! Tests for M5: Concurrent Writers
//! Covers TC-5.1, TC-5.2
//!
//! Run individual tests with:
//! cargo test tc_5_1 -- --nocapture
//! cargo test m5_concurrent_writers -- --nocapture

use filterindex::{
    DataManager, Filter, FilterRule, FlatEvent, HealthArgs, IndexConfig, MemoryStore, ProfileKind, ProfileRecord,
};
use std::sync::Arc;
use std::thread;

const TNT: &str = "cgrates.org";
const WRITERS: usize = 4;
const PROFILES_PER_WRITER: usize = 12;

fn shared_filter(rule: FilterRule) -> Filter {
    Filter::new(TNT, "FLTR_SHARED", vec![rule])
}

fn setup_dm() -> Arc<DataManager> {
    let dm = DataManager::new(Arc::new(MemoryStore::new()), IndexConfig::default());
    dm.filters()
        .set(&shared_filter(FilterRule::new("*string", "~*req.Account", &["1001"])))
        .unwrap();
    dm.filters()
        .set(&Filter::new(TNT, "FLTR_DST", vec![FilterRule::new("*prefix", "~*req.Destination", &["+49"])]))
        .unwrap();
    Arc::new(dm)
}

/// Rewrites FLTR_SHARED through a few rule shapes and ends on Account 9999.
fn spawn_rewriter(dm: &Arc<DataManager>) -> thread::JoinHandle<()> {
    let dm = Arc::clone(dm);
    thread::spawn(move || {
        let shapes = [
            FilterRule::new("*string", "~*req.Account", &["2002"]),
            FilterRule::new("*prefix", "~*req.Subject", &["10"]),
            FilterRule::new("*gt", "~*req.Usage", &["10s"]),
            FilterRule::new("*suffix", "~*req.Account", &["01", "02"]),
        ];
        for round in 0..6 {
            for rule in &shapes {
                dm.filters().set(&shared_filter(rule.clone())).unwrap();
            }
            println!("rewriter finished round {round}");
        }
        dm.filters()
            .set(&shared_filter(FilterRule::new("*string", "~*req.Account", &["9999"])))
            .unwrap();
    })
}

fn assert_healthy(dm: &DataManager, kind: ProfileKind) {
    let args = HealthArgs::default();
    let forward = dm.health().get_fltr_idx_health(kind, &args).unwrap();
    println!("forward health: {forward:?}");
    assert_eq!(forward, Default::default());
    let reverse = dm.health().get_rev_fltr_idx_health(&args).unwrap();
    println!("reverse health: {reverse:?}");
    assert!(reverse.is_empty(), "{reverse:?}");
}

mod tc_5_1_profiles_and_filter_rewrites {
    use super::*;

    #[test]
    fn test_indexes_consistent_after_parallel_writes() {
        let dm = setup_dm();
        let rewriter = spawn_rewriter(&dm);

        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let dm = Arc::clone(&dm);
                thread::spawn(move || {
                    let thresholds = dm.profiles(ProfileKind::Threshold);
                    for i in 0..PROFILES_PER_WRITER {
                        let id = format!("TH_{w}_{i}");
                        thresholds
                            .set(&ProfileRecord::new(ProfileKind::Threshold, TNT, &id, &["FLTR_DST"]))
                            .unwrap();
                        // move onto the shared filter while it is being rewritten
                        thresholds
                            .set(&ProfileRecord::new(
                                ProfileKind::Threshold,
                                TNT,
                                &id,
                                &["FLTR_SHARED", "FLTR_DST"],
                            ))
                            .unwrap();
                        thresholds
                            .set(&ProfileRecord::new(ProfileKind::Threshold, TNT, &id, &["FLTR_SHARED"]))
                            .unwrap();
                    }
                })
            })
            .collect();

        for w in writers {
            w.join().unwrap();
        }
        rewriter.join().unwrap();

        assert_healthy(&dm, ProfileKind::Threshold);
        let ev = FlatEvent::new().with("*req.Account", "9999");
        let ids = dm
            .profiles(ProfileKind::Threshold)
            .matching_ids(&ev, TNT, "")
            .unwrap();
        println!("matched {} thresholds", ids.len());
        assert_eq!(ids.len(), WRITERS * PROFILES_PER_WRITER);
        assert_eq!(dm.lock_manager().held_count(), 0);
    }
}

mod tc_5_2_context_moves_and_removals {
    use super::*;

    #[test]
    fn test_context_scoped_writers_with_rewrites() {
        let dm = setup_dm();
        let rewriter = spawn_rewriter(&dm);

        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let dm = Arc::clone(&dm);
                thread::spawn(move || {
                    let attrs = dm.profiles(ProfileKind::Attribute);
                    for i in 0..PROFILES_PER_WRITER {
                        let id = format!("ATTR_{w}_{i}");
                        attrs
                            .set(
                                &ProfileRecord::new(ProfileKind::Attribute, TNT, &id, &["FLTR_SHARED"])
                                    .with_contexts(&["*sessions"]),
                            )
                            .unwrap();
                        attrs
                            .set(
                                &ProfileRecord::new(ProfileKind::Attribute, TNT, &id, &["FLTR_SHARED", "FLTR_DST"])
                                    .with_contexts(&["*cdrs", "*sessions"]),
                            )
                            .unwrap();
                        if i % 3 == 0 {
                            attrs.remove(TNT, &id).unwrap();
                        }
                    }
                })
            })
            .collect();

        for w in writers {
            w.join().unwrap();
        }
        rewriter.join().unwrap();

        assert_healthy(&dm, ProfileKind::Attribute);
        let ev = FlatEvent::new()
            .with("*req.Account", "9999")
            .with("*req.Destination", "+4917");
        let ids = dm
            .profiles(ProfileKind::Attribute)
            .matching_ids(&ev, TNT, "*cdrs")
            .unwrap();
        let kept = WRITERS * (PROFILES_PER_WRITER - PROFILES_PER_WRITER.div_ceil(3));
        assert_eq!(ids.len(), kept);
        assert_eq!(dm.lock_manager().held_count(), 0);
    }
}
