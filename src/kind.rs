//! Registry of indexed object kinds.
//!
//! Each kind owns one forward-index partition family; the registry row says how
//! its objects and indexes are keyed and whether it is scoped by context.

use crate::error::{Error, Result};
use crate::keys::{REVERSE_FILTER_INDEXES, REVERSE_FILTER_INDEX_PREFIX};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProfileKind {
    Threshold,
    Charger,
    Resource,
    StatQueue,
    Route,
    Attribute,
    Dispatcher,
}

/// One registry row.
#[derive(Debug)]
pub struct KindInfo {
    pub kind: ProfileKind,
    pub name: &'static str,
    pub cache_id: &'static str,
    pub object_prefix: &'static str,
    pub index_prefix: &'static str,
    pub has_context: bool,
}

const REGISTRY: [KindInfo; 7] = [
    KindInfo {
        kind: ProfileKind::Threshold,
        name: "ThresholdProfile",
        cache_id: "*threshold_filter_indexes",
        object_prefix: "thp_",
        index_prefix: "tfi_",
        has_context: false,
    },
    KindInfo {
        kind: ProfileKind::Charger,
        name: "ChargerProfile",
        cache_id: "*charger_filter_indexes",
        object_prefix: "cpp_",
        index_prefix: "cfi_",
        has_context: false,
    },
    KindInfo {
        kind: ProfileKind::Resource,
        name: "ResourceProfile",
        cache_id: "*resource_filter_indexes",
        object_prefix: "rsp_",
        index_prefix: "rfi_",
        has_context: false,
    },
    KindInfo {
        kind: ProfileKind::StatQueue,
        name: "StatQueueProfile",
        cache_id: "*stat_filter_indexes",
        object_prefix: "sqp_",
        index_prefix: "sfi_",
        has_context: false,
    },
    KindInfo {
        kind: ProfileKind::Route,
        name: "RouteProfile",
        cache_id: "*route_filter_indexes",
        object_prefix: "rpp_",
        index_prefix: "rti_",
        has_context: false,
    },
    KindInfo {
        kind: ProfileKind::Attribute,
        name: "AttributeProfile",
        cache_id: "*attribute_filter_indexes",
        object_prefix: "alp_",
        index_prefix: "afi_",
        has_context: true,
    },
    KindInfo {
        kind: ProfileKind::Dispatcher,
        name: "DispatcherProfile",
        cache_id: "*dispatcher_filter_indexes",
        object_prefix: "dpp_",
        index_prefix: "dfi_",
        has_context: true,
    },
];

impl ProfileKind {
    pub const ALL: [ProfileKind; 7] = [
        ProfileKind::Threshold,
        ProfileKind::Charger,
        ProfileKind::Resource,
        ProfileKind::StatQueue,
        ProfileKind::Route,
        ProfileKind::Attribute,
        ProfileKind::Dispatcher,
    ];

    pub fn info(self) -> &'static KindInfo {
        &REGISTRY[self as usize]
    }

    pub fn has_context(self) -> bool {
        self.info().has_context
    }

    pub fn cache_id(self) -> &'static str {
        self.info().cache_id
    }

    pub fn object_prefix(self) -> &'static str {
        self.info().object_prefix
    }

    pub fn index_prefix(self) -> &'static str {
        self.info().index_prefix
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Resolves the index type name stored inside reverse indexes.
    pub fn from_cache_id(cache_id: &str) -> Result<Self> {
        REGISTRY
            .iter()
            .find(|s| s.cache_id == cache_id)
            .map(|s| s.kind)
            .ok_or_else(|| Error::UnsupportedIndexType(cache_id.to_string()))
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_id())
    }
}

/// A family of index partitions in the storage facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexPartition {
    /// Forward index: `tntCtx` → index key → object IDs.
    Filter(ProfileKind),
    /// Reverse index: `tenant:filterID` → kind cache ID → object IDs.
    Reverse,
}

impl IndexPartition {
    pub fn prefix(self) -> &'static str {
        match self {
            IndexPartition::Filter(kind) => kind.index_prefix(),
            IndexPartition::Reverse => REVERSE_FILTER_INDEX_PREFIX,
        }
    }

    pub fn cache_id(self) -> &'static str {
        match self {
            IndexPartition::Filter(kind) => kind.cache_id(),
            IndexPartition::Reverse => REVERSE_FILTER_INDEXES,
        }
    }

    /// Name of the lock region guarding one partition.
    pub fn lock_key(self, tnt_ctx: &str) -> String {
        format!("{}{}", self.cache_id(), tnt_ctx)
    }
}
