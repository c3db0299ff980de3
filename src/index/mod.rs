//! Filter Index Module
//!
//! Inverted indexes from filter predicates to the profiles that use them.
//!
//! ## Layout
//! - forward: `tntCtx` → `type:field:value` → object IDs (one partition family per kind)
//! - reverse: `tenant:filterID` → kind cache ID → object IDs (`id:ctx` for context kinds)
//!
//! Only `*string`, `*prefix` and `*suffix` rules are indexed. Objects whose
//! filters yield no key live in the `*none:*any:*any` bucket.
//!
//! ## Writers
//! [`FilterIndexer`] is the only writer. It takes the partition lock
//! (`cache_id + tntCtx`) around forward read-modify-writes and the reverse
//! lock (`*reverse_filter_indexes + tenant:filterID`) around reverse ones.
//! [`EventMatcher`] reads without locking.

mod builder;
mod differ;
mod indexer;
mod matcher;

pub use builder::{filter_index_keys, object_index_keys, rule_keys, RuleKeys};
pub use indexer::FilterIndexer;
pub use matcher::EventMatcher;

pub(crate) use indexer::reverse_item;
