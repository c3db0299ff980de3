//! Key and tenant utilities.
//!
//! Every persisted key is a `:`-joined path. Index keys are `type:field:value`,
//! partitions are `tenant` or `tenant:context`, and the storage facade lists them
//! behind a short per-category prefix (`tfi_`, `fii_`, `ftr_`, ...).

use crate::error::{Error, Result};
use std::fmt;

pub const CONCATENATED_KEY_SEP: &str = ":";
pub const INLINE_VALUE_SEP: char = '|';
pub const DYNAMIC_DATA_PREFIX: &str = "~";
pub const META: &str = "*";
pub const META_NONE: &str = "*none";
pub const META_ANY: &str = "*any";

/// Bucket holding objects without any indexable predicate.
pub const CATCH_ALL_KEY: &str = "*none:*any:*any";

// ============ DB PREFIXES ============

pub const FILTER_PREFIX: &str = "ftr_";
pub const REVERSE_FILTER_INDEX_PREFIX: &str = "fii_";
pub const ACTION_PLAN_PREFIX: &str = "apl_";
pub const ACCOUNT_ACTION_PLANS_PREFIX: &str = "aap_";
pub const DESTINATION_PREFIX: &str = "dst_";
pub const REVERSE_DESTINATION_PREFIX: &str = "rds_";

pub const REVERSE_FILTER_INDEXES: &str = "*reverse_filter_indexes";

/// Dynamic paths pointing into other subsystems. Rules on them are never indexed.
pub const UNINDEXABLE_PATHS: [&str; 4] = [
    "~*accounts",
    "~*stats",
    "~*resources",
    "~*libphonenumber",
];

pub fn concatenated_key(parts: &[&str]) -> String {
    parts.join(CONCATENATED_KEY_SEP)
}

/// Partition name: the bare tenant, or `tenant:context` for context-scoped kinds.
pub fn tenant_ctx(tenant: &str, context: &str) -> String {
    if context.is_empty() {
        tenant.to_string()
    } else {
        concatenated_key(&[tenant, context])
    }
}

pub fn is_unindexable_path(path: &str) -> bool {
    UNINDEXABLE_PATHS.iter().any(|p| path.starts_with(p))
}

/// Splits `tenant[:context]:type:field:value` into the partition and the index key.
pub fn split_filter_index(tnt_ctx_idx_key: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = tnt_ctx_idx_key.split(CONCATENATED_KEY_SEP).collect();
    let n = parts.len();
    if n < 4 || parts[..n - 3].iter().any(|p| p.is_empty()) {
        return Err(Error::MalformedKey(tnt_ctx_idx_key.to_string()));
    }
    Ok((parts[..n - 3].join(CONCATENATED_KEY_SEP), parts[n - 3..].join(CONCATENATED_KEY_SEP)))
}

/// Splits `objectID:context` as stored in reverse indexes of context-scoped kinds.
pub fn split_item_context(item: &str) -> Result<(&str, &str)> {
    match item.split_once(CONCATENATED_KEY_SEP) {
        Some((id, ctx)) if !id.is_empty() && !ctx.is_empty() => Ok((id, ctx)),
        _ => Err(Error::MalformedKey(item.to_string())),
    }
}

/// All non-empty prefixes of `value`, longest first.
pub fn value_prefixes(value: &str) -> impl Iterator<Item = &str> {
    value
        .char_indices()
        .map(|(i, c)| &value[..i + c.len_utf8()])
        .rev()
}

/// All non-empty suffixes of `value`, longest first.
pub fn value_suffixes(value: &str) -> impl Iterator<Item = &str> {
    value.char_indices().map(|(i, _)| &value[i..])
}

/// `tenant:id` pair as found behind object prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId {
    pub tenant: String,
    pub id: String,
}

impl TenantId {
    pub fn new(tenant: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            id: id.into(),
        }
    }

    /// Parses `tenant:id`; the ID keeps any further separators.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.split_once(CONCATENATED_KEY_SEP) {
            Some((tenant, id)) if !tenant.is_empty() && !id.is_empty() => Ok(Self::new(tenant, id)),
            _ => Err(Error::MalformedKey(raw.to_string())),
        }
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.tenant, CONCATENATED_KEY_SEP, self.id)
    }
}
