//! Error taxonomy shared by the indexer, matcher and auditor.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Absence of a filter, index bucket or object.
    #[error("NOT_FOUND")]
    NotFound,

    /// A persisted index key that does not split into `tenant[:context]:type:field:value`.
    #[error("WRONG_IDX_KEY_FORMAT<{0}>")]
    MalformedKey(String),

    #[error("broken reference to filter: <{filter_id}> for itemType: <{kind}> and ID: <{item_id}>")]
    BrokenReference {
        kind: String,
        item_id: String,
        filter_id: String,
    },

    #[error("inline parse error for string: <{0}>")]
    InlineParse(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("cannot remove filter <{filter}> because will broken the reference to following items: {items:?}")]
    FilterInUse { filter: String, items: Vec<String> },

    #[error("timeout while acquiring lock <{0}>")]
    LockTimeout(String),

    #[error("unsupported index type: <{0}>")]
    UnsupportedIndexType(String),

    /// Any other failure reported by the storage facade.
    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Maps `NotFound` to `None`, keeping every other error.
pub(crate) fn optional<T>(res: Result<T>) -> Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(Error::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_key_display() {
        let err = Error::MalformedKey("cgrates.org:*string".to_string());
        assert_eq!(err.to_string(), "WRONG_IDX_KEY_FORMAT<cgrates.org:*string>");
    }

    #[test]
    fn test_optional_maps_not_found() {
        assert!(optional::<u8>(Err(Error::NotFound)).unwrap().is_none());
        assert_eq!(optional(Ok(3u8)).unwrap(), Some(3));
        assert!(optional::<u8>(Err(Error::Storage("down".into()))).is_err());
    }
}
