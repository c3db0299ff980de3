//! Bounded scan cache with negative caching.

use super::CacheArgs;
use crate::error::{optional, Result};
use moka::sync::Cache;
use std::sync::Arc;

/// Per-audit lookup cache. A `NotFound` load is stored as `None`, so a
/// missing filter or object is fetched once per scan.
pub struct HealthCache<V> {
    inner: Option<Cache<String, Option<Arc<V>>, ahash::RandomState>>,
}

impl<V: Send + Sync + 'static> HealthCache<V> {
    pub fn new(args: &CacheArgs) -> Self {
        if args.limit == 0 {
            return Self { inner: None };
        }
        let mut builder = Cache::builder();
        if args.limit > 0 {
            builder = builder.max_capacity(args.limit as u64);
        }
        if let Some(ttl) = args.ttl() {
            builder = if args.static_ttl {
                builder.time_to_live(ttl)
            } else {
                builder.time_to_idle(ttl)
            };
        }
        Self {
            inner: Some(builder.build_with_hasher(ahash::RandomState::new())),
        }
    }

    pub fn get_or_load(&self, key: &str, load: impl FnOnce() -> Result<V>) -> Result<Option<Arc<V>>> {
        let Some(cache) = &self.inner else {
            return Ok(optional(load())?.map(Arc::new));
        };
        if let Some(hit) = cache.get(key) {
            return Ok(hit);
        }
        let loaded = optional(load())?.map(Arc::new);
        cache.insert(key.to_string(), loaded.clone());
        Ok(loaded)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::Cell;

    #[test]
    fn test_negative_result_cached() {
        let cache: HealthCache<String> = HealthCache::new(&CacheArgs::default());
        let loads = Cell::new(0);
        for _ in 0..3 {
            let got = cache
                .get_or_load("cgrates.org:FLTR_X", || {
                    loads.set(loads.get() + 1);
                    Err(Error::NotFound)
                })
                .unwrap();
            assert!(got.is_none());
        }
        assert_eq!(loads.get(), 1);
    }

    #[test]
    fn test_disabled_cache_always_loads() {
        let cache: HealthCache<u32> = HealthCache::new(&CacheArgs::disabled());
        assert!(!cache.is_enabled());
        let loads = Cell::new(0);
        for _ in 0..2 {
            let got = cache
                .get_or_load("k", || {
                    loads.set(loads.get() + 1);
                    Ok(7)
                })
                .unwrap();
            assert_eq!(got.as_deref(), Some(&7));
        }
        assert_eq!(loads.get(), 2);
    }

    #[test]
    fn test_storage_errors_are_not_cached() {
        let cache: HealthCache<u32> = HealthCache::new(&CacheArgs::default());
        assert!(cache.get_or_load("k", || Err(Error::Storage("down".into()))).is_err());
        assert_eq!(cache.get_or_load("k", || Ok(1)).unwrap().as_deref(), Some(&1));
    }
}
