use std::collections::HashMap;

use parking_lot::RwLock;

use mc_error::CoreResult;

/// `(bytes, mime, crc32)` — mirrors CVAT's `_CacheItem` tuple.
type CacheEntry = (Vec<u8>, String, u32);

/// Pluggable cache storage. `MediaCache` owns the key grammar and producer
/// dispatch; this trait is just "put bytes behind a string key somewhere"
/// (spec §6: externally injectable). `get` returns `Err` only for a
/// backend-level deserialization failure (CVAT's `pickle.UnpicklingError`
/// equivalent) — `MediaCache` logs and treats that the same as a plain miss.
pub trait KVCache: Send + Sync {
    fn get(&self, key: &str) -> CoreResult<Option<CacheEntry>>;
    fn set(&self, key: &str, bytes: Vec<u8>, mime: String, crc: u32);
    fn delete(&self, key: &str);
}

/// Default in-process backend: one process-wide map behind a single lock.
/// Good enough for a single server instance; a Redis/memcached-backed impl
/// would implement the same trait for multi-instance deployments.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl KVCache for InMemoryCache {
    fn get(&self, key: &str) -> CoreResult<Option<CacheEntry>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, bytes: Vec<u8>, mime: String, crc: u32) {
        self.entries
            .write()
            .insert(key.to_owned(), (bytes, mime, crc));
    }

    fn delete(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_entry() {
        let cache = InMemoryCache::default();
        cache.set("k", vec![1, 2, 3], "application/zip".to_owned(), 42);
        assert_eq!(
            cache.get("k").unwrap(),
            Some((vec![1, 2, 3], "application/zip".to_owned(), 42))
        );
    }

    #[test]
    fn delete_is_idempotent() {
        let cache = InMemoryCache::default();
        cache.delete("absent");
        cache.set("k", vec![1], "x".to_owned(), 1);
        cache.delete("k");
        cache.delete("k");
        assert_eq!(cache.get("k").unwrap(), None);
    }
}
