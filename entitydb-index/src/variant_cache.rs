//! Bounded LRU memoization of `logical_tag -> timestamped variants`
//! (spec.md §4.7). Never holds memoized state outside this structure —
//! every mutation to the tag index that could change a tag's variant set
//! must call `invalidate` for that logical tag, rather than growing an
//! ambient mutable map that nothing ever evicts (spec.md §9).

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use entitydb_core::Timestamp;

/// One timestamped variant of a tag value as seen historically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagVariant {
    pub timestamp: Timestamp,
    pub value: String,
}

const DEFAULT_CAPACITY: usize = 4096;

pub struct TagVariantCache {
    inner: Mutex<LruCache<String, Vec<TagVariant>>>,
}

impl TagVariantCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity must be nonzero");
        Self { inner: Mutex::new(LruCache::new(cap)) }
    }

    pub fn get(&self, logical_tag: &str) -> Option<Vec<TagVariant>> {
        self.inner.lock().get(logical_tag).cloned()
    }

    pub fn put(&self, logical_tag: String, variants: Vec<TagVariant>) {
        self.inner.lock().put(logical_tag, variants);
    }

    /// Drop any memoized entry for this logical tag. Called whenever the
    /// sharded index records a new add/remove for that tag so a stale
    /// variant list can never be served.
    pub fn invalidate(&self, logical_tag: &str) {
        self.inner.lock().pop(logical_tag);
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TagVariantCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(ts: u64, value: &str) -> TagVariant {
        TagVariant { timestamp: Timestamp::from_nanos(ts), value: value.to_string() }
    }

    #[test]
    fn put_then_get_roundtrips() {
        let cache = TagVariantCache::new(8);
        cache.put("status".to_string(), vec![variant(1, "active")]);
        assert_eq!(cache.get("status"), Some(vec![variant(1, "active")]));
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = TagVariantCache::new(8);
        cache.put("status".to_string(), vec![variant(1, "active")]);
        cache.invalidate("status");
        assert_eq!(cache.get("status"), None);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = TagVariantCache::new(2);
        cache.put("a".to_string(), vec![variant(1, "1")]);
        cache.put("b".to_string(), vec![variant(1, "1")]);
        cache.put("c".to_string(), vec![variant(1, "1")]);
        // "a" was least recently touched and should have been evicted.
        assert_eq!(cache.get("a"), None);
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn miss_returns_none_without_panicking() {
        let cache = TagVariantCache::new(4);
        assert_eq!(cache.get("nope"), None);
    }
}
