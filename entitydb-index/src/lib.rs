//! The sharded tag index and tag variant cache (spec.md §4.6, §4.7).
//!
//! [`TagIndex`] is the public entry point: it owns both the 256-shard
//! index and the bounded variant cache, and keeps the two consistent by
//! invalidating a tag's cached variants on every mutation that touches
//! it.

pub mod shard;
pub mod sharded_index;
pub mod variant_cache;

pub use shard::{TagShard, TimelineEvent, TimelineOp};
pub use sharded_index::ShardedTagIndex;
pub use variant_cache::{TagVariant, TagVariantCache};

use std::collections::HashSet;

use entitydb_core::Timestamp;

pub struct TagIndex {
    sharded: ShardedTagIndex,
    variants: TagVariantCache,
}

impl TagIndex {
    pub fn new(variant_cache_capacity: usize) -> Self {
        Self { sharded: ShardedTagIndex::new(), variants: TagVariantCache::new(variant_cache_capacity) }
    }

    pub fn record_add(&self, entity_id: &str, logical_tag: &str, timestamp: Timestamp) {
        self.sharded.add(entity_id, logical_tag, timestamp);
        self.variants.invalidate(logical_tag);
    }

    pub fn record_remove(&self, entity_id: &str, logical_tag: &str, timestamp: Timestamp) {
        self.sharded.remove(entity_id, logical_tag, timestamp);
        self.variants.invalidate(logical_tag);
    }

    /// Current entity set for one logical tag (spec.md §4.7). Consults the
    /// variant cache first and unions its cached entries; on a miss, falls
    /// through to the shard lookup and memoizes the result so the next
    /// call on this tag (before the next mutation invalidates it) is
    /// served from the cache. A cached entry's `TagVariant::value` holds
    /// the matching entity id and `timestamp` the instant it was last
    /// confirmed present.
    pub fn list_by_tag(&self, logical_tag: &str) -> HashSet<String> {
        if let Some(variants) = self.variants.get(logical_tag) {
            return variants.into_iter().map(|v| v.value).collect();
        }
        let result = self.sharded.list_by_tag(logical_tag);
        let now = Timestamp::now();
        let variants: Vec<TagVariant> =
            result.iter().cloned().map(|value| TagVariant { timestamp: now, value }).collect();
        self.variants.put(logical_tag.to_string(), variants);
        result
    }

    /// AND semantics across several logical tags, each resolved through
    /// the cache-consulting `list_by_tag` so a repeated tag in the filter
    /// set benefits from memoization too.
    pub fn list_by_tags_all(&self, logical_tags: &[String]) -> HashSet<String> {
        let mut iter = logical_tags.iter();
        let first = match iter.next() {
            Some(tag) => self.list_by_tag(tag),
            None => return HashSet::new(),
        };
        iter.fold(first, |acc, tag| {
            if acc.is_empty() {
                return acc;
            }
            let next = self.list_by_tag(tag);
            acc.intersection(&next).cloned().collect()
        })
    }

    pub fn timeline_of(&self, entity_id: &str) -> Vec<TimelineEvent> {
        self.sharded.timeline_of(entity_id)
    }

    pub fn forget_entity(&self, entity_id: &str) {
        self.sharded.forget_entity(entity_id);
    }

    /// Drop every memoized variant list. Called by a caller's memory
    /// guardian under soft/hard pressure (spec.md §5: "at 80%... triggers
    /// variant cache eviction") — cheap to rebuild lazily on the next
    /// `list_by_tag` miss.
    pub fn evict_variant_cache(&self) {
        self.variants.clear();
    }

    /// Cached timestamped variants for a logical tag, if present.
    pub fn cached_variants(&self, logical_tag: &str) -> Option<Vec<TagVariant>> {
        self.variants.get(logical_tag)
    }

    /// Memoize a freshly computed variant list for a logical tag.
    pub fn cache_variants(&self, logical_tag: String, variants: Vec<TagVariant>) {
        self.variants.put(logical_tag, variants);
    }

    pub fn sharded(&self) -> &ShardedTagIndex {
        &self.sharded
    }
}

impl Default for TagIndex {
    fn default() -> Self {
        Self::new(4096)
    }
}
