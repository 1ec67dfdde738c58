//! The 256-way sharded tag index (spec.md §4.6).
//!
//! Shard assignment is by hash of the *logical tag*, not the entity id:
//! `ListByTag` then touches exactly one shard, while reconstructing a
//! single entity's full tag timeline means visiting every shard (rare,
//! used only by `GetHistory`/`GetDiff`/recovery rebuild).
//!
//! Lock ordering rule: whenever more than one shard lock must be held at
//! once (bulk rebuild is the only such case today), shards are locked in
//! ascending index order. Any code path that acquires them out of order
//! is a bug.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use entitydb_core::limits::TAG_INDEX_SHARD_COUNT;
use entitydb_core::Timestamp;
use parking_lot::{RwLock, RwLockWriteGuard};

use crate::shard::{TagShard, TimelineEvent};

fn shard_of(logical_tag: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    logical_tag.hash(&mut hasher);
    (hasher.finish() as usize) % TAG_INDEX_SHARD_COUNT
}

pub struct ShardedTagIndex {
    shards: Vec<RwLock<TagShard>>,
}

impl ShardedTagIndex {
    pub fn new() -> Self {
        let shards = (0..TAG_INDEX_SHARD_COUNT).map(|_| RwLock::new(TagShard::new())).collect();
        Self { shards }
    }

    pub fn add(&self, entity_id: &str, logical_tag: &str, timestamp: Timestamp) {
        let idx = shard_of(logical_tag);
        self.shards[idx].write().add(entity_id, logical_tag, timestamp);
    }

    pub fn remove(&self, entity_id: &str, logical_tag: &str, timestamp: Timestamp) {
        let idx = shard_of(logical_tag);
        self.shards[idx].write().remove(entity_id, logical_tag, timestamp);
    }

    pub fn list_by_tag(&self, logical_tag: &str) -> HashSet<String> {
        let idx = shard_of(logical_tag);
        self.shards[idx].read().list_by_tag(logical_tag)
    }

    /// Intersection of `ListByTag` across every tag in `logical_tags`
    /// (spec.md §4.11 `ListByTagsAll`, AND semantics).
    pub fn list_by_tags_all(&self, logical_tags: &[String]) -> HashSet<String> {
        let mut iter = logical_tags.iter();
        let first = match iter.next() {
            Some(tag) => self.list_by_tag(tag),
            None => return HashSet::new(),
        };
        iter.fold(first, |acc, tag| {
            let next = self.list_by_tag(tag);
            acc.intersection(&next).cloned().collect()
        })
    }

    /// Full timeline for one entity, merged across every shard and
    /// sorted by timestamp. Touches all 256 shards; callers should not
    /// use this on a request hot path.
    pub fn timeline_of(&self, entity_id: &str) -> Vec<TimelineEvent> {
        let mut merged: Vec<TimelineEvent> =
            self.shards.iter().flat_map(|s| s.read().timeline_of(entity_id)).collect();
        merged.sort_by_key(|e| e.timestamp);
        merged
    }

    /// Remove every trace of an entity across all shards, locking in
    /// ascending index order.
    pub fn forget_entity(&self, entity_id: &str) {
        for guard in self.lock_all_ascending() {
            let mut guard = guard;
            guard.forget_entity(entity_id);
        }
    }

    /// Acquire every shard's write lock in ascending order, for bulk
    /// rebuild during recovery. Holding the returned guards concurrently
    /// is the only place in this crate where more than one shard lock is
    /// live at a time.
    pub fn lock_all_ascending(&self) -> Vec<RwLockWriteGuard<'_, TagShard>> {
        self.shards.iter().map(|s| s.write()).collect()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

impl Default for ShardedTagIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_list_by_tag_roundtrips() {
        let index = ShardedTagIndex::new();
        index.add("e1", "status:active", Timestamp::from_nanos(1));
        index.add("e2", "status:active", Timestamp::from_nanos(2));
        let result = index.list_by_tag("status:active");
        assert!(result.contains("e1") && result.contains("e2"));
    }

    #[test]
    fn list_by_tags_all_intersects() {
        let index = ShardedTagIndex::new();
        index.add("e1", "status:active", Timestamp::from_nanos(1));
        index.add("e1", "region:us", Timestamp::from_nanos(1));
        index.add("e2", "status:active", Timestamp::from_nanos(1));
        let result = index.list_by_tags_all(&["status:active".to_string(), "region:us".to_string()]);
        assert_eq!(result.len(), 1);
        assert!(result.contains("e1"));
    }

    #[test]
    fn list_by_tags_all_empty_input_is_empty() {
        let index = ShardedTagIndex::new();
        assert!(index.list_by_tags_all(&[]).is_empty());
    }

    #[test]
    fn timeline_of_merges_across_shards() {
        let index = ShardedTagIndex::new();
        // Distinct logical tags almost certainly land in different shards.
        index.add("e1", "alpha:1", Timestamp::from_nanos(5));
        index.add("e1", "beta:2", Timestamp::from_nanos(1));
        index.add("e1", "gamma:3", Timestamp::from_nanos(3));
        let timeline = index.timeline_of("e1");
        assert_eq!(timeline.len(), 3);
        assert!(timeline.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn forget_entity_clears_every_shard() {
        let index = ShardedTagIndex::new();
        index.add("e1", "alpha:1", Timestamp::from_nanos(1));
        index.add("e1", "beta:2", Timestamp::from_nanos(1));
        index.forget_entity("e1");
        assert!(index.timeline_of("e1").is_empty());
        assert!(index.list_by_tag("alpha:1").is_empty());
    }

    #[test]
    fn lock_all_ascending_covers_every_shard_exactly_once() {
        let index = ShardedTagIndex::new();
        let guards = index.lock_all_ascending();
        assert_eq!(guards.len(), TAG_INDEX_SHARD_COUNT);
    }
}
