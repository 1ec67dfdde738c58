//! A single shard of the tag index: current state plus per-entity
//! timelines, as described in spec.md §4.6.

use std::collections::{HashMap, HashSet};

use entitydb_core::Timestamp;

/// One recorded mutation of a tag key on a specific entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineOp {
    Add,
    Remove,
}

/// One entry in an entity's per-shard timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
    pub timestamp: Timestamp,
    pub logical_tag: String,
    pub op: TimelineOp,
}

/// Current state and timeline for every logical tag whose hash lands in
/// this shard.
#[derive(Debug, Default)]
pub struct TagShard {
    /// `logical_tag -> set<entity_id>`, used by `ListByTag` of current state.
    current: HashMap<String, HashSet<String>>,
    /// `entity_id -> timeline`, kept sorted by timestamp for temporal
    /// reconstruction.
    timeline: HashMap<String, Vec<TimelineEvent>>,
}

impl TagShard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `entity_id` now carries `logical_tag` as of `timestamp`.
    pub fn add(&mut self, entity_id: &str, logical_tag: &str, timestamp: Timestamp) {
        self.current
            .entry(logical_tag.to_string())
            .or_default()
            .insert(entity_id.to_string());
        let events = self.timeline.entry(entity_id.to_string()).or_default();
        events.push(TimelineEvent { timestamp, logical_tag: logical_tag.to_string(), op: TimelineOp::Add });
        events.sort_by_key(|e| e.timestamp);
    }

    /// Remove the current association between `entity_id` and `logical_tag`
    /// (used on hard update of a tag key) while preserving timeline history.
    pub fn remove(&mut self, entity_id: &str, logical_tag: &str, timestamp: Timestamp) {
        if let Some(set) = self.current.get_mut(logical_tag) {
            set.remove(entity_id);
            if set.is_empty() {
                self.current.remove(logical_tag);
            }
        }
        let events = self.timeline.entry(entity_id.to_string()).or_default();
        events.push(TimelineEvent { timestamp, logical_tag: logical_tag.to_string(), op: TimelineOp::Remove });
        events.sort_by_key(|e| e.timestamp);
    }

    pub fn list_by_tag(&self, logical_tag: &str) -> HashSet<String> {
        self.current.get(logical_tag).cloned().unwrap_or_default()
    }

    pub fn timeline_of(&self, entity_id: &str) -> Vec<TimelineEvent> {
        self.timeline.get(entity_id).cloned().unwrap_or_default()
    }

    /// Remove every trace of an entity (used when purging).
    pub fn forget_entity(&mut self, entity_id: &str) {
        self.timeline.remove(entity_id);
        for set in self.current.values_mut() {
            set.remove(entity_id);
        }
        self.current.retain(|_, set| !set.is_empty());
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.timeline.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_list_by_tag() {
        let mut shard = TagShard::new();
        shard.add("e1", "status:active", Timestamp::from_nanos(1));
        let result = shard.list_by_tag("status:active");
        assert!(result.contains("e1"));
    }

    #[test]
    fn remove_clears_current_but_keeps_timeline() {
        let mut shard = TagShard::new();
        shard.add("e1", "status:active", Timestamp::from_nanos(1));
        shard.remove("e1", "status:active", Timestamp::from_nanos(2));
        assert!(shard.list_by_tag("status:active").is_empty());
        assert_eq!(shard.timeline_of("e1").len(), 2);
    }

    #[test]
    fn timeline_is_sorted_by_timestamp() {
        let mut shard = TagShard::new();
        shard.add("e1", "a:1", Timestamp::from_nanos(5));
        shard.add("e1", "b:1", Timestamp::from_nanos(1));
        let timeline = shard.timeline_of("e1");
        assert_eq!(timeline[0].timestamp, Timestamp::from_nanos(1));
        assert_eq!(timeline[1].timestamp, Timestamp::from_nanos(5));
    }

    #[test]
    fn forget_entity_removes_all_traces() {
        let mut shard = TagShard::new();
        shard.add("e1", "status:active", Timestamp::from_nanos(1));
        shard.forget_entity("e1");
        assert!(shard.list_by_tag("status:active").is_empty());
        assert!(shard.timeline_of("e1").is_empty());
    }
}
