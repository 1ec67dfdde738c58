//! Temporal reconstruction helpers shared by `GetAsOf`, `GetHistory`,
//! `GetDiff`, and `GetChangesSince` (spec.md §4.11).

use entitydb_core::{split_logical_tag, Entity, StoredTag, Timestamp};

/// One content version as recorded by `Create`/`Update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentVersion {
    pub timestamp: Timestamp,
    pub content: Vec<u8>,
}

/// Content as of a given instant: the newest version whose timestamp is
/// `<= at`, or `None` if the entity did not exist yet.
pub fn content_as_of(versions: &[ContentVersion], at: Timestamp) -> Option<Vec<u8>> {
    versions.iter().filter(|v| v.timestamp <= at).max_by_key(|v| v.timestamp).map(|v| v.content.clone())
}

/// Tag-level diff between two instants (spec.md §4.8's `GetDiff`): keys
/// present at `to` but not at `from`, keys dropped between `from` and
/// `to`, and keys present at both instants whose value changed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

pub fn diff_tags(raw: &[StoredTag], from: Timestamp, to: Timestamp) -> TagDiff {
    let before: std::collections::HashMap<String, String> =
        Entity::project_as_of(raw, from).into_iter().filter_map(|t| split_logical_tag(&t).ok()).collect();
    let after: std::collections::HashMap<String, String> =
        Entity::project_as_of(raw, to).into_iter().filter_map(|t| split_logical_tag(&t).ok()).collect();

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut changed = Vec::new();
    for (key, value) in &after {
        match before.get(key) {
            None => added.push(format!("{key}:{value}")),
            Some(old_value) if old_value != value => changed.push(format!("{key}:{value}")),
            Some(_) => {}
        }
    }
    for (key, value) in &before {
        if !after.contains_key(key) {
            removed.push(format!("{key}:{value}"));
        }
    }
    TagDiff { added, removed, changed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(ts: u64, logical: &str) -> StoredTag {
        StoredTag::new(Timestamp::from_nanos(ts), logical).unwrap()
    }

    #[test]
    fn content_as_of_picks_newest_not_after_cutoff() {
        let versions = vec![
            ContentVersion { timestamp: Timestamp::from_nanos(1), content: b"v1".to_vec() },
            ContentVersion { timestamp: Timestamp::from_nanos(5), content: b"v2".to_vec() },
        ];
        assert_eq!(content_as_of(&versions, Timestamp::from_nanos(3)), Some(b"v1".to_vec()));
        assert_eq!(content_as_of(&versions, Timestamp::from_nanos(10)), Some(b"v2".to_vec()));
        assert_eq!(content_as_of(&versions, Timestamp::from_nanos(0)), None);
    }

    #[test]
    fn diff_tags_reports_added_and_removed() {
        let raw = vec![tag(1, "region:us"), tag(5, "kind:blob")];
        let mut diff = diff_tags(&raw, Timestamp::from_nanos(1), Timestamp::from_nanos(5));
        diff.added.sort();
        assert_eq!(diff.added, vec!["kind:blob".to_string()]);
        assert!(diff.removed.is_empty());
        assert!(diff.changed.is_empty());
    }

    #[test]
    fn diff_tags_reports_changed_for_same_key_new_value() {
        let raw = vec![tag(1, "status:active"), tag(5, "status:inactive"), tag(5, "region:us")];
        let diff = diff_tags(&raw, Timestamp::from_nanos(1), Timestamp::from_nanos(5));
        assert_eq!(diff.changed, vec!["status:inactive".to_string()]);
        assert_eq!(diff.added, vec!["region:us".to_string()]);
        assert!(diff.removed.is_empty());
    }
}
