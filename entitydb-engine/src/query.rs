//! `Query`: the builder behind `EntityRepository::query` (spec.md §4.11
//! plus the supplemented filter features noted in SPEC_FULL.md).

#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Tag key prefix, e.g. `"status:"` matches `status:active`,
    /// `status:archived`, ...
    pub tag_key_prefix: Option<String>,
    /// Entity id namespace prefix, e.g. `"user."` matches `user.42`.
    pub id_namespace_prefix: Option<String>,
    /// Case-sensitive substring match against decoded content.
    pub content_substring: Option<String>,
    /// Glob pattern (`*` as a multi-char wildcard) matched against an
    /// entity's current logical tags, e.g. `"status:*"` or `"region:u*"`.
    /// Distinct from `tag_key_prefix`: the wildcard may appear anywhere in
    /// the pattern, not just as a trailing match on the key.
    pub tag_wildcard: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_key_prefix = Some(prefix.into());
        self
    }

    pub fn id_namespace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_namespace_prefix = Some(prefix.into());
        self
    }

    pub fn content_substring(mut self, needle: impl Into<String>) -> Self {
        self.content_substring = Some(needle.into());
        self
    }

    pub fn tag_wildcard(mut self, pattern: impl Into<String>) -> Self {
        self.tag_wildcard = Some(pattern.into());
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.offset = n;
        self
    }

    pub(crate) fn matches_id(&self, id: &str) -> bool {
        match &self.id_namespace_prefix {
            None => true,
            Some(prefix) => id.starts_with(prefix.as_str()),
        }
    }

    pub(crate) fn matches_tags(&self, tags: &[String]) -> bool {
        let prefix_ok = match &self.tag_key_prefix {
            None => true,
            Some(prefix) => tags.iter().any(|t| t.starts_with(prefix.as_str())),
        };
        let wildcard_ok = match &self.tag_wildcard {
            None => true,
            Some(pattern) => tags.iter().any(|t| wildcard_match(pattern, t)),
        };
        prefix_ok && wildcard_ok
    }

    pub(crate) fn matches_content(&self, content: &[u8]) -> bool {
        match &self.content_substring {
            None => true,
            Some(needle) => {
                let text = String::from_utf8_lossy(content);
                text.contains(needle.as_str())
            }
        }
    }

    /// Apply `offset`/`limit` to an already-filtered, ordered iterator.
    pub(crate) fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        let after_offset: Vec<T> = items.into_iter().skip(self.offset).collect();
        match self.limit {
            Some(n) => after_offset.into_iter().take(n).collect(),
            None => after_offset,
        }
    }
}

/// Glob match with `*` as a multi-char wildcard (no `?`/character classes —
/// spec.md's wildcard requirement stops at `*`). Splits the pattern on `*`
/// and walks the text left to right, anchoring the first and last
/// fragments to the text's start/end.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }
    let fragments: Vec<&str> = pattern.split('*').collect();
    let mut cursor = 0usize;
    let last = fragments.len() - 1;
    for (i, fragment) in fragments.iter().enumerate() {
        if fragment.is_empty() {
            continue;
        }
        if i == 0 {
            if !text[cursor..].starts_with(fragment) {
                return false;
            }
            cursor += fragment.len();
        } else if i == last {
            return text[cursor..].ends_with(fragment) && text.len() - cursor >= fragment.len();
        } else {
            match text[cursor..].find(fragment) {
                Some(pos) => cursor += pos + fragment.len(),
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        let f = QueryFilter::new();
        assert!(f.matches_id("anything"));
        assert!(f.matches_tags(&["a:b".to_string()]));
        assert!(f.matches_content(b"hello"));
    }

    #[test]
    fn namespace_prefix_filters_ids() {
        let f = QueryFilter::new().id_namespace_prefix("user.");
        assert!(f.matches_id("user.42"));
        assert!(!f.matches_id("order.1"));
    }

    #[test]
    fn tag_key_prefix_requires_one_matching_tag() {
        let f = QueryFilter::new().tag_key_prefix("status:");
        assert!(f.matches_tags(&["status:active".to_string()]));
        assert!(!f.matches_tags(&["region:us".to_string()]));
    }

    #[test]
    fn pagination_applies_offset_then_limit() {
        let f = QueryFilter::new().offset(1).limit(2);
        let result = f.paginate(vec![1, 2, 3, 4]);
        assert_eq!(result, vec![2, 3]);
    }

    #[test]
    fn tag_wildcard_matches_anywhere_in_pattern() {
        let f = QueryFilter::new().tag_wildcard("status:*");
        assert!(f.matches_tags(&["status:active".to_string()]));
        assert!(!f.matches_tags(&["region:us".to_string()]));

        let f = QueryFilter::new().tag_wildcard("*:active");
        assert!(f.matches_tags(&["status:active".to_string()]));
        assert!(!f.matches_tags(&["status:inactive".to_string()]));

        let f = QueryFilter::new().tag_wildcard("region:u*");
        assert!(f.matches_tags(&["region:us".to_string()]));
        assert!(!f.matches_tags(&["region:eu".to_string()]));
    }

    #[test]
    fn tag_wildcard_without_star_requires_exact_match() {
        let f = QueryFilter::new().tag_wildcard("status:active");
        assert!(f.matches_tags(&["status:active".to_string()]));
        assert!(!f.matches_tags(&["status:inactive".to_string()]));
    }
}
