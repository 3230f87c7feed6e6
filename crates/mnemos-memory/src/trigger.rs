//! Embedding-free trigger phrase matching.
//!
//! A cheap pre-check run before full hybrid search: each entry's trigger
//! phrases are lowercased once at index time, and matching is a
//! case-insensitive substring test against the incoming text.

use chrono::{DateTime, Utc};
use mnemos_core::EntryId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// An entry with at least one trigger phrase found in the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerMatch {
    pub id: EntryId,
    pub hits: usize,
    /// Matched phrases, lowercased and sorted.
    pub matched_phrases: Vec<String>,
    pub last_accessed: DateTime<Utc>,
}

/// Per-entry lowercased phrase sets.
#[derive(Debug, Clone, Default)]
pub struct TriggerMatcher {
    phrases: HashMap<EntryId, HashSet<String>>,
}

impl TriggerMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the phrases indexed for `id`. An empty set unindexes the entry.
    pub fn index(&mut self, id: EntryId, phrases: &BTreeSet<String>) {
        let lowered: HashSet<String> = phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if lowered.is_empty() {
            self.phrases.remove(&id);
        } else {
            self.phrases.insert(id, lowered);
        }
    }

    pub fn remove(&mut self, id: EntryId) {
        self.phrases.remove(&id);
    }

    /// Number of entries with at least one phrase.
    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Entries whose phrases occur in `text`, ranked by hit count, then most
    /// recent access, then id.
    ///
    /// `recency` supplies each entry's last access time; entries for which it
    /// returns `None` (unknown or excluded) are skipped.
    pub fn match_text<F>(&self, text: &str, limit: usize, recency: F) -> Vec<TriggerMatch>
    where
        F: Fn(EntryId) -> Option<DateTime<Utc>>,
    {
        if limit == 0 || text.trim().is_empty() {
            return Vec::new();
        }
        let haystack = text.to_lowercase();

        let mut matches: Vec<TriggerMatch> = self
            .phrases
            .iter()
            .filter_map(|(&id, phrases)| {
                let mut matched: Vec<String> = phrases
                    .iter()
                    .filter(|p| haystack.contains(p.as_str()))
                    .cloned()
                    .collect();
                if matched.is_empty() {
                    return None;
                }
                let last_accessed = recency(id)?;
                matched.sort();
                Some(TriggerMatch {
                    id,
                    hits: matched.len(),
                    matched_phrases: matched,
                    last_accessed,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.hits
                .cmp(&a.hits)
                .then(b.last_accessed.cmp(&a.last_accessed))
                .then(a.id.cmp(&b.id))
        });
        matches.truncate(limit);
        matches
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn phrases(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_case_insensitive_substring() {
        let mut matcher = TriggerMatcher::new();
        matcher.index(1, &phrases(&["OAuth Flow"]));
        let now = Utc::now();

        let text = "how does the oauth flow refresh tokens?";
        let found = matcher.match_text(text, 10, |_| Some(now));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].matched_phrases, vec!["oauth flow".to_string()]);
    }

    #[test]
    fn test_ranked_by_hits_then_recency() {
        let mut matcher = TriggerMatcher::new();
        let now = Utc::now();
        matcher.index(1, &phrases(&["deploy"]));
        matcher.index(2, &phrases(&["deploy", "rollback"]));
        matcher.index(3, &phrases(&["deploy"]));

        let recency = |id: EntryId| match id {
            1 => Some(now - Duration::days(3)),
            3 => Some(now - Duration::days(1)),
            _ => Some(now - Duration::days(10)),
        };
        let found = matcher.match_text("deploy failed, need a rollback", 10, recency);
        let ids: Vec<EntryId> = found.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(found[0].hits, 2);
    }

    #[test]
    fn test_skips_entries_without_recency() {
        let mut matcher = TriggerMatcher::new();
        matcher.index(1, &phrases(&["cache"]));
        matcher.index(2, &phrases(&["cache"]));
        let now = Utc::now();

        let found = matcher.match_text("cache miss", 10, |id| (id == 2).then_some(now));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);
    }

    #[test]
    fn test_reindex_and_remove() {
        let mut matcher = TriggerMatcher::new();
        let now = Utc::now();
        matcher.index(1, &phrases(&["alpha"]));
        matcher.index(1, &phrases(&["beta"]));
        assert!(matcher.match_text("alpha", 10, |_| Some(now)).is_empty());
        assert_eq!(matcher.match_text("beta", 10, |_| Some(now)).len(), 1);

        matcher.index(1, &BTreeSet::new());
        assert!(matcher.is_empty());

        matcher.index(2, &phrases(&["gamma"]));
        matcher.remove(2);
        assert!(matcher.match_text("gamma", 10, |_| Some(now)).is_empty());
    }

    #[test]
    fn test_limit_and_empty_text() {
        let mut matcher = TriggerMatcher::new();
        let now = Utc::now();
        for id in 0..5 {
            matcher.index(id, &phrases(&["shared"]));
        }
        assert_eq!(matcher.match_text("shared", 2, |_| Some(now)).len(), 2);
        assert!(matcher.match_text("   ", 10, |_| Some(now)).is_empty());
    }

    #[test]
    fn test_large_corpus_is_fast() {
        let mut matcher = TriggerMatcher::new();
        let now = Utc::now();
        for id in 0..5_000u64 {
            matcher.index(
                id,
                &phrases(&[
                    &format!("topic {id}"),
                    &format!("module-{id} setup"),
                    "general notes",
                ]),
            );
        }
        let text = "Working on topic 4999 today, following the module-42 setup guide. ".repeat(4);

        let started = std::time::Instant::now();
        let found = matcher.match_text(&text, 10, |_| Some(now));
        let elapsed = started.elapsed();

        assert!(found.iter().any(|m| m.id == 4999));
        assert!(
            elapsed < std::time::Duration::from_millis(50),
            "trigger matching took {elapsed:?}"
        );
    }
}
