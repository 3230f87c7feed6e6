use mnemos_core::EntryId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// BM25 parameters.
const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Tokenize text into lowercase words, filtering tokens with length <= 1.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 1)
        .collect()
}

/// A BM25 inverted index for keyword-based entry retrieval.
///
/// Maintains an inverted index mapping terms to entries and their
/// term frequencies, along with document length statistics needed
/// for the BM25 scoring formula. Ordered maps keep the serialized form
/// stable so checkpoints can be checksummed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bm25Index {
    /// term -> (entry id -> term frequency)
    inverted_index: BTreeMap<String, BTreeMap<EntryId, f32>>,
    /// entry id -> document length (token count)
    doc_lengths: BTreeMap<EntryId, f32>,
    /// Average document length across all indexed entries.
    avg_doc_length: f32,
}

impl Bm25Index {
    /// Create a new, empty BM25 index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index an entry's text, replacing whatever was indexed under `id` before.
    pub fn add_document(&mut self, id: EntryId, text: &str) {
        self.remove_postings(id);

        let tokens = tokenize(text);
        let doc_len = tokens.len() as f32;

        let mut term_freq: HashMap<String, f32> = HashMap::new();
        for token in tokens {
            *term_freq.entry(token).or_insert(0.0) += 1.0;
        }

        for (term, freq) in term_freq {
            self.inverted_index
                .entry(term)
                .or_default()
                .insert(id, freq);
        }

        self.doc_lengths.insert(id, doc_len);
        self.recompute_avg_doc_length();
    }

    /// Remove an entry from the index. Returns `false` if it was not indexed.
    pub fn remove_document(&mut self, id: EntryId) -> bool {
        let removed = self.remove_postings(id);
        if removed {
            self.recompute_avg_doc_length();
        }
        removed
    }

    fn remove_postings(&mut self, id: EntryId) -> bool {
        if self.doc_lengths.remove(&id).is_none() {
            return false;
        }

        self.inverted_index.retain(|_, postings| {
            postings.remove(&id);
            !postings.is_empty()
        });
        true
    }

    /// Search the index, returning up to `top_k` `(id, score)` pairs sorted by
    /// descending BM25 score. Ties are broken by ascending id.
    ///
    /// Uses the standard BM25 scoring formula:
    /// ```text
    /// score = sum over query terms of:
    ///   IDF(t) * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl / avgdl))
    /// ```
    /// where:
    /// - `IDF(t) = ln((N - df + 0.5) / (df + 0.5) + 1.0)`
    /// - `tf` = term frequency of term t in the entry
    /// - `dl` = entry length, `avgdl` = average entry length
    /// - `N` = total number of entries, `df` = entries containing t
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(EntryId, f32)> {
        self.search_filtered(query, top_k, |_| true)
    }

    /// Like [`Bm25Index::search`], but only entries accepted by `filter` are
    /// scored, so filtering never starves the top-k.
    pub fn search_filtered<F>(&self, query: &str, top_k: usize, filter: F) -> Vec<(EntryId, f32)>
    where
        F: Fn(EntryId) -> bool,
    {
        if self.doc_lengths.is_empty() || top_k == 0 {
            return Vec::new();
        }

        // Repeated query terms count once.
        let query_tokens: BTreeSet<String> = tokenize(query).into_iter().collect();
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let n = self.doc_lengths.len() as f32;
        let avgdl = if self.avg_doc_length > 0.0 {
            self.avg_doc_length
        } else {
            1.0
        };
        let mut scores: HashMap<EntryId, f32> = HashMap::new();

        for token in &query_tokens {
            let Some(postings) = self.inverted_index.get(token) else {
                continue;
            };
            let df = postings.len() as f32;
            // IDF with Robertson's formula (always non-negative)
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for (&id, &tf) in postings {
                if !filter(id) {
                    continue;
                }
                let dl = self.doc_lengths.get(&id).copied().unwrap_or(0.0);
                let numerator = tf * (K1 + 1.0);
                let denominator = tf + K1 * (1.0 - B + B * dl / avgdl);
                *scores.entry(id).or_insert(0.0) += idf * numerator / denominator;
            }
        }

        let mut results: Vec<(EntryId, f32)> = scores.into_iter().collect();
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        results.truncate(top_k);
        results
    }

    /// Whether an entry is indexed.
    pub fn contains(&self, id: EntryId) -> bool {
        self.doc_lengths.contains_key(&id)
    }

    /// Ids of all indexed entries, ascending.
    pub fn ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.doc_lengths.keys().copied()
    }

    /// Return the number of entries currently in the index.
    pub fn document_count(&self) -> usize {
        self.doc_lengths.len()
    }

    /// Number of distinct terms.
    pub fn term_count(&self) -> usize {
        self.inverted_index.len()
    }

    /// Recompute the average document length from current doc_lengths.
    fn recompute_avg_doc_length(&mut self) {
        if self.doc_lengths.is_empty() {
            self.avg_doc_length = 0.0;
        } else {
            let total: f32 = self.doc_lengths.values().sum();
            self.avg_doc_length = total / self.doc_lengths.len() as f32;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn corpus() -> Bm25Index {
        let mut index = Bm25Index::new();
        index.add_document(1, "postgres vacuum runs nightly on the replica");
        index.add_document(2, "postgres failover promotes the replica postgres postgres");
        index.add_document(3, "frontend bundle size budget");
        index
    }

    #[test]
    fn test_term_frequency_and_idf_shape_ranking() {
        let index = corpus();
        let results = index.search("postgres replica", 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 2, "more occurrences of the rarer term win");
        assert!(results[0].1 > results[1].1);
        assert!(results.iter().all(|(_, score)| *score > 0.0));
        assert!(!results.iter().any(|(id, _)| *id == 3));
    }

    #[test]
    fn test_unknown_terms_and_empty_index() {
        let index = corpus();
        assert!(index.search("kubernetes helm", 10).is_empty());
        assert!(index.search("a ?", 10).is_empty(), "query without tokens");
        assert!(index.search("postgres", 0).is_empty());
        assert!(Bm25Index::new().search("postgres", 10).is_empty());
    }

    #[test]
    fn test_re_adding_replaces_document() {
        let mut index = Bm25Index::new();
        index.add_document(1, "rust ownership borrowing");
        index.add_document(1, "python decorators");

        assert_eq!(index.document_count(), 1);
        assert!(index.search("ownership", 10).is_empty());
        assert_eq!(index.search("decorators", 10)[0].0, 1);
    }

    #[test]
    fn test_remove_document_drops_postings() {
        let mut index = corpus();
        let terms_before = index.term_count();

        assert!(index.remove_document(3));
        assert!(!index.remove_document(3), "second removal is a no-op");
        assert!(!index.contains(3));
        assert_eq!(index.ids().collect::<Vec<_>>(), vec![1, 2]);
        assert!(index.term_count() < terms_before, "orphaned terms are pruned");
        assert!(index.search("frontend", 10).is_empty());
    }

    #[test]
    fn test_filtered_search_skips_rejected_ids() {
        let mut index = Bm25Index::new();
        index.add_document(1, "deploy pipeline notes");
        index.add_document(2, "deploy pipeline notes");

        let results = index.search_filtered("deploy", 10, |id| id != 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 2);
    }

    #[test]
    fn test_equal_scores_break_ties_by_id() {
        let mut index = Bm25Index::new();
        index.add_document(9, "cache invalidation");
        index.add_document(3, "cache invalidation");
        index.add_document(5, "cache invalidation");

        let ids: Vec<EntryId> = index.search("cache", 10).into_iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![3, 5, 9]);
    }

    #[test]
    fn test_repeated_query_terms_count_once() {
        let index = corpus();
        assert_eq!(index.search("vacuum", 10), index.search("vacuum vacuum vacuum", 10));
    }

    #[test]
    fn test_serde_roundtrip_preserves_scores() {
        let mut index = Bm25Index::new();
        index.add_document(1, "checkpoint restore swap");
        index.add_document(2, "shadow state swap");

        let json = serde_json::to_string(&index).unwrap();
        let restored: Bm25Index = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, index);
        assert_eq!(restored.search("swap", 10), index.search("swap", 10));
    }

    #[test]
    fn test_tokenize_drops_single_chars_and_punctuation() {
        assert_eq!(
            tokenize("Use X-Request-ID, not a UUID!"),
            vec!["use", "request", "id", "not", "uuid"]
        );
    }
}
