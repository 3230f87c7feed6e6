//! Reciprocal Rank Fusion over ranked id lists.
//!
//! Each list contributes `1 / (k + rank)` (1-based rank) to every entry it
//! contains; entries absent from a list get nothing from it. Raw scores are
//! never compared across lists, so BM25 and cosine scales do not matter.

use mnemos_core::EntryId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default smoothing constant.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Whether a fusion produced any candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStatus {
    /// At least one candidate.
    Matched,
    /// Every input list was empty.
    NoMatches,
}

/// One fused candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedCandidate {
    pub id: EntryId,
    /// Summed reciprocal-rank score.
    pub score: f32,
    /// 1-based rank in each input list, `None` where absent.
    pub ranks: Vec<Option<usize>>,
}

impl FusedCandidate {
    fn best_rank(&self) -> usize {
        self.ranks.iter().flatten().copied().min().unwrap_or(usize::MAX)
    }
}

/// Result of [`reciprocal_rank_fusion`].
#[derive(Debug, Clone, PartialEq)]
pub struct FusionOutcome {
    pub status: FusionStatus,
    pub candidates: Vec<FusedCandidate>,
}

/// Merge ranked lists with Reciprocal Rank Fusion and keep the top `limit`.
///
/// Candidates are sorted by descending score, then by best individual rank,
/// then by ascending id. A duplicate id within one list counts at its first
/// position only. With a single non-empty list the fused order equals that
/// list's order.
pub fn reciprocal_rank_fusion(lists: &[&[EntryId]], k: f32, limit: usize) -> FusionOutcome {
    let mut by_id: HashMap<EntryId, FusedCandidate> = HashMap::new();

    for (list_idx, list) in lists.iter().enumerate() {
        for (pos, &id) in list.iter().enumerate() {
            let rank = pos + 1;
            let candidate = by_id.entry(id).or_insert_with(|| FusedCandidate {
                id,
                score: 0.0,
                ranks: vec![None; lists.len()],
            });
            if candidate.ranks[list_idx].is_some() {
                continue;
            }
            candidate.ranks[list_idx] = Some(rank);
            candidate.score += 1.0 / (k + rank as f32);
        }
    }

    if by_id.is_empty() {
        return FusionOutcome {
            status: FusionStatus::NoMatches,
            candidates: Vec::new(),
        };
    }

    let mut candidates: Vec<FusedCandidate> = by_id.into_values().collect();
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.best_rank().cmp(&b.best_rank()))
            .then(a.id.cmp(&b.id))
    });
    candidates.truncate(limit);

    FusionOutcome {
        status: FusionStatus::Matched,
        candidates,
    }
}
