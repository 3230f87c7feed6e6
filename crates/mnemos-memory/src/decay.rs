//! Tier-weighted, time-decayed score adjustment.
//!
//! `final = fused × boost × max(floor, 1 − days × rate)`, with constitutional
//! entries (and callers passing `use_decay = false`) pinned at factor 1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::{ImportanceTier, MemoryEntry};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Per-result score components, reported alongside every search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Reciprocal-rank-fusion score (0 for pinned entries the query did not match).
    pub fused_score: f32,
    pub tier_boost: f32,
    pub decay_factor: f32,
    pub final_score: f32,
    /// Placed ahead of the ranking as constitutional content.
    pub pinned: bool,
}

/// Fractional days from `earlier` to `now`, clamped at zero.
pub fn days_between(earlier: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - earlier).num_milliseconds();
    (millis as f64 / 1000.0 / SECONDS_PER_DAY).max(0.0)
}

/// Decay multiplier for a tier after `days` without access.
///
/// Never falls below the tier floor; always 1 for constitutional entries or
/// when `use_decay` is off.
pub fn decay_factor(tier: ImportanceTier, days: f64, use_decay: bool) -> f32 {
    if !use_decay || tier.is_decay_exempt() {
        return 1.0;
    }
    let policy = tier.policy();
    let days = if days.is_nan() { 0.0 } else { days.max(0.0) };
    let linear = 1.0 - days * f64::from(policy.decay_rate_per_day);
    (linear as f32).clamp(policy.floor, 1.0)
}

/// Score one entry.
pub fn score_entry(
    entry: &MemoryEntry,
    fused_score: f32,
    now: DateTime<Utc>,
    use_decay: bool,
) -> ScoreBreakdown {
    let tier_boost = entry.importance_tier.policy().boost;
    let decay_factor = decay_factor(
        entry.importance_tier,
        days_between(entry.last_accessed, now),
        use_decay,
    );
    ScoreBreakdown {
        fused_score,
        tier_boost,
        decay_factor,
        final_score: fused_score * tier_boost * decay_factor,
        pinned: false,
    }
}

/// Whether a deprecated entry has sat at its decay floor for longer than
/// `retention_days`. Soft-expired entries drop out of default search but stay
/// stored.
pub fn is_soft_expired(entry: &MemoryEntry, now: DateTime<Utc>, retention_days: f64) -> bool {
    if entry.importance_tier != ImportanceTier::Deprecated {
        return false;
    }
    let Some(days_to_floor) = entry.importance_tier.policy().days_to_floor() else {
        return false;
    };
    days_between(entry.last_accessed, now) - days_to_floor > retention_days
}

/// Per-query cap on always-included constitutional content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinBudget {
    pub max_results: usize,
    pub max_chars: usize,
}

/// Choose which constitutional candidates to pin, in order.
///
/// Candidates are `(entry, fused score)` pairs. They are ordered by fused
/// score, importance weight, then most recent update; candidates whose content
/// would overflow the character budget are skipped. Returns the indices of the
/// pinned candidates into `candidates`.
pub fn select_pinned(candidates: &[(&MemoryEntry, f32)], budget: PinBudget) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        let (ea, fa) = candidates[a];
        let (eb, fb) = candidates[b];
        fb.partial_cmp(&fa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                eb.importance_weight
                    .partial_cmp(&ea.importance_weight)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(eb.updated_at.cmp(&ea.updated_at))
            .then(ea.id.cmp(&eb.id))
    });

    let mut pinned = Vec::new();
    let mut used_chars = 0usize;
    for idx in order {
        if pinned.len() >= budget.max_results {
            break;
        }
        let chars = candidates[idx].0.content.chars().count();
        if used_chars + chars > budget.max_chars {
            continue;
        }
        used_chars += chars;
        pinned.push(idx);
    }
    pinned
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::entry::MemoryDraft;
    use chrono::Duration;

    fn entry(tier: ImportanceTier, content: &str) -> MemoryEntry {
        MemoryDraft::new("proj", "t", content)
            .with_tier(tier)
            .validate()
            .unwrap()
            .into_new_entry(1, Utc::now())
    }

    #[test]
    fn test_constitutional_never_decays() {
        for days in [0.0, 1.0, 365.0, 10_000.0, 1e12] {
            assert_eq!(decay_factor(ImportanceTier::Constitutional, days, true), 1.0);
        }
    }

    #[test]
    fn test_factor_never_below_floor() {
        let mut days = 0.0f64;
        while days < 5_000.0 {
            for tier in ImportanceTier::ALL {
                let factor = decay_factor(tier, days, true);
                assert!(factor >= tier.policy().floor, "{tier} at {days} days: {factor}");
                assert!(factor <= 1.0);
            }
            days += 0.37;
        }
        for extreme in [f64::MAX, f64::INFINITY, -5.0, f64::NAN] {
            for tier in ImportanceTier::ALL {
                let factor = decay_factor(tier, extreme, true);
                assert!(factor >= tier.policy().floor && factor <= 1.0);
            }
        }
    }

    #[test]
    fn test_decay_disabled() {
        assert_eq!(decay_factor(ImportanceTier::Deprecated, 400.0, false), 1.0);
    }

    #[test]
    fn test_linear_region() {
        let factor = decay_factor(ImportanceTier::Normal, 30.0, true);
        assert!((factor - 0.7).abs() < 1e-5);
        let factor = decay_factor(ImportanceTier::Critical, 100.0, true);
        assert!((factor - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_normal_entry_ninety_days_keeps_ten_percent() {
        let now = Utc::now();
        let mut e = entry(ImportanceTier::Normal, "body");
        e.last_accessed = now - Duration::days(90);

        let breakdown = score_entry(&e, 0.5, now, true);
        assert!((breakdown.decay_factor - 0.1).abs() < 1e-5);
        let undecayed = 0.5 * breakdown.tier_boost;
        assert!((breakdown.final_score - undecayed * 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_boost_applies() {
        let now = Utc::now();
        let e = entry(ImportanceTier::Critical, "body");
        let breakdown = score_entry(&e, 0.25, now, true);
        assert_eq!(breakdown.tier_boost, 2.0);
        assert!((breakdown.final_score - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_days_between_clamps_future() {
        let now = Utc::now();
        assert_eq!(days_between(now + Duration::days(3), now), 0.0);
        assert!((days_between(now - Duration::hours(36), now) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_soft_expiry_only_for_deprecated() {
        let now = Utc::now();
        let mut deprecated = entry(ImportanceTier::Deprecated, "old");
        deprecated.last_accessed = now - Duration::days(20);
        // 20 days: floor reached at 9.5 days, 10.5 days at floor.
        assert!(!is_soft_expired(&deprecated, now, 30.0));
        assert!(is_soft_expired(&deprecated, now, 10.0));

        let mut normal = entry(ImportanceTier::Normal, "old");
        normal.last_accessed = now - Duration::days(5_000);
        assert!(!is_soft_expired(&normal, now, 0.0));
    }

    #[test]
    fn test_select_pinned_respects_count_and_chars() {
        let short_a = entry(ImportanceTier::Constitutional, "aaaa");
        let long = entry(ImportanceTier::Constitutional, &"x".repeat(50));
        let short_b = entry(ImportanceTier::Constitutional, "bbbb");
        let candidates = vec![(&short_a, 0.0f32), (&long, 0.9f32), (&short_b, 0.1f32)];

        let picked = select_pinned(
            &candidates,
            PinBudget {
                max_results: 3,
                max_chars: 10,
            },
        );
        // `long` ranks first but does not fit; the two short entries do.
        assert_eq!(picked, vec![2, 0]);

        let picked = select_pinned(
            &candidates,
            PinBudget {
                max_results: 1,
                max_chars: 1_000,
            },
        );
        assert_eq!(picked, vec![1]);
    }
}
