use mnemos_core::{EntryId, MnemosError, MnemosResult};
use serde::{Deserialize, Serialize};

use crate::entry::{ImportanceTier, MemoryEntry};

/// Validations required before an entry can be flagged for promotion.
pub const PROMOTION_MIN_VALIDATIONS: u32 = 5;
/// Confidence required before an entry can be flagged for promotion.
pub const PROMOTION_MIN_CONFIDENCE: f32 = 0.90;
/// Default EMA learning rate.
///
/// Reconstructed, not a published contract: 0.3 is the smallest round rate
/// that lifts a fresh entry (0.5) past 0.90 after five useful validations.
pub const DEFAULT_LEARNING_RATE: f32 = 0.3;

/// Result of recording one piece of usefulness feedback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub id: EntryId,
    pub confidence_score: f32,
    pub validation_count: u32,
    /// The entry meets the promotion rule. The tier is never changed here.
    pub promotion_eligible: bool,
    pub tier: ImportanceTier,
}

/// Maintains confidence scores from caller feedback with an exponential
/// moving average:
///
/// ```text
/// confidence' = confidence × (1 − rate) + (useful ? 1 : 0) × rate
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceTracker {
    learning_rate: f32,
}

impl ConfidenceTracker {
    pub fn new(learning_rate: f32) -> MnemosResult<Self> {
        if !(learning_rate.is_finite() && learning_rate > 0.0 && learning_rate <= 1.0) {
            return Err(MnemosError::Config(format!(
                "confidence learning rate must be within (0, 1], got {learning_rate}"
            )));
        }
        Ok(Self { learning_rate })
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Next confidence value after one piece of feedback.
    pub fn next_confidence(&self, current: f32, was_useful: bool) -> f32 {
        let target = if was_useful { 1.0 } else { 0.0 };
        let next = current * (1.0 - self.learning_rate) + target * self.learning_rate;
        next.clamp(0.0, 1.0)
    }

    /// Apply feedback to an entry and re-evaluate promotion eligibility.
    pub fn record(&self, entry: &mut MemoryEntry, was_useful: bool) -> ValidationOutcome {
        entry.validation_count = entry.validation_count.saturating_add(1);
        entry.confidence_score = self.next_confidence(entry.confidence_score, was_useful);
        entry.promotion_eligible = is_promotion_eligible(entry);

        ValidationOutcome {
            id: entry.id,
            confidence_score: entry.confidence_score,
            validation_count: entry.validation_count,
            promotion_eligible: entry.promotion_eligible,
            tier: entry.importance_tier,
        }
    }
}

impl Default for ConfidenceTracker {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }
}

/// The promotion rule: enough validations, enough confidence, and a tier that
/// may be promoted. Constitutional is never a promotion target.
pub fn is_promotion_eligible(entry: &MemoryEntry) -> bool {
    entry.validation_count >= PROMOTION_MIN_VALIDATIONS
        && entry.confidence_score >= PROMOTION_MIN_CONFIDENCE
        && entry.importance_tier.is_promotable()
}
