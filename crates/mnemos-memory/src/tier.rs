//! Static per-tier tuning table.
//!
//! Ranking code looks tiers up here instead of branching on them, so tuning a
//! tier never touches the scoring pipeline.

use crate::entry::ImportanceTier;

/// Decay and boost constants for one importance tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierPolicy {
    /// Fraction of the score lost per day since last access.
    pub decay_rate_per_day: f32,
    /// Lowest multiplier decay can reach.
    pub floor: f32,
    /// Multiplier applied to the fused relevance score.
    pub boost: f32,
}

impl TierPolicy {
    /// Days of inactivity after which the decay factor sits at the floor.
    /// `None` for tiers that never decay.
    pub fn days_to_floor(&self) -> Option<f64> {
        if self.decay_rate_per_day <= 0.0 {
            None
        } else {
            Some(f64::from(1.0 - self.floor) / f64::from(self.decay_rate_per_day))
        }
    }
}

/// Indexed by [`ImportanceTier`] discriminant, same order as [`ImportanceTier::ALL`].
const TIER_TABLE: [TierPolicy; 6] = [
    // constitutional
    TierPolicy {
        decay_rate_per_day: 0.0,
        floor: 1.0,
        boost: 3.0,
    },
    // critical
    TierPolicy {
        decay_rate_per_day: 0.001,
        floor: 0.5,
        boost: 2.0,
    },
    // important
    TierPolicy {
        decay_rate_per_day: 0.005,
        floor: 0.3,
        boost: 1.5,
    },
    // normal
    TierPolicy {
        decay_rate_per_day: 0.01,
        floor: 0.1,
        boost: 1.0,
    },
    // temporary
    TierPolicy {
        decay_rate_per_day: 0.05,
        floor: 0.1,
        boost: 0.5,
    },
    // deprecated
    TierPolicy {
        decay_rate_per_day: 0.1,
        floor: 0.05,
        boost: 0.25,
    },
];

impl ImportanceTier {
    /// Tuning constants for this tier.
    pub fn policy(self) -> &'static TierPolicy {
        &TIER_TABLE[self.index()]
    }

    /// Whether the tier never decays.
    pub fn is_decay_exempt(self) -> bool {
        self == ImportanceTier::Constitutional
    }

    /// Tiers the confidence tracker may flag for promotion.
    pub fn is_promotable(self) -> bool {
        matches!(self, ImportanceTier::Normal | ImportanceTier::Important)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_tiers() {
        let normal = ImportanceTier::Normal.policy();
        assert_eq!(normal.decay_rate_per_day, 0.01);
        assert_eq!(normal.floor, 0.1);
        assert_eq!(normal.boost, 1.0);

        let constitutional = ImportanceTier::Constitutional.policy();
        assert_eq!(constitutional.decay_rate_per_day, 0.0);
        assert_eq!(constitutional.boost, 3.0);

        let deprecated = ImportanceTier::Deprecated.policy();
        assert_eq!(deprecated.floor, 0.05);
        assert_eq!(deprecated.boost, 0.25);
    }

    #[test]
    fn test_boost_is_monotonic_down_the_table() {
        let boosts: Vec<f32> = ImportanceTier::ALL.iter().map(|t| t.policy().boost).collect();
        assert!(boosts.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_days_to_floor() {
        assert!(ImportanceTier::Constitutional.policy().days_to_floor().is_none());
        let days = ImportanceTier::Normal.policy().days_to_floor().unwrap_or_default();
        assert!((days - 90.0).abs() < 1e-3);
        let days = ImportanceTier::Deprecated.policy().days_to_floor().unwrap_or_default();
        assert!((days - 9.5).abs() < 1e-3);
    }

    #[test]
    fn test_promotable_tiers() {
        assert!(ImportanceTier::Normal.is_promotable());
        assert!(ImportanceTier::Important.is_promotable());
        assert!(!ImportanceTier::Critical.is_promotable());
        assert!(!ImportanceTier::Constitutional.is_promotable());
    }
}
