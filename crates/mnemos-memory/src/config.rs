use mnemos_core::{MnemosError, MnemosResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::confidence::DEFAULT_LEARNING_RATE;
use crate::decay::PinBudget;
use crate::fusion::DEFAULT_RRF_K;

/// Tuning knobs for [`crate::MemoryEngine`].
///
/// Every field has a default so a partial `[engine]` TOML table is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// RRF smoothing constant.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    /// Candidates fetched from each index per requested result.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// Cosine similarity a vector hit must exceed to count as a candidate.
    #[serde(default)]
    pub min_vector_similarity: f32,
    /// Total embedding attempts before an entry is marked permanently failed.
    #[serde(default = "default_max_embedding_attempts")]
    pub max_embedding_attempts: u32,
    #[serde(default = "default_embedding_timeout_ms")]
    pub embedding_timeout_ms: u64,
    /// Bound on a whole checkpoint restore, lock wait included.
    #[serde(default = "default_restore_timeout_ms")]
    pub restore_timeout_ms: u64,
    /// Bound on creating a checkpoint, lock wait and storage write included.
    #[serde(default = "default_checkpoint_timeout_ms")]
    pub checkpoint_timeout_ms: u64,
    /// Extra passes made when a removal leaves the id in either index.
    #[serde(default = "default_remove_retry_limit")]
    pub remove_retry_limit: u32,
    #[serde(default = "default_constitutional_max_results")]
    pub constitutional_max_results: usize,
    /// Total content characters pinned constitutional entries may occupy.
    #[serde(default = "default_constitutional_budget_chars")]
    pub constitutional_budget_chars: usize,
    /// Days a deprecated entry may sit at its decay floor before soft expiry.
    #[serde(default = "default_deprecated_retention_days")]
    pub deprecated_retention_days: f64,
    #[serde(default = "default_confidence_learning_rate")]
    pub confidence_learning_rate: f32,
    /// Bump access counters on entries returned by search.
    #[serde(default = "default_true")]
    pub track_access: bool,
}

fn default_rrf_k() -> f32 {
    DEFAULT_RRF_K
}
fn default_candidate_multiplier() -> usize {
    3
}
fn default_max_embedding_attempts() -> u32 {
    3
}
fn default_embedding_timeout_ms() -> u64 {
    5_000
}
fn default_restore_timeout_ms() -> u64 {
    10_000
}
fn default_checkpoint_timeout_ms() -> u64 {
    10_000
}
fn default_remove_retry_limit() -> u32 {
    3
}
fn default_constitutional_max_results() -> usize {
    3
}
fn default_constitutional_budget_chars() -> usize {
    4_000
}
fn default_deprecated_retention_days() -> f64 {
    30.0
}
fn default_confidence_learning_rate() -> f32 {
    DEFAULT_LEARNING_RATE
}
fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            candidate_multiplier: default_candidate_multiplier(),
            min_vector_similarity: 0.0,
            max_embedding_attempts: default_max_embedding_attempts(),
            embedding_timeout_ms: default_embedding_timeout_ms(),
            restore_timeout_ms: default_restore_timeout_ms(),
            checkpoint_timeout_ms: default_checkpoint_timeout_ms(),
            remove_retry_limit: default_remove_retry_limit(),
            constitutional_max_results: default_constitutional_max_results(),
            constitutional_budget_chars: default_constitutional_budget_chars(),
            deprecated_retention_days: default_deprecated_retention_days(),
            confidence_learning_rate: default_confidence_learning_rate(),
            track_access: true,
        }
    }
}

impl EngineConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> MnemosResult<()> {
        if !(self.rrf_k.is_finite() && self.rrf_k > 0.0) {
            return Err(MnemosError::Config(format!(
                "rrf_k must be positive, got {}",
                self.rrf_k
            )));
        }
        if self.candidate_multiplier == 0 {
            return Err(MnemosError::Config(
                "candidate_multiplier must be at least 1".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.min_vector_similarity) {
            return Err(MnemosError::Config(
                "min_vector_similarity must be within [-1, 1]".into(),
            ));
        }
        if self.max_embedding_attempts == 0 {
            return Err(MnemosError::Config(
                "max_embedding_attempts must be at least 1".into(),
            ));
        }
        if self.embedding_timeout_ms == 0
            || self.restore_timeout_ms == 0
            || self.checkpoint_timeout_ms == 0
        {
            return Err(MnemosError::Config("timeouts must be non-zero".into()));
        }
        if !(self.deprecated_retention_days.is_finite() && self.deprecated_retention_days >= 0.0)
        {
            return Err(MnemosError::Config(
                "deprecated_retention_days must be a non-negative number".into(),
            ));
        }
        if !(self.confidence_learning_rate > 0.0 && self.confidence_learning_rate <= 1.0) {
            return Err(MnemosError::Config(
                "confidence_learning_rate must be within (0, 1]".into(),
            ));
        }
        Ok(())
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    pub fn restore_timeout(&self) -> Duration {
        Duration::from_millis(self.restore_timeout_ms)
    }

    pub fn checkpoint_timeout(&self) -> Duration {
        Duration::from_millis(self.checkpoint_timeout_ms)
    }

    pub fn pin_budget(&self) -> PinBudget {
        PinBudget {
            max_results: self.constitutional_max_results,
            max_chars: self.constitutional_budget_chars,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rrf_k, 60.0);
        assert_eq!(config.max_embedding_attempts, 3);
        assert_eq!(config.checkpoint_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"rrf_k": 20.0, "track_access": false}"#).unwrap();
        assert_eq!(config.rrf_k, 20.0);
        assert!(!config.track_access);
        assert_eq!(config.constitutional_max_results, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = EngineConfig {
            rrf_k: 0.0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        config.rrf_k = 60.0;
        config.max_embedding_attempts = 0;
        assert!(config.validate().is_err());

        config.max_embedding_attempts = 3;
        config.confidence_learning_rate = 2.0;
        assert!(config.validate().is_err());

        config.confidence_learning_rate = 0.3;
        config.checkpoint_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
