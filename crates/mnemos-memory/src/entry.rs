use chrono::{DateTime, Utc};
use mnemos_core::{EntryId, MnemosError, MnemosResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Importance classification controlling decay rate, floor, and score boost.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ImportanceTier {
    /// Always-on content, exempt from decay. Only ever set explicitly.
    Constitutional,
    /// Long-lived, high-priority context.
    Critical,
    /// Context worth keeping around for months.
    Important,
    /// Default tier for new entries.
    #[default]
    Normal,
    /// Short-lived scratch context.
    Temporary,
    /// Superseded context on its way out.
    Deprecated,
}

impl ImportanceTier {
    /// Every tier, in table order.
    pub const ALL: [ImportanceTier; 6] = [
        ImportanceTier::Constitutional,
        ImportanceTier::Critical,
        ImportanceTier::Important,
        ImportanceTier::Normal,
        ImportanceTier::Temporary,
        ImportanceTier::Deprecated,
    ];

    /// Lowercase name used in storage and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportanceTier::Constitutional => "constitutional",
            ImportanceTier::Critical => "critical",
            ImportanceTier::Important => "important",
            ImportanceTier::Normal => "normal",
            ImportanceTier::Temporary => "temporary",
            ImportanceTier::Deprecated => "deprecated",
        }
    }

    /// Position of this tier in [`ImportanceTier::ALL`].
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ImportanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportanceTier {
    type Err = MnemosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        ImportanceTier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == lowered)
            .ok_or_else(|| MnemosError::Validation(format!("unknown importance tier '{s}'")))
    }
}

/// What kind of context an entry records.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    /// Background reading and investigation notes.
    Research,
    /// Notes about code that was written.
    Implementation,
    /// A decision and its rationale.
    Decision,
    /// Something learned along the way.
    Discovery,
    /// Anything else.
    #[default]
    General,
}

impl ContextType {
    /// Every context type.
    pub const ALL: [ContextType; 5] = [
        ContextType::Research,
        ContextType::Implementation,
        ContextType::Decision,
        ContextType::Discovery,
        ContextType::General,
    ];

    /// Lowercase name used in storage and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Research => "research",
            ContextType::Implementation => "implementation",
            ContextType::Decision => "decision",
            ContextType::Discovery => "discovery",
            ContextType::General => "general",
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextType {
    type Err = MnemosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        ContextType::ALL
            .into_iter()
            .find(|ct| ct.as_str() == lowered)
            .ok_or_else(|| MnemosError::Validation(format!("unknown context type '{s}'")))
    }
}

/// Vector-indexing state of an entry.
///
/// An entry is in the vector index exactly when its state is [`EmbeddingState::Ready`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EmbeddingState {
    /// Embedded and vector-searchable.
    Ready,
    /// Embedding failed; queued for another attempt.
    Pending {
        /// Attempts made so far.
        attempts: u32,
        /// Error from the latest attempt.
        last_error: String,
    },
    /// Retries exhausted. Keyword-searchable only.
    Failed {
        /// Attempts made in total.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },
}

impl EmbeddingState {
    /// Whether the entry belongs in the vector index.
    pub fn is_ready(&self) -> bool {
        matches!(self, EmbeddingState::Ready)
    }

    /// Whether the entry is waiting for a retry.
    pub fn is_pending(&self) -> bool {
        matches!(self, EmbeddingState::Pending { .. })
    }

    /// Whether retries were exhausted.
    pub fn is_failed(&self) -> bool {
        matches!(self, EmbeddingState::Failed { .. })
    }

    /// Number of failed attempts recorded so far (0 when ready).
    pub fn attempts(&self) -> u32 {
        match self {
            EmbeddingState::Ready => 0,
            EmbeddingState::Pending { attempts, .. } | EmbeddingState::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// The unit of storage: one timestamped, classified piece of context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: EntryId,
    pub group_key: String,
    pub title: String,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub embedding_state: EmbeddingState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub importance_weight: f32,
    pub importance_tier: ImportanceTier,
    pub context_type: ContextType,
    pub access_count: u32,
    pub validation_count: u32,
    pub confidence_score: f32,
    pub trigger_phrases: BTreeSet<String>,
    /// Last promotion signal raised by the confidence tracker.
    #[serde(default)]
    pub promotion_eligible: bool,
}

impl MemoryEntry {
    /// Text handed to the embedding provider.
    pub fn embedding_text(&self) -> String {
        embedding_text(&self.title, &self.content)
    }

    /// Text indexed by the keyword index: title, content, and trigger phrases.
    pub fn keyword_text(&self) -> String {
        let mut text = String::with_capacity(self.title.len() + self.content.len() + 32);
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.content);
        for phrase in &self.trigger_phrases {
            text.push('\n');
            text.push_str(phrase);
        }
        text
    }

    /// Check the invariants every stored entry must satisfy.
    pub fn check_invariants(&self) -> MnemosResult<()> {
        check_unit_interval("importance_weight", self.importance_weight)?;
        check_unit_interval("confidence_score", self.confidence_score)?;
        match (&self.embedding, self.embedding_state.is_ready()) {
            (Some(_), true) | (None, false) => Ok(()),
            (Some(_), false) => Err(MnemosError::Validation(format!(
                "entry {} carries an embedding but is not marked ready",
                self.id
            ))),
            (None, true) => Err(MnemosError::Validation(format!(
                "entry {} is marked ready without an embedding",
                self.id
            ))),
        }
    }
}

pub(crate) fn embedding_text(title: &str, content: &str) -> String {
    if title.is_empty() {
        content.to_string()
    } else {
        format!("{title}\n{content}")
    }
}

fn check_unit_interval(field: &str, value: f32) -> MnemosResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MnemosError::Validation(format!(
            "{field} must be within [0, 1], got {value}"
        )))
    }
}

/// Caller-supplied ingestion input.
///
/// Tier and context type are accepted as strings so that values outside the
/// enumerations are rejected by [`MemoryDraft::validate`] rather than silently
/// coerced. When `id` is set the upsert updates that entry; unset optional
/// fields then keep the entry's current values, while `trigger_phrases` always
/// replaces the stored set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryDraft {
    #[serde(default)]
    pub id: Option<EntryId>,
    pub group_key: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub importance_tier: Option<String>,
    #[serde(default)]
    pub context_type: Option<String>,
    #[serde(default)]
    pub importance_weight: Option<f32>,
    #[serde(default)]
    pub confidence_score: Option<f32>,
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
}

impl MemoryDraft {
    /// Start a draft for a new entry.
    pub fn new(
        group_key: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            group_key: group_key.into(),
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Target an existing entry instead of creating one.
    pub fn for_id(mut self, id: EntryId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_tier(mut self, tier: ImportanceTier) -> Self {
        self.importance_tier = Some(tier.as_str().to_string());
        self
    }

    pub fn with_context_type(mut self, context_type: ContextType) -> Self {
        self.context_type = Some(context_type.as_str().to_string());
        self
    }

    pub fn with_importance_weight(mut self, weight: f32) -> Self {
        self.importance_weight = Some(weight);
        self
    }

    pub fn with_triggers<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trigger_phrases = phrases.into_iter().map(Into::into).collect();
        self
    }

    /// Parse and range-check every field. Nothing is written on failure.
    pub fn validate(&self) -> MnemosResult<ValidatedDraft> {
        let group_key = self.group_key.trim();
        if group_key.is_empty() {
            return Err(MnemosError::Validation("group_key must not be empty".into()));
        }
        if self.content.trim().is_empty() {
            return Err(MnemosError::Validation("content must not be empty".into()));
        }

        let tier = self
            .importance_tier
            .as_deref()
            .map(ImportanceTier::from_str)
            .transpose()?;
        let context_type = self
            .context_type
            .as_deref()
            .map(ContextType::from_str)
            .transpose()?;

        if let Some(weight) = self.importance_weight {
            check_unit_interval("importance_weight", weight)?;
        }
        if let Some(confidence) = self.confidence_score {
            check_unit_interval("confidence_score", confidence)?;
        }

        let trigger_phrases = self
            .trigger_phrases
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        Ok(ValidatedDraft {
            id: self.id,
            group_key: group_key.to_string(),
            title: self.title.trim().to_string(),
            content: self.content.clone(),
            tier,
            context_type,
            importance_weight: self.importance_weight,
            confidence_score: self.confidence_score,
            trigger_phrases,
        })
    }
}

/// A draft that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedDraft {
    pub id: Option<EntryId>,
    pub group_key: String,
    pub title: String,
    pub content: String,
    pub tier: Option<ImportanceTier>,
    pub context_type: Option<ContextType>,
    pub importance_weight: Option<f32>,
    pub confidence_score: Option<f32>,
    pub trigger_phrases: BTreeSet<String>,
}

impl ValidatedDraft {
    pub fn embedding_text(&self) -> String {
        embedding_text(&self.title, &self.content)
    }

    /// Build a brand-new entry. The embedding fields are filled in by the caller.
    pub(crate) fn into_new_entry(self, id: EntryId, now: DateTime<Utc>) -> MemoryEntry {
        MemoryEntry {
            id,
            group_key: self.group_key,
            title: self.title,
            content: self.content,
            embedding: None,
            embedding_state: EmbeddingState::Pending {
                attempts: 0,
                last_error: String::new(),
            },
            created_at: now,
            updated_at: now,
            last_accessed: now,
            importance_weight: self.importance_weight.unwrap_or(0.5),
            importance_tier: self.tier.unwrap_or_default(),
            context_type: self.context_type.unwrap_or_default(),
            access_count: 0,
            validation_count: 0,
            confidence_score: self.confidence_score.unwrap_or(0.5),
            trigger_phrases: self.trigger_phrases,
            promotion_eligible: false,
        }
    }

    /// Merge into an existing entry, keeping counters and creation time.
    pub(crate) fn merge_into(self, existing: &MemoryEntry, now: DateTime<Utc>) -> MemoryEntry {
        let mut entry = existing.clone();
        entry.group_key = self.group_key;
        entry.title = self.title;
        entry.content = self.content;
        entry.updated_at = now;
        if let Some(tier) = self.tier {
            entry.importance_tier = tier;
        }
        if let Some(context_type) = self.context_type {
            entry.context_type = context_type;
        }
        if let Some(weight) = self.importance_weight {
            entry.importance_weight = weight;
        }
        if let Some(confidence) = self.confidence_score {
            entry.confidence_score = confidence;
        }
        entry.trigger_phrases = self.trigger_phrases;
        entry
    }
}
