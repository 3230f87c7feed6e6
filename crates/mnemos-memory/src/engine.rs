//! The hybrid memory engine.
//!
//! One [`MemoryEngine`] owns the entry arena, the keyword and vector indexes,
//! and the trigger matcher, all behind a single `RwLock` so readers only ever
//! observe fully-applied writes. Embeddings are computed before the lock is
//! taken; restores build a verified shadow state and swap it in.

use mnemos_core::{EntryId, MnemosError, MnemosResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bm25::Bm25Index;
use crate::checkpoint::CheckpointManager;
use crate::clock::{Clock, SystemClock};
use crate::confidence::{is_promotion_eligible, ConfidenceTracker, ValidationOutcome};
use crate::config::EngineConfig;
use crate::decay::{is_soft_expired, score_entry, select_pinned, ScoreBreakdown};
use crate::embedding::EmbeddingProvider;
use crate::entry::{ContextType, EmbeddingState, ImportanceTier, MemoryDraft, MemoryEntry};
use crate::fusion::{reciprocal_rank_fusion, FusionStatus};
use crate::snapshot::{
    CheckpointMeta, InMemorySnapshotStore, IndexSnapshot, SnapshotStore, SNAPSHOT_FORMAT_VERSION,
};
use crate::trigger::{TriggerMatch, TriggerMatcher};
use crate::vector::VectorIndex;

// --- Index state ---

/// Everything a write transition touches. Guarded as one unit.
#[derive(Debug)]
struct IndexState {
    next_id: EntryId,
    entries: BTreeMap<EntryId, MemoryEntry>,
    keyword: Bm25Index,
    vector: VectorIndex,
    triggers: TriggerMatcher,
}

impl IndexState {
    fn new() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
            keyword: Bm25Index::new(),
            vector: VectorIndex::new(),
            triggers: TriggerMatcher::new(),
        }
    }

    fn allocate_id(&mut self) -> EntryId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Write an entry into the arena and every index.
    ///
    /// The vector write goes first since it is the only fallible one; if it is
    /// rejected the entry is stored as failed and stays keyword-searchable.
    fn apply(&mut self, mut entry: MemoryEntry) {
        let id = entry.id;
        match entry.embedding.clone() {
            Some(vector) if entry.embedding_state.is_ready() => {
                if let Err(e) = self.vector.insert(id, vector) {
                    warn!(id, error = %e, "Vector index rejected embedding, entry is keyword-only");
                    self.vector.remove(id);
                    entry.embedding = None;
                    entry.embedding_state = EmbeddingState::Failed {
                        attempts: entry.embedding_state.attempts().max(1),
                        last_error: e.to_string(),
                    };
                }
            }
            _ => {
                self.vector.remove(id);
                entry.embedding = None;
            }
        }
        self.keyword.add_document(id, &entry.keyword_text());
        self.triggers.index(id, &entry.trigger_phrases);
        self.entries.insert(id, entry);
    }

    /// Remove an entry everywhere, re-checking both indexes up to
    /// `retry_limit` extra times. Returns the removed entry and whether both
    /// indexes ended up clean.
    fn remove_entry(&mut self, id: EntryId, retry_limit: u32) -> (Option<MemoryEntry>, bool) {
        let removed = self.entries.remove(&id);
        self.triggers.remove(id);
        self.keyword.remove_document(id);
        self.vector.remove(id);

        let mut attempt = 0;
        while self.keyword.contains(id) || self.vector.contains(id) {
            if attempt >= retry_limit {
                return (removed, false);
            }
            attempt += 1;
            self.keyword.remove_document(id);
            self.vector.remove(id);
        }
        (removed, true)
    }

    /// Ids whose index membership disagrees with the arena.
    fn inconsistencies(&self) -> BTreeSet<EntryId> {
        let mut bad = BTreeSet::new();
        for id in self.keyword.ids() {
            if !self.entries.contains_key(&id) {
                bad.insert(id);
            }
        }
        for id in self.vector.ids() {
            if !self.entries.get(&id).is_some_and(|e| e.embedding_state.is_ready()) {
                bad.insert(id);
            }
        }
        for (id, entry) in &self.entries {
            let in_vector = self.vector.contains(*id);
            if !self.keyword.contains(*id) || entry.embedding_state.is_ready() != in_vector {
                bad.insert(*id);
            }
        }
        bad
    }

    fn to_snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            version: SNAPSHOT_FORMAT_VERSION,
            next_id: self.next_id,
            entries: self.entries.values().cloned().collect(),
            keyword: self.keyword.clone(),
            vector: self.vector.clone(),
        }
    }

    /// Rebuild a state from a snapshot, rejecting anything inconsistent.
    fn from_snapshot(snapshot: IndexSnapshot) -> MnemosResult<Self> {
        if snapshot.version != SNAPSHOT_FORMAT_VERSION {
            return Err(MnemosError::Validation(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_FORMAT_VERSION})",
                snapshot.version
            )));
        }

        let mut entries = BTreeMap::new();
        let mut triggers = TriggerMatcher::new();
        for entry in snapshot.entries {
            entry.check_invariants()?;
            if entry.id >= snapshot.next_id {
                return Err(MnemosError::Validation(format!(
                    "entry {} is not below the id counter {}",
                    entry.id, snapshot.next_id
                )));
            }
            triggers.index(entry.id, &entry.trigger_phrases);
            if entries.insert(entry.id, entry).is_some() {
                return Err(MnemosError::Validation("duplicate entry id in snapshot".into()));
            }
        }
        snapshot.vector.check_dimensions()?;

        let state = Self {
            next_id: snapshot.next_id.max(1),
            entries,
            keyword: snapshot.keyword,
            vector: snapshot.vector,
            triggers,
        };
        let bad = state.inconsistencies();
        if let Some(first) = bad.first() {
            return Err(MnemosError::IndexInconsistency(format!(
                "{} entries disagree between arena and indexes (first: {first})",
                bad.len()
            )));
        }
        Ok(state)
    }
}

// --- Requests and responses ---

/// Restrictions applied before ranking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub tier: Option<ImportanceTier>,
    #[serde(default)]
    pub context_type: Option<ContextType>,
    #[serde(default)]
    pub group_key: Option<String>,
    /// Also return soft-expired deprecated entries.
    #[serde(default)]
    pub include_expired: bool,
}

impl SearchFilters {
    fn accepts(&self, entry: &MemoryEntry) -> bool {
        self.tier.map_or(true, |t| t == entry.importance_tier)
            && self.context_type.map_or(true, |c| c == entry.context_type)
            && self.group_key.as_deref().map_or(true, |g| g == entry.group_key)
    }
}

/// A hybrid search query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub filters: SearchFilters,
    /// Maximum number of query-specific results, not counting pinned entries.
    pub limit: usize,
    pub use_decay: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filters: SearchFilters::default(),
            limit: 10,
            use_decay: true,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn without_decay(mut self) -> Self {
        self.use_decay = false;
        self
    }
}

/// One search hit with its score components.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntry {
    pub entry: MemoryEntry,
    pub breakdown: ScoreBreakdown,
}

/// Search output. Pinned constitutional entries come first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    /// Whether the query itself matched anything in either index.
    pub status: FusionStatus,
    pub results: Vec<ScoredEntry>,
    pub keyword_candidates: usize,
    pub vector_candidates: usize,
    /// The query could not be embedded and ranking is keyword-only.
    pub degraded: bool,
}

impl SearchResponse {
    pub fn ids(&self) -> Vec<EntryId> {
        self.results.iter().map(|r| r.entry.id).collect()
    }
}

/// What to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    Id(EntryId),
    /// Every entry with this group key.
    Group(String),
}

/// Outcome of one pass over pending embeddings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub attempted: usize,
    pub embedded: usize,
    pub still_pending: usize,
    pub failed: usize,
    /// Entries changed or removed while their embedding was being computed.
    pub skipped: usize,
}

/// Agreement between the arena and the two indexes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexHealth {
    pub consistent: bool,
    pub keyword_documents: usize,
    pub vector_documents: usize,
    pub vector_dimension: Option<usize>,
    pub inconsistent_ids: Vec<EntryId>,
}

/// Corpus overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    pub total: usize,
    pub by_tier: BTreeMap<String, usize>,
    pub by_context_type: BTreeMap<String, usize>,
    pub pending_embeddings: usize,
    pub failed_embeddings: usize,
    pub soft_expired: usize,
    pub promotion_eligible: usize,
    pub health: IndexHealth,
}

// --- Engine ---

/// Hybrid keyword + vector memory store with tiered decay, confidence
/// tracking, trigger matching, and checkpoints.
pub struct MemoryEngine {
    state: RwLock<IndexState>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn SnapshotStore>,
    checkpoints: CheckpointManager,
    /// Serializes checkpoint creation and restore.
    checkpoint_lock: Mutex<()>,
    tracker: ConfidenceTracker,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    /// Ids a removal could not clear from both indexes.
    inconsistencies: parking_lot::Mutex<BTreeSet<EntryId>>,
}

impl MemoryEngine {
    /// An empty engine with default configuration, an in-memory snapshot
    /// store, and the system clock.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let store: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
        Self {
            state: RwLock::new(IndexState::new()),
            embedder,
            checkpoints: CheckpointManager::new(store.clone()),
            store,
            checkpoint_lock: Mutex::new(()),
            tracker: ConfidenceTracker::default(),
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
            inconsistencies: parking_lot::Mutex::new(BTreeSet::new()),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> MnemosResult<Self> {
        config.validate()?;
        self.tracker = ConfidenceTracker::new(config.confidence_learning_rate)?;
        self.config = config;
        Ok(self)
    }

    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.checkpoints = CheckpointManager::new(store.clone());
        self.store = store;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Load the live state saved in the snapshot store, if there is one.
    pub async fn open(self) -> MnemosResult<Self> {
        if let Some(snapshot) = self.store.load_live().await? {
            let state = IndexState::from_snapshot(snapshot).map_err(|e| {
                MnemosError::Storage(format!("saved live state is unusable: {e}"))
            })?;
            info!(entries = state.entries.len(), "Loaded live memory state");
            *self.state.write().await = state;
        }
        Ok(self)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Write the current state to the snapshot store.
    pub async fn persist(&self) -> MnemosResult<()> {
        let snapshot = self.state.read().await.to_snapshot();
        self.store.save_live(&snapshot).await?;
        debug!(entries = snapshot.entries.len(), "Persisted live memory state");
        Ok(())
    }

    // --- Writes ---

    /// Create or update an entry.
    ///
    /// Validation errors are returned before anything is written. Embedding
    /// failures are not: the entry is stored keyword-only and queued for retry.
    pub async fn upsert(&self, draft: MemoryDraft) -> MnemosResult<EntryId> {
        let draft = draft.validate()?;
        if let Some(id) = draft.id {
            if !self.state.read().await.entries.contains_key(&id) {
                return Err(MnemosError::NotFound(id));
            }
        }

        let embedded = self.embed_text(&draft.embedding_text()).await;

        let now = self.clock.now();
        let mut state = self.state.write().await;
        let mut entry = match draft.id {
            Some(id) => {
                let existing = state.entries.get(&id).ok_or(MnemosError::NotFound(id))?;
                draft.merge_into(existing, now)
            }
            None => {
                let id = state.allocate_id();
                draft.into_new_entry(id, now)
            }
        };
        entry.promotion_eligible = is_promotion_eligible(&entry);
        self.settle_embedding(&mut entry, embedded, 0);

        let id = entry.id;
        state.apply(entry);
        debug!(id, "Upserted memory entry");
        Ok(id)
    }

    /// Retry every pending embedding once.
    pub async fn retry_pending_embeddings(&self) -> MnemosResult<RetryReport> {
        let pending: Vec<(EntryId, String, u32)> = self
            .state
            .read()
            .await
            .entries
            .values()
            .filter(|e| e.embedding_state.is_pending())
            .map(|e| (e.id, e.embedding_text(), e.embedding_state.attempts()))
            .collect();

        let mut report = RetryReport::default();
        for (id, text, attempts) in pending {
            report.attempted += 1;
            let embedded = self.embed_text(&text).await;

            let mut state = self.state.write().await;
            let unchanged = state.entries.get(&id).is_some_and(|e| {
                e.embedding_state.is_pending()
                    && e.embedding_state.attempts() == attempts
                    && e.embedding_text() == text
            });
            if !unchanged {
                report.skipped += 1;
                continue;
            }
            let Some(mut entry) = state.entries.get(&id).cloned() else {
                report.skipped += 1;
                continue;
            };
            self.settle_embedding(&mut entry, embedded, attempts);
            state.apply(entry);

            match state.entries.get(&id).map(|e| &e.embedding_state) {
                Some(EmbeddingState::Ready) => report.embedded += 1,
                Some(EmbeddingState::Pending { .. }) => report.still_pending += 1,
                _ => report.failed += 1,
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                embedded = report.embedded,
                still_pending = report.still_pending,
                failed = report.failed,
                skipped = report.skipped,
                "Retried pending embeddings"
            );
        }
        Ok(report)
    }

    /// Run [`MemoryEngine::retry_pending_embeddings`] every `interval` until
    /// the engine is dropped.
    pub fn spawn_embedding_worker(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                if let Err(e) = engine.retry_pending_embeddings().await {
                    warn!(error = %e, "Embedding retry pass failed");
                }
            }
        })
    }

    /// Remove one entry. Returns `false` if it did not exist.
    pub async fn remove(&self, id: EntryId) -> MnemosResult<bool> {
        let mut state = self.state.write().await;
        Ok(self.remove_locked(&mut state, id))
    }

    /// Remove an entry or a whole group. Returns how many entries were removed.
    pub async fn delete(&self, target: DeleteTarget) -> MnemosResult<usize> {
        let mut state = self.state.write().await;
        let ids: Vec<EntryId> = match &target {
            DeleteTarget::Id(id) => vec![*id],
            DeleteTarget::Group(group) => state
                .entries
                .values()
                .filter(|e| &e.group_key == group)
                .map(|e| e.id)
                .collect(),
        };
        let mut removed = 0;
        for id in ids {
            if self.remove_locked(&mut state, id) {
                removed += 1;
            }
        }
        info!(delete_target = ?target, removed, "Deleted memory entries");
        Ok(removed)
    }

    fn remove_locked(&self, state: &mut IndexState, id: EntryId) -> bool {
        let (removed, clean) = state.remove_entry(id, self.config.remove_retry_limit);
        if clean {
            self.inconsistencies.lock().remove(&id);
        } else {
            let err = MnemosError::IndexInconsistency(format!(
                "entry {id} still present in an index after removal"
            ));
            error!(id, error = %err, "Removal left the indexes inconsistent");
            self.inconsistencies.lock().insert(id);
        }
        removed.is_some()
    }

    /// Record whether an entry was useful.
    pub async fn validate(&self, id: EntryId, was_useful: bool) -> MnemosResult<ValidationOutcome> {
        let mut state = self.state.write().await;
        let entry = state.entries.get_mut(&id).ok_or(MnemosError::NotFound(id))?;
        let was_eligible = entry.promotion_eligible;
        let outcome = self.tracker.record(entry, was_useful);
        if outcome.promotion_eligible && !was_eligible {
            info!(
                id,
                tier = %outcome.tier,
                confidence = outcome.confidence_score,
                validations = outcome.validation_count,
                "Entry is eligible for promotion"
            );
        }
        Ok(outcome)
    }

    /// Explicitly move an entry to another tier.
    pub async fn set_tier(&self, id: EntryId, tier: ImportanceTier) -> MnemosResult<MemoryEntry> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let entry = state.entries.get_mut(&id).ok_or(MnemosError::NotFound(id))?;
        let previous = entry.importance_tier;
        entry.importance_tier = tier;
        entry.updated_at = now;
        entry.promotion_eligible = is_promotion_eligible(entry);
        info!(id, from = %previous, to = %tier, "Changed entry tier");
        Ok(entry.clone())
    }

    // --- Reads ---

    pub async fn get(&self, id: EntryId) -> MnemosResult<MemoryEntry> {
        self.state
            .read()
            .await
            .entries
            .get(&id)
            .cloned()
            .ok_or(MnemosError::NotFound(id))
    }

    /// Hybrid keyword + vector search.
    ///
    /// Constitutional entries accepted by the filters are pinned ahead of the
    /// ranked results within the configured budget. If the query cannot be
    /// embedded the ranking falls back to keywords alone.
    pub async fn search(&self, request: SearchRequest) -> MnemosResult<SearchResponse> {
        if request.limit == 0 {
            return Err(MnemosError::Validation("limit must be at least 1".into()));
        }
        if request.query.trim().is_empty() {
            return Err(MnemosError::Validation("query must not be empty".into()));
        }

        let query_vector = match self.embed_text(&request.query).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(error = %e, "Query embedding unavailable, using keyword ranking only");
                None
            }
        };
        let degraded = query_vector.is_none();
        let now = self.clock.now();
        let retention = self.config.deprecated_retention_days;
        let budget = self.config.pin_budget();
        let depth = request
            .limit
            .saturating_mul(self.config.candidate_multiplier)
            .saturating_add(budget.max_results);

        let (response, touched) = {
            let state = self.state.read().await;
            let visible = |id: EntryId| {
                state.entries.get(&id).is_some_and(|e| {
                    request.filters.accepts(e)
                        && (request.filters.include_expired || !is_soft_expired(e, now, retention))
                })
            };

            let keyword_ids: Vec<EntryId> = state
                .keyword
                .search_filtered(&request.query, depth, visible)
                .into_iter()
                .map(|(id, _)| id)
                .collect();
            let vector_ids: Vec<EntryId> = match &query_vector {
                Some(q) => state
                    .vector
                    .search_filtered(q, depth, self.config.min_vector_similarity, visible)?
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect(),
                None => Vec::new(),
            };

            let fused = reciprocal_rank_fusion(
                &[keyword_ids.as_slice(), vector_ids.as_slice()],
                self.config.rrf_k,
                depth,
            );
            let fused_scores: HashMap<EntryId, f32> =
                fused.candidates.iter().map(|c| (c.id, c.score)).collect();

            let constitutional: Vec<(&MemoryEntry, f32)> = state
                .entries
                .values()
                .filter(|e| e.importance_tier == ImportanceTier::Constitutional && visible(e.id))
                .map(|e| (e, fused_scores.get(&e.id).copied().unwrap_or(0.0)))
                .collect();
            let pinned_idx = select_pinned(&constitutional, budget);

            let mut results =
                Vec::with_capacity(pinned_idx.len() + fused.candidates.len().min(request.limit));
            let mut pinned_ids = BTreeSet::new();
            for idx in pinned_idx {
                let (entry, fused_score) = constitutional[idx];
                let mut breakdown = score_entry(entry, fused_score, now, request.use_decay);
                breakdown.pinned = true;
                pinned_ids.insert(entry.id);
                results.push(ScoredEntry {
                    entry: entry.clone(),
                    breakdown,
                });
            }

            let mut ranked: Vec<ScoredEntry> = fused
                .candidates
                .iter()
                .filter(|c| !pinned_ids.contains(&c.id))
                .filter_map(|c| {
                    let entry = state.entries.get(&c.id)?;
                    Some(ScoredEntry {
                        entry: entry.clone(),
                        breakdown: score_entry(entry, c.score, now, request.use_decay),
                    })
                })
                .collect();
            ranked.sort_by(|a, b| {
                b.breakdown
                    .final_score
                    .partial_cmp(&a.breakdown.final_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(
                        b.breakdown
                            .fused_score
                            .partial_cmp(&a.breakdown.fused_score)
                            .unwrap_or(std::cmp::Ordering::Equal),
                    )
                    .then(a.entry.id.cmp(&b.entry.id))
            });
            ranked.truncate(request.limit);
            results.extend(ranked);

            let touched: Vec<EntryId> = results.iter().map(|r| r.entry.id).collect();
            let response = SearchResponse {
                status: fused.status,
                results,
                keyword_candidates: keyword_ids.len(),
                vector_candidates: vector_ids.len(),
                degraded,
            };
            (response, touched)
        };

        if self.config.track_access && !touched.is_empty() {
            let mut state = self.state.write().await;
            for id in touched {
                if let Some(entry) = state.entries.get_mut(&id) {
                    entry.access_count = entry.access_count.saturating_add(1);
                    entry.last_accessed = entry.last_accessed.max(now);
                }
            }
        }

        debug!(
            query = %request.query,
            results = response.results.len(),
            degraded,
            "Search complete"
        );
        Ok(response)
    }

    /// Entries whose trigger phrases occur in `text`. Never embeds anything.
    pub async fn match_triggers(&self, text: &str, limit: usize) -> Vec<TriggerMatch> {
        let now = self.clock.now();
        let retention = self.config.deprecated_retention_days;
        let state = self.state.read().await;
        state.triggers.match_text(text, limit, |id| {
            state
                .entries
                .get(&id)
                .filter(|e| !is_soft_expired(e, now, retention))
                .map(|e| e.last_accessed)
        })
    }

    pub async fn stats(&self) -> MnemosResult<MemoryStats> {
        let now = self.clock.now();
        let retention = self.config.deprecated_retention_days;
        let state = self.state.read().await;

        let mut by_tier = [0usize; ImportanceTier::ALL.len()];
        let mut by_context: BTreeMap<String, usize> = ContextType::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), 0))
            .collect();
        let mut stats = MemoryStats {
            total: state.entries.len(),
            by_tier: BTreeMap::new(),
            by_context_type: BTreeMap::new(),
            pending_embeddings: 0,
            failed_embeddings: 0,
            soft_expired: 0,
            promotion_eligible: 0,
            health: self.health_locked(&state),
        };
        for entry in state.entries.values() {
            by_tier[entry.importance_tier.index()] += 1;
            *by_context
                .entry(entry.context_type.as_str().to_string())
                .or_default() += 1;
            match entry.embedding_state {
                EmbeddingState::Pending { .. } => stats.pending_embeddings += 1,
                EmbeddingState::Failed { .. } => stats.failed_embeddings += 1,
                EmbeddingState::Ready => {}
            }
            if is_soft_expired(entry, now, retention) {
                stats.soft_expired += 1;
            }
            if entry.promotion_eligible {
                stats.promotion_eligible += 1;
            }
        }
        stats.by_tier = ImportanceTier::ALL
            .iter()
            .map(|t| (t.as_str().to_string(), by_tier[t.index()]))
            .collect();
        stats.by_context_type = by_context;
        Ok(stats)
    }

    /// Report index health, failing if the indexes disagree with the arena.
    pub async fn health_check(&self) -> MnemosResult<IndexHealth> {
        let health = {
            let state = self.state.read().await;
            self.health_locked(&state)
        };
        if health.consistent {
            Ok(health)
        } else {
            Err(MnemosError::IndexInconsistency(format!(
                "inconsistent entries: {:?}; restore a checkpoint to repair the indexes",
                health.inconsistent_ids
            )))
        }
    }

    fn health_locked(&self, state: &IndexState) -> IndexHealth {
        let mut bad = state.inconsistencies();
        bad.extend(self.inconsistencies.lock().iter().copied());
        IndexHealth {
            consistent: bad.is_empty(),
            keyword_documents: state.keyword.document_count(),
            vector_documents: state.vector.len(),
            vector_dimension: state.vector.dimension(),
            inconsistent_ids: bad.into_iter().collect(),
        }
    }

    // --- Checkpoints ---

    /// Snapshot the whole engine under `name`. Names are never reused.
    ///
    /// Bounded by `checkpoint_timeout_ms`; on timeout nothing is stored and a
    /// retryable [`MnemosError::Timeout`] is returned.
    pub async fn checkpoint_create(
        &self,
        name: &str,
        description: &str,
    ) -> MnemosResult<CheckpointMeta> {
        let deadline = tokio::time::Instant::now() + self.config.checkpoint_timeout();
        let timed_out = |stage: &str| {
            warn!(checkpoint = %name, stage, "Checkpoint creation timed out");
            MnemosError::Timeout(format!("checkpoint '{name}' timed out {stage}"))
        };

        let _guard = tokio::time::timeout_at(deadline, self.checkpoint_lock.lock())
            .await
            .map_err(|_| timed_out("waiting for another checkpoint operation"))?;
        let snapshot = tokio::time::timeout_at(deadline, self.state.read())
            .await
            .map_err(|_| timed_out("waiting for the index read lock"))?
            .to_snapshot();
        tokio::time::timeout_at(
            deadline,
            self.checkpoints.create(name, description, snapshot, self.clock.now()),
        )
        .await
        .map_err(|_| timed_out("writing to storage"))?
    }

    /// Checkpoints, oldest first.
    pub async fn checkpoint_list(&self) -> MnemosResult<Vec<CheckpointMeta>> {
        self.checkpoints.list().await
    }

    /// Replace the live state with a checkpoint. Returns the restored entry count.
    ///
    /// The checkpoint is loaded and verified into a shadow state before the
    /// write lock is requested; the whole operation is bounded by
    /// `restore_timeout_ms`. On any error the live state is left as it was.
    pub async fn checkpoint_restore(&self, name: &str) -> MnemosResult<usize> {
        let deadline = tokio::time::Instant::now() + self.config.restore_timeout();
        let timed_out = |stage: &str| MnemosError::RestoreFailed {
            reason: format!("restore of '{name}' timed out {stage}"),
            retryable: true,
        };

        let _guard = tokio::time::timeout_at(deadline, self.checkpoint_lock.lock())
            .await
            .map_err(|_| timed_out("waiting for another checkpoint operation"))?;

        let checkpoint = tokio::time::timeout_at(deadline, self.checkpoints.load(name))
            .await
            .map_err(|_| timed_out("loading the checkpoint"))?
            .map_err(|e| match e {
                MnemosError::CheckpointNotFound(_) | MnemosError::RestoreFailed { .. } => e,
                other => MnemosError::RestoreFailed {
                    reason: format!("could not read checkpoint '{name}': {other}"),
                    retryable: true,
                },
            })?;

        let shadow = IndexState::from_snapshot(checkpoint.state).map_err(|e| {
            MnemosError::restore_failed(format!("checkpoint '{name}' failed verification: {e}"))
        })?;
        let restored = shadow.entries.len();

        let mut state = tokio::time::timeout_at(deadline, self.state.write())
            .await
            .map_err(|_| timed_out("waiting for the index write lock"))?;
        *state = shadow;
        drop(state);
        self.inconsistencies.lock().clear();

        info!(checkpoint = %name, entries = restored, "Restored checkpoint");
        Ok(restored)
    }

    // --- Embedding helpers ---

    /// Embed `text` under the configured timeout and check the result is usable.
    async fn embed_text(&self, text: &str) -> MnemosResult<Vec<f32>> {
        let timeout = self.config.embedding_timeout();
        let vector = tokio::time::timeout(timeout, self.embedder.embed(text))
            .await
            .map_err(|_| {
                MnemosError::EmbeddingUnavailable(format!(
                    "embedding timed out after {}ms",
                    self.config.embedding_timeout_ms
                ))
            })??;
        if vector.is_empty() || vector.iter().any(|v| !v.is_finite()) {
            return Err(MnemosError::EmbeddingUnavailable(
                "provider returned an empty or non-finite vector".into(),
            ));
        }
        if vector.len() != self.embedder.dimension() {
            return Err(MnemosError::EmbeddingUnavailable(format!(
                "provider returned dimension {}, expected {}",
                vector.len(),
                self.embedder.dimension()
            )));
        }
        Ok(vector)
    }

    /// Store an embedding result on an entry. `prior_attempts` is the number of
    /// failed attempts already recorded.
    fn settle_embedding(
        &self,
        entry: &mut MemoryEntry,
        result: MnemosResult<Vec<f32>>,
        prior_attempts: u32,
    ) {
        match result {
            Ok(vector) => {
                entry.embedding = Some(vector);
                entry.embedding_state = EmbeddingState::Ready;
            }
            Err(e) => {
                let attempts = prior_attempts.saturating_add(1);
                let last_error = e.to_string();
                entry.embedding = None;
                if attempts >= self.config.max_embedding_attempts {
                    warn!(
                        id = entry.id,
                        attempts,
                        error = %e,
                        "Embedding failed permanently, entry is keyword-only"
                    );
                    entry.embedding_state = EmbeddingState::Failed {
                        attempts,
                        last_error,
                    };
                } else {
                    warn!(id = entry.id, attempts, error = %e, "Embedding failed, will retry");
                    entry.embedding_state = EmbeddingState::Pending {
                        attempts,
                        last_error,
                    };
                }
            }
        }
    }
}
