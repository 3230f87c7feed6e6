//! Hybrid keyword + vector memory retrieval.
//!
//! Stores timestamped, tiered memory entries and ranks them for a query by
//! fusing a BM25 keyword ranking with a cosine-similarity ranking, then
//! applying per-tier boost and time decay. Also tracks confidence from
//! caller feedback, matches trigger phrases without embedding, and takes
//! named checkpoints of the whole state.
//!
//! # Main types
//!
//! - [`MemoryEngine`] — Owns the entries and both indexes; every operation goes through it.
//! - [`MemoryDraft`] — Caller input for creating or updating an entry.
//! - [`Bm25Index`] / [`VectorIndex`] — The two retrieval indexes.
//! - [`EmbeddingProvider`] — Trait for computing embeddings, with [`LocalEmbedding`].
//! - [`SnapshotStore`] — Where checkpoints and the live state are kept.
//! - [`EngineConfig`] — Tuning knobs, all with defaults.

/// BM25 inverted index for keyword-based retrieval.
pub mod bm25;
/// Checkpoint naming and the checkpoint manager.
pub mod checkpoint;
/// Injectable time source.
pub mod clock;
/// Confidence tracking and the promotion rule.
pub mod confidence;
/// Engine configuration.
pub mod config;
/// Tier boost, time decay, and constitutional pinning.
pub mod decay;
/// Embedding provider trait and local implementation.
pub mod embedding;
/// The engine tying indexes, ranking, and checkpoints together.
pub mod engine;
/// Memory entries, tiers, and ingestion drafts.
pub mod entry;
/// Reciprocal Rank Fusion.
pub mod fusion;
/// Snapshot format and storage backends.
pub mod snapshot;
/// Per-tier decay and boost table.
pub mod tier;
/// Trigger phrase matching.
pub mod trigger;
/// Brute-force cosine vector index.
pub mod vector;

pub use bm25::Bm25Index;
pub use checkpoint::CheckpointManager;
pub use clock::{Clock, ManualClock, SystemClock};
pub use confidence::{ConfidenceTracker, ValidationOutcome};
pub use config::EngineConfig;
pub use decay::ScoreBreakdown;
pub use embedding::{EmbeddingProvider, LocalEmbedding};
pub use engine::{
    DeleteTarget, IndexHealth, MemoryEngine, MemoryStats, RetryReport, ScoredEntry, SearchFilters,
    SearchRequest, SearchResponse,
};
pub use entry::{ContextType, EmbeddingState, ImportanceTier, MemoryDraft, MemoryEntry};
pub use fusion::{FusionStatus, DEFAULT_RRF_K};
pub use snapshot::{
    Checkpoint, CheckpointMeta, FileSnapshotStore, InMemorySnapshotStore, IndexSnapshot,
    SnapshotStore,
};
pub use tier::TierPolicy;
pub use trigger::{TriggerMatch, TriggerMatcher};
pub use vector::VectorIndex;
