use mnemos_core::{EntryId, MnemosError, MnemosResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// In-memory vector index using brute-force cosine similarity.
/// Suitable for small-to-medium corpora (<100k entries).
///
/// All vectors share one dimension, fixed by the first insert and released
/// when the index becomes empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    vectors: BTreeMap<EntryId, Vec<f32>>,
    dimension: Option<usize>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the vector stored under `id`.
    pub fn insert(&mut self, id: EntryId, vector: Vec<f32>) -> MnemosResult<()> {
        if vector.is_empty() {
            return Err(MnemosError::Validation("empty embedding".to_string()));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(MnemosError::Validation(
                "embedding contains non-finite values".to_string(),
            ));
        }
        // A replacement may change the dimension only if it is the sole vector.
        let others = self.vectors.len() - usize::from(self.vectors.contains_key(&id));
        match self.dimension {
            Some(dim) if dim != vector.len() && others > 0 => {
                return Err(MnemosError::Validation(format!(
                    "embedding dimension {} does not match index dimension {dim}",
                    vector.len()
                )));
            }
            _ => self.dimension = Some(vector.len()),
        }
        self.vectors.insert(id, vector);
        Ok(())
    }

    /// Remove a vector. Returns `false` if nothing was stored under `id`.
    pub fn remove(&mut self, id: EntryId) -> bool {
        let removed = self.vectors.remove(&id).is_some();
        if self.vectors.is_empty() {
            self.dimension = None;
        }
        removed
    }

    /// Search for the top-k vectors most similar to `query`, keeping only
    /// entries accepted by `filter` and with similarity above `min_similarity`.
    pub fn search_filtered<F>(
        &self,
        query: &[f32],
        top_k: usize,
        min_similarity: f32,
        filter: F,
    ) -> MnemosResult<Vec<(EntryId, f32)>>
    where
        F: Fn(EntryId) -> bool,
    {
        if query.is_empty() {
            return Err(MnemosError::Validation("Empty query embedding".to_string()));
        }
        if self.dimension.is_some_and(|dim| dim != query.len()) {
            tracing::warn!(
                query_dimension = query.len(),
                index_dimension = ?self.dimension,
                "Query embedding dimension mismatch, skipping vector search"
            );
            return Ok(Vec::new());
        }

        let mut scored: Vec<(EntryId, f32)> = self
            .vectors
            .iter()
            .filter(|(id, _)| filter(**id))
            .map(|(id, v)| (*id, cosine_similarity(query, v)))
            .filter(|(_, score)| *score > min_similarity)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        Ok(scored)
    }

    /// Whether a vector is stored under `id`.
    pub fn contains(&self, id: EntryId) -> bool {
        self.vectors.contains_key(&id)
    }

    /// Ids with a stored vector, ascending.
    pub fn ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.vectors.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Dimension shared by all stored vectors, if any are stored.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Check that every stored vector has the recorded dimension.
    pub(crate) fn check_dimensions(&self) -> MnemosResult<()> {
        match self.dimension {
            None if self.vectors.is_empty() => Ok(()),
            None => Err(MnemosError::Validation(
                "vector index has vectors but no dimension".to_string(),
            )),
            Some(dim) => match self.vectors.iter().find(|(_, v)| v.len() != dim) {
                Some((id, v)) => Err(MnemosError::Validation(format!(
                    "vector for entry {id} has dimension {}, expected {dim}",
                    v.len()
                ))),
                None => Ok(()),
            },
        }
    }
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}
