use async_trait::async_trait;
use mnemos_core::{MnemosError, MnemosResult};
use std::collections::HashMap;

use crate::bm25::tokenize;

/// Trait for computing text embeddings (vector representations).
///
/// Implementations may be slow or fail; the engine bounds every call with a
/// timeout and treats failures as soft.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute embedding vector for a single text.
    async fn embed(&self, text: &str) -> MnemosResult<Vec<f32>>;

    /// Compute embeddings for a batch of texts.
    async fn embed_batch(&self, texts: &[&str]) -> MnemosResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimension of the embedding vectors produced by this provider.
    fn dimension(&self) -> usize;
}

/// Slots each feature is hashed into.
const PROBES: u8 = 2;
/// Weight of adjacent-token bigrams relative to single tokens.
const BIGRAM_WEIGHT: f32 = 0.5;

/// Offline embedding by signed feature hashing.
///
/// Tokens (split the same way as the keyword index) and adjacent-token
/// bigrams are hashed into a fixed number of slots with a hash-derived sign,
/// weighted by sublinear term frequency, and L2-normalized. Unrelated texts
/// land near zero similarity instead of sharing a positive bias.
pub struct LocalEmbedding {
    dimension: usize,
}

impl LocalEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        for probe in 0..PROBES {
            let hash = fnv1a(feature.as_bytes(), probe);
            let slot = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign * weight;
        }
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> MnemosResult<Vec<f32>> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(MnemosError::EmbeddingUnavailable(
                "text has no indexable tokens".to_string(),
            ));
        }

        let mut features: HashMap<String, f32> = HashMap::new();
        for token in &tokens {
            *features.entry(token.clone()).or_insert(0.0) += 1.0;
        }
        for pair in tokens.windows(2) {
            *features.entry(format!("{} {}", pair[0], pair[1])).or_insert(0.0) += BIGRAM_WEIGHT;
        }

        let mut vector = vec![0.0f32; self.dimension];
        for (feature, tf) in &features {
            self.add_feature(&mut vector, feature, 1.0 + tf.ln_1p());
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// 64-bit FNV-1a over `data` followed by a probe byte.
fn fnv1a(data: &[u8], probe: u8) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in data.iter().chain(std::iter::once(&probe)) {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
