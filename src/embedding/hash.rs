//! Deterministic hash-bucket embedding fallback.

use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use rustc_hash::FxHasher;

use super::Embedder;
use crate::types::QaError;

/// Vector width of the fallback embedding space.
pub const DIMENSIONS: usize = 384;

/// Best-effort substitute for a real sentence encoder.
///
/// Each lowercased whitespace token hashes to one of 384 buckets and
/// accumulates a weight that decays with its position in the text; the
/// result is L2-normalized. The mapping is stable across processes, so a
/// store built with this embedder stays queryable after a restart — but
/// the vectors capture keyword overlap, not meaning. Do not mistake its
/// results for real embedding accuracy.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();
        let mut vector = vec![0.0f32; DIMENSIONS];
        let count = words.len().max(1);

        for (position, word) in words.iter().enumerate() {
            let bucket = bucket_for(word);
            let weight = 1.0 - position as f32 / count as f32;
            vector[bucket] += weight;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

fn bucket_for(word: &str) -> usize {
    let mut hasher = FxHasher::default();
    word.hash(&mut hasher);
    (hasher.finish() as usize) % DIMENSIONS
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash-bucket"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QaError> {
        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}
