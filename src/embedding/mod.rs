//! Embedding backends behind a single capability trait.
//!
//! The index never knows which backend it is running on; selection
//! happens in [`crate::config::Config::embedder`]. Two variants exist:
//!
//! * [`OpenAiEmbedder`] — a pretrained sentence encoder behind an
//!   OpenAI-compatible `/embeddings` endpoint.
//! * [`HashEmbedder`] — a deterministic hash-bucket fallback used when no
//!   embedding endpoint is configured. Retrieval quality is markedly
//!   worse; it keeps the tool usable offline, nothing more.

pub mod hash;
pub mod openai;

use async_trait::async_trait;

use crate::types::QaError;

pub use hash::HashEmbedder;
pub use openai::OpenAiEmbedder;

/// Maps text to fixed-length vectors for similarity comparison.
///
/// A single index must build and query through the same implementation;
/// vectors from different embedders are not comparable.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Short backend label used in logs and index summaries.
    fn name(&self) -> &str;

    /// Embeds a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QaError>;

    /// Embeds a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, QaError> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_batch(&texts).await?;
        vectors
            .pop()
            .ok_or_else(|| QaError::Embedding("backend returned no vector for query".to_string()))
    }
}
