//! Chunk storage behind a backend trait plus collection naming rules.
//!
//! One collection holds the embedded chunks of one indexed site. The
//! [`Backend`] trait keeps the index code independent of the concrete
//! store; [`sqlite::SqliteChunkStore`] is the only implementation today.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::chunking::{Chunk, ChunkMetadata};
use crate::types::QaError;

pub use sqlite::SqliteChunkStore;

/// A chunk paired with its embedding, ready for persistence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique row id.
    pub id: String,
    /// URL of the page the chunk came from.
    pub source_url: String,
    /// Title of that page.
    pub page_title: String,
    /// Zero-based position of the chunk within its page.
    pub chunk_index: usize,
    /// Number of chunks the page produced.
    pub total_chunks: usize,
    /// The chunk text itself.
    pub content: String,
    /// The embedding vector, when computed.
    pub embedding: Option<Vec<f32>>,
}

impl ChunkRecord {
    /// Pairs a chunk with its embedding under a fresh row id.
    pub fn from_chunk(chunk: &Chunk, embedding: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_url: chunk.metadata.source_url.clone(),
            page_title: chunk.metadata.page_title.clone(),
            chunk_index: chunk.metadata.chunk_index,
            total_chunks: chunk.metadata.total_chunks,
            content: chunk.text.clone(),
            embedding: Some(embedding),
        }
    }

    /// Rebuilds the retrieval-side [`Chunk`] view of this record.
    pub fn into_chunk(self) -> Chunk {
        Chunk {
            text: self.content,
            metadata: ChunkMetadata {
                source_url: self.source_url,
                page_title: self.page_title,
                chunk_index: self.chunk_index,
                total_chunks: self.total_chunks,
            },
        }
    }
}

/// Storage interface for one collection of embedded chunks.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Inserts records in order. Records without embeddings are skipped.
    async fn insert_chunks(&self, records: Vec<ChunkRecord>) -> Result<(), QaError>;

    /// Returns up to `top_k` records ordered by non-decreasing cosine
    /// distance to `query_embedding`, ties broken by insertion order.
    /// An uninitialized collection yields an empty vec.
    async fn search_similar(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, QaError>;

    /// Number of stored chunks.
    async fn count(&self) -> Result<usize, QaError>;
}

/// Derives the collection name for a source URL's domain.
///
/// Deterministic and pure: strip a leading `www.`, replace anything
/// outside `[A-Za-z0-9.-]` with `-`, trim non-alphanumeric edges, pad
/// with a `site-` prefix below 3 characters, truncate to 50.
pub fn collection_name(source_url: &str) -> String {
    let domain = Url::parse(source_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_default();
    let domain = domain.strip_prefix("www.").unwrap_or(&domain);

    let replaced: String = domain
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = replaced.trim_matches(|c: char| !c.is_ascii_alphanumeric());

    let padded = if trimmed.chars().count() < 3 {
        if trimmed.is_empty() {
            "site-default".to_string()
        } else {
            format!("site-{trimmed}")
        }
    } else {
        trimmed.to_string()
    };

    padded.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_name_strips_www_prefix() {
        assert_eq!(collection_name("https://www.example.com/page"), "example.com");
    }

    #[test]
    fn collection_name_is_deterministic() {
        let a = collection_name("https://docs.example.org/a");
        let b = collection_name("https://docs.example.org/b?q=1");
        assert_eq!(a, b);
        assert_eq!(a, "docs.example.org");
    }

    #[test]
    fn collection_name_replaces_invalid_characters() {
        let name = collection_name("http://host_with_underscores.com");
        assert_eq!(name, "host-with-underscores.com");
    }

    #[test]
    fn collection_name_pads_short_domains() {
        assert_eq!(collection_name("http://ab"), "site-ab");
        assert_eq!(collection_name("not a url"), "site-default");
    }

    #[test]
    fn collection_name_truncates_to_fifty() {
        let long = format!("https://{}.com", "a".repeat(80));
        let name = collection_name(&long);
        assert_eq!(name.chars().count(), 50);
    }

    #[test]
    fn collection_name_shape_is_store_safe() {
        for input in [
            "https://www.example.com",
            "http://sub.domain.co.uk/path",
            "http://ab",
            "https://127.0.0.1:8080/x",
        ] {
            let name = collection_name(input);
            let mut chars = name.chars();
            assert!(chars.next().unwrap().is_ascii_alphanumeric(), "{name}");
            assert!(
                name.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-')),
                "{name}"
            );
            assert!(name.chars().count() <= 50);
        }
    }

    #[test]
    fn record_round_trips_to_chunk() {
        let chunk = Chunk {
            text: "Some content".to_string(),
            metadata: ChunkMetadata {
                source_url: "https://example.com".to_string(),
                page_title: "Example".to_string(),
                chunk_index: 2,
                total_chunks: 5,
            },
        };
        let record = ChunkRecord::from_chunk(&chunk, vec![0.1, 0.2]);
        assert_eq!(record.embedding.as_deref(), Some(&[0.1, 0.2][..]));
        assert_eq!(record.into_chunk(), chunk);
    }
}
