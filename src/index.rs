//! Builds and queries the per-site embedding collections.
//!
//! Each indexed domain gets its own collection database under the data
//! directory. Rebuilding a domain replaces its collection wholesale; a
//! failed build leaves the previous collection untouched because nothing
//! is deleted until chunking and embedding have both succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info};

use crate::chunking::Chunk;
use crate::embedding::Embedder;
use crate::stores::{Backend, ChunkRecord, SqliteChunkStore, collection_name};
use crate::types::QaError;

/// Number of nearest chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 5;

/// Outcome of an index build, for reporting to the caller.
#[derive(Clone, Debug)]
pub struct IndexSummary {
    pub collection: String,
    pub chunks: usize,
    pub embedder: String,
}

/// Embeds chunks and persists them in similarity-searchable collections.
pub struct EmbeddingIndex {
    embedder: Arc<dyn Embedder>,
    data_dir: PathBuf,
}

impl EmbeddingIndex {
    pub fn new(embedder: Arc<dyn Embedder>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            embedder,
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Embeds `chunks` and writes them to the collection derived from the
    /// first chunk's source domain, replacing any previous collection for
    /// that domain.
    pub async fn build(&self, chunks: &[Chunk]) -> Result<IndexSummary, QaError> {
        let Some(first) = chunks.first() else {
            return Err(QaError::IndexBuild);
        };
        let collection = collection_name(&first.metadata.source_url);

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(QaError::Embedding(format!(
                "embedder produced {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let records: Vec<ChunkRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord::from_chunk(chunk, vector))
            .collect();

        fs::create_dir_all(&self.data_dir).await?;
        let path = self.collection_path(&collection);
        if path.exists() {
            fs::remove_file(&path).await?;
            debug!(collection = %collection, "replacing existing collection");
        }

        let store = SqliteChunkStore::open(&path).await?;
        store.insert_chunks(records).await?;

        info!(
            collection = %collection,
            chunks = chunks.len(),
            embedder = self.embedder.name(),
            "indexed site"
        );
        Ok(IndexSummary {
            collection,
            chunks: chunks.len(),
            embedder: self.embedder.name().to_string(),
        })
    }

    /// Returns up to `top_k` chunks nearest to `text`, closest first.
    ///
    /// A collection that does not exist (never built, or cleared) yields
    /// an empty result set rather than an error.
    pub async fn query(
        &self,
        collection: &str,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<(Chunk, f32)>, QaError> {
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_query(text).await?;
        let store = SqliteChunkStore::open(&path).await?;
        let hits = store.search_similar(&vector, top_k).await?;
        debug!(collection = %collection, hits = hits.len(), "retrieved chunks");
        Ok(hits
            .into_iter()
            .map(|(record, distance)| (record.into_chunk(), distance))
            .collect())
    }

    /// Deletes every persisted collection and recreates the data directory.
    pub async fn clear_all(&self) -> Result<(), QaError> {
        if self.data_dir.exists() {
            fs::remove_dir_all(&self.data_dir).await?;
        }
        fs::create_dir_all(&self.data_dir).await?;
        info!(dir = %self.data_dir.display(), "cleared all collections");
        Ok(())
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.data_dir.join(format!("{collection}.sqlite"))
    }
}
