//! Per-session orchestration of the index and answer pipelines.
//!
//! All mutable state — the active collection and the conversation
//! history — lives on the [`Session`] value handed to the interface
//! layer; there are no ambient globals. Indexing errors propagate
//! verbatim. Answering errors do not: [`Session::ask`] is the single
//! place where any failure on the question path collapses into the
//! fixed refusal string.

use tracing::warn;

use crate::answer::{AnswerComposer, Message, REFUSAL};
use crate::chunking::{Chunk, TextChunker};
use crate::config::Config;
use crate::extract::Extractor;
use crate::index::{DEFAULT_TOP_K, EmbeddingIndex, IndexSummary};
use crate::types::QaError;

/// One user session: an optional active index plus the chat transcript.
pub struct Session {
    extractor: Extractor,
    chunker: TextChunker,
    index: EmbeddingIndex,
    composer: AnswerComposer,
    active_collection: Option<String>,
    history: Vec<Message>,
}

impl Session {
    pub fn new(config: &Config) -> Result<Self, QaError> {
        Ok(Self {
            extractor: Extractor::new()?,
            chunker: TextChunker::new(config.chunking),
            index: EmbeddingIndex::new(config.embedder()?, &config.data_dir),
            composer: AnswerComposer::new(config.chat()?),
            active_collection: None,
            history: Vec::new(),
        })
    }

    /// Crawls `url`, chunks it, and builds its collection, which becomes
    /// the active one. Every failure aborts the action before anything
    /// is committed; the previous collection stays active on error.
    pub async fn index_site(&mut self, url: &str) -> Result<IndexSummary, QaError> {
        let page = self.extractor.crawl(url).await?;
        let chunks = self.chunker.chunk_page(&page);
        if chunks.is_empty() {
            return Err(QaError::EmptyChunks);
        }
        let summary = self.index.build(&chunks).await?;
        self.active_collection = Some(summary.collection.clone());
        Ok(summary)
    }

    /// Answers a question from the active collection and appends both
    /// turns to the history. Infallible: retrieval or generation errors
    /// degrade to the refusal string here, by policy.
    pub async fn ask(&mut self, question: &str) -> String {
        let answer = match self.try_answer(question).await {
            Ok(answer) => answer,
            Err(err) => {
                warn!(error = %err, "answer pipeline failed, returning refusal");
                REFUSAL.to_string()
            }
        };
        self.history.push(Message::user(question));
        self.history.push(Message::assistant(&answer));
        answer
    }

    async fn try_answer(&self, question: &str) -> Result<String, QaError> {
        let Some(collection) = &self.active_collection else {
            return Ok(REFUSAL.to_string());
        };
        let hits = self.index.query(collection, question, DEFAULT_TOP_K).await?;
        let chunks: Vec<Chunk> = hits.into_iter().map(|(chunk, _)| chunk).collect();
        Ok(self.composer.answer(question, &chunks, &self.history).await)
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn active_collection(&self) -> Option<&str> {
        self.active_collection.as_deref()
    }

    /// Maintenance: drops every persisted collection and deactivates the
    /// current one.
    pub async fn clear_collections(&mut self) -> Result<(), QaError> {
        self.index.clear_all().await?;
        self.active_collection = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn session_with_tempdir() -> (Session, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        (Session::new(&config).unwrap(), dir)
    }

    #[tokio::test]
    async fn asking_before_indexing_refuses() {
        let (mut session, _dir) = session_with_tempdir();
        let answer = session.ask("what is this site about?").await;
        assert_eq!(answer, REFUSAL);
    }

    #[tokio::test]
    async fn history_records_both_turns_and_clears() {
        let (mut session, _dir) = session_with_tempdir();
        session.ask("first question").await;
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[0].role, Message::USER);
        assert_eq!(session.history()[0].content, "first question");
        assert_eq!(session.history()[1].role, Message::ASSISTANT);

        session.clear_history();
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn invalid_url_aborts_indexing() {
        let (mut session, _dir) = session_with_tempdir();
        let result = session.index_site("definitely not a url").await;
        assert!(matches!(result, Err(QaError::InvalidUrl(_))));
        assert!(session.active_collection().is_none());
    }

    #[tokio::test]
    async fn clearing_collections_deactivates_index() {
        let (mut session, _dir) = session_with_tempdir();
        session.clear_collections().await.unwrap();
        assert!(session.active_collection().is_none());
    }
}
