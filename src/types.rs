//! Shared error taxonomy for the indexing and answering pipeline.

use thiserror::Error;

/// Errors surfaced by the crawl → chunk → embed → answer pipeline.
///
/// Indexing-path variants (`InvalidUrl`, `Fetch`, `EmptyContent`,
/// `EmptyChunks`, `Storage`, `Embedding`) abort the indexing action and are
/// reported verbatim to the caller. Question-answering code also returns
/// `QaError`, but [`crate::session::Session::ask`] collapses every variant
/// into the fixed refusal string; the answering path never surfaces a hard
/// failure to the user.
#[derive(Debug, Error)]
pub enum QaError {
    /// The input string is not a URL with a scheme and a host.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The HTTP GET for the page failed (transport error or non-2xx status).
    #[error("failed to fetch URL: {0}")]
    Fetch(#[from] reqwest::Error),

    /// Extraction produced no usable text after boilerplate removal.
    #[error("no content could be extracted from the page")]
    EmptyContent,

    /// Chunking produced no chunks, so there is nothing to index.
    #[error("no meaningful content chunks could be created")]
    EmptyChunks,

    /// The index build was handed no chunks to embed.
    #[error("no chunks to embed into the index")]
    IndexBuild,

    /// The vector store rejected an operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// The embedding backend failed or returned malformed vectors.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The chat-completion call failed; the answer path degrades to the
    /// keyword fallback when it sees this.
    #[error("chat completion error: {0}")]
    Chat(String),

    /// Rejected configuration value, caught before the pipeline runs.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
