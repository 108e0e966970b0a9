//! Question answering over a single crawled website.
//!
//! ```text
//! URL ──► extract::Extractor ──► PageContent
//!                                    │
//!                                    ▼
//!                       chunking::TextChunker ──► [Chunk]
//!                                    │
//!                                    ▼
//!          index::EmbeddingIndex ◄── embedding::Embedder
//!                    │   (one sqlite-vec collection per domain)
//!                    ▼
//! question ──► top-k chunks ──► answer::AnswerComposer ──► answer
//!                    │                    │
//!                    └── session::Session keeps the transcript
//! ```
//!
//! Indexing-path failures abort and surface verbatim; answering-path
//! failures collapse into the fixed refusal string inside
//! [`session::Session::ask`], so "not answerable" and "something broke"
//! are deliberately indistinguishable to the user.

pub mod answer;
pub mod chunking;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod session;
pub mod stores;
pub mod types;

pub use answer::{AnswerComposer, ChatClient, Message, REFUSAL};
pub use chunking::{Chunk, ChunkConfig, ChunkMetadata, TextChunker};
pub use config::Config;
pub use embedding::{Embedder, HashEmbedder, OpenAiEmbedder};
pub use extract::{Extractor, PageContent, validate_url};
pub use index::{DEFAULT_TOP_K, EmbeddingIndex, IndexSummary};
pub use session::Session;
pub use types::QaError;
