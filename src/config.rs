//! Environment-driven configuration and backend composition.
//!
//! Which embedding and chat backends the pipeline runs on is decided
//! here, not inside the components: the index receives an [`Embedder`]
//! and the composer an optional [`ChatClient`], both built from the
//! parsed configuration.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::answer::ChatClient;
use crate::chunking::ChunkConfig;
use crate::embedding::{Embedder, HashEmbedder, OpenAiEmbedder};
use crate::types::QaError;

pub const DEFAULT_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_DATA_DIR: &str = "./siteqa_data";

/// Runtime configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Bearer token for the chat (and, when set, embedding) endpoint.
    pub api_key: Option<String>,
    /// Full chat-completions endpoint URL.
    pub chat_url: String,
    /// Chat model id.
    pub chat_model: String,
    /// Base URL of an OpenAI-compatible embeddings API; unset means the
    /// hash-bucket fallback embedder.
    pub embed_url: Option<String>,
    /// Embedding model id, required together with `embed_url`.
    pub embed_model: Option<String>,
    /// Directory holding one collection database per indexed domain.
    pub data_dir: PathBuf,
    /// Chunk sizing, runtime-adjustable via environment.
    pub chunking: ChunkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            chat_url: DEFAULT_CHAT_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embed_url: None,
            embed_model: None,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            chunking: ChunkConfig::default(),
        }
    }
}

impl Config {
    /// Reads `SITEQA_*` variables (with `GROQ_API_KEY` as a fallback for
    /// the key), validating the chunk parameters.
    pub fn from_env() -> Result<Self, QaError> {
        let defaults = Self::default();

        let chunk_size = match non_empty_var("SITEQA_CHUNK_SIZE") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| QaError::Config(format!("SITEQA_CHUNK_SIZE '{raw}' is not a number")))?,
            None => defaults.chunking.chunk_size,
        };
        let chunk_overlap = match non_empty_var("SITEQA_CHUNK_OVERLAP") {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                QaError::Config(format!("SITEQA_CHUNK_OVERLAP '{raw}' is not a number"))
            })?,
            None => defaults.chunking.chunk_overlap,
        };

        Ok(Self {
            api_key: non_empty_var("SITEQA_API_KEY").or_else(|| non_empty_var("GROQ_API_KEY")),
            chat_url: non_empty_var("SITEQA_CHAT_URL").unwrap_or(defaults.chat_url),
            chat_model: non_empty_var("SITEQA_CHAT_MODEL").unwrap_or(defaults.chat_model),
            embed_url: non_empty_var("SITEQA_EMBED_URL"),
            embed_model: non_empty_var("SITEQA_EMBED_MODEL"),
            data_dir: non_empty_var("SITEQA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            chunking: ChunkConfig::new(chunk_size, chunk_overlap)?,
        })
    }

    /// Composes the embedding backend: the remote encoder when fully
    /// configured, otherwise the deterministic hash fallback.
    pub fn embedder(&self) -> Result<Arc<dyn Embedder>, QaError> {
        match (&self.embed_url, &self.embed_model, &self.api_key) {
            (Some(url), Some(model), Some(key)) => {
                Ok(Arc::new(OpenAiEmbedder::new(key, url, model)?))
            }
            _ => {
                info!("no embedding endpoint configured, using hash-bucket fallback");
                Ok(Arc::new(HashEmbedder::new()))
            }
        }
    }

    /// Composes the chat client; `None` without an API key, which routes
    /// every question to the keyword fallback.
    pub fn chat(&self) -> Result<Option<ChatClient>, QaError> {
        match &self.api_key {
            Some(key) => Ok(Some(ChatClient::new(key, &self.chat_url, &self.chat_model)?)),
            None => Ok(None),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_hash_embedder_and_no_chat() {
        let config = Config::default();
        let embedder = config.embedder().unwrap();
        assert_eq!(embedder.name(), "hash-bucket");
        assert!(config.chat().unwrap().is_none());
    }

    #[test]
    fn chat_client_requires_key_only() {
        let config = Config {
            api_key: Some("key".to_string()),
            ..Config::default()
        };
        assert!(config.chat().unwrap().is_some());
    }

    #[test]
    fn remote_embedder_requires_full_configuration() {
        let config = Config {
            api_key: Some("key".to_string()),
            embed_url: Some("https://api.example.com/v1".to_string()),
            embed_model: None,
            ..Config::default()
        };
        // Half-configured embedding settings fall back to hashing.
        assert_eq!(config.embedder().unwrap().name(), "hash-bucket");

        let config = Config {
            embed_model: Some("embed-model".to_string()),
            ..config
        };
        assert_eq!(config.embedder().unwrap().name(), "embed-model");
    }
}
