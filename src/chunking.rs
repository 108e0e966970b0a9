//! Splits cleaned page text into overlapping, length-bounded chunks.
//!
//! The splitter is length-based (character counts), not semantic: it
//! recursively tries an ordered list of separators — paragraph break, line
//! break, sentence boundary, space, and finally individual characters —
//! and merges adjacent pieces back toward the configured chunk size while
//! carrying a tail of each chunk into the next for context continuity.

use serde::{Deserialize, Serialize};

use crate::extract::PageContent;
use crate::types::QaError;

/// Separator preference order for the recursive split.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Chunk sizing parameters. Both values count characters, not bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkConfig {
    /// Builds a config, rejecting zero sizes and overlaps that are not
    /// strictly smaller than the chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, QaError> {
        if chunk_size == 0 {
            return Err(QaError::Config("chunk size must be positive".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(QaError::Config(format!(
                "chunk overlap {chunk_overlap} must be smaller than chunk size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

/// Positional metadata attached to every chunk of a page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_url: String,
    pub page_title: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// A bounded-length slice of a page's text, the unit of embedding and
/// retrieval. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Recursive character splitter with overlap carry.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextChunker {
    config: ChunkConfig,
}

impl TextChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// Cleans and splits one page into chunks with contiguous indexes.
    ///
    /// Returns an empty vec when nothing survives the pre-clean; the
    /// caller decides whether that is an error.
    pub fn chunk_page(&self, page: &PageContent) -> Vec<Chunk> {
        let cleaned = clean_text(&page.text);
        if cleaned.is_empty() {
            return Vec::new();
        }

        let pieces = self.split_text(&cleaned);
        let total_chunks = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Chunk {
                text: text.trim().to_string(),
                metadata: ChunkMetadata {
                    source_url: page.url.to_string(),
                    page_title: page.title.clone(),
                    chunk_index,
                    total_chunks,
                },
            })
            .collect()
    }

    /// Splits raw text into pieces no longer than the configured chunk
    /// size, except when a single unsplittable token exceeds it.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = *separators.last().unwrap_or(&"");
        let mut remaining: &[&str] = &[];
        for (i, candidate) in separators.iter().copied().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(|c| c.to_string()).collect()
        } else {
            text.split(separator)
                .filter(|piece| !piece.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut good: Vec<String> = Vec::new();
        for piece in splits {
            if char_len(&piece) < self.config.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge_splits(&good, separator));
                good.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, remaining));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge_splits(&good, separator));
        }
        chunks
    }

    /// Concatenates small pieces back toward the chunk size, retaining the
    /// last `chunk_overlap` characters' worth of pieces as the start of the
    /// next chunk.
    fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in splits {
            let piece = piece.as_str();
            let piece_len = char_len(piece);
            let joined_len = total + piece_len + if current.is_empty() { 0 } else { sep_len };
            if joined_len > self.config.chunk_size && !current.is_empty() {
                if let Some(doc) = join_pieces(&current, separator) {
                    docs.push(doc);
                }
                while total > self.config.chunk_overlap
                    || (total > 0
                        && total + piece_len + if current.is_empty() { 0 } else { sep_len }
                            > self.config.chunk_size)
                {
                    total -= char_len(current[0]) + if current.len() > 1 { sep_len } else { 0 };
                    current.remove(0);
                }
            }
            current.push(piece);
            total += piece_len + if current.len() > 1 { sep_len } else { 0 };
        }

        if let Some(doc) = join_pieces(&current, separator) {
            docs.push(doc);
        }
        docs
    }
}

/// Normalizes whitespace, collapses blank-line runs, and drops short lines
/// that do not end in terminal punctuation.
fn clean_text(text: &str) -> String {
    let mut kept: Vec<String> = Vec::new();
    let mut pending_blank = false;

    for raw in text.lines() {
        let line = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            pending_blank = !kept.is_empty();
            continue;
        }
        if line.chars().count() >= 10 || line.ends_with(['.', '!', '?']) {
            if pending_blank {
                kept.push(String::new());
                pending_blank = false;
            }
            kept.push(line);
        }
    }

    kept.join("\n").trim().to_string()
}

fn join_pieces(pieces: &[&str], separator: &str) -> Option<String> {
    let joined = pieces.join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn page(text: &str) -> PageContent {
        PageContent {
            title: "Test Page".to_string(),
            text: text.to_string(),
            url: Url::parse("https://example.com/page").unwrap(),
        }
    }

    fn chunker(chunk_size: usize, chunk_overlap: usize) -> TextChunker {
        TextChunker::new(ChunkConfig::new(chunk_size, chunk_overlap).unwrap())
    }

    #[test]
    fn config_rejects_bad_values() {
        assert!(ChunkConfig::new(0, 0).is_err());
        assert!(ChunkConfig::new(100, 100).is_err());
        assert!(ChunkConfig::new(100, 150).is_err());
        assert!(ChunkConfig::new(100, 20).is_ok());
    }

    #[test]
    fn chunks_respect_size_bound() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let chunker = chunker(100, 20);
        for piece in chunker.split_text(&text) {
            assert!(
                piece.chars().count() <= 100,
                "piece of {} chars exceeds bound",
                piece.chars().count()
            );
        }
    }

    #[test]
    fn oversized_token_falls_back_to_characters() {
        let text = "x".repeat(250);
        let chunker = chunker(100, 10);
        let pieces = chunker.split_text(&text);
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(piece.chars().count() <= 100);
        }
    }

    #[test]
    fn adjacent_chunks_overlap() {
        let words: Vec<String> = (0..60).map(|i| format!("word{i:02}")).collect();
        let text = words.join(" ");
        let chunker = chunker(60, 24);
        let pieces = chunker.split_text(&text);
        assert!(pieces.len() > 1);
        for pair in pieces.windows(2) {
            let tail_word = pair[0].split(' ').next_back().unwrap();
            assert!(
                pair[1].contains(tail_word),
                "chunk {:?} should carry {:?} forward",
                pair[1],
                tail_word
            );
        }
    }

    #[test]
    fn metadata_is_contiguous_and_consistent() {
        let text = "A sentence that is reasonably long for chunking purposes. ".repeat(30);
        let chunker = chunker(120, 30);
        let chunks = chunker.chunk_page(&page(&text));
        assert!(chunks.len() > 1);

        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.chunk_index, i);
            assert_eq!(chunk.metadata.total_chunks, total);
            assert_eq!(chunk.metadata.source_url, "https://example.com/page");
            assert_eq!(chunk.metadata.page_title, "Test Page");
        }
    }

    #[test]
    fn blank_page_yields_no_chunks() {
        let chunks = TextChunker::default().chunk_page(&page("   \n  \n"));
        assert!(chunks.is_empty());
    }

    #[test]
    fn clean_text_drops_short_fragments() {
        let cleaned = clean_text("nav\nok.\nThis line is long enough to keep.\n\n\nmenu");
        assert!(!cleaned.contains("nav"));
        assert!(!cleaned.contains("menu"));
        assert!(cleaned.contains("ok."));
        assert!(cleaned.contains("long enough"));
    }

    #[test]
    fn clean_text_collapses_blank_runs() {
        let cleaned = clean_text("First paragraph here.\n\n\n\nSecond paragraph here.");
        assert_eq!(cleaned, "First paragraph here.\n\nSecond paragraph here.");
    }
}
