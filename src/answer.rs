//! Composes grounded answers from retrieved chunks.
//!
//! Primary path: one chat-completion call instructed to answer strictly
//! from the supplied context. Fallback path: crude keyword-overlap
//! sentence extraction, used when no chat backend is configured or the
//! call fails. Either way the composer returns a string; it never
//! propagates an error to its caller.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chunking::Chunk;
use crate::types::QaError;

/// The fixed answer returned whenever no grounded answer exists.
pub const REFUSAL: &str = "The answer is not available on the provided website.";

/// How many trailing conversation turns are replayed into the prompt.
const HISTORY_WINDOW: usize = 6;

const CHAT_TIMEOUT: Duration = Duration::from_secs(30);
const TEMPERATURE: f32 = 0.1;
const MAX_TOKENS: u32 = 500;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based ONLY on the provided website content.\n\
If the answer to a question is not available in the provided context, respond EXACTLY with:\n\
\"The answer is not available on the provided website.\"\n\n\
Do not use any external knowledge or make assumptions. Base your answer strictly on the information provided in the context.";

/// One conversation turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    /// User input message role.
    pub const USER: &'static str = "user";
    /// Assistant response message role.
    pub const ASSISTANT: &'static str = "assistant";
    /// System instruction message role.
    pub const SYSTEM: &'static str = "system";

    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Self::USER, content)
    }

    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::new(Self::SYSTEM, content)
    }
}

/// Minimal chat-completions client for OpenAI-compatible endpoints.
#[derive(Clone, Debug)]
pub struct ChatClient {
    client: Client,
    endpoint: String,
    model: String,
}

impl ChatClient {
    /// Builds a client posting to `endpoint` with bearer auth.
    pub fn new(api_key: &str, endpoint: &str, model: &str) -> Result<Self, QaError> {
        if api_key.trim().is_empty() {
            return Err(QaError::Config("missing chat API key".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| QaError::Config("chat API key is not a valid header".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(CHAT_TIMEOUT)
            .default_headers(headers)
            .use_rustls_tls()
            .build()
            .map_err(|err| QaError::Chat(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one completion request and returns the assistant's text.
    pub async fn complete(&self, messages: &[Message]) -> Result<String, QaError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| QaError::Chat(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(QaError::Chat(format!(
                "chat completion failed ({status}): {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| QaError::Chat(format!("malformed chat response: {err}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| QaError::Chat("response contained no choices".to_string()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

/// Turns a question plus retrieved chunks into an answer string.
pub struct AnswerComposer {
    chat: Option<ChatClient>,
}

impl AnswerComposer {
    /// `chat: None` means every question goes straight to the keyword
    /// fallback.
    pub fn new(chat: Option<ChatClient>) -> Self {
        Self { chat }
    }

    pub fn has_chat_backend(&self) -> bool {
        self.chat.is_some()
    }

    /// Answers `question` from `chunks`, consulting up to the last six
    /// turns of `history` for conversational context. Infallible by
    /// construction: every failure degrades to the fallback or the
    /// refusal string.
    pub async fn answer(&self, question: &str, chunks: &[Chunk], history: &[Message]) -> String {
        if chunks.is_empty() {
            return REFUSAL.to_string();
        }

        let context = chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let Some(chat) = &self.chat else {
            debug!("no chat backend configured, using keyword fallback");
            return simple_answer(question, &context);
        };

        let messages = build_messages(question, &context, history);
        match chat.complete(&messages).await {
            Ok(answer) => normalize_model_answer(&answer),
            Err(err) => {
                warn!(error = %err, "chat completion unavailable, using keyword fallback");
                simple_answer(question, &context)
            }
        }
    }
}

/// Assembles the grounding prompt: system instruction, trailing history
/// window, then the context and question as the final user turn.
fn build_messages(question: &str, context: &str, history: &[Message]) -> Vec<Message> {
    let mut messages = vec![Message::system(SYSTEM_PROMPT)];
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    messages.extend(history[start..].iter().cloned());
    messages.push(Message::user(&format!(
        "Context from the website:\n{context}\n\nQuestion: {question}"
    )));
    messages
}

/// Applies the grounding post-check to a model answer: empty answers,
/// stock apologies, and any answer quoting the refusal phrase collapse to
/// exactly the refusal string.
fn normalize_model_answer(answer: &str) -> String {
    let trimmed = answer.trim();
    let lower = trimmed.to_lowercase();
    if trimmed.is_empty()
        || lower.starts_with("i don't know")
        || lower.starts_with("i'm sorry")
        || lower.contains("the answer is not available on the provided website")
    {
        return REFUSAL.to_string();
    }
    trimmed.to_string()
}

/// Interrogatives and filler stripped from questions before matching.
const QUESTION_WORDS: &[&str] = &[
    "what", "is", "are", "the", "a", "an", "how", "why", "when", "where", "who",
];

/// Cue words marking a definitional question.
const DEFINITIONAL_CUES: &[&str] = &["what is", "what are", "define", "explain"];

/// Keyword-overlap sentence extraction, used when no model is reachable.
///
/// Definitional questions match up to three key question terms against
/// period-delimited context sentences and return the first two hits;
/// other questions match longer question words and return the first
/// three. No hits at all means the refusal string.
pub fn simple_answer(question: &str, context: &str) -> String {
    let question_lower = question.to_lowercase();

    if DEFINITIONAL_CUES.iter().any(|cue| question_lower.contains(cue)) {
        let mut key_terms: Vec<&str> = question_lower
            .split_whitespace()
            .filter(|word| !QUESTION_WORDS.contains(word) && word.chars().count() > 2)
            .collect();
        if key_terms.is_empty() {
            // Nothing substantive survived the filters ("what is a").
            // Retry with only the interrogatives removed so single-letter
            // subjects still match.
            key_terms = question_lower
                .split_whitespace()
                .filter(|word| !is_interrogative(word))
                .collect();
        }
        key_terms.truncate(3);

        let relevant = matching_sentences(context, &key_terms, 2);
        if !relevant.is_empty() {
            return format!("{}.", relevant.join(". "));
        }
    }

    let content_words: Vec<&str> = question_lower
        .split_whitespace()
        .filter(|word| word.chars().count() > 3)
        .collect();
    if !content_words.is_empty() {
        let matching = matching_sentences(context, &content_words, 3);
        if !matching.is_empty() {
            return format!("{}.", matching.join(". "));
        }
    }

    REFUSAL.to_string()
}

fn is_interrogative(word: &str) -> bool {
    matches!(
        word,
        "what" | "is" | "are" | "how" | "why" | "when" | "where" | "who" | "define" | "explain"
    )
}

/// First `limit` period-delimited sentences containing any of `terms`.
fn matching_sentences(context: &str, terms: &[&str], limit: usize) -> Vec<String> {
    if terms.is_empty() {
        return Vec::new();
    }
    context
        .split('.')
        .filter(|sentence| {
            let lower = sentence.to_lowercase();
            terms.iter().any(|term| lower.contains(term))
        })
        .map(|sentence| sentence.trim().to_string())
        .filter(|sentence| !sentence.is_empty())
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkMetadata;
    use httpmock::prelude::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                source_url: "https://example.com".to_string(),
                page_title: "Example".to_string(),
                chunk_index: 0,
                total_chunks: 1,
            },
        }
    }

    #[tokio::test]
    async fn empty_retrieval_refuses_without_model_call() {
        let composer = AnswerComposer::new(None);
        let answer = composer.answer("anything?", &[], &[]).await;
        assert_eq!(answer, REFUSAL);
    }

    #[test]
    fn definitional_fallback_extracts_matching_sentences() {
        let answer = simple_answer("what is a", "A is B. C is D. E is F.");
        assert_eq!(answer, "A is B.");
    }

    #[test]
    fn definitional_fallback_uses_key_terms() {
        let context = "Rust is a systems language. Python is interpreted. Gardens need water.";
        let answer = simple_answer("what is rust", context);
        assert_eq!(answer, "Rust is a systems language.");
    }

    #[test]
    fn generic_fallback_matches_longer_words() {
        let context = "The compiler checks ownership. The runtime is minimal. Cats sleep.";
        let answer = simple_answer("does the compiler verify ownership", context);
        assert!(answer.contains("compiler checks ownership"));
    }

    #[test]
    fn fallback_refuses_when_nothing_matches() {
        let answer = simple_answer("tell me about quantum chromodynamics", "Cats sleep a lot.");
        assert_eq!(answer, REFUSAL);
    }

    #[test]
    fn normalization_collapses_apologies_and_quoted_refusals() {
        assert_eq!(normalize_model_answer(""), REFUSAL);
        assert_eq!(normalize_model_answer("I don't know anything about that"), REFUSAL);
        assert_eq!(normalize_model_answer("I'm sorry, I cannot help"), REFUSAL);
        assert_eq!(
            normalize_model_answer(
                "Well, The Answer Is Not Available On The Provided Website. Try again."
            ),
            REFUSAL
        );
        assert_eq!(normalize_model_answer("  Rust is great.  "), "Rust is great.");
    }

    #[test]
    fn prompt_keeps_system_first_and_history_bounded() {
        let history: Vec<Message> = (0..10)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(&format!("question {i}"))
                } else {
                    Message::assistant(&format!("answer {i}"))
                }
            })
            .collect();
        let messages = build_messages("latest question", "some context", &history);

        assert_eq!(messages.len(), 1 + HISTORY_WINDOW + 1);
        assert_eq!(messages[0].role, Message::SYSTEM);
        assert_eq!(messages[1].content, "question 4");
        let last = messages.last().unwrap();
        assert_eq!(last.role, Message::USER);
        assert!(last.content.contains("some context"));
        assert!(last.content.contains("Question: latest question"));
    }

    #[tokio::test]
    async fn model_answer_passes_through_when_grounded() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(serde_json::json!({
                    "choices": [
                        {"message": {"role": "assistant", "content": "B, according to the site."}}
                    ]
                }));
            })
            .await;

        let chat = ChatClient::new(
            "key",
            &format!("{}/chat/completions", server.base_url()),
            "test-model",
        )
        .unwrap();
        let composer = AnswerComposer::new(Some(chat));
        let answer = composer.answer("what is a", &[chunk("A is B.")], &[]).await;
        assert_eq!(answer, "B, according to the site.");
    }

    #[tokio::test]
    async fn failed_model_call_degrades_to_fallback() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(503).body("overloaded");
            })
            .await;

        let chat = ChatClient::new(
            "key",
            &format!("{}/chat/completions", server.base_url()),
            "test-model",
        )
        .unwrap();
        let composer = AnswerComposer::new(Some(chat));
        let answer = composer
            .answer("what is rust", &[chunk("Rust is a language. Cats sleep.")], &[])
            .await;
        assert_eq!(answer, "Rust is a language.");
    }
}
