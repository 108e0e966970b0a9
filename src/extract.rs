//! Fetches a single page and extracts its readable content.
//!
//! Extraction is a best-effort DOM heuristic: a fixed deny-list of
//! boilerplate selectors is removed, then the first match from a fixed
//! allow-list of main-content selectors wins, falling back to `<body>`.
//! The network fetch and the DOM work are kept separate so extraction can
//! be tested against fixture HTML without a server.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::types::QaError;

/// Desktop browser user agent sent with the page fetch.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// How long the single page GET may take before it is abandoned.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Structural and boilerplate subtrees removed before text extraction.
const DENY_SELECTORS: &[&str] = &[
    "header",
    "footer",
    "nav",
    "aside",
    ".header",
    ".footer",
    ".navigation",
    ".nav",
    ".sidebar",
    ".advertisement",
    ".ads",
    ".ad",
    ".menu",
    ".navbar",
    ".footer-links",
    "script",
    "style",
    "noscript",
    ".social-share",
    ".share-buttons",
    ".cookie-banner",
    ".popup",
    ".modal",
];

/// Main-content candidates, searched in priority order.
const MAIN_SELECTORS: &[&str] = &[
    "main",
    "article",
    ".main-content",
    ".content",
    ".post-content",
    ".entry-content",
    "#main",
    "#content",
    ".article-body",
    ".post-body",
];

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static NON_TEXT_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s.,!?-]").expect("character filter regex"));

/// Cleaned content of one fetched page. Immutable once produced and
/// discarded after chunking.
#[derive(Clone, Debug)]
pub struct PageContent {
    pub title: String,
    pub text: String,
    pub url: Url,
}

/// Validates that the input parses as a URL with both a scheme and a host.
///
/// Anything else is rejected with [`QaError::InvalidUrl`] before any I/O
/// happens. Scheme support beyond http/https is left to the fetch layer.
pub fn validate_url(input: &str) -> Result<Url, QaError> {
    let url = Url::parse(input).map_err(|_| QaError::InvalidUrl(input.to_string()))?;
    if !url.has_host() {
        return Err(QaError::InvalidUrl(input.to_string()));
    }
    Ok(url)
}

/// Fetches one page and turns it into [`PageContent`].
#[derive(Clone, Debug)]
pub struct Extractor {
    client: Client,
}

impl Extractor {
    pub fn new() -> Result<Self, QaError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .use_rustls_tls()
            .build()?;
        Ok(Self { client })
    }

    /// Validates `input`, performs a single GET, and extracts the content.
    ///
    /// A blank extraction result is a hard stop ([`QaError::EmptyContent`]),
    /// not a retry.
    pub async fn crawl(&self, input: &str) -> Result<PageContent, QaError> {
        let url = validate_url(input)?;
        let body = self.fetch(&url).await?;
        debug!(url = %url, bytes = body.len(), "fetched page");
        extract(&body, &url).ok_or(QaError::EmptyContent)
    }

    async fn fetch(&self, url: &Url) -> Result<String, QaError> {
        let response = self.client.get(url.clone()).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Extracts title and cleaned body text from raw HTML.
///
/// Returns `None` when nothing readable survives cleanup.
pub fn extract(html: &str, url: &Url) -> Option<PageContent> {
    let mut document = Html::parse_document(html);

    let title = page_title(&document);
    remove_denied_subtrees(&mut document);
    strip_comments(&mut document);

    let raw = main_content_text(&document)?;
    let text = clean_text(&raw);
    if text.is_empty() {
        return None;
    }

    Some(PageContent {
        title,
        text,
        url: url.clone(),
    })
}

fn page_title(document: &Html) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return "Untitled Page".to_string();
    };
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| "Untitled Page".to_string())
}

fn remove_denied_subtrees(document: &mut Html) {
    for raw in DENY_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        let ids: Vec<_> = document.select(&selector).map(|el| el.id()).collect();
        for id in ids {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }
    }
}

fn strip_comments(document: &mut Html) {
    let ids: Vec<_> = document
        .tree
        .nodes()
        .filter(|node| node.value().is_comment())
        .map(|node| node.id())
        .collect();
    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// Text of the first allow-listed main-content match, else the full body.
fn main_content_text(document: &Html) -> Option<String> {
    for raw in MAIN_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = element_text(&element);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    let selector = Selector::parse("body").ok()?;
    document
        .select(&selector)
        .next()
        .map(|body| element_text(&body))
}

fn element_text(element: &scraper::ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapses whitespace, drops residual nav/menu fragments, and strips
/// characters outside word characters, whitespace, and `.,!?-`.
fn clean_text(text: &str) -> String {
    let collapsed = WHITESPACE_RUN.replace_all(text, " ");

    let kept: Vec<&str> = collapsed
        .split('\n')
        .map(str::trim)
        .filter(|line| line.chars().count() > 20)
        .collect();

    let joined = kept.join(" ");
    NON_TEXT_CHARS.replace_all(&joined, "").trim().to_string()
}
