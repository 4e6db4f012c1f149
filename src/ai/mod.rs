//! External AI and search providers
//!
//! Every adapter answers a query with a [`ProviderResult`]. Failures are typed
//! so logs can tell a missing key from a slow upstream, but callers are free
//! to treat every error as "no answer from this provider".

pub mod chat;
pub mod google;
pub mod openai;
pub mod perplexity;

use crate::core::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// User agent sent to every upstream
const USER_AGENT: &str = concat!("medquery/", env!("CARGO_PKG_VERSION"));

/// Upper bound on upstream error bodies kept for logging
const ERROR_BODY_CHARS: usize = 200;

/// Outcome of a single provider call
pub type ProviderResult = std::result::Result<String, ProviderError>;

/// Why a provider produced no text
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("credentials not configured")]
    NotConfigured,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("response contained no text")]
    Empty,

    #[error("task aborted: {0}")]
    Aborted(String),
}

impl ProviderError {
    /// Classify a reqwest send/receive failure
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout)
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// The three answer sources, in aggregation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Chat,
    Research,
    Search,
}

impl ProviderKind {
    pub const ORDER: [ProviderKind; 3] = [
        ProviderKind::Chat,
        ProviderKind::Research,
        ProviderKind::Search,
    ];

    /// Bold heading used in the combined answer
    pub fn heading(&self) -> &'static str {
        match self {
            ProviderKind::Chat => "AI Analysis",
            ProviderKind::Research => "Research Findings",
            ProviderKind::Search => "Additional Context",
        }
    }

    /// Name listed in the provenance line
    pub fn source_name(&self) -> &'static str {
        match self {
            ProviderKind::Chat => "ChatGPT",
            ProviderKind::Research => "Perplexity AI",
            ProviderKind::Search => "Google Search",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_name())
    }
}

/// A single external answer source
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Deadline the orchestrator gives this provider
    fn timeout(&self) -> Duration;

    /// Answer an already-enhanced query. One attempt, no retries.
    async fn call(&self, query: &str) -> ProviderResult;
}

/// Build the HTTP client shared by all adapters (one connection pool)
pub fn build_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(3))
        .build()?;
    Ok(client)
}

/// Turn a non-2xx response into [`ProviderError::Status`]
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body: truncate_chars(&body, ERROR_BODY_CHARS),
    })
}

/// Keep at most `max` characters, never splitting a UTF-8 sequence
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 4), "abcd");
        assert_eq!(truncate_chars("abc", 10), "abc");
        // Multi-byte characters count once
        assert_eq!(truncate_chars("αβγδ", 2), "αβ");
    }

    #[test]
    fn test_endpoint_join() {
        assert_eq!(
            endpoint("https://api.openai.com/", "/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(endpoint("http://x", "a"), "http://x/a");
    }

    #[test]
    fn test_kind_labels() {
        let headings: Vec<_> = ProviderKind::ORDER.iter().map(|k| k.heading()).collect();
        assert_eq!(
            headings,
            vec!["AI Analysis", "Research Findings", "Additional Context"]
        );
        assert_eq!(ProviderKind::Research.to_string(), "Perplexity AI");
    }

    #[test]
    fn test_build_client() {
        assert!(build_client().is_ok());
    }
}
