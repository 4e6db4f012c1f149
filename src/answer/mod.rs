//! Instant answers: validation, concurrent provider dispatch and aggregation
//!
//! A question is checked, prefixed with domain keywords and sent to all three
//! providers at once. Each call runs in its own task with a deadline fixed at
//! dispatch time; results are collected in the order chat, research, search,
//! so the combined answer never depends on which provider finished first.

pub mod aggregate;
pub mod enhance;

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::ai::google::GoogleSearch;
use crate::ai::openai::OpenAiChat;
use crate::ai::perplexity::PerplexityClient;
use crate::ai::{Provider, ProviderError, ProviderKind, ProviderResult};
use crate::core::config::{Config, MAX_TIMEOUT_SECS};

pub use aggregate::{aggregate, AggregateAnswer, DISCLAIMER, UNAVAILABLE};
pub use enhance::{enhance, QUERY_PREFIX};

/// Reply for a blank question
pub const EMPTY_QUERY_GUIDANCE: &str = "Please provide a question.";

/// Outcome of answering one question
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// The question was rejected before any provider was called
    Guidance(String),
    Aggregated(AggregateAnswer),
}

/// Check a raw question; returns the trimmed text or a guidance message
pub fn validate(raw: &str, min_length: usize) -> Result<&str, String> {
    let query = raw.trim();
    if query.is_empty() {
        return Err(EMPTY_QUERY_GUIDANCE.to_string());
    }
    if query.chars().count() < min_length {
        return Err(format!(
            "Please provide a more detailed question (at least {} characters).",
            min_length
        ));
    }
    Ok(query)
}

/// Fans a question out to the chat, research and search providers
pub struct AnswerService {
    chat: Arc<dyn Provider>,
    research: Arc<dyn Provider>,
    search: Arc<dyn Provider>,
    min_length: usize,
}

impl AnswerService {
    pub fn new(
        chat: Arc<dyn Provider>,
        research: Arc<dyn Provider>,
        search: Arc<dyn Provider>,
        min_length: usize,
    ) -> Self {
        Self {
            chat,
            research,
            search,
            min_length,
        }
    }

    /// Wire up the real providers, sharing one HTTP client
    pub fn from_config(config: &Config, client: Client) -> Self {
        let providers = &config.providers;
        Self::new(
            Arc::new(OpenAiChat::new(client.clone(), providers.openai.clone())),
            Arc::new(PerplexityClient::new(
                client.clone(),
                providers.perplexity.clone(),
            )),
            Arc::new(GoogleSearch::new(client, providers.google.clone())),
            config.query.min_length,
        )
    }

    /// Longest time [`AnswerService::answer`] can wait on providers
    pub fn latency_ceiling(&self) -> Duration {
        [&self.chat, &self.research, &self.search]
            .iter()
            .map(|p| p.timeout())
            .max()
            .unwrap_or_default()
    }

    /// Answer a question. Provider failures only make the answer less complete.
    pub async fn answer(&self, raw: &str) -> Answer {
        let query = match validate(raw, self.min_length) {
            Ok(query) => query,
            Err(guidance) => {
                debug!("Rejected question: {}", guidance);
                return Answer::Guidance(guidance);
            }
        };

        let span = info_span!("instant_answer", request_id = %Uuid::new_v4());
        async {
            let started = std::time::Instant::now();
            let result = self.dispatch(query).await;
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                source = %result.source,
                "Answer assembled"
            );
            Answer::Aggregated(result)
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, query: &str) -> AggregateAnswer {
        let enhanced: Arc<str> = Arc::from(enhance(query));

        let chat = PendingCall::spawn(&self.chat, &enhanced);
        let research = PendingCall::spawn(&self.research, &enhanced);
        let search = PendingCall::spawn(&self.search, &enhanced);

        // Settled in fixed order; deadlines already run in parallel
        let chat = chat.settle().await;
        let research = research.settle().await;
        let search = search.settle().await;

        aggregate(chat.as_deref(), research.as_deref(), search.as_deref())
    }
}

/// A provider call running in its own task
struct PendingCall {
    kind: ProviderKind,
    timeout: Duration,
    deadline: Instant,
    handle: JoinHandle<ProviderResult>,
}

impl PendingCall {
    fn spawn(provider: &Arc<dyn Provider>, query: &Arc<str>) -> Self {
        let provider = Arc::clone(provider);
        let query = Arc::clone(query);
        let kind = provider.kind();
        let timeout = provider.timeout().min(Duration::from_secs(MAX_TIMEOUT_SECS));

        let handle = tokio::spawn(async move { provider.call(&query).await }.in_current_span());

        Self {
            kind,
            timeout,
            deadline: deadline_after(Instant::now(), timeout),
            handle,
        }
    }

    /// Wait until the deadline; anything but text becomes `None`
    async fn settle(mut self) -> Option<String> {
        let outcome = match tokio::time::timeout_at(self.deadline, &mut self.handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ProviderError::Aborted(join_error.to_string())),
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(text) => {
                debug!(provider = %self.kind, chars = text.len(), "Provider answered");
                Some(text)
            }
            Err(ProviderError::NotConfigured) => {
                debug!(provider = %self.kind, "Provider not configured, skipping");
                None
            }
            Err(error) => {
                warn!(provider = %self.kind, %error, "Provider call failed");
                None
            }
        }
    }
}

/// `now + timeout`, saturating at the longest accepted provider timeout
fn deadline_after(now: Instant, timeout: Duration) -> Instant {
    now.checked_add(timeout)
        .or_else(|| now.checked_add(Duration::from_secs(MAX_TIMEOUT_SECS)))
        .unwrap_or(now)
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        // Abandoned or timed-out calls must not outlive the request
        self.handle.abort();
    }
}
