//! Google Custom Search provider
//!
//! Returns the leading result snippets as a short block of context rather
//! than a generated answer.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{
    endpoint, ensure_success, truncate_chars, Provider, ProviderError, ProviderKind,
    ProviderResult,
};
use crate::core::config::GoogleConfig;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    snippet: Option<String>,
}

pub struct GoogleSearch {
    client: Client,
    config: GoogleConfig,
}

impl GoogleSearch {
    pub fn new(client: Client, config: GoogleConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Provider for GoogleSearch {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Search
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    async fn call(&self, query: &str) -> ProviderResult {
        let Some((api_key, cse_id)) = self.config.credentials() else {
            return Err(ProviderError::NotConfigured);
        };
        let timeout = self.timeout();
        let num = self.config.results.to_string();

        let response = self
            .client
            .get(endpoint(&self.config.base_url, "customsearch/v1"))
            .query(&[("key", api_key), ("cx", cse_id), ("q", query), ("num", num.as_str())])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, timeout))?;

        let response = ensure_success(response).await?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, timeout))?;

        debug!("Search returned {} items", body.items.len());
        join_snippets(&body.items, self.config.snippets, self.config.max_chars)
            .ok_or(ProviderError::Empty)
    }
}

/// Space-join the snippets of the first `take` items, capped at `max_chars`
fn join_snippets(items: &[SearchItem], take: usize, max_chars: usize) -> Option<String> {
    let joined = items
        .iter()
        .take(take)
        .filter_map(|item| item.snippet.as_deref())
        .collect::<Vec<_>>()
        .join(" ");

    if joined.trim().is_empty() {
        return None;
    }
    Some(truncate_chars(&joined, max_chars))
}
