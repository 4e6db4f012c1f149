//! OpenAI chat completions and image generation

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::chat::{self, ChatRequest};
use super::{endpoint, ensure_success, Provider, ProviderError, ProviderKind, ProviderResult};
use crate::core::config::OpenAiConfig;

/// Prefix that steers image prompts towards diagrams
pub const IMAGE_PROMPT_PREFIX: &str = "Educational medical illustration: ";

/// Chat-completion provider
pub struct OpenAiChat {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiChat {
    pub fn new(client: Client, config: OpenAiConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Provider for OpenAiChat {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Chat
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    async fn call(&self, query: &str) -> ProviderResult {
        let Some(api_key) = self.config.api_key() else {
            return Err(ProviderError::NotConfigured);
        };

        let mut request = ChatRequest::new(&self.config.model, &self.config.system_prompt, query);
        request.max_tokens = self.config.max_tokens;
        request.temperature = self.config.temperature;

        let url = endpoint(&self.config.base_url, "v1/chat/completions");
        chat::complete(&self.client, &url, api_key, &request, self.timeout()).await
    }
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: String,
    n: u32,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

/// Image generation client; returns the hosted image URL
pub struct ImageGenerator {
    client: Client,
    config: OpenAiConfig,
}

impl ImageGenerator {
    pub fn new(client: Client, config: OpenAiConfig) -> Self {
        Self { client, config }
    }

    pub async fn generate(&self, query: &str) -> ProviderResult {
        let Some(api_key) = self.config.api_key() else {
            return Err(ProviderError::NotConfigured);
        };
        let timeout = Duration::from_secs(self.config.image_timeout_secs);

        let request = ImageRequest {
            model: &self.config.image_model,
            prompt: format!("{}{}", IMAGE_PROMPT_PREFIX, query),
            n: 1,
            size: &self.config.image_size,
        };

        let response = self
            .client
            .post(endpoint(&self.config.base_url, "v1/images/generations"))
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, timeout))?;

        let response = ensure_success(response).await?;
        let body: ImageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, timeout))?;

        let url = body
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .filter(|u| !u.is_empty())
            .ok_or(ProviderError::Empty)?;

        debug!("Generated image for query ({} chars)", query.len());
        Ok(url)
    }
}
