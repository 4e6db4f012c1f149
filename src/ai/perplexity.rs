//! Perplexity research-search provider

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::chat::{self, ChatRequest};
use super::{endpoint, Provider, ProviderError, ProviderKind, ProviderResult};
use crate::core::config::PerplexityConfig;

pub struct PerplexityClient {
    client: Client,
    config: PerplexityConfig,
}

impl PerplexityClient {
    pub fn new(client: Client, config: PerplexityConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Provider for PerplexityClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Research
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
        request.top_p = Some(self.config.top_p);

        let url = endpoint(&self.config.base_url, "chat/completions");
        chat::complete(&self.client, &url, api_key, &request, self.timeout()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, key: Option<&str>) -> PerplexityClient {
        PerplexityClient::new(
            Client::new(),
            PerplexityConfig {
                api_key: key.map(str::to_string),
                base_url: server.uri(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_request_includes_sampling_params() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer pplx-test"))
            .and(body_partial_json(json!({
                "model": "llama-3.1-sonar-large-128k-online",
                "max_tokens": 600,
                "top_p": 0.9,
                "messages": [
                    {"role": "system", "content": "You are a medical research expert."},
                    {"role": "user", "content": "medical research healthcare migraine"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Triptans help."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = provider(&server, Some("pplx-test"))
            .call("medical research healthcare migraine")
            .await;
        assert_eq!(result, Ok("Triptans help.".to_string()));
    }

    #[tokio::test]
    async fn test_server_error_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = provider(&server, Some("pplx-test")).call("q").await;
        assert!(matches!(result, Err(ProviderError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_blank_key_is_not_configured() {
        let server = MockServer::start().await;
        let result = provider(&server, Some("   ")).call("q").await;
        assert_eq!(result, Err(ProviderError::NotConfigured));
    }
}
