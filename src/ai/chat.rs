//! OpenAI-compatible chat completion wire format
//!
//! Both the chat and research providers speak this protocol; they differ only
//! in endpoint, model and sampling parameters.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{ensure_success, ProviderError, ProviderResult};

/// Chat completion request body
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

/// A single message in the conversation
#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

impl<'a> ChatRequest<'a> {
    /// System prompt followed by the user's question
    pub fn new(model: &'a str, system: &'a str, question: &'a str) -> Self {
        Self {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: question,
                },
            ],
            max_tokens: 256,
            temperature: 1.0,
            top_p: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// POST a completion request and return the first choice's text
pub async fn complete(
    client: &Client,
    url: &str,
    api_key: &str,
    request: &ChatRequest<'_>,
    timeout: Duration,
) -> ProviderResult {
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .timeout(timeout)
        .json(request)
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, timeout))?;

    let response = ensure_success(response).await?;

    let body: ChatResponse = response
        .json()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, timeout))?;

    let text = body
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(ProviderError::Empty)?;

    debug!("Chat completion from {} ({} chars)", url, text.len());
    Ok(text)
}
