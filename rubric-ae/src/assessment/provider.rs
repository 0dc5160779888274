//! External text-assessment provider
//!
//! The provider is an OpenAI-compatible chat-completions endpoint. The
//! [`AssessmentProvider`] trait is the seam tests use to script responses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("rubric-ae/", env!("CARGO_PKG_VERSION"));

/// Provider call errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed provider envelope: {0}")]
    Envelope(String),
}

impl ProviderError {
    /// Whether another attempt may succeed
    ///
    /// Timeouts, network failures, rate limiting (429) and server errors
    /// (5xx) are transient. Other HTTP statuses and malformed envelopes are
    /// not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            Self::Envelope(_) => false,
        }
    }
}

/// A model that turns a rubric prompt into free-form text
#[async_trait]
pub trait AssessmentProvider: Send + Sync {
    /// Identifier recorded as `evaluatedBy` on successful results
    fn model_id(&self) -> &str;

    /// Send one completion request and return the raw assistant text
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError>;
}

/// Connection settings for [`ChatCompletionsProvider`]
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ProviderSettings {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// `POST {endpoint}/chat/completions` with a bearer credential
pub struct ChatCompletionsProvider {
    http_client: reqwest::Client,
    settings: ProviderSettings,
    request_timeout: Duration,
}

impl ChatCompletionsProvider {
    /// Build the HTTP client
    ///
    /// `request_timeout` is a transport-level upper bound; the assessment
    /// client applies its own per-call timeout on top.
    pub fn new(settings: ProviderSettings, request_timeout: Duration) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            settings,
            request_timeout,
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.settings.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl AssessmentProvider for ChatCompletionsProvider {
    fn model_id(&self) -> &str {
        &self.settings.model
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
        };

        tracing::debug!(model = %self.settings.model, url = %self.url(), "Querying assessment provider");

        let response = self
            .http_client
            .post(self.url())
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.request_timeout)
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Envelope(e.to_string()))?;

        if let Some(usage) = &reply.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Provider token usage"
            );
        }

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Envelope("no choices in response".to_string()))
    }
}
