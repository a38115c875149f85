//! Anthropic Messages API client over plain reqwest.
//!
//! Non-streaming: the agent loop is fully synchronous around each response,
//! so one request/one JSON body is all the engine needs. Transient statuses
//! (429, 5xx, overloaded) are retried with exponential backoff up to a small
//! bound; anything else escapes as [`LlmError::Api`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    AssistantResponse, CompletionRequest, ContentBlock, LlmClient, LlmError, StopReason, Usage,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_ATTEMPTS: u32 = 5;

pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
        }
    }

    /// Points the client at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn body(&self, request: &CompletionRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": request.system,
            "tools": request.tools,
            "messages": request.messages,
        })
    }
}

#[derive(Deserialize)]
struct MessageWire {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: UsageWire,
}

#[derive(Default, Deserialize)]
struct UsageWire {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ErrorWire {
    #[serde(default)]
    error: ErrorDetail,
}

#[derive(Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

fn retryable(status: u16) -> bool {
    status == 429 || status == 529 || (500..600).contains(&status)
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<AssistantResponse, LlmError> {
        let body = self.body(&request);
        let url = format!("{}/v1/messages", self.base_url);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let response = self
                .http
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
                .send()
                .await?;
            let status = response.status().as_u16();
            if status == 200 {
                let wire: MessageWire = response
                    .json()
                    .await
                    .map_err(|e| LlmError::Protocol(format!("undecodable response: {e}")))?;
                let stop_reason = wire
                    .stop_reason
                    .map(StopReason::from)
                    .unwrap_or(StopReason::Other("missing".to_string()));
                debug!(
                    input_tokens = wire.usage.input_tokens,
                    output_tokens = wire.usage.output_tokens,
                    stop_reason = ?stop_reason,
                    "completion finished"
                );
                return Ok(AssistantResponse {
                    content: wire.content,
                    stop_reason,
                    usage: Usage {
                        input_tokens: wire.usage.input_tokens,
                        output_tokens: wire.usage.output_tokens,
                    },
                });
            }

            let message = response
                .json::<ErrorWire>()
                .await
                .map(|w| w.error.message)
                .unwrap_or_default();
            if retryable(status) && attempt < MAX_ATTEMPTS {
                let backoff = Duration::from_secs(1u64 << attempt.min(5));
                warn!(status, attempt, ?backoff, "retryable llm error, backing off");
                tokio::time::sleep(backoff).await;
                continue;
            }
            return Err(LlmError::Api { status, message });
        }
    }
}
