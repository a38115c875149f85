//! Model endpoint contract: content blocks, stop reasons, and the
//! [`LlmClient`] seam.
//!
//! The engine only ever sees this trait; [`anthropic::AnthropicClient`] talks
//! to the real Messages API and [`MockLlm`] replays scripted responses in
//! tests. Block types serialize to the provider's wire shape, which doubles
//! as the persisted-history format.

pub mod anthropic;
mod mock;

pub use mock::MockLlm;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One content block of a user or assistant message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "is_false")]
        is_error: bool,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    RedactedThinking {
        data: String,
    },
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn tool_error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Why the model stopped producing output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Refusal,
    Other(String),
}

impl From<String> for StopReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "refusal" => StopReason::Refusal,
            _ => StopReason::Other(s),
        }
    }
}

impl From<StopReason> for String {
    fn from(r: StopReason) -> Self {
        match r {
            StopReason::EndTurn => "end_turn".to_string(),
            StopReason::ToolUse => "tool_use".to_string(),
            StopReason::MaxTokens => "max_tokens".to_string(),
            StopReason::Refusal => "refusal".to_string(),
            StopReason::Other(s) => s,
        }
    }
}

/// Token usage for one completion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One complete assistant response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    #[serde(default)]
    pub usage: Usage,
}

impl AssistantResponse {
    /// The tool-use blocks of this response, in issue order.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &serde_json::Value)> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => {
                Some((id.as_str(), name.as_str(), input))
            }
            _ => None,
        })
    }

    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }
}

/// Schema advertised for one tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One message of the request transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

/// A full completion request: fixed system prompt, tool schemas, transcript.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub system: String,
    pub tools: Vec<ToolSpec>,
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("llm api {status}: {message}")]
    Api { status: u16, message: String },
    /// The endpoint answered with something outside the contract.
    #[error("llm protocol: {0}")]
    Protocol(String),
}

/// The model endpoint. One call, one complete response; streaming and
/// provider-level retries live behind this seam.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<AssistantResponse, LlmError>;
}
