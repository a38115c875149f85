//! Scripted [`LlmClient`] for tests: pops one canned response per call and
//! records every request for assertions.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    AssistantResponse, CompletionRequest, ContentBlock, LlmClient, LlmError, StopReason, Usage,
};

#[derive(Default)]
pub struct MockLlm {
    responses: Mutex<VecDeque<AssistantResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlm {
    pub fn scripted(responses: Vec<AssistantResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A plain-text `end_turn` response.
    pub fn text_response(text: &str) -> AssistantResponse {
        AssistantResponse {
            content: vec![ContentBlock::text(text)],
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 20,
            },
        }
    }

    /// A `tool_use` response invoking the given tools in order.
    pub fn tool_response(uses: Vec<(&str, &str, serde_json::Value)>) -> AssistantResponse {
        AssistantResponse {
            content: uses
                .into_iter()
                .map(|(id, name, input)| ContentBlock::ToolUse {
                    id: id.to_string(),
                    name: name.to_string(),
                    input,
                })
                .collect(),
            stop_reason: StopReason::ToolUse,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
            },
        }
    }

    /// Requests seen so far, for assertions on transcript shape.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<AssistantResponse, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| LlmError::Protocol("mock script exhausted".to_string()))
    }
}
