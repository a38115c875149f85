//! Conversation: the persistent ordered turn list over an [`LlmClient`].
//!
//! A turn is a user message plus the assistant response it produced; a turn
//! whose response is still `None` is *pending* and is what [`send_pending`]
//! resolves. The whole structure round-trips through [`History`] so the agent
//! loop can persist after every response and resume across process restarts.
//!
//! [`send_pending`]: Conversation::send_pending

pub mod store;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::{
    AssistantResponse, CompletionRequest, ContentBlock, LlmClient, LlmError, Role, ToolSpec,
    WireMessage,
};

/// One user message and, once the model has answered, its response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub user: Vec<ContentBlock>,
    pub assistant: Option<AssistantResponse>,
}

/// Serializable snapshot sufficient to reconstruct the conversation exactly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub system_prompt: String,
    pub turns: Vec<Turn>,
}

pub struct Conversation {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    tools: Vec<ToolSpec>,
    turns: Vec<Turn>,
    input_tokens_total: u64,
    summarize_threshold: u64,
}

impl Conversation {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        system_prompt: impl Into<String>,
        tools: Vec<ToolSpec>,
        summarize_threshold: u64,
    ) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            tools,
            turns: Vec::new(),
            input_tokens_total: 0,
            summarize_threshold,
        }
    }

    /// Rebuilds a conversation from a persisted snapshot. The cumulative
    /// token count is recovered from the recorded per-response usage.
    pub fn resume(
        llm: Arc<dyn LlmClient>,
        tools: Vec<ToolSpec>,
        history: History,
        summarize_threshold: u64,
    ) -> Self {
        let input_tokens_total = history
            .turns
            .iter()
            .filter_map(|t| t.assistant.as_ref())
            .map(|r| r.usage.input_tokens)
            .sum();
        Self {
            llm,
            system_prompt: history.system_prompt,
            tools,
            turns: history.turns,
            input_tokens_total,
            summarize_threshold,
        }
    }

    pub fn history(&self) -> History {
        History {
            system_prompt: self.system_prompt.clone(),
            turns: self.turns.clone(),
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// True when the trailing turn still awaits its assistant response.
    pub fn has_pending(&self) -> bool {
        self.turns.last().is_some_and(|t| t.assistant.is_none())
    }

    /// Appends a user message and awaits the model's response for it.
    pub async fn send_message(
        &mut self,
        blocks: Vec<ContentBlock>,
    ) -> Result<AssistantResponse, LlmError> {
        self.turns.push(Turn {
            user: blocks,
            assistant: None,
        });
        self.send_pending().await
    }

    /// Resolves the trailing pending turn. Used after a resume (the crash
    /// happened between persisting the user message and the response) and
    /// after a summarization rewrite.
    pub async fn send_pending(&mut self) -> Result<AssistantResponse, LlmError> {
        if !self.has_pending() {
            return Err(LlmError::Protocol(
                "no pending user message to send".to_string(),
            ));
        }
        let request = CompletionRequest {
            system: self.system_prompt.clone(),
            tools: self.tools.clone(),
            messages: self.messages(),
        };
        let llm = Arc::clone(&self.llm);
        let response = llm.complete(request).await?;
        self.input_tokens_total += response.usage.input_tokens;
        if let Some(turn) = self.turns.last_mut() {
            turn.assistant = Some(response.clone());
        }
        Ok(response)
    }

    fn messages(&self) -> Vec<WireMessage> {
        let mut out = Vec::with_capacity(self.turns.len() * 2);
        for turn in &self.turns {
            out.push(WireMessage {
                role: Role::User,
                content: turn.user.clone(),
            });
            if let Some(response) = &turn.assistant {
                out.push(WireMessage {
                    role: Role::Assistant,
                    content: response.content.clone(),
                });
            }
        }
        out
    }

    /// Signals that the history has grown past the configured input-token
    /// budget and should be rewritten around a summary.
    pub fn needs_summarization(&self) -> bool {
        self.summarize_threshold > 0
            && self.turns.len() > 2
            && self.input_tokens_total >= self.summarize_threshold
    }

    /// Rewrites the history as `[first turn, (summary-request,
    /// summary-response), (resume-request, pending)]`, discarding everything
    /// in between. The caller sends the pending resume turn next.
    ///
    /// Orphaned tool_use blocks in the preserved first response and orphaned
    /// tool_result blocks in the summary-request message are stripped: after
    /// the rewrite their counterparts are gone and the endpoint would reject
    /// the transcript.
    pub fn compact(&mut self, resume_text: &str) {
        if self.turns.len() < 2 {
            return;
        }
        let mut first = self.turns.remove(0);
        if let Some(response) = &mut first.assistant {
            response
                .content
                .retain(|b| !matches!(b, ContentBlock::ToolUse { .. }));
            if response.content.is_empty() {
                response.content.push(ContentBlock::text("(working)"));
            }
        }
        let mut summary = match self.turns.pop() {
            Some(turn) => turn,
            None => return,
        };
        summary
            .user
            .retain(|b| !matches!(b, ContentBlock::ToolResult { .. }));
        if summary.user.is_empty() {
            summary.user.push(ContentBlock::text("(summarize)"));
        }
        let dropped = self.turns.len();
        self.turns = vec![
            first,
            summary,
            Turn {
                user: vec![ContentBlock::text(resume_text)],
                assistant: None,
            },
        ];
        self.input_tokens_total = 0;
        debug!(dropped, "conversation compacted around summary");
    }
}
