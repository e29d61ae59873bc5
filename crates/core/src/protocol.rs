//! Protocol adapter trait: one control-flow contract over three wire
//! protocols.
//!
//! The loop only ever sees [`TurnState`], [`TurnOutcome`] and the
//! [`ProtocolAdapter`] methods. Which protocol is in use is decided once,
//! when the adapter is constructed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::message::ConversationMessage;
use crate::tool::{ToolCall, ToolDefinition, ToolResult};

/// Model endpoint wire protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    ChatCompletions,
    Responses,
    Messages,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::ChatCompletions => "chat_completions",
            Protocol::Responses => "responses",
            Protocol::Messages => "messages",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "chat_completions" | "chat" | "openai" => Ok(Protocol::ChatCompletions),
            "responses" => Ok(Protocol::Responses),
            "messages" | "anthropic" => Ok(Protocol::Messages),
            other => Err(format!("unknown protocol '{other}'")),
        }
    }
}

/// Opaque per-loop conversation state, in the adapter's native shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnState {
    /// Native messages (or, for responses, the input items of the next turn)
    pub messages: Vec<serde_json::Value>,

    /// System text, sent in whatever slot the protocol provides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// `previous_response_id` for responses-style threading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// A successfully parsed model reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantReply {
    /// Concatenated text, possibly empty
    pub answer: String,

    pub tool_calls: Vec<ToolCall>,

    /// The assistant's native message / content / output items, replayed by
    /// `append_tool_results`
    pub raw: serde_json::Value,

    pub response_id: Option<String>,
}

impl AssistantReply {
    pub fn has_answer(&self) -> bool {
        !self.answer.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Non-2xx after retries, or a body that is not valid JSON
    TurnFailed,
    /// Valid JSON with no choice / message / output
    MissingMessage,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::TurnFailed => "turn_failed",
            FailureReason::MissingMessage => "missing_message",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Reply(AssistantReply),
    Failed { reason: FailureReason, detail: String },
}

impl TurnOutcome {
    pub fn failed(reason: FailureReason, detail: impl Into<String>) -> Self {
        TurnOutcome::Failed {
            reason,
            detail: detail.into(),
        }
    }
}

/// One wire protocol. Implementations live in `toolrelay-providers`.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Convert the caller's conversation into the first turn's state.
    fn initial_state(&self, messages: &[ConversationMessage], system_prompt: Option<&str>) -> TurnState;

    /// Send one turn. Structural failures come back as
    /// `Ok(TurnOutcome::Failed)`; only network, timeout and cancellation
    /// errors are `Err`.
    async fn run_turn(
        &self,
        state: &TurnState,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> std::result::Result<TurnOutcome, TransportError>;

    /// Fold the assistant turn and its tool results into the next turn's
    /// state.
    fn append_tool_results(&self, state: &mut TurnState, reply: &AssistantReply, results: &[ToolResult]);
}
