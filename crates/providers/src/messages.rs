//! Messages-style adapter (Anthropic's Messages API).
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//!
//! Tool results must directly follow the assistant turn that requested them,
//! so the assistant's content is re-inserted before one grouped `user`
//! message of `tool_result` blocks.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use toolrelay_core::error::TransportError;
use toolrelay_core::message::{ConversationMessage, MessageContent, Role};
use toolrelay_core::protocol::{
    AssistantReply, FailureReason, Protocol, ProtocolAdapter, TurnOutcome, TurnState,
};
use toolrelay_core::tool::{ToolCall, ToolDefinition, ToolResult};
use toolrelay_transport::HttpJsonClient;
use tracing::debug;

use crate::endpoint::{ModelEndpoint, send_turn};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct MessagesAdapter {
    endpoint: ModelEndpoint,
    http: HttpJsonClient,
}

impl MessagesAdapter {
    pub fn new(endpoint: ModelEndpoint, http: HttpJsonClient) -> Self {
        Self { endpoint, http }
    }

    /// Split system messages out of the conversation and merge them with the
    /// explicit system prompt.
    fn extract_system(messages: &[ConversationMessage], system_prompt: Option<&str>) -> Option<String> {
        let parts: Vec<String> = system_prompt
            .map(str::to_string)
            .into_iter()
            .chain(messages.iter().filter(|m| m.role == Role::System).map(|m| m.text()))
            .filter(|s| !s.trim().is_empty())
            .collect();
        if parts.is_empty() { None } else { Some(parts.join("\n\n")) }
    }

    /// Consecutive `tool` messages collapse into one `user` message of
    /// `tool_result` blocks.
    fn to_api_messages(messages: &[ConversationMessage]) -> Vec<Value> {
        let mut out: Vec<Value> = Vec::with_capacity(messages.len());
        let mut previous_was_tool = false;

        for m in messages.iter().filter(|m| m.role != Role::System) {
            if m.role == Role::Tool {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
                    "content": m.text(),
                });
                if previous_was_tool
                    && let Some(blocks) = out.last_mut().and_then(|last| last["content"].as_array_mut())
                {
                    blocks.push(block);
                } else {
                    out.push(json!({ "role": "user", "content": [block] }));
                }
                previous_was_tool = true;
                continue;
            }

            let content = match &m.content {
                MessageContent::Text(text) => json!(text),
                MessageContent::Blocks(blocks) => json!(blocks),
            };
            out.push(json!({ "role": m.role.as_str(), "content": content }));
            previous_was_tool = false;
        }
        out
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect()
    }

    pub fn build_request(&self, state: &TurnState, tools: &[ToolDefinition]) -> Value {
        let mut body = json!({
            "model": self.endpoint.model,
            "messages": state.messages,
            "max_tokens": self.endpoint.max_response_tokens,
            "temperature": self.endpoint.temperature,
        });
        if let Some(system) = &state.system {
            body["system"] = json!(system);
        }
        if !tools.is_empty() {
            body["tools"] = json!(Self::to_api_tools(tools));
            body["tool_choice"] = json!({ "type": "auto" });
        }
        body
    }

    pub fn parse_reply(body: &Value) -> TurnOutcome {
        let Some(blocks) = body.get("content").and_then(Value::as_array) else {
            return TurnOutcome::failed(FailureReason::MissingMessage, "Response has no content blocks");
        };

        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        texts.push(text);
                    }
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(Value::as_str);
                    let name = block.get("name").and_then(Value::as_str);
                    if let (Some(id), Some(name)) = (id, name) {
                        let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                        tool_calls.push(ToolCall::new(id, name, input));
                    }
                }
                _ => {}
            }
        }

        TurnOutcome::Reply(AssistantReply {
            answer: texts.join(""),
            tool_calls,
            raw: Value::Array(blocks.clone()),
            response_id: body.get("id").and_then(Value::as_str).map(String::from),
        })
    }
}

#[async_trait]
impl ProtocolAdapter for MessagesAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Messages
    }

    fn initial_state(&self, messages: &[ConversationMessage], system_prompt: Option<&str>) -> TurnState {
        TurnState {
            messages: Self::to_api_messages(messages),
            system: Self::extract_system(messages, system_prompt),
            cursor: None,
        }
    }

    async fn run_turn(
        &self,
        state: &TurnState,
        tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TransportError> {
        let body = self.build_request(state, tools);
        let mut request = self
            .endpoint
            .request("messages", body)
            .header("anthropic-version", ANTHROPIC_VERSION);
        if let Some(key) = &self.endpoint.api_key {
            request = request.header("x-api-key", key.as_str());
        }

        debug!(
            model = %self.endpoint.model,
            messages = state.messages.len(),
            tools = tools.len(),
            "Sending messages turn"
        );

        match send_turn(&self.http, &request, cancel).await? {
            Ok(body) => Ok(Self::parse_reply(&body)),
            Err(failed) => Ok(failed),
        }
    }

    fn append_tool_results(&self, state: &mut TurnState, reply: &AssistantReply, results: &[ToolResult]) {
        let content = match &reply.raw {
            Value::Array(blocks) if !blocks.is_empty() => reply.raw.clone(),
            _ => {
                let mut blocks = Vec::new();
                if !reply.answer.is_empty() {
                    blocks.push(json!({ "type": "text", "text": reply.answer }));
                }
                blocks.extend(reply.tool_calls.iter().map(|tc| {
                    json!({ "type": "tool_use", "id": tc.id, "name": tc.name, "input": tc.arguments })
                }));
                Value::Array(blocks)
            }
        };
        state.messages.push(json!({ "role": "assistant", "content": content }));

        let blocks: Vec<Value> = results
            .iter()
            .map(|r| {
                let mut block = json!({
                    "type": "tool_result",
                    "tool_use_id": r.call_id,
                    "content": r.output,
                });
                if !r.is_success() {
                    block["is_error"] = json!(true);
                }
                block
            })
            .collect();
        state.messages.push(json!({ "role": "user", "content": blocks }));
    }
}
