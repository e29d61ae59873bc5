//! Responses-style adapter.
//!
//! The first turn carries `instructions` plus the converted conversation.
//! Later turns carry only the new `function_call_output` items and thread
//! `previous_response_id` from the prior reply. When a reply has no id the
//! adapter falls back to replaying the full input, including the
//! `function_call` items.

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

pub struct ResponsesAdapter {
    endpoint: ModelEndpoint,
    http: HttpJsonClient,
}

impl ResponsesAdapter {
    pub fn new(endpoint: ModelEndpoint, http: HttpJsonClient) -> Self {
        Self { endpoint, http }
    }

    /// System prompt plus any system-role messages, as one instruction block.
    fn derive_instructions(messages: &[ConversationMessage], system_prompt: Option<&str>) -> Option<String> {
        let parts: Vec<String> = system_prompt
            .map(str::to_string)
            .into_iter()
            .chain(messages.iter().filter(|m| m.role == Role::System).map(|m| m.text()))
            .filter(|s| !s.trim().is_empty())
            .collect();
        if parts.is_empty() { None } else { Some(parts.join("\n\n")) }
    }

    fn to_input_items(messages: &[ConversationMessage]) -> Vec<Value> {
        let mut items = Vec::with_capacity(messages.len());
        for m in messages.iter().filter(|m| m.role != Role::System) {
            match (m.role, &m.tool_call_id) {
                (Role::Tool, Some(call_id)) => items.push(json!({
                    "type": "function_call_output",
                    "call_id": call_id,
                    "output": m.text(),
                })),
                (Role::Assistant, _) => {
                    let text = m.text();
                    if !text.is_empty() || !matches!(m.content, MessageContent::Blocks(_)) {
                        items.push(json!({ "role": "assistant", "content": text }));
                    }
                    if let MessageContent::Blocks(blocks) = &m.content {
                        items.extend(
                            blocks
                                .iter()
                                .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
                                .map(|b| {
                                    json!({
                                        "type": "function_call",
                                        "call_id": b.get("id").and_then(Value::as_str).unwrap_or_default(),
                                        "name": b.get("name").and_then(Value::as_str).unwrap_or_default(),
                                        "arguments": b.get("input").cloned().unwrap_or_else(|| json!({})).to_string(),
                                    })
                                }),
                        );
                    }
                }
                _ => items.push(json!({ "role": "user", "content": m.text() })),
            }
        }
        items
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect()
    }

    pub fn build_request(&self, state: &TurnState, tools: &[ToolDefinition]) -> Value {
        let mut body = json!({
            "model": self.endpoint.model,
            "input": state.messages,
            "max_output_tokens": self.endpoint.max_response_tokens,
            "temperature": self.endpoint.temperature,
            "store": false,
        });
        if !tools.is_empty() {
            body["tools"] = json!(Self::to_api_tools(tools));
            body["tool_choice"] = json!("auto");
        }
        match &state.cursor {
            Some(previous) => body["previous_response_id"] = json!(previous),
            None => {
                if let Some(instructions) = &state.system {
                    body["instructions"] = json!(instructions);
                }
            }
        }
        body
    }

    pub fn parse_reply(body: &Value) -> TurnOutcome {
        let Some(output) = body.get("output").and_then(Value::as_array).filter(|o| !o.is_empty()) else {
            return TurnOutcome::failed(FailureReason::MissingMessage, "Response has no output items");
        };

        let mut texts: Vec<&str> = Vec::new();
        let mut tool_calls = Vec::new();
        for item in output {
            match item.get("type").and_then(Value::as_str) {
                Some("message") => {
                    let parts = item.get("content").and_then(Value::as_array);
                    for part in parts.into_iter().flatten() {
                        if matches!(part.get("type").and_then(Value::as_str), Some("output_text" | "text"))
                            && let Some(text) = part.get("text").and_then(Value::as_str)
                        {
                            texts.push(text);
                        }
                    }
                }
                Some("function_call") => {
                    let call_id = item
                        .get("call_id")
                        .or_else(|| item.get("id"))
                        .and_then(Value::as_str);
                    let name = item.get("name").and_then(Value::as_str);
                    if let (Some(call_id), Some(name)) = (call_id, name) {
                        let call = match item.get("arguments") {
                            Some(Value::String(raw)) => ToolCall::from_raw(call_id, name, raw),
                            Some(other) => ToolCall::new(call_id, name, other.clone()),
                            None => ToolCall::new(call_id, name, json!({})),
                        };
                        tool_calls.push(call);
                    }
                }
                _ => {}
            }
        }

        let answer = if texts.is_empty() {
            body.get("output_text").and_then(Value::as_str).unwrap_or_default().to_string()
        } else {
            texts.join("")
        };

        TurnOutcome::Reply(AssistantReply {
            answer,
            tool_calls,
            raw: Value::Array(output.clone()),
            response_id: body.get("id").and_then(Value::as_str).map(String::from),
        })
    }
}

#[async_trait]
impl ProtocolAdapter for ResponsesAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Responses
    }

    fn initial_state(&self, messages: &[ConversationMessage], system_prompt: Option<&str>) -> TurnState {
        TurnState {
            messages: Self::to_input_items(messages),
            system: Self::derive_instructions(messages, system_prompt),
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
        let request = self
            .endpoint
            .request("responses", body)
            .bearer(self.endpoint.api_key.as_deref());

        debug!(
            model = %self.endpoint.model,
            input_items = state.messages.len(),
            previous_response_id = state.cursor.as_deref().unwrap_or(""),
            tools = tools.len(),
            "Sending responses turn"
        );

        match send_turn(&self.http, &request, cancel).await? {
            Ok(body) => Ok(Self::parse_reply(&body)),
            Err(failed) => Ok(failed),
        }
    }

    fn append_tool_results(&self, state: &mut TurnState, reply: &AssistantReply, results: &[ToolResult]) {
        let outputs = results.iter().map(|r| {
            json!({
                "type": "function_call_output",
                "call_id": r.call_id,
                "output": r.output,
            })
        });

        match &reply.response_id {
            Some(id) => {
                state.cursor = Some(id.clone());
                state.messages = outputs.collect();
            }
            None => {
                state.messages.extend(reply.tool_calls.iter().map(|tc| {
                    json!({
                        "type": "function_call",
                        "call_id": tc.id,
                        "name": tc.name,
                        "arguments": tc.arguments_json(),
                    })
                }));
                state.messages.extend(outputs);
            }
        }
    }
}
