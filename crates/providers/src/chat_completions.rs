//! Chat-completions adapter.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, Together AI and any other
//! endpoint exposing `/chat/completions`. The full history and the tool list
//! are sent every turn; tool results come back as `tool`-role messages keyed
//! by `tool_call_id`.

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

pub struct ChatCompletionsAdapter {
    endpoint: ModelEndpoint,
    http: HttpJsonClient,
}

impl ChatCompletionsAdapter {
    pub fn new(endpoint: ModelEndpoint, http: HttpJsonClient) -> Self {
        Self { endpoint, http }
    }

    /// Convert conversation messages to chat-completions format.
    fn to_api_messages(messages: &[ConversationMessage], system_prompt: Option<&str>) -> Vec<Value> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
            out.push(json!({ "role": "system", "content": system }));
        }
        for m in messages {
            let mut message = json!({
                "role": m.role.as_str(),
                "content": m.text(),
            });
            if m.role == Role::Tool
                && let Some(id) = &m.tool_call_id
            {
                message["tool_call_id"] = json!(id);
            }
            if m.role == Role::Assistant
                && let MessageContent::Blocks(blocks) = &m.content
            {
                let calls = tool_use_calls(blocks);
                if !calls.is_empty() {
                    message["tool_calls"] = json!(calls);
                    if message["content"].as_str().is_some_and(str::is_empty) {
                        message["content"] = Value::Null;
                    }
                }
            }
            out.push(message);
        }
        out
    }

    /// Convert tool definitions to chat-completions format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
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
            "stream": false,
        });
        if !tools.is_empty() {
            body["tools"] = json!(Self::to_api_tools(tools));
            body["tool_choice"] = json!("auto");
        }
        body
    }

    pub fn parse_reply(body: &Value) -> TurnOutcome {
        let Some(message) = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .filter(|m| m.is_object())
        else {
            return TurnOutcome::failed(FailureReason::MissingMessage, "No choices in response");
        };

        let answer = content_text(message.get("content"));
        let tool_calls = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|tc| {
                        let function = tc.get("function")?;
                        let name = function.get("name")?.as_str()?;
                        let id = tc
                            .get("id")
                            .and_then(Value::as_str)
                            .map(String::from)
                            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                        Some(match function.get("arguments") {
                            Some(Value::String(raw)) => ToolCall::from_raw(id, name, raw),
                            Some(other) => ToolCall::new(id, name, other.clone()),
                            None => ToolCall::new(id, name, json!({})),
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        TurnOutcome::Reply(AssistantReply {
            answer,
            tool_calls,
            raw: message.clone(),
            response_id: body.get("id").and_then(Value::as_str).map(String::from),
        })
    }
}

/// `tool_use` blocks of a messages-style assistant turn, as `tool_calls`.
fn tool_use_calls(blocks: &[Value]) -> Vec<Value> {
    blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
        .map(|b| {
            let arguments = b.get("input").cloned().unwrap_or_else(|| json!({}));
            json!({
                "id": b.get("id").and_then(Value::as_str).unwrap_or_default(),
                "type": "function",
                "function": {
                    "name": b.get("name").and_then(Value::as_str).unwrap_or_default(),
                    "arguments": arguments.to_string(),
                }
            })
        })
        .collect()
}

/// Content may be a string, null, or a list of `{type:"text", text}` parts.
fn content_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

#[async_trait]
impl ProtocolAdapter for ChatCompletionsAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::ChatCompletions
    }

    fn initial_state(&self, messages: &[ConversationMessage], system_prompt: Option<&str>) -> TurnState {
        TurnState {
            messages: Self::to_api_messages(messages, system_prompt),
            system: None,
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
        let mut request = self.endpoint.request("chat/completions", body);
        request = request.bearer(self.endpoint.api_key.as_deref());

        debug!(
            model = %self.endpoint.model,
            messages = state.messages.len(),
            tools = tools.len(),
            "Sending chat-completions turn"
        );

        match send_turn(&self.http, &request, cancel).await? {
            Ok(body) => Ok(Self::parse_reply(&body)),
            Err(failed) => Ok(failed),
        }
    }

    fn append_tool_results(&self, state: &mut TurnState, reply: &AssistantReply, results: &[ToolResult]) {
        // Rebuilt from the parsed calls so generated ids line up with the results.
        let tool_calls: Vec<Value> = reply
            .tool_calls
            .iter()
            .map(|tc| {
                json!({
                    "id": tc.id,
                    "type": "function",
                    "function": { "name": tc.name, "arguments": tc.arguments_json() }
                })
            })
            .collect();
        let content = if reply.answer.is_empty() { Value::Null } else { json!(reply.answer) };
        state.messages.push(json!({
            "role": "assistant",
            "content": content,
            "tool_calls": tool_calls,
        }));

        for result in results {
            state.messages.push(json!({
                "role": "tool",
                "tool_call_id": result.call_id,
                "content": result.output,
            }));
        }
    }
}
