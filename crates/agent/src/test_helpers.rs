//! Shared test helpers for loop tests.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use toolrelay_core::error::TransportError;
use toolrelay_core::message::ConversationMessage;
use toolrelay_core::protocol::{AssistantReply, Protocol, ProtocolAdapter, TurnOutcome, TurnState};
use toolrelay_core::provider::ToolProviderDescriptor;
use toolrelay_core::tool::{ToolCall, ToolCatalogEntry, ToolDefinition, ToolKind, ToolResult, ToolTransport};
use toolrelay_tools::{BuildOptions, Catalog, CatalogBuilder, CatalogCache};

/// A protocol adapter that returns a sequence of scripted outcomes.
///
/// Each call to `run_turn` returns the next outcome in the queue.
/// Panics if more turns are requested than outcomes provided.
pub struct ScriptedAdapter {
    outcomes: Mutex<Vec<Result<TurnOutcome, TransportError>>>,
    call_count: Mutex<usize>,
    system_prompts: Mutex<Vec<Option<String>>>,
    appended: Mutex<Vec<Vec<String>>>,
}

impl ScriptedAdapter {
    pub fn new(outcomes: Vec<TurnOutcome>) -> Self {
        Self::from_outcomes(outcomes.into_iter().map(Ok).collect())
    }

    pub fn from_outcomes(outcomes: Vec<Result<TurnOutcome, TransportError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            call_count: Mutex::new(0),
            system_prompts: Mutex::new(Vec::new()),
            appended: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// The system prompt of every `initial_state` call.
    pub fn system_prompts(&self) -> Vec<Option<String>> {
        self.system_prompts.lock().unwrap().clone()
    }

    /// Call ids passed to each `append_tool_results`.
    pub fn appended_results(&self) -> Vec<Vec<String>> {
        self.appended.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ProtocolAdapter for ScriptedAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::ChatCompletions
    }

    fn initial_state(&self, messages: &[ConversationMessage], system_prompt: Option<&str>) -> TurnState {
        self.system_prompts
            .lock()
            .unwrap()
            .push(system_prompt.map(str::to_string));
        TurnState {
            messages: messages.iter().map(|m| json!({"role": m.role.as_str(), "content": m.text()})).collect(),
            system: system_prompt.map(str::to_string),
            cursor: None,
        }
    }

    async fn run_turn(
        &self,
        _state: &TurnState,
        _tools: &[ToolDefinition],
        _cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TransportError> {
        let mut count = self.call_count.lock().unwrap();
        let outcomes = self.outcomes.lock().unwrap();

        if *count >= outcomes.len() {
            panic!(
                "ScriptedAdapter: no more outcomes (turn #{}, have {})",
                *count,
                outcomes.len()
            );
        }

        let outcome = outcomes[*count].clone();
        *count += 1;
        outcome
    }

    fn append_tool_results(&self, state: &mut TurnState, _reply: &AssistantReply, results: &[ToolResult]) {
        self.appended
            .lock()
            .unwrap()
            .push(results.iter().map(|r| r.call_id.clone()).collect());
        for result in results {
            state
                .messages
                .push(json!({"role": "tool", "tool_call_id": result.call_id, "content": result.output}));
        }
    }
}

/// A reply carrying only tool calls.
pub fn tool_call_reply(tool_calls: Vec<ToolCall>) -> TurnOutcome {
    TurnOutcome::Reply(AssistantReply {
        tool_calls,
        ..Default::default()
    })
}

/// A final text reply (no tool calls).
pub fn answer_reply(text: &str) -> TurnOutcome {
    TurnOutcome::Reply(AssistantReply {
        answer: text.into(),
        ..Default::default()
    })
}

/// A reply with neither text nor tool calls.
pub fn empty_reply() -> TurnOutcome {
    TurnOutcome::Reply(AssistantReply::default())
}

/// A tool transport exposing one `search` tool that always finds `x`.
pub struct SearchTransport;

#[async_trait::async_trait]
impl ToolTransport for SearchTransport {
    async fn list_tools(
        &self,
        _provider: &ToolProviderDescriptor,
        _cancel: &CancellationToken,
    ) -> Result<Vec<ToolCatalogEntry>, TransportError> {
        Ok(vec![ToolCatalogEntry {
            remote_name: "search".into(),
            input_schema: json!({"type": "object", "properties": {"q": {"type": "string"}}}),
            description: "Search the index".into(),
            kind: ToolKind::McpHttp,
        }])
    }

    async fn call_tool(
        &self,
        _provider: &ToolProviderDescriptor,
        _name: &str,
        arguments: Value,
        _cancel: &CancellationToken,
    ) -> Result<Value, TransportError> {
        let query = arguments["q"].as_str().unwrap_or_default().to_string();
        Ok(json!({"content": [{"type": "text", "text": format!("found: {query}")}]}))
    }
}

pub fn search_provider() -> ToolProviderDescriptor {
    ToolProviderDescriptor::http("search", "https://tools.example.com/rpc")
}

/// A catalog with the single alias `search__search_1`.
pub async fn search_catalog() -> Catalog {
    CatalogBuilder::with_cache(Arc::new(SearchTransport), Arc::new(CatalogCache::default()))
        .build(&[search_provider()], &[], BuildOptions::default())
        .await
        .unwrap()
}
