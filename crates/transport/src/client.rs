//! JSON-RPC 2.0 client for remote tool providers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use toolrelay_core::error::TransportError;
use toolrelay_core::provider::ToolProviderDescriptor;
use toolrelay_core::tool::{ToolCatalogEntry, ToolKind, ToolTransport};
use tracing::debug;

use crate::http::{HttpJsonClient, JsonRequest};
use crate::policy::EndpointPolicy;
use crate::retry::RetryPolicy;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(15);

/// `tools/list` pages followed before giving up on `nextCursor`.
const MAX_LIST_PAGES: usize = 16;

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl SendOptions {
    pub fn with_cancel(cancel: &CancellationToken) -> Self {
        Self {
            timeout: None,
            cancel: cancel.clone(),
        }
    }
}

pub struct JsonRpcClient {
    http: HttpJsonClient,
    policy: EndpointPolicy,
    timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(retry: RetryPolicy, policy: EndpointPolicy) -> Self {
        Self {
            http: HttpJsonClient::new(retry),
            policy,
            timeout: DEFAULT_TOOL_TIMEOUT,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Issue one JSON-RPC request and return its `result`.
    ///
    /// The request id is fixed across retries of the same call.
    pub async fn send(
        &self,
        provider: &ToolProviderDescriptor,
        method: &str,
        params: Value,
        options: &SendOptions,
    ) -> Result<Value, TransportError> {
        let url = self.policy.check(&provider.endpoint)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let request = JsonRequest::new(url.as_str(), body, options.timeout.unwrap_or(self.timeout))
            .bearer(provider.api_key.as_deref())
            .event_stream();

        let start = Instant::now();
        let envelope = self.http.post_json(&request, &options.cancel).await?;
        debug!(
            provider = %provider.id,
            method,
            id,
            latency_ms = start.elapsed().as_millis() as u64,
            "JSON-RPC call finished"
        );
        extract_result(envelope)
    }

    pub async fn list_tools(
        &self,
        provider: &ToolProviderDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolCatalogEntry>, TransportError> {
        let options = SendOptions::with_cancel(cancel);
        let mut entries = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let result = self.send(provider, "tools/list", params, &options).await?;
            let page: ToolListResponse = serde_json::from_value(result)
                .map_err(|e| TransportError::MalformedResponse(format!("invalid tools/list result: {e}")))?;

            entries.extend(page.tools.into_iter().map(|tool| ToolCatalogEntry {
                remote_name: tool.name,
                input_schema: tool.input_schema.unwrap_or_else(|| json!({})),
                description: tool.description.unwrap_or_default(),
                kind: ToolKind::McpHttp,
            }));

            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(entries)
    }

    pub async fn call_tool(
        &self,
        provider: &ToolProviderDescriptor,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, TransportError> {
        let params = json!({ "name": name, "arguments": arguments });
        self.send(provider, "tools/call", params, &SendOptions::with_cancel(cancel))
            .await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolListResponse {
    #[serde(default)]
    tools: Vec<RemoteTool>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_schema: Option<Value>,
}

/// Unwrap a JSON-RPC envelope into its `result`.
fn extract_result(envelope: Value) -> Result<Value, TransportError> {
    if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
        return Err(TransportError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(-32603),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    match envelope {
        Value::Object(mut map) => map
            .remove("result")
            .ok_or_else(|| TransportError::MalformedResponse("JSON-RPC envelope has no result".into())),
        _ => Err(TransportError::MalformedResponse("JSON-RPC envelope is not an object".into())),
    }
}

#[async_trait]
impl ToolTransport for JsonRpcClient {
    async fn list_tools(
        &self,
        provider: &ToolProviderDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolCatalogEntry>, TransportError> {
        JsonRpcClient::list_tools(self, provider, cancel).await
    }

    async fn call_tool(
        &self,
        provider: &ToolProviderDescriptor,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, TransportError> {
        JsonRpcClient::call_tool(self, provider, name, arguments, cancel).await
    }
}
