//! Tool types: what a provider offers, what the model asks for, and what
//! comes back.
//!
//! The `ToolTransport` trait is the seam between the catalog/dispatcher and
//! whatever actually talks to a remote tool server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::provider::ToolProviderDescriptor;

/// Upper bound on the text of a single tool result, in characters.
pub const MAX_TOOL_OUTPUT_CHARS: usize = 24_000;

/// Where a catalog entry is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    McpHttp,
    BuiltinSkill,
    BuiltinPageContext,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::McpHttp => "mcp_http",
            ToolKind::BuiltinSkill => "builtin_skill",
            ToolKind::BuiltinPageContext => "builtin_page_context",
        }
    }
}

/// One capability discovered on a provider, before aliasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCatalogEntry {
    pub remote_name: String,

    #[serde(default = "empty_object")]
    pub input_schema: serde_json::Value,

    #[serde(default)]
    pub description: String,

    pub kind: ToolKind,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

/// Tool definition handed to a protocol adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The alias the model must use
    pub name: String,

    pub description: String,

    /// Normalized JSON Schema for the arguments
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque call id issued by the model
    pub id: String,

    /// Alias of the target tool
    pub name: String,

    /// Arguments, always a JSON object
    pub arguments: serde_json::Value,

    /// Argument text exactly as the model sent it, kept for telemetry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_arguments: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: coerce_object(arguments),
            raw_arguments: None,
        }
    }

    /// Build a call from the raw argument text a model emitted.
    pub fn from_raw(id: impl Into<String>, name: impl Into<String>, raw: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: parse_arguments(raw),
            raw_arguments: Some(raw.to_string()),
        }
    }

    /// Arguments re-encoded as JSON text, for wire formats that carry strings.
    pub fn arguments_json(&self) -> String {
        serde_json::to_string(&self.arguments).unwrap_or_else(|_| "{}".into())
    }
}

/// Parse model-supplied argument text. Empty, malformed, or non-object JSON
/// degrades to `{}`.
pub fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return empty_object();
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => coerce_object(value),
        Err(e) => {
            tracing::debug!(error = %e, "Malformed tool arguments, using empty object");
            empty_object()
        }
    }
}

fn coerce_object(value: serde_json::Value) -> serde_json::Value {
    if value.is_object() { value } else { empty_object() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Succeeded,
    Failed,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Succeeded => "succeeded",
            ToolStatus::Failed => "failed",
        }
    }
}

/// Telemetry attached to a result. Never sent to the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResultMeta {
    pub provider_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_arguments: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The outcome of one dispatched tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call id this result answers
    pub call_id: String,

    pub status: ToolStatus,

    /// Text re-inserted into the conversation, at most
    /// [`MAX_TOOL_OUTPUT_CHARS`] characters
    pub output: String,

    pub meta: ToolResultMeta,
}

impl ToolResult {
    pub fn succeeded(call_id: impl Into<String>, output: impl Into<String>, meta: ToolResultMeta) -> Self {
        Self {
            call_id: call_id.into(),
            status: ToolStatus::Succeeded,
            output: truncate_output(output.into()),
            meta,
        }
    }

    /// A failed result. The error text doubles as the output the model sees.
    pub fn failed(call_id: impl Into<String>, error: impl Into<String>, mut meta: ToolResultMeta) -> Self {
        let error = error.into();
        meta.error = Some(error.clone());
        Self {
            call_id: call_id.into(),
            status: ToolStatus::Failed,
            output: truncate_output(error),
            meta,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Succeeded
    }
}

/// Cut `text` to [`MAX_TOOL_OUTPUT_CHARS`] characters on a char boundary.
pub fn truncate_output(text: String) -> String {
    match text.char_indices().nth(MAX_TOOL_OUTPUT_CHARS) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text,
    }
}

/// Remote tool access. Implemented by the JSON-RPC client; mocked in tests.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// `tools/list` against one provider.
    async fn list_tools(
        &self,
        provider: &ToolProviderDescriptor,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<ToolCatalogEntry>, TransportError>;

    /// `tools/call` against one provider. Returns the raw JSON-RPC `result`.
    async fn call_tool(
        &self,
        provider: &ToolProviderDescriptor,
        name: &str,
        arguments: serde_json::Value,
        cancel: &CancellationToken,
    ) -> std::result::Result<serde_json::Value, TransportError>;
}
