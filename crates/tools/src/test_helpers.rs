//! Shared test helpers for catalog and dispatcher tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use toolrelay_core::error::TransportError;
use toolrelay_core::provider::ToolProviderDescriptor;
use toolrelay_core::tool::{ToolCatalogEntry, ToolKind, ToolTransport};

/// A scripted tool transport that counts listings and records calls.
#[derive(Default)]
pub struct CountingTransport {
    listings: HashMap<String, Vec<ToolCatalogEntry>>,
    failing: HashSet<String>,
    call_results: HashMap<String, Result<Value, TransportError>>,
    list_calls: Mutex<usize>,
    calls: Mutex<Vec<(String, String, Value)>>,
}

impl CountingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, provider_id: &str, entries: Vec<ToolCatalogEntry>) -> Self {
        self.listings.insert(provider_id.into(), entries);
        self
    }

    /// Listing this provider fails with a 500.
    pub fn failing(mut self, provider_id: &str) -> Self {
        self.failing.insert(provider_id.into());
        self
    }

    pub fn with_call_result(mut self, remote_name: &str, result: Result<Value, TransportError>) -> Self {
        self.call_results.insert(remote_name.into(), result);
        self
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }

    /// `(provider_id, remote_name, arguments)` for every call, in order.
    pub fn calls(&self) -> Vec<(String, String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ToolTransport for CountingTransport {
    async fn list_tools(
        &self,
        provider: &ToolProviderDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolCatalogEntry>, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        *self.list_calls.lock().unwrap() += 1;
        if self.failing.contains(&provider.id) {
            return Err(TransportError::HttpStatus {
                status: 500,
                body: "listing unavailable".into(),
            });
        }
        Ok(self.listings.get(&provider.id).cloned().unwrap_or_default())
    }

    async fn call_tool(
        &self,
        provider: &ToolProviderDescriptor,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        self.calls
            .lock()
            .unwrap()
            .push((provider.id.clone(), name.to_string(), arguments));
        self.call_results
            .get(name)
            .cloned()
            .unwrap_or_else(|| Ok(json!({"content": [{"type": "text", "text": format!("{name} ok")}]})))
    }
}

pub fn remote_entry(name: &str, description: &str) -> ToolCatalogEntry {
    ToolCatalogEntry {
        remote_name: name.into(),
        input_schema: json!({"type": "object", "properties": {"q": {"type": "string"}}}),
        description: description.into(),
        kind: ToolKind::McpHttp,
    }
}
