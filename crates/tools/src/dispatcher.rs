//! Tool dispatcher: runs the model's tool calls against the catalog.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use toolrelay_core::error::{Error, ToolError, TransportError};
use toolrelay_core::event::ToolEvent;
use toolrelay_core::tool::{ToolCall, ToolResult, ToolResultMeta};

use crate::catalog::Catalog;

/// Results and call events of one dispatch round.
#[derive(Debug, Default)]
pub struct Dispatch {
    /// One result per call, in call order
    pub results: Vec<ToolResult>,
    pub events: Vec<ToolEvent>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ToolDispatcher;

impl ToolDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Execute `calls` one after another in the order the model gave them.
    ///
    /// Failures become failed results. Only cancellation returns `Err`.
    pub async fn execute(
        &self,
        calls: &[ToolCall],
        catalog: &Catalog,
        cancel: &CancellationToken,
    ) -> Result<Dispatch, Error> {
        let mut dispatch = Dispatch::default();

        for call in calls {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled.into());
            }

            let Some(binding) = catalog.resolve(&call.name) else {
                let error = ToolError::UnknownAlias(call.name.clone()).to_string();
                warn!(alias = %call.name, "Model called an unknown tool alias");
                let meta = ToolResultMeta {
                    provider_id: String::new(),
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    raw_arguments: call.raw_arguments.clone(),
                    error: None,
                };
                dispatch
                    .events
                    .push(ToolEvent::tool_call(None, &call.name, call, Some(error.clone())));
                dispatch.results.push(ToolResult::failed(&call.id, error, meta));
                continue;
            };

            debug!(
                alias = %call.name,
                provider = %binding.provider_id,
                tool = %binding.remote_name,
                "Dispatching tool call"
            );
            let meta = ToolResultMeta {
                provider_id: binding.provider_id.clone(),
                tool_name: binding.remote_name.clone(),
                arguments: call.arguments.clone(),
                raw_arguments: call.raw_arguments.clone(),
                error: None,
            };

            let result = match binding.invoker.invoke(call.arguments.clone(), cancel).await {
                Ok(value) => {
                    let (text, is_error) = render_output(&value);
                    if is_error {
                        ToolResult::failed(&call.id, text, meta)
                    } else {
                        ToolResult::succeeded(&call.id, text, meta)
                    }
                }
                Err(ToolError::Transport(TransportError::Cancelled)) => {
                    return Err(TransportError::Cancelled.into());
                }
                Err(e) => ToolResult::failed(&call.id, e.to_string(), meta),
            };

            if let Some(error) = &result.meta.error {
                warn!(alias = %call.name, provider = %binding.provider_id, error = %error, "Tool call failed");
            }
            dispatch.events.push(ToolEvent::tool_call(
                Some(&binding.provider_id),
                &binding.remote_name,
                call,
                result.meta.error.clone(),
            ));
            dispatch.results.push(result);
        }

        Ok(dispatch)
    }
}

/// Turn a raw tool result into text. MCP `content[].text` parts are joined
/// with newlines; anything else is pretty-printed JSON. The flag is the MCP
/// `isError` marker.
pub fn render_output(value: &Value) -> (String, bool) {
    let is_error = value.get("isError").and_then(Value::as_bool).unwrap_or(false);

    if let Value::String(text) = value {
        return (text.clone(), false);
    }

    if let Some(parts) = value.get("content").and_then(Value::as_array) {
        let texts: Vec<&str> = parts.iter().filter_map(|p| p.get("text").and_then(Value::as_str)).collect();
        if !texts.is_empty() {
            return (texts.join("\n"), is_error);
        }
    }

    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    (text, is_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CatalogCache;
    use crate::catalog::{BuildOptions, CatalogBuilder};
    use crate::test_helpers::{CountingTransport, remote_entry};
    use serde_json::json;
    use std::sync::Arc;
    use toolrelay_core::event::{EventStatus, ToolEventKind};
    use toolrelay_core::provider::ToolProviderDescriptor;
    use toolrelay_core::tool::{MAX_TOOL_OUTPUT_CHARS, ToolStatus};

    async fn catalog_with(transport: Arc<CountingTransport>) -> Catalog {
        CatalogBuilder::with_cache(transport, Arc::new(CatalogCache::default()))
            .build(
                &[ToolProviderDescriptor::http("search", "https://tools.example.com/rpc")],
                &[],
                BuildOptions::default(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn successful_call_joins_text_content() {
        let transport = Arc::new(
            CountingTransport::new()
                .with_tools("search", vec![remote_entry("search", "")])
                .with_call_result(
                    "search",
                    Ok(json!({"content": [{"type": "text", "text": "found:"}, {"type": "text", "text": "x"}]})),
                ),
        );
        let catalog = catalog_with(transport.clone()).await;
        let calls = [ToolCall::new("call_1", "search__search_1", json!({"q": "x"}))];

        let dispatch = ToolDispatcher::new().execute(&calls, &catalog, &CancellationToken::new()).await.unwrap();

        assert_eq!(dispatch.results.len(), 1);
        let result = &dispatch.results[0];
        assert_eq!(result.call_id, "call_1");
        assert_eq!(result.status, ToolStatus::Succeeded);
        assert_eq!(result.output, "found:\nx");
        assert_eq!(result.meta.provider_id, "search");
        assert_eq!(
            transport.calls(),
            vec![(String::from("search"), String::from("search"), json!({"q": "x"}))]
        );

        let event = &dispatch.events[0];
        assert_eq!(event.kind, ToolEventKind::McpToolCall);
        assert_eq!(event.status, EventStatus::Succeeded);
        assert_eq!(event.tool_name.as_deref(), Some("search"));
        assert_eq!(event.arguments, Some(json!({"q": "x"})));
    }

    #[tokio::test]
    async fn unknown_alias_is_a_failed_result() {
        let catalog = catalog_with(Arc::new(CountingTransport::new())).await;
        let calls = [ToolCall::new("call_9", "nope_1", json!({}))];

        let dispatch = ToolDispatcher::new().execute(&calls, &catalog, &CancellationToken::new()).await.unwrap();

        assert_eq!(dispatch.results[0].status, ToolStatus::Failed);
        assert_eq!(dispatch.results[0].output, "Unknown tool alias: nope_1");
        assert_eq!(dispatch.events[0].status, EventStatus::Failed);
        assert_eq!(dispatch.events[0].provider_id, None);
        assert_eq!(dispatch.events[0].tool_name.as_deref(), Some("nope_1"));
    }

    #[tokio::test]
    async fn malformed_arguments_are_recorded_verbatim() {
        let transport = Arc::new(CountingTransport::new().with_tools("search", vec![remote_entry("search", "")]));
        let catalog = catalog_with(transport.clone()).await;
        let calls = [ToolCall::from_raw("c1", "search__search_1", "{\"q\": \"x\"")];

        let dispatch = ToolDispatcher::new().execute(&calls, &catalog, &CancellationToken::new()).await.unwrap();

        assert_eq!(transport.calls()[0].2, json!({}));
        let result = &dispatch.results[0];
        assert_eq!(result.meta.arguments, json!({}));
        assert_eq!(result.meta.raw_arguments.as_deref(), Some("{\"q\": \"x\""));
        let event = &dispatch.events[0];
        assert_eq!(event.provider_id.as_deref(), Some("search"));
        assert_eq!(event.arguments, Some(json!({})));
        assert_eq!(event.raw_arguments.as_deref(), Some("{\"q\": \"x\""));
    }

    #[tokio::test]
    async fn is_error_and_transport_errors_fail_the_call_only() {
        let transport = Arc::new(
            CountingTransport::new()
                .with_tools("search", vec![remote_entry("search", ""), remote_entry("fetch", "")])
                .with_call_result(
                    "search",
                    Ok(json!({"content": [{"type": "text", "text": "quota exceeded"}], "isError": true})),
                )
                .with_call_result("fetch", Err(TransportError::Rpc { code: -32602, message: "bad params".into() })),
        );
        let catalog = catalog_with(transport).await;
        let calls = [
            ToolCall::new("c1", "search__search_1", json!({})),
            ToolCall::new("c2", "search__fetch_2", json!({})),
        ];

        let dispatch = ToolDispatcher::new().execute(&calls, &catalog, &CancellationToken::new()).await.unwrap();

        assert_eq!(dispatch.results[0].status, ToolStatus::Failed);
        assert_eq!(dispatch.results[0].output, "quota exceeded");
        assert_eq!(dispatch.results[1].status, ToolStatus::Failed);
        assert!(dispatch.results[1].output.contains("bad params"));
        assert_eq!(dispatch.events.len(), 2);
    }

    #[tokio::test]
    async fn long_output_is_truncated() {
        let transport = Arc::new(
            CountingTransport::new()
                .with_tools("search", vec![remote_entry("search", "")])
                .with_call_result("search", Ok(Value::String("y".repeat(MAX_TOOL_OUTPUT_CHARS + 500)))),
        );
        let catalog = catalog_with(transport).await;
        let calls = [ToolCall::new("c1", "search__search_1", json!({}))];

        let dispatch = ToolDispatcher::new().execute(&calls, &catalog, &CancellationToken::new()).await.unwrap();
        assert_eq!(dispatch.results[0].output.chars().count(), MAX_TOOL_OUTPUT_CHARS);
    }

    #[tokio::test]
    async fn cancellation_propagates() {
        let transport = Arc::new(CountingTransport::new().with_tools("search", vec![remote_entry("search", "")]));
        let catalog = catalog_with(transport.clone()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ToolDispatcher::new()
            .execute(&[ToolCall::new("c1", "search__search_1", json!({}))], &catalog, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn structured_results_are_pretty_printed() {
        let (text, is_error) = render_output(&json!({"rows": [1, 2]}));
        assert!(!is_error);
        assert_eq!(text, serde_json::to_string_pretty(&json!({"rows": [1, 2]})).unwrap());
    }
}
