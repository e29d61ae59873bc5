//! Builtin page-context toolkit: read-only views over a captured page.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use toolrelay_core::error::ToolError;
use toolrelay_core::page::PageContext;
use toolrelay_core::tool::{ToolCatalogEntry, ToolKind};

use crate::catalog::ToolInvoker;

const TEXT_PREVIEW_CHARS: usize = 2_000;

pub fn page_context_tools(page: Option<Arc<PageContext>>) -> Vec<(ToolCatalogEntry, Arc<dyn ToolInvoker>)> {
    let entry = ToolCatalogEntry {
        remote_name: "page_context".into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["overview", "field", "resolve_template"],
                    "description": "overview of the page, one named field, or fill a {{field}} template"
                },
                "name": {
                    "type": "string",
                    "description": "Field name for action=field"
                },
                "template": {
                    "type": "string",
                    "description": "Template text for action=resolve_template"
                }
            },
            "required": ["action"]
        }),
        description: "Read the page the user is looking at: its title, URL, selection, extracted fields, \
                      and text. Read-only."
            .into(),
        kind: ToolKind::BuiltinPageContext,
    };
    vec![(entry, Arc::new(PageContextInvoker { page }))]
}

pub fn run_action(page: &PageContext, arguments: &Value) -> Result<String, ToolError> {
    match arguments["action"].as_str().unwrap_or("overview") {
        "overview" => Ok(overview(page)),
        "field" => {
            let name = arguments["name"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("Missing 'name' argument".into()))?;
            page.field(name.trim()).map(str::to_string).ok_or_else(|| {
                let known: Vec<&str> = page.fields.keys().map(String::as_str).collect();
                ToolError::InvalidArguments(format!(
                    "Unknown field '{name}'. Available: url, title, selection, text{}{}",
                    if known.is_empty() { "" } else { ", " },
                    known.join(", ")
                ))
            })
        }
        "resolve_template" => {
            let template = arguments["template"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("Missing 'template' argument".into()))?;
            let (resolved, missing) = page.resolve_template(template);
            if missing.is_empty() {
                Ok(resolved)
            } else {
                Ok(format!("{resolved}\n\n(unresolved fields: {})", missing.join(", ")))
            }
        }
        other => Err(ToolError::InvalidArguments(format!(
            "Unknown action '{other}'. Expected overview, field or resolve_template"
        ))),
    }
}

fn overview(page: &PageContext) -> String {
    let mut out = format!("Title: {}\nURL: {}\n", page.title, page.url);
    if let Some(selection) = page.selection.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!("Selection: {selection}\n"));
    }
    if !page.fields.is_empty() {
        let names: Vec<&str> = page.fields.keys().map(String::as_str).collect();
        out.push_str(&format!("Fields: {}\n", names.join(", ")));
    }
    if !page.text.is_empty() {
        let preview: String = page.text.chars().take(TEXT_PREVIEW_CHARS).collect();
        out.push_str(&format!("\n{preview}"));
        if page.text.chars().count() > TEXT_PREVIEW_CHARS {
            out.push_str("\n[... truncated, use action=field name=text for the full text]");
        }
    }
    out
}

pub struct PageContextInvoker {
    page: Option<Arc<PageContext>>,
}

#[async_trait]
impl ToolInvoker for PageContextInvoker {
    async fn invoke(&self, arguments: Value, _cancel: &CancellationToken) -> Result<Value, ToolError> {
        let page = self.page.as_deref().ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: "page_context".into(),
            reason: "no page context was captured".into(),
        })?;
        run_action(page, &arguments).map(Value::String)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn page() -> PageContext {
        PageContext {
            url: "https://shop.example.com/item/7".into(),
            title: "Blue kettle".into(),
            selection: Some("1.7 litres".into()),
            fields: BTreeMap::from([("price".to_string(), "$40".to_string())]),
            text: "A blue kettle.".into(),
        }
    }

    #[test]
    fn overview_lists_fields() {
        let text = run_action(&page(), &json!({"action": "overview"})).unwrap();
        assert!(text.contains("Title: Blue kettle"));
        assert!(text.contains("Fields: price"));
        assert!(text.contains("Selection: 1.7 litres"));
    }

    #[test]
    fn field_lookup() {
        assert_eq!(run_action(&page(), &json!({"action": "field", "name": "price"})).unwrap(), "$40");
        let err = run_action(&page(), &json!({"action": "field", "name": "sku"})).unwrap_err();
        assert!(err.to_string().contains("price"));
    }

    #[test]
    fn template_resolution_notes_missing() {
        let text = run_action(
            &page(),
            &json!({"action": "resolve_template", "template": "{{title}} for {{price}} ({{sku}})"}),
        )
        .unwrap();
        assert!(text.starts_with("Blue kettle for $40 ({{sku}})"));
        assert!(text.contains("unresolved fields: sku"));
    }

    #[tokio::test]
    async fn invoker_without_page_fails() {
        let tools = page_context_tools(None);
        let err = tools[0]
            .1
            .invoke(json!({"action": "overview"}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
