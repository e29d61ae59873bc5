//! Captured page snapshot, produced outside the engine and read by the
//! page-context toolkit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub title: String,

    /// Text the user had selected, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,

    /// Named values extracted from the page (`{{name}}` in templates)
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Visible text of the page, possibly truncated upstream
    #[serde(default)]
    pub text: String,
}

impl PageContext {
    /// Look up a named value. `url`, `title` and `selection` are always
    /// available alongside the extracted fields.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "url" => Some(self.url.as_str()),
            "title" => Some(self.title.as_str()),
            "selection" => self.selection.as_deref(),
            "text" => Some(self.text.as_str()),
            _ => self.fields.get(name).map(String::as_str),
        }
    }

    /// Replace every `{{name}}` with its field value. Unknown placeholders are
    /// left untouched and reported.
    pub fn resolve_template(&self, template: &str) -> (String, Vec<String>) {
        let mut out = String::with_capacity(template.len());
        let mut missing = Vec::new();
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let name = after[..end].trim();
            match self.field(name) {
                Some(value) => out.push_str(value),
                None => {
                    missing.push(name.to_string());
                    out.push_str(&rest[start..start + 2 + end + 2]);
                }
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        (out, missing)
    }
}
