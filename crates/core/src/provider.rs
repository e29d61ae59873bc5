//! Tool provider descriptors: where tools come from.
//!
//! A provider is either a remote JSON-RPC server reached over HTTP, or a
//! builtin toolset that runs in-process. Descriptors are owned by
//! configuration and read-only to the engine.

use serde::{Deserialize, Serialize};

/// Well-known id of the builtin skill library provider.
pub const SKILL_LIBRARY_PROVIDER_ID: &str = "builtin_skills";

/// Well-known id of the builtin page context provider.
pub const PAGE_CONTEXT_PROVIDER_ID: &str = "builtin_page_context";

/// How a provider is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTransport {
    #[default]
    Http,
    Builtin,
}

/// Which in-process toolset a builtin provider exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinToolset {
    SkillLibrary,
    PageContext,
}

/// Identity and reachability of a tool provider.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProviderDescriptor {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub transport: ProviderTransport,

    /// JSON-RPC endpoint (HTTP providers only)
    #[serde(default)]
    pub endpoint: String,

    /// Bearer credential sent as `Authorization: Bearer <key>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,

    /// Builtin toolset; inferred from the well-known ids when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolset: Option<BuiltinToolset>,
}

fn default_active() -> bool {
    true
}

impl std::fmt::Debug for ToolProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolProviderDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("transport", &self.transport)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("active", &self.active)
            .field("toolset", &self.toolset)
            .finish()
    }
}

impl ToolProviderDescriptor {
    /// A remote JSON-RPC provider.
    pub fn http(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            transport: ProviderTransport::Http,
            endpoint: endpoint.into(),
            api_key: None,
            active: true,
            toolset: None,
        }
    }

    /// A builtin in-process provider.
    pub fn builtin(toolset: BuiltinToolset) -> Self {
        let (id, name) = match toolset {
            BuiltinToolset::SkillLibrary => (SKILL_LIBRARY_PROVIDER_ID, "Skill library"),
            BuiltinToolset::PageContext => (PAGE_CONTEXT_PROVIDER_ID, "Page context toolkit"),
        };
        Self {
            id: id.into(),
            name: name.into(),
            transport: ProviderTransport::Builtin,
            endpoint: String::new(),
            api_key: None,
            active: true,
            toolset: Some(toolset),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Human label: the name when set, otherwise the id.
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() { &self.id } else { &self.name }
    }

    /// The builtin toolset this provider exposes, if it is builtin.
    pub fn builtin_toolset(&self) -> Option<BuiltinToolset> {
        if self.transport != ProviderTransport::Builtin {
            return None;
        }
        self.toolset.or(match self.id.as_str() {
            SKILL_LIBRARY_PROVIDER_ID => Some(BuiltinToolset::SkillLibrary),
            PAGE_CONTEXT_PROVIDER_ID => Some(BuiltinToolset::PageContext),
            _ => None,
        })
    }
}
