//! Tool catalog: merges remote and builtin providers into one aliased set.
//!
//! Every tool the model sees goes through [`CatalogBuilder::build`]. Each
//! entry is bound once to an [`ToolInvoker`], so the dispatcher never
//! branches on provider kind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use toolrelay_core::error::{Error, ToolError, TransportError};
use toolrelay_core::event::ToolEvent;
use toolrelay_core::page::PageContext;
use toolrelay_core::provider::{
    BuiltinToolset, ProviderTransport, SKILL_LIBRARY_PROVIDER_ID, ToolProviderDescriptor,
};
use toolrelay_core::skill::Skill;
use toolrelay_core::tool::{ToolCatalogEntry, ToolDefinition, ToolKind, ToolTransport};

use crate::alias::to_tool_alias;
use crate::cache::CatalogCache;
use crate::page_context::page_context_tools;
use crate::schema::normalize_schema;
use crate::skill_library::skill_tools;

/// Executes one bound tool.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, arguments: Value, cancel: &CancellationToken) -> Result<Value, ToolError>;
}

/// Forwards calls to a remote provider over the tool transport.
pub struct RemoteInvoker {
    transport: Arc<dyn ToolTransport>,
    provider: ToolProviderDescriptor,
    remote_name: String,
}

#[async_trait]
impl ToolInvoker for RemoteInvoker {
    async fn invoke(&self, arguments: Value, cancel: &CancellationToken) -> Result<Value, ToolError> {
        self.transport
            .call_tool(&self.provider, &self.remote_name, arguments, cancel)
            .await
            .map_err(ToolError::from)
    }
}

/// Where an alias leads.
#[derive(Clone)]
pub struct ToolBinding {
    pub provider_id: String,
    pub remote_name: String,
    pub kind: ToolKind,
    pub invoker: Arc<dyn ToolInvoker>,
}

impl std::fmt::Debug for ToolBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBinding")
            .field("provider_id", &self.provider_id)
            .field("remote_name", &self.remote_name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct AliasedTool {
    pub alias: String,
    pub description: String,
    pub schema: Value,
    pub binding: ToolBinding,
}

/// The aliased tool set for one loop invocation.
#[derive(Debug, Default)]
pub struct Catalog {
    pub tools: Vec<AliasedTool>,
    pub tool_map: HashMap<String, ToolBinding>,
    /// One `mcp_tools_listed` event per listing attempt
    pub events: Vec<ToolEvent>,
}

impl Catalog {
    /// Definitions in the shape protocol adapters consume.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.alias.clone(),
                description: t.description.clone(),
                parameters: t.schema.clone(),
            })
            .collect()
    }

    pub fn resolve(&self, alias: &str) -> Option<&ToolBinding> {
        self.tool_map.get(alias)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn insert(
        &mut self,
        provider: &ToolProviderDescriptor,
        entry: ToolCatalogEntry,
        invoker: Arc<dyn ToolInvoker>,
        index: usize,
    ) {
        let alias = to_tool_alias(&provider.id, &entry.remote_name, index);
        let description = if entry.description.trim().is_empty() {
            format!("[{}] {}", provider.label(), entry.remote_name)
        } else {
            format!("[{}] {}", provider.label(), entry.description.trim())
        };
        let binding = ToolBinding {
            provider_id: provider.id.clone(),
            remote_name: entry.remote_name,
            kind: entry.kind,
            invoker,
        };
        self.tool_map.insert(alias.clone(), binding.clone());
        self.tools.push(AliasedTool {
            alias,
            description,
            schema: normalize_schema(&entry.input_schema),
            binding,
        });
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Captured page for the page-context toolkit
    pub page_context: Option<Arc<PageContext>>,
    pub cancel: CancellationToken,
}

pub struct CatalogBuilder {
    transport: Arc<dyn ToolTransport>,
    cache: Arc<CatalogCache>,
}

impl CatalogBuilder {
    /// A builder backed by the process-wide listing cache.
    pub fn new(transport: Arc<dyn ToolTransport>) -> Self {
        Self::with_cache(transport, CatalogCache::global())
    }

    pub fn with_cache(transport: Arc<dyn ToolTransport>, cache: Arc<CatalogCache>) -> Self {
        Self { transport, cache }
    }

    /// Build the catalog for `providers`.
    ///
    /// A provider that fails to list contributes zero tools and a failed
    /// event. Only cancellation aborts the build.
    pub async fn build(
        &self,
        providers: &[ToolProviderDescriptor],
        selected_skills: &[Skill],
        options: BuildOptions,
    ) -> Result<Catalog, Error> {
        let mut catalog = Catalog::default();
        let mut next_index = 0_usize;
        let mut skill_library_seen = false;

        for provider in providers.iter().filter(|p| p.active) {
            if options.cancel.is_cancelled() {
                return Err(TransportError::Cancelled.into());
            }

            let listed = match provider.transport {
                ProviderTransport::Builtin => {
                    let toolset = provider.builtin_toolset();
                    skill_library_seen |= toolset == Some(BuiltinToolset::SkillLibrary);
                    self.builtin_tools(provider, toolset, selected_skills, &options)
                }
                ProviderTransport::Http => match self.remote_tools(provider, &options.cancel).await {
                    Ok(tools) => Ok(tools),
                    Err(TransportError::Cancelled) => return Err(TransportError::Cancelled.into()),
                    Err(e) => Err(e.to_string()),
                },
            };

            match listed {
                Ok(tools) => {
                    debug!(provider = %provider.id, count = tools.len(), "Provider tools listed");
                    catalog.events.push(ToolEvent::tools_listed(&provider.id, Ok(tools.len())));
                    for (entry, invoker) in tools {
                        next_index += 1;
                        catalog.insert(provider, entry, invoker, next_index);
                    }
                }
                Err(error) => {
                    warn!(provider = %provider.id, error = %error, "Tool listing failed, provider skipped");
                    catalog.events.push(ToolEvent::tools_listed(&provider.id, Err(error)));
                }
            }
        }

        if !skill_library_seen && !selected_skills.is_empty() {
            let provider = ToolProviderDescriptor::builtin(BuiltinToolset::SkillLibrary);
            let tools = skill_tools(selected_skills);
            debug!(count = tools.len(), "Injecting skill library for selected skills");
            catalog.events.push(ToolEvent::tools_listed(SKILL_LIBRARY_PROVIDER_ID, Ok(tools.len())));
            for (entry, invoker) in tools {
                next_index += 1;
                catalog.insert(&provider, entry, invoker, next_index);
            }
        }

        info!(tools = catalog.len(), providers = catalog.events.len(), "Tool catalog built");
        Ok(catalog)
    }

    fn builtin_tools(
        &self,
        provider: &ToolProviderDescriptor,
        toolset: Option<BuiltinToolset>,
        selected_skills: &[Skill],
        options: &BuildOptions,
    ) -> Result<Vec<(ToolCatalogEntry, Arc<dyn ToolInvoker>)>, String> {
        match toolset {
            Some(BuiltinToolset::SkillLibrary) => Ok(skill_tools(selected_skills)),
            Some(BuiltinToolset::PageContext) => Ok(page_context_tools(options.page_context.clone())),
            None => Err(format!("Unknown builtin provider: {}", provider.id)),
        }
    }

    async fn remote_tools(
        &self,
        provider: &ToolProviderDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Vec<(ToolCatalogEntry, Arc<dyn ToolInvoker>)>, TransportError> {
        let entries = match self.cache.get(&provider.id, &provider.endpoint) {
            Some(entries) => {
                debug!(provider = %provider.id, "Tool listing served from cache");
                entries
            }
            None => {
                let entries = self.transport.list_tools(provider, cancel).await?;
                self.cache.put(&provider.id, &provider.endpoint, entries.clone());
                entries
            }
        };

        Ok(entries
            .into_iter()
            .map(|entry| {
                let invoker: Arc<dyn ToolInvoker> = Arc::new(RemoteInvoker {
                    transport: self.transport.clone(),
                    provider: provider.clone(),
                    remote_name: entry.remote_name.clone(),
                });
                (entry, invoker)
            })
            .collect())
    }
}
