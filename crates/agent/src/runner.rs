//! Caller entry point: build the catalog, then run the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use toolrelay_config::{AppConfig, TransportConfig};
use toolrelay_core::error::Error;
use toolrelay_core::message::ConversationMessage;
use toolrelay_core::page::PageContext;
use toolrelay_core::protocol::{Protocol, ProtocolAdapter};
use toolrelay_core::provider::ToolProviderDescriptor;
use toolrelay_core::session::AgentSession;
use toolrelay_core::skill::Skill;
use toolrelay_core::tool::ToolTransport;
use toolrelay_providers::{DEFAULT_MODEL_TIMEOUT, ModelEndpoint, adapter_for};
use toolrelay_tools::{BuildOptions, CatalogBuilder, CatalogCache};
use toolrelay_transport::{DEFAULT_TOOL_TIMEOUT, EndpointPolicy, HttpJsonClient, JsonRpcClient, RetryPolicy};
use tracing::debug;

use crate::loop_runner::{AgentToolLoop, LoopLimits};
use crate::outcome::LoopResult;

/// Everything one loop invocation needs.
#[derive(Clone)]
pub struct LoopOptions {
    pub protocol: Protocol,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub messages: Vec<ConversationMessage>,
    pub system_prompt: Option<String>,
    pub providers: Vec<ToolProviderDescriptor>,
    pub selected_skills: Vec<Skill>,
    pub max_response_tokens: u32,
    pub temperature: f32,
    pub cancel: CancellationToken,

    /// Captured page for the page-context toolkit
    pub page_context: Option<Arc<PageContext>>,

    pub limits: LoopLimits,

    /// Retry policy for model turns and tool calls
    pub retry: RetryPolicy,

    pub tool_timeout: Duration,
    pub model_timeout: Duration,

    /// Allow plain-http tool endpoints on loopback hosts
    pub developer_mode: bool,
}

impl std::fmt::Debug for LoopOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopOptions")
            .field("protocol", &self.protocol)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("messages", &self.messages.len())
            .field("providers", &self.providers)
            .field("selected_skills", &self.selected_skills.len())
            .field("limits", &self.limits)
            .field("developer_mode", &self.developer_mode)
            .finish_non_exhaustive()
    }
}

impl LoopOptions {
    pub fn new(protocol: Protocol, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            protocol,
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            messages: Vec::new(),
            system_prompt: None,
            providers: Vec::new(),
            selected_skills: Vec::new(),
            max_response_tokens: 1024,
            temperature: 0.7,
            cancel: CancellationToken::new(),
            page_context: None,
            limits: LoopLimits::default(),
            retry: RetryPolicy::default(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            developer_mode: false,
        }
    }

    /// Options seeded from configuration. Messages, prompt and page are
    /// left for the caller.
    pub fn from_config(config: &AppConfig) -> Self {
        let transport = &config.transport;
        Self {
            api_key: config.model.api_key.clone(),
            providers: config.providers.clone(),
            selected_skills: config.skills_by_id(&config.selected_skills),
            max_response_tokens: config.model.max_response_tokens,
            temperature: config.model.temperature,
            limits: LoopLimits {
                max_turns: config.agent.agent_max_steps,
                no_progress_limit: config.agent.agent_no_progress_limit,
            },
            retry: retry_policy(transport),
            tool_timeout: Duration::from_millis(transport.timeout_ms),
            model_timeout: Duration::from_millis(transport.model_timeout_ms),
            developer_mode: transport.developer_mode,
            ..Self::new(config.model.protocol, &config.model.base_url, &config.model.model)
        }
    }

    pub fn with_messages(mut self, messages: Vec<ConversationMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The model endpoint these options describe.
    pub fn endpoint(&self) -> ModelEndpoint {
        ModelEndpoint::new(&self.base_url, &self.model)
            .with_api_key(self.api_key.clone().unwrap_or_default())
            .with_max_response_tokens(self.max_response_tokens)
            .with_temperature(self.temperature)
            .with_timeout(self.model_timeout)
    }

    /// Reject options no adapter could send a turn with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.model.trim().is_empty() {
            return Err(Error::Config {
                message: "model must not be empty".into(),
            });
        }
        if self.base_url.trim().is_empty() {
            return Err(Error::Config {
                message: "model base_url must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Whether any tool source is configured at all.
    pub fn has_tool_sources(&self) -> bool {
        self.providers.iter().any(|p| p.active) || !self.selected_skills.is_empty()
    }
}

pub fn retry_policy(config: &TransportConfig) -> RetryPolicy {
    RetryPolicy {
        max_retries: config.max_retries,
        initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        multiplier: config.backoff_multiplier,
        max_backoff: Duration::from_millis(config.max_backoff_ms),
    }
}

/// The adapter, tool transport and listing cache a loop runs against.
pub struct LoopBackends {
    pub adapter: Arc<dyn ProtocolAdapter>,
    pub transport: Arc<dyn ToolTransport>,
    pub cache: Arc<CatalogCache>,
}

impl LoopBackends {
    /// Network-backed adapter and JSON-RPC client, sharing the global cache.
    pub fn from_options(options: &LoopOptions) -> Self {
        let policy = if options.developer_mode {
            EndpointPolicy::developer()
        } else {
            EndpointPolicy::strict()
        };
        Self {
            adapter: adapter_for(options.protocol, options.endpoint(), HttpJsonClient::new(options.retry)),
            transport: Arc::new(JsonRpcClient::new(options.retry, policy).with_timeout(options.tool_timeout)),
            cache: CatalogCache::global(),
        }
    }
}

/// Run one tool-loop invocation.
///
/// Returns `Ok(None)` when no active provider and no skill is configured,
/// so the caller can go straight to a plain completion.
pub async fn run_agent_tool_loop(options: LoopOptions, session: &mut AgentSession) -> Result<Option<LoopResult>, Error> {
    if !options.has_tool_sources() {
        debug!("No tool providers or skills configured, skipping tool loop");
        return Ok(None);
    }
    let backends = LoopBackends::from_options(&options);
    run_agent_tool_loop_with(backends, options, session).await
}

/// [`run_agent_tool_loop`] against explicit backends.
pub async fn run_agent_tool_loop_with(
    backends: LoopBackends,
    options: LoopOptions,
    session: &mut AgentSession,
) -> Result<Option<LoopResult>, Error> {
    if !options.has_tool_sources() {
        debug!("No tool providers or skills configured, skipping tool loop");
        return Ok(None);
    }
    options.validate()?;

    let catalog = CatalogBuilder::with_cache(backends.transport, backends.cache)
        .build(
            &options.providers,
            &options.selected_skills,
            BuildOptions {
                page_context: options.page_context.clone(),
                cancel: options.cancel.clone(),
            },
        )
        .await?;

    let result = AgentToolLoop::new(backends.adapter)
        .with_limits(options.limits)
        .run(
            &options.messages,
            options.system_prompt.as_deref(),
            catalog,
            session,
            &options.cancel,
        )
        .await?;

    Ok(Some(result))
}
