//! `toolrelay run`: one prompt through the tool loop.
//!
//! A failed loop, or one the caller should not trust, falls back to a plain
//! completion with no tools.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use toolrelay_agent::{
    LoopOptions, ShortCircuitOptions, run_agent_tool_loop, should_short_circuit_with_tool_loop,
};
use toolrelay_config::AppConfig;
use toolrelay_core::message::ConversationMessage;
use toolrelay_core::page::PageContext;
use toolrelay_core::protocol::TurnOutcome;
use toolrelay_core::provider::{BuiltinToolset, ToolProviderDescriptor};
use toolrelay_core::session::AgentSession;
use toolrelay_providers::adapter_for;
use toolrelay_transport::HttpJsonClient;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run(
    prompt: String,
    page_context: Option<PathBuf>,
    skills: Vec<String>,
    system: Option<String>,
) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    if !config.has_api_key() {
        warn!("No API key configured (set TOOLRELAY_API_KEY or model.api_key)");
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let options = build_options(&config, prompt, page_context.as_deref(), &skills, system)?.with_cancel(cancel);
    let mut session = AgentSession::with_caps(config.agent.memory_max_steps, config.agent.event_log_max);

    match run_agent_tool_loop(options.clone(), &mut session).await {
        Ok(result) if should_short_circuit_with_tool_loop(result.as_ref(), ShortCircuitOptions::default()) => {
            if let Some(result) = result {
                info!(turns = result.turns, used_tools = result.used_tools, "Answered through the tool loop");
                println!("{}", result.answer);
                return Ok(());
            }
        }
        Ok(Some(result)) => {
            warn!(reason = %result.reason, turns = result.turns, "Tool loop did not finish, falling back");
        }
        Ok(None) => {}
        Err(e) if e.is_cancelled() => bail!("Cancelled"),
        Err(e) => warn!(error = %e, "Tool loop errored, falling back"),
    }

    let answer = plain_completion(&options).await?;
    println!("{answer}");
    Ok(())
}

fn build_options(
    config: &AppConfig,
    prompt: String,
    page_context: Option<&Path>,
    extra_skills: &[String],
    system: Option<String>,
) -> anyhow::Result<LoopOptions> {
    let mut options = LoopOptions::from_config(config).with_messages(vec![ConversationMessage::user(prompt)]);
    if let Some(system) = system {
        options = options.with_system_prompt(system);
    }

    select_skills(config, &mut options, extra_skills)?;

    if let Some(path) = page_context {
        let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let page: PageContext =
            serde_json::from_str(&raw).with_context(|| format!("Invalid page context in {}", path.display()))?;
        options.page_context = Some(Arc::new(page));
        let has_toolkit = options
            .providers
            .iter()
            .any(|p| p.active && p.builtin_toolset() == Some(BuiltinToolset::PageContext));
        if !has_toolkit {
            options.providers.push(ToolProviderDescriptor::builtin(BuiltinToolset::PageContext));
        }
    }

    Ok(options)
}

/// Add `ids` to the options' selected skills, skipping ones already there.
pub(crate) fn select_skills(config: &AppConfig, options: &mut LoopOptions, ids: &[String]) -> anyhow::Result<()> {
    for id in ids {
        if options.selected_skills.iter().any(|s| &s.id == id) {
            continue;
        }
        let skill = config
            .skills
            .iter()
            .find(|s| &s.id == id)
            .with_context(|| format!("Unknown skill '{id}'"))?;
        options.selected_skills.push(skill.clone());
    }
    Ok(())
}

/// One turn with no tools.
async fn plain_completion(options: &LoopOptions) -> anyhow::Result<String> {
    let adapter = adapter_for(options.protocol, options.endpoint(), HttpJsonClient::new(options.retry));
    let state = adapter.initial_state(&options.messages, options.system_prompt.as_deref());
    match adapter.run_turn(&state, &[], &options.cancel).await? {
        TurnOutcome::Reply(reply) => Ok(reply.answer),
        TurnOutcome::Failed { reason, detail } => bail!("Completion failed ({}): {detail}", reason.as_str()),
    }
}
