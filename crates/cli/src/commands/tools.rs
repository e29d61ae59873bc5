//! `toolrelay tools`: Print the aliased tool catalog.

use anyhow::Context;
use toolrelay_agent::{LoopBackends, LoopOptions};
use toolrelay_config::AppConfig;
use toolrelay_core::event::EventStatus;
use toolrelay_tools::{BuildOptions, CatalogBuilder};

pub async fn run(extra_skills: Vec<String>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let mut options = LoopOptions::from_config(&config);
    super::run::select_skills(&config, &mut options, &extra_skills)?;

    let backends = LoopBackends::from_options(&options);
    let catalog = CatalogBuilder::with_cache(backends.transport, backends.cache)
        .build(
            &options.providers,
            &options.selected_skills,
            BuildOptions {
                page_context: None,
                cancel: options.cancel.clone(),
            },
        )
        .await?;

    println!("Tools ({})", catalog.len());
    for tool in &catalog.tools {
        println!("  {:<40} {}", tool.alias, tool.description);
    }

    let failures: Vec<_> = catalog
        .events
        .iter()
        .filter(|e| e.status == EventStatus::Failed)
        .collect();
    if !failures.is_empty() {
        println!();
        println!("Unavailable providers:");
        for event in failures {
            println!(
                "  {}: {}",
                event.provider_id.as_deref().unwrap_or("?"),
                event.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}
