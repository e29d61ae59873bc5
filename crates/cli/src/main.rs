//! ToolRelay CLI: the main entry point.
//!
//! Commands:
//! - `run`: answer a prompt through the tool loop, with a plain fallback
//! - `tools`: print the aliased tool catalog
//! - `config`: print the default configuration or its path

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "toolrelay",
    about = "ToolRelay: tool-use orchestration for language-model endpoints",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a prompt, letting the model call tools
    Run {
        /// The user prompt
        prompt: String,

        /// JSON file with a captured page for the page-context toolkit
        #[arg(long, value_name = "FILE")]
        page_context: Option<PathBuf>,

        /// Expose a configured skill (repeatable)
        #[arg(long = "skill", value_name = "ID")]
        skills: Vec<String>,

        /// System prompt for this run
        #[arg(long = "system", value_name = "PROMPT")]
        system: Option<String>,
    },

    /// List the tools the model would see
    Tools {
        /// Expose a configured skill (repeatable)
        #[arg(long = "skill", value_name = "ID")]
        skills: Vec<String>,
    },

    /// Print the default configuration
    Config {
        /// Print the config file path instead
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            prompt,
            page_context,
            skills,
            system,
        } => commands::run::run(prompt, page_context, skills, system).await?,
        Commands::Tools { skills } => commands::tools::run(skills).await?,
        Commands::Config { path } => {
            if path {
                commands::config_cmd::path()?
            } else {
                commands::config_cmd::show()?
            }
        }
    }

    Ok(())
}
