//! CLI entry point for codeloom.
//!
//! This binary provides the `codeloom` command: an interactive chat, a
//! one-shot `ask`, and a `config` dump of the effective settings.

mod ask;
mod cli;
mod helpers;
mod repl;

use anyhow::{Context, Result};
use clap::Parser;
use codeloom_agent::build_provider;

use crate::cli::{Cli, Commands};
use crate::helpers::{Interrupts, Overrides, init_tracing, load_config, masked};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(if cli.debug { "debug" } else { "warn" });

    let overrides = Overrides {
        debug: cli.debug,
        model_type: cli.model_type.map(Into::into),
    };
    let config = load_config(cli.config.as_deref(), overrides)?;

    if matches!(cli.command, Commands::Config) {
        let shown = serde_json::to_string_pretty(&masked(&config))
            .context("failed to render configuration")?;
        println!("{shown}");
        return Ok(());
    }

    let client = build_provider(config.provider).context("failed to set up provider")?;
    let interrupts = Interrupts::install();

    match cli.command {
        Commands::Chat => repl::cmd_chat(client, cli.timeout, interrupts).await,
        Commands::Ask { prompt, no_stream } => {
            ask::cmd_ask(client, prompt.join(" "), !no_stream, cli.timeout, interrupts).await
        }
        Commands::Config => Ok(()),
    }
}
