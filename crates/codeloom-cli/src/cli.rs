//! CLI argument definitions for codeloom.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use codeloom_agent::ModelType;

/// codeloom -- a streaming AI coding assistant.
#[derive(Parser)]
#[command(
    name = "codeloom",
    version,
    about = "codeloom -- streaming AI coding assistant",
    long_about = "Talks to an OpenAI-compatible chat endpoint (or a plain line-streaming \
                  generation service) and prints the answer as it arrives."
)]
pub struct Cli {
    /// Path to a TOML configuration file (defaults to ./codeloom.toml).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging and log redacted request bodies.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Which configured model selection to use.
    #[arg(long, global = true, value_enum)]
    pub model_type: Option<ModelTypeArg>,

    /// Give up on a request after this many seconds.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat session.
    Chat,

    /// Ask a single question and print the answer.
    Ask {
        /// The question; multiple words are joined with spaces.
        #[arg(required = true)]
        prompt: Vec<String>,

        /// Wait for the full answer instead of streaming it.
        #[arg(long)]
        no_stream: bool,
    },

    /// Print the effective configuration with secrets masked.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelTypeArg {
    Large,
    Small,
}

impl From<ModelTypeArg> for ModelType {
    fn from(arg: ModelTypeArg) -> Self {
        match arg {
            ModelTypeArg::Large => ModelType::Large,
            ModelTypeArg::Small => ModelType::Small,
        }
    }
}
