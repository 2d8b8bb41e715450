//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, configuration loading, Ctrl+C handling
//! and rendering of streamed provider events to the terminal.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use codeloom_agent::llm::EventStream;
use codeloom_agent::{
    AgentError, AppConfig, CancelScope, ModelType, ProviderResponse, StreamEvent, ToolCall,
    ToolResult,
};
use tracing_subscriber::EnvFilter;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "codeloom.toml";

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// Logs go to stderr so they never interleave with streamed answers.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Read an environment variable, treating empty values as unset.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Command-line overrides applied on top of the file and environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub debug: bool,
    pub model_type: Option<ModelType>,
}

/// Load `.env`, then the config file, then `CODELOOM_*` variables, then the
/// command-line overrides.
pub fn load_config(path: Option<&Path>, overrides: Overrides) -> Result<AppConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
    load_config_with(path, overrides, env_non_empty)
}

pub fn load_config_with<F>(path: Option<&Path>, overrides: Overrides, lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            AppConfig::load(Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("failed to load {DEFAULT_CONFIG_FILE}"))?
        }
        None => AppConfig::default(),
    };

    config
        .apply_env(lookup)
        .context("invalid CODELOOM_* environment override")?;

    if overrides.debug {
        config.provider.debug = true;
    }
    if let Some(model_type) = overrides.model_type {
        config.provider.model_type = model_type;
    }
    Ok(config)
}

/// Copy of `config` safe to print: literal API keys are masked, `$VAR`
/// references are kept so the user can see where the key comes from.
pub fn masked(config: &AppConfig) -> AppConfig {
    let mut shown = config.clone();
    let key = &mut shown.provider.api_key;
    if !key.is_empty() && !key.starts_with('$') {
        *key = "****".to_owned();
    }
    shown
}

/// A fresh cancellation scope, bounded by `timeout_secs` when given.
pub fn request_scope(timeout_secs: Option<u64>) -> CancelScope {
    let scope = CancelScope::new();
    match timeout_secs {
        Some(secs) => scope.with_timeout(Duration::from_secs(secs)),
        None => scope,
    }
}

// ---------------------------------------------------------------------------
// Ctrl+C
// ---------------------------------------------------------------------------

/// Routes Ctrl+C to the request in flight.
///
/// With a request armed, Ctrl+C cancels it and control returns to the
/// caller.  With nothing armed the process exits.
#[derive(Clone, Default)]
pub struct Interrupts {
    active: Arc<Mutex<Option<CancelScope>>>,
}

impl Interrupts {
    /// Install the process-wide Ctrl+C listener.
    pub fn install() -> Self {
        let interrupts = Self::default();
        let listener = interrupts.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !listener.fire() {
                    eprintln!("\n  Interrupted. Goodbye!");
                    std::process::exit(130);
                }
            }
        });
        interrupts
    }

    pub fn arm(&self, scope: &CancelScope) {
        if let Ok(mut slot) = self.active.lock() {
            *slot = Some(scope.clone());
        }
    }

    pub fn disarm(&self) {
        if let Ok(mut slot) = self.active.lock() {
            *slot = None;
        }
    }

    /// Cancel the armed request.  Returns `false` when nothing was armed.
    pub fn fire(&self) -> bool {
        let armed = self.active.lock().ok().and_then(|mut slot| slot.take());
        match armed {
            Some(scope) => {
                scope.cancel();
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Print streamed events as they arrive and return the aggregate.
///
/// Content goes to `out`; reasoning (dimmed) and tool notices go to `notes`.
pub async fn render_stream<O, N>(
    mut events: EventStream,
    out: &mut O,
    notes: &mut N,
) -> codeloom_agent::Result<ProviderResponse>
where
    O: Write,
    N: Write,
{
    let mut thinking = false;

    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::ContentStart => {}
            StreamEvent::ThinkingDelta(text) => {
                if !thinking {
                    thinking = true;
                    write!(notes, "{DIM}").ok();
                }
                write!(notes, "{text}").ok();
                notes.flush().ok();
            }
            StreamEvent::ContentDelta(text) => {
                if thinking {
                    thinking = false;
                    writeln!(notes, "{RESET}").ok();
                }
                write!(out, "{text}").ok();
                out.flush().ok();
            }
            StreamEvent::ToolUseStart { name, .. } => {
                writeln!(notes, "\n  [tool] {name}").ok();
            }
            StreamEvent::Error(err) => {
                if thinking {
                    writeln!(notes, "{RESET}").ok();
                }
                return Err(err);
            }
            StreamEvent::Complete(response) => {
                if thinking {
                    writeln!(notes, "{RESET}").ok();
                }
                return Ok(response);
            }
        }
    }

    Err(AgentError::NoResponse)
}

/// The answer given to a tool call this front end cannot execute.
pub fn unavailable_result(call: &ToolCall) -> ToolResult {
    ToolResult {
        tool_call_id: call.id.clone(),
        content: format!("tool `{}` is not available in this session", call.name),
        is_error: true,
    }
}
