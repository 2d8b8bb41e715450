//! Provider configuration.
//!
//! Everything the engine needs to know about a backend: where it lives, how
//! to authenticate, which model to ask for, and how hard to retry.  The
//! types deserialize from TOML so the CLI can load them from a file and then
//! layer environment overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};
use crate::retry::RetryPolicy;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default endpoint for the plain newline-delimited backend.
pub const DEFAULT_PLAIN_STREAM_BASE_URL: &str = "http://localhost:38888";

/// Overall request timeout, covering the streamed body as well.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Max-token fallback for models missing from the catalog.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// ---------------------------------------------------------------------------
// Provider kind
// ---------------------------------------------------------------------------

/// Which transport implementation a configuration selects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI Chat Completions over SSE, with tool calls.
    #[default]
    OpenaiCompat,
    /// Minimal newline-delimited text stream, no tool calls.
    PlainStream,
}

impl std::str::FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "openai_compat" | "openai" => Ok(Self::OpenaiCompat),
            "plain_stream" | "plain" => Ok(Self::PlainStream),
            other => Err(AgentError::Config {
                reason: format!("unknown provider kind `{other}`"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

/// Capabilities of one model in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Provider model identifier.
    pub id: String,
    /// Reasoning models take `max_completion_tokens` and `reasoning_effort`.
    #[serde(default)]
    pub can_reason: bool,
    /// Max tokens used when nothing more specific is configured.
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
}

impl ModelInfo {
    /// Catalog entry for a model we know nothing about.
    pub fn unknown(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            can_reason: false,
            default_max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

/// Which per-request-type selection a client uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Large,
    Small,
}

/// Model choice and limits for one request type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    /// Model identifier, looked up in the catalog.
    #[serde(default)]
    pub model: String,
    /// Per-request-type token limit (0 = unset).
    #[serde(default)]
    pub max_tokens: u32,
    /// Reasoning effort hint for reasoning-capable models.
    #[serde(default)]
    pub reasoning_effort: String,
}

// ---------------------------------------------------------------------------
// Provider configuration
// ---------------------------------------------------------------------------

/// Configuration for a single provider backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Transport implementation.
    pub kind: ProviderKind,
    /// Base URL; `$VAR` references are resolved at request time.
    pub base_url: String,
    /// API key; `$VAR` references are resolved at request time.
    pub api_key: String,
    /// Base system prompt.
    pub system_prompt: String,
    /// Text prepended to the system prompt on its own line.
    pub system_prompt_prefix: String,
    /// Headers added to every request.
    pub extra_headers: BTreeMap<String, String>,
    /// Fields merged verbatim into every request body, last-writer-wins.
    pub extra_body: Map<String, Value>,
    /// Log redacted request bodies.
    pub debug: bool,
    /// Explicit per-call token limit (0 = unset).
    pub max_tokens: u32,
    /// Which selection below this client uses.
    pub model_type: ModelType,
    /// Selection for large (main) requests.
    pub large: ModelSelection,
    /// Selection for small (auxiliary) requests.
    pub small: ModelSelection,
    /// Known models and their capabilities.
    pub models: Vec<ModelInfo>,
    /// Retry behavior.
    pub retry: RetryPolicy,
    /// Overall request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Session identifier forwarded by the plain-stream backend.
    pub session_id: String,
    /// Working directory forwarded by the plain-stream backend.
    pub working_dir: Option<PathBuf>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenaiCompat,
            base_url: DEFAULT_OPENAI_BASE_URL.to_owned(),
            api_key: String::new(),
            system_prompt: String::new(),
            system_prompt_prefix: String::new(),
            extra_headers: BTreeMap::new(),
            extra_body: Map::new(),
            debug: false,
            max_tokens: 0,
            model_type: ModelType::Large,
            large: ModelSelection::default(),
            small: ModelSelection::default(),
            models: Vec::new(),
            retry: RetryPolicy::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            session_id: String::new(),
            working_dir: None,
        }
    }
}

impl ProviderConfig {
    /// Configuration for an OpenAI-compatible endpoint.
    pub fn openai_compatible(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            large: ModelSelection {
                model: model.into(),
                ..ModelSelection::default()
            },
            ..Self::default()
        }
    }

    /// Configuration for the plain newline-delimited backend.
    pub fn plain_stream(base_url: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::PlainStream,
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// The selection for the configured request type.
    pub fn selection(&self) -> &ModelSelection {
        match self.model_type {
            ModelType::Large => &self.large,
            ModelType::Small => &self.small,
        }
    }

    /// Mutable access to the selection for the configured request type.
    pub fn selection_mut(&mut self) -> &mut ModelSelection {
        match self.model_type {
            ModelType::Large => &mut self.large,
            ModelType::Small => &mut self.small,
        }
    }

    /// Catalog entry for the selected model, or default capabilities when
    /// the catalog does not list it.
    pub fn model(&self) -> ModelInfo {
        let id = &self.selection().model;
        self.models
            .iter()
            .find(|m| &m.id == id)
            .cloned()
            .unwrap_or_else(|| ModelInfo::unknown(id.clone()))
    }

    /// Timeout applied to every request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Synthesized system message: prefix and base prompt on separate lines.
    pub fn system_message(&self) -> String {
        if self.system_prompt_prefix.is_empty() {
            self.system_prompt.clone()
        } else {
            format!("{}\n{}", self.system_prompt_prefix, self.system_prompt)
        }
    }

    /// Reject configurations no request could be built from.
    pub fn validate(&self) -> Result<()> {
        if self.kind == ProviderKind::OpenaiCompat && self.base_url.trim().is_empty() {
            return Err(AgentError::Config {
                reason: "base_url is required for openai_compat providers".into(),
            });
        }
        if self.kind == ProviderKind::OpenaiCompat && self.selection().model.trim().is_empty() {
            return Err(AgentError::Config {
                reason: format!("no model selected for {:?} requests", self.model_type),
            });
        }
        if self.retry.base_delay_ms == 0 {
            return Err(AgentError::Config {
                reason: "retry.base_delay_ms must be positive".into(),
            });
        }
        Ok(())
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AgentError::Config {
            reason: format!("invalid provider config: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Application configuration
// ---------------------------------------------------------------------------

/// Top-level configuration file layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
}

impl AppConfig {
    /// Load and parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AgentError::Config {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AgentError::Config {
            reason: format!("invalid config: {e}"),
        })
    }

    /// Apply `CODELOOM_*` overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(kind) = non_empty("CODELOOM_PROVIDER") {
            self.provider.kind = kind.parse()?;
        }
        if let Some(url) = non_empty("CODELOOM_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(key) = non_empty("CODELOOM_API_KEY") {
            self.provider.api_key = key;
        }
        if let Some(model) = non_empty("CODELOOM_MODEL") {
            self.provider.selection_mut().model = model;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Value resolution
// ---------------------------------------------------------------------------

/// Expand `$VAR` and `${VAR}` references using `lookup`.
///
/// A reference to an unset variable is an error; literal text passes
/// through unchanged.
pub fn resolve_value<F>(raw: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            let end = braced.find('}').ok_or_else(|| AgentError::RequestBuild {
                reason: format!("unterminated variable reference in `{raw}`"),
            })?;
            (&braced[..end], end + 2)
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        if name.is_empty() {
            out.push('$');
            rest = after;
            continue;
        }

        let value = lookup(name).ok_or_else(|| AgentError::RequestBuild {
            reason: format!("environment variable `{name}` is not set"),
        })?;
        out.push_str(&value);
        rest = &after[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}

/// [`resolve_value`] against the process environment.
pub fn resolve_env(raw: &str) -> Result<String> {
    resolve_value(raw, |name| std::env::var(name).ok())
}
