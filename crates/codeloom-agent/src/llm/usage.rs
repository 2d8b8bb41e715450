//! Token usage derivation.
//!
//! Providers report raw counters; the engine wants text-only output tokens
//! and cache hits.  Each snapshot replaces the previous one wholesale.

use serde::Deserialize;

use crate::llm::chunk::null_as_default;
use crate::llm::types::TokenUsage;

/// `usage` object of a streamed chunk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireUsage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completion_tokens: u64,
    #[serde(default)]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default)]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptTokensDetails {
    #[serde(default, deserialize_with = "null_as_default")]
    pub cached_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub audio_tokens: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionTokensDetails {
    #[serde(default, deserialize_with = "null_as_default")]
    pub reasoning_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub audio_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text_tokens: u64,
}

/// Turn a usage snapshot into [`TokenUsage`].
///
/// Output tokens are the completion total unless the details report an
/// explicit positive text count, which wins outright.  Without one,
/// reasoning and audio tokens are subtracted from the total.
pub fn derive_usage(wire: &WireUsage) -> TokenUsage {
    let output_tokens = match &wire.completion_tokens_details {
        Some(details) if details.text_tokens > 0 => details.text_tokens,
        Some(details) => wire
            .completion_tokens
            .saturating_sub(details.reasoning_tokens)
            .saturating_sub(details.audio_tokens),
        None => wire.completion_tokens,
    };

    TokenUsage {
        input_tokens: wire.prompt_tokens,
        output_tokens,
        cache_read_tokens: wire
            .prompt_tokens_details
            .as_ref()
            .map_or(0, |d| d.cached_tokens),
        cache_creation_tokens: 0,
    }
}
