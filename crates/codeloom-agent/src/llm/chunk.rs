//! Wire shapes of one streamed Chat Completions chunk.
//!
//! Only the fields the engine reads are modelled; everything else on a
//! delta lands in [`Delta::extra`] so extension fields such as reasoning
//! text stay reachable.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::llm::usage::WireUsage;

/// Read an explicit `null` the same as a missing field.
///
/// Several OpenAI-compatible servers send `"tool_calls": null` or
/// `"choices": null` instead of omitting the key.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One decoded `data:` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChunk {
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tool_calls: Vec<ToolCallFragment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Extension fields some providers use for reasoning text.
const REASONING_FIELDS: [&str; 2] = ["reasoning", "reasoning_content"];

impl Delta {
    /// Non-empty content text, if any.
    pub fn content_text(&self) -> Option<&str> {
        self.content.as_deref().filter(|s| !s.is_empty())
    }

    /// Non-empty reasoning text carried in an extension field.
    pub fn reasoning_text(&self) -> Option<&str> {
        REASONING_FIELDS
            .iter()
            .filter_map(|key| self.extra.get(*key).and_then(Value::as_str))
            .find(|s| !s.is_empty())
    }

    /// A bare `role: assistant` marker with no text.
    pub fn is_role_marker(&self) -> bool {
        self.role.as_deref() == Some("assistant") && self.content_text().is_none()
    }
}

/// One piece of a tool call, keyed by ordinal `index` and optional `id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallFragment {
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub call_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub function: FunctionFragment,
}

impl ToolCallFragment {
    /// Non-empty identifier.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|s| !s.is_empty())
    }

    /// Non-empty function name.
    pub fn name(&self) -> Option<&str> {
        self.function.name.as_deref().filter(|s| !s.is_empty())
    }

    /// Argument text carried by this fragment (possibly empty).
    pub fn arguments(&self) -> &str {
        self.function.arguments.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionFragment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}
