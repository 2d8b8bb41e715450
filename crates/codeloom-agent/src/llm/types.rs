//! Core types for LLM interaction.
//!
//! These types model the data flowing between the caller's conversation and
//! a provider.  They are provider-agnostic; [`super::compose`] translates
//! them into the wire format and [`super::emitter`] builds the
//! provider-agnostic response on the way back.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AgentError;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions that shape model behavior.
    System,
    /// Input from the human user.
    User,
    /// Output from the LLM.
    Assistant,
    /// Results of tool invocations, fed back to the model.
    Tool,
}

/// An image attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    /// A remote or already-encoded URL.
    Url { url: String },
    /// Raw image bytes, sent inline as a base64 `data:` URL.
    Inline { mime_type: String, data: Vec<u8> },
}

impl ImageRef {
    /// Render the image as the URL string the provider expects.
    pub fn to_url(&self) -> String {
        match self {
            Self::Url { url } => url.clone(),
            Self::Inline { mime_type, data } => {
                format!("data:{mime_type};base64,{}", STANDARD.encode(data))
            }
        }
    }
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { image: ImageRef },
}

/// A single message in a conversation history.
///
/// Supplied by the caller and treated as read-only input by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub role: Role,

    /// Ordered content parts.
    #[serde(default)]
    pub parts: Vec<ContentPart>,

    /// Tool calls requested by the assistant (only meaningful when
    /// `role == Role::Assistant`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Results of earlier tool calls (only meaningful when
    /// `role == Role::Tool`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
}

impl Message {
    fn with_role(role: Role) -> Self {
        Self {
            role,
            parts: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    fn text_parts(role: Role, content: String) -> Self {
        let mut msg = Self::with_role(role);
        if !content.is_empty() {
            msg.parts.push(ContentPart::Text { text: content });
        }
        msg
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::text_parts(Role::System, content.into())
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::text_parts(Role::User, content.into())
    }

    /// Create an assistant text message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text_parts(Role::Assistant, content.into())
    }

    /// Create an assistant message carrying text and tool calls.
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::text_parts(Role::Assistant, content.into());
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a tool message carrying one or more results.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        let mut msg = Self::with_role(Role::Tool);
        msg.tool_results = results;
        msg
    }

    /// Attach an image to the message.
    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.parts.push(ContentPart::Image { image });
        self
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tool calls
// ---------------------------------------------------------------------------

/// A tool invocation requested by the LLM.
///
/// `input` is the raw argument text exactly as the provider streamed it; the
/// engine never parses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned identifier used to correlate results.
    pub id: String,

    /// The name of the tool to invoke.
    pub name: String,

    /// Raw JSON argument text.
    pub input: String,

    /// Call type tag, `"function"` for every provider we talk to.
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,

    /// Whether the provider finished streaming this call.
    #[serde(default)]
    pub finished: bool,
}

fn default_call_type() -> String {
    "function".to_owned()
}

/// The result of executing a tool, ready to feed back to the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The [`ToolCall::id`] this result corresponds to.
    pub tool_call_id: String,

    /// Serialized result content.
    pub content: String,

    /// Whether the tool invocation failed.
    #[serde(default)]
    pub is_error: bool,
}

/// A tool definition exposed to the LLM so it knows what it may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description of what the tool does.
    pub description: String,

    /// JSON Schema `properties` object for the tool's parameters.
    #[serde(default)]
    pub parameters: Value,

    /// Names of required parameters.
    #[serde(default)]
    pub required: Vec<String>,
}

// ---------------------------------------------------------------------------
// Response aggregate
// ---------------------------------------------------------------------------

/// Why generation stopped, normalized across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    Unknown,
}

impl FinishReason {
    /// Map a provider finish-reason string.  Unrecognized (or absent) values
    /// fall back to [`FinishReason::ToolUse`] when the response carries tool
    /// calls and [`FinishReason::Unknown`] otherwise.
    pub fn from_provider(raw: Option<&str>, has_tool_calls: bool) -> Self {
        match raw {
            Some("stop") => Self::EndTurn,
            Some("length") => Self::MaxTokens,
            Some("tool_calls") => Self::ToolUse,
            _ if has_tool_calls => Self::ToolUse,
            _ => Self::Unknown,
        }
    }
}

/// Token counts derived from provider usage reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Text-only completion tokens (reasoning and audio excluded).
    pub output_tokens: u64,
    /// Prompt tokens served from the provider cache.
    pub cache_read_tokens: u64,
    /// Prompt tokens written to the provider cache.
    pub cache_creation_tokens: u64,
}

/// The final aggregate of one streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Concatenated content text.
    pub content: String,
    /// Concatenated reasoning text, when the provider streams any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning: String,
    /// Finished tool calls in ordinal order.
    pub tool_calls: Vec<ToolCall>,
    /// Last usage snapshot seen on the stream.
    pub usage: TokenUsage,
    /// Normalized finish reason.
    pub finish_reason: FinishReason,
}

// ---------------------------------------------------------------------------
// Streaming events
// ---------------------------------------------------------------------------

/// Events published to the caller while a response streams.
///
/// Exactly one terminal variant ([`StreamEvent::Error`] or
/// [`StreamEvent::Complete`]) is produced per stream, and it is always the
/// last event.
#[derive(Debug)]
pub enum StreamEvent {
    /// The assistant turn has started.
    ContentStart,
    /// A fragment of content text.
    ContentDelta(String),
    /// A fragment of reasoning text.
    ThinkingDelta(String),
    /// A new tool call was announced.  Its arguments grow silently and show
    /// up in the [`StreamEvent::Complete`] aggregate.
    ToolUseStart { id: String, name: String },
    /// The call failed; the stream closes after this event.
    Error(AgentError),
    /// The response finished; the stream closes after this event.
    Complete(ProviderResponse),
}

impl StreamEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Complete(_))
    }
}
