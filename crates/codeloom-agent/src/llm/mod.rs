//! LLM integration layer.
//!
//! This module turns a conversation into provider requests and provider
//! streams back into a uniform event sequence.  It is organized into:
//!
//! - [`types`] -- Core data types (messages, tool calls, streaming events).
//! - [`compose`] -- Chat Completions request composition.
//! - [`transport`] -- HTTP send, endpoint/header building, retry loop.
//! - [`decoder`] -- SSE line decoding with cancellation checks.
//! - [`chunk`] -- Wire shapes of one streamed chunk.
//! - [`reconcile`] -- Tool-call fragment reconciliation.
//! - [`usage`] -- Token usage derivation.
//! - [`emitter`] -- Per-stream buffers and event generation.
//! - [`events`] -- Worker-to-caller event queue.
//! - [`provider`] -- The backend capability trait and its factory.
//! - [`openai_compat`] -- Full SSE backend with tools and retries.
//! - [`plain_stream`] -- Minimal newline-delimited backend.

pub mod chunk;
pub mod compose;
pub mod decoder;
pub mod emitter;
pub mod events;
pub mod openai_compat;
pub mod plain_stream;
pub mod provider;
pub mod reconcile;
pub mod transport;
pub mod types;
pub mod usage;

// Re-export the most commonly used types for convenience.
pub use compose::{ProviderRequest, compose_request};
pub use events::{EventSink, EventStream};
pub use openai_compat::HttpStreamClient;
pub use plain_stream::PlainStreamClient;
pub use provider::{ProviderClient, build_provider};
pub use types::{
    ContentPart, FinishReason, ImageRef, Message, ProviderResponse, Role, StreamEvent,
    TokenUsage, ToolCall, ToolDefinition, ToolResult,
};
