//! Streaming provider engine for the codeloom coding assistant.
//!
//! This crate talks to large-language-model backends over HTTP: it composes
//! requests from a conversation, sends them with retry and backoff, decodes
//! the incremental response, reconciles fragmented tool calls, and publishes
//! everything as one ordered stream of [`StreamEvent`]s.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐     ┌───────────────┐     ┌─────────┐
//! │ Composer │────>│  Transport +  │────>│ Decoder │
//! │ (payload)│     │  retry loop   │     │  (SSE)  │
//! └──────────┘     └───────────────┘     └────┬────┘
//!                                             │ chunks
//!                          ┌──────────────────┼─────────────┐
//!                          │                  │             │
//!                   ┌──────┴──────┐    ┌──────┴─────┐  ┌────┴────┐
//!                   │ Reconcile   │    │   Usage    │  │ Emitter │──> EventStream
//!                   │ (tool calls)│    │ aggregator │  │         │
//!                   └─────────────┘    └────────────┘  └─────────┘
//! ```
//!
//! ## Modules
//!
//! - [`llm`] -- Provider clients, wire types, streaming pipeline.
//! - [`retry`] -- Retry policy and attempt state machine.
//! - [`cancel`] -- Cancellation scope shared by every suspension point.
//! - [`config`] -- Provider and application configuration.
//! - [`error`] -- Agent error types.

pub mod cancel;
pub mod config;
pub mod error;
pub mod llm;
pub mod retry;

// Re-export the most commonly used types at the crate root.
pub use cancel::CancelScope;
pub use config::{AppConfig, ModelInfo, ModelSelection, ModelType, ProviderConfig, ProviderKind};
pub use error::{AgentError, CancelReason, Result};
pub use llm::{
    EventStream, FinishReason, HttpStreamClient, ImageRef, Message, PlainStreamClient,
    ProviderClient, ProviderResponse, Role, StreamEvent, TokenUsage, ToolCall, ToolDefinition,
    ToolResult, build_provider,
};
pub use retry::RetryPolicy;
