//! Provider capability interface.
//!
//! Every backend implements [`ProviderClient`]: compose a payload, stream a
//! response as events, or send and wait for the aggregate.  Which backend a
//! caller gets is decided by [`ProviderConfig::kind`] in [`build_provider`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::cancel::CancelScope;
use crate::config::{ModelInfo, ProviderConfig, ProviderKind};
use crate::error::Result;
use crate::llm::events::EventStream;
use crate::llm::openai_compat::HttpStreamClient;
use crate::llm::plain_stream::PlainStreamClient;
use crate::llm::types::{Message, ProviderResponse, ToolDefinition};

#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Capabilities of the model this client talks to.
    fn model(&self) -> ModelInfo;

    /// The request body one attempt would send.
    fn compose(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<Value>;

    /// Start a streaming call on a background worker.
    ///
    /// The returned stream yields non-terminal events in source order and
    /// ends with exactly one `Complete` or `Error`.
    fn stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        scope: CancelScope,
    ) -> EventStream;

    /// Stream, discard intermediate events, and return the aggregate.
    async fn send(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        scope: CancelScope,
    ) -> Result<ProviderResponse> {
        self.stream(messages, tools, scope).into_response().await
    }
}

/// Build the backend selected by `config.kind`.
pub fn build_provider(config: ProviderConfig) -> Result<Arc<dyn ProviderClient>> {
    config.validate()?;
    let client: Arc<dyn ProviderClient> = match config.kind {
        ProviderKind::OpenaiCompat => Arc::new(HttpStreamClient::new(config)?),
        ProviderKind::PlainStream => Arc::new(PlainStreamClient::new(config)?),
    };
    Ok(client)
}
