//! OpenAI-compatible streaming client.
//!
//! Works with any endpoint speaking the Chat Completions SSE protocol
//! (OpenAI, DeepSeek, Ollama, vLLM, LM Studio, ...).  Each call runs on its
//! own worker task: compose, send, decode, retry on transient failures, and
//! finally publish one terminal event.

use std::pin::pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use crate::cancel::CancelScope;
use crate::config::{ModelInfo, ProviderConfig};
use crate::error::{AgentError, Result};
use crate::llm::compose::compose_request;
use crate::llm::decoder::decode_stream;
use crate::llm::events::{self, EventSink, EventStream};
use crate::llm::provider::ProviderClient;
use crate::llm::transport::{
    request_headers, resolve_endpoint, run_with_retry, send_request, stream_read_error,
};
use crate::llm::types::{Message, ProviderResponse, ToolDefinition};

/// Path appended to the configured base URL.
pub const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

/// Streaming Chat Completions client.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpStreamClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl HttpStreamClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AgentError::Config {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self::with_http(config, http))
    }

    /// Share an existing connection pool.
    pub fn with_http(config: ProviderConfig, http: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(Inner { config, http }),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.inner.config
    }
}

impl Inner {
    /// The full attempt/retry/decode loop for one call.
    async fn run(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        sink: &EventSink,
        scope: &CancelScope,
    ) -> Result<ProviderResponse> {
        let url = resolve_endpoint(&self.config.base_url, CHAT_COMPLETIONS_PATH)?;
        let headers = request_headers(
            &self.config.api_key,
            Some("text/event-stream"),
            &self.config.extra_headers,
        )?;

        run_with_retry(&self.config.retry, scope, |attempt| {
            let url = &url;
            let headers = &headers;
            async move {
                let request = compose_request(messages, tools, &self.config);
                tracing::debug!(url = %url, model = request.model(), attempt, "sending provider request");
                if self.config.debug {
                    tracing::debug!(body = %request.redacted(), "provider request body");
                }

                let response =
                    send_request(&self.http, url, headers, request.body(), scope).await?;
                let body = pin!(response.bytes_stream().map(|r| r.map_err(stream_read_error)));
                decode_stream(body, sink, scope).await
            }
        })
        .await
    }
}

#[async_trait]
impl ProviderClient for HttpStreamClient {
    fn model(&self) -> ModelInfo {
        self.inner.config.model()
    }

    fn compose(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<Value> {
        Ok(compose_request(messages, tools, &self.inner.config).into_body())
    }

    fn stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        scope: CancelScope,
    ) -> EventStream {
        let (sink, stream) = events::channel();
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let outcome = inner.run(&messages, &tools, &sink, &scope).await;
            if let Err(err) = &outcome {
                tracing::debug!(error = %err, "provider stream failed");
            }
            sink.finish(outcome).await;
        });

        stream
    }
}
