//! Minimal newline-delimited streaming backend.
//!
//! Talks to a local generation service that answers a single JSON POST with
//! plain text, one line at a time.  There are no tool calls, no usage
//! counters and no retries: every body line becomes a content delta and end
//! of body completes the turn.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::cancel::CancelScope;
use crate::config::{DEFAULT_PLAIN_STREAM_BASE_URL, ModelInfo, ProviderConfig};
use crate::error::{AgentError, Result};
use crate::llm::decoder::LineBuffer;
use crate::llm::events::{self, EventSink, EventStream};
use crate::llm::provider::ProviderClient;
use crate::llm::transport::{request_headers, resolve_endpoint, send_request, stream_read_error};
use crate::llm::types::{
    FinishReason, Message, ProviderResponse, Role, StreamEvent, TokenUsage, ToolDefinition,
};

/// Path appended to the configured base URL.
pub const GENERATE_PATH: &str = "code/GenerateTestCase";

/// Limit on establishing the connection to the generation service.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request body of the plain backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainRequest {
    pub user_context: String,
    pub absolute_path: String,
    pub stream: bool,
    pub session_id: String,
}

/// Text of the last user message, or every non-empty message text joined by
/// blank lines when no user message has any.
pub fn user_context(messages: &[Message]) -> String {
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(Message::text)
        .unwrap_or_default();
    if !last_user.is_empty() {
        return last_user;
    }

    messages
        .iter()
        .map(|m| m.text().trim().to_owned())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone)]
pub struct PlainStreamClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl PlainStreamClient {
    /// Generation can stream for as long as it likes: only connecting is
    /// time-limited, the call itself is bounded by its [`CancelScope`].
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AgentError::Config {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            inner: Arc::new(Inner { config, http }),
        })
    }
}

impl Inner {
    fn payload(&self, messages: &[Message]) -> PlainRequest {
        let absolute_path = self
            .config
            .working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        PlainRequest {
            user_context: user_context(messages),
            absolute_path,
            stream: true,
            session_id: self.config.session_id.clone(),
        }
    }

    async fn run(
        &self,
        messages: &[Message],
        sink: &EventSink,
        scope: &CancelScope,
    ) -> Result<ProviderResponse> {
        let base = if self.config.base_url.trim().is_empty() {
            DEFAULT_PLAIN_STREAM_BASE_URL
        } else {
            self.config.base_url.as_str()
        };
        let url = resolve_endpoint(base, GENERATE_PATH)?;
        let headers = request_headers(&self.config.api_key, None, &self.config.extra_headers)?;
        let body = serde_json::to_value(self.payload(messages))?;

        tracing::debug!(url = %url, "sending plain stream request");
        let response = send_request(&self.http, &url, &headers, &body, scope).await?;
        let chunks = pin!(response.bytes_stream().map(|r| r.map_err(stream_read_error)));
        read_lines(chunks, sink, scope).await
    }
}

/// Forward every line (newline kept) as a content delta.
async fn read_lines<S, B>(
    mut body: S,
    sink: &EventSink,
    scope: &CancelScope,
) -> Result<ProviderResponse>
where
    S: Stream<Item = Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut lines = LineBuffer::default();
    let mut content = String::new();

    loop {
        while let Some(mut line) = lines.next_line() {
            scope.check()?;
            line.push('\n');
            content.push_str(&line);
            sink.send(StreamEvent::ContentDelta(line), scope).await?;
        }
        lines.ensure_bounded()?;

        let next = tokio::select! {
            biased;
            reason = scope.cancelled() => return Err(AgentError::cancelled(reason)),
            item = body.next() => item,
        };
        match next {
            Some(Ok(bytes)) => lines.push(bytes.as_ref()),
            Some(Err(err)) => return Err(err),
            None => break,
        }
    }

    if let Some(rest) = lines.take_rest() {
        content.push_str(&rest);
        sink.send(StreamEvent::ContentDelta(rest), scope).await?;
    }

    Ok(ProviderResponse {
        content,
        reasoning: String::new(),
        tool_calls: Vec::new(),
        usage: TokenUsage::default(),
        finish_reason: FinishReason::EndTurn,
    })
}

#[async_trait]
impl ProviderClient for PlainStreamClient {
    fn model(&self) -> ModelInfo {
        self.inner.config.model()
    }

    fn compose(&self, messages: &[Message], _tools: &[ToolDefinition]) -> Result<Value> {
        Ok(serde_json::to_value(self.inner.payload(messages))?)
    }

    fn stream(
        &self,
        messages: Vec<Message>,
        _tools: Vec<ToolDefinition>,
        scope: CancelScope,
    ) -> EventStream {
        let (sink, stream) = events::channel();
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let outcome = inner.run(&messages, &sink, &scope).await;
            sink.finish(outcome).await;
        });

        stream
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    #[test]
    fn user_context_prefers_last_user_message() {
        let messages = vec![
            Message::user("first"),
            Message::assistant("reply"),
            Message::user("second"),
        ];
        assert_eq!(user_context(&messages), "second");
    }

    #[test]
    fn user_context_falls_back_to_all_texts() {
        let messages = vec![
            Message::system("  sys  "),
            Message::user(""),
            Message::assistant("answer"),
        ];
        assert_eq!(user_context(&messages), "sys\n\nanswer");
    }

    #[test]
    fn payload_uses_camel_case() {
        let mut cfg = ProviderConfig::plain_stream(DEFAULT_PLAIN_STREAM_BASE_URL);
        cfg.session_id = "s-1".into();
        cfg.working_dir = Some("/work/project".into());
        let client = PlainStreamClient::new(cfg).unwrap();

        let body = client.compose(&[Message::user("write tests")], &[]).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "userContext": "write tests",
                "absolutePath": "/work/project",
                "stream": true,
                "sessionId": "s-1",
            })
        );
    }

    #[tokio::test]
    async fn lines_become_deltas() {
        let (sink, mut rx) = events::channel();
        let body = stream::iter(vec![
            Ok::<&'static [u8], AgentError>(&b"line one\nline "[..]),
            Ok(&b"two\ntail"[..]),
        ]);

        let worker = tokio::spawn(async move {
            let out = read_lines(body, &sink, &CancelScope::new()).await;
            sink.finish(out).await;
        });

        let mut deltas = Vec::new();
        let mut complete = None;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::ContentDelta(text) => deltas.push(text),
                StreamEvent::Complete(resp) => complete = Some(resp),
                other => panic!("unexpected event {other:?}"),
            }
        }
        worker.await.unwrap();

        assert_eq!(deltas, vec!["line one\n", "line two\n", "tail"]);
        let resp = complete.unwrap();
        assert_eq!(resp.content, "line one\nline two\ntail");
        assert_eq!(resp.finish_reason, FinishReason::EndTurn);
        assert!(resp.tool_calls.is_empty());
    }
}
