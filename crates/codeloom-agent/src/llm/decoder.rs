//! Incremental SSE decoder for the Chat Completions stream.
//!
//! The body arrives as arbitrary byte chunks.  [`LineBuffer`] reassembles
//! them into lines (splitting on raw bytes so multi-byte characters that
//! straddle a chunk boundary survive), [`SseDecoder::feed_line`] classifies
//! each line, and [`decode_stream`] drives the whole thing while racing every
//! read against the cancellation scope.

use futures::{Stream, StreamExt};

use crate::cancel::CancelScope;
use crate::error::{AgentError, Result};
use crate::llm::chunk::StreamChunk;
use crate::llm::emitter::StreamParser;
use crate::llm::events::EventSink;
use crate::llm::types::{ProviderResponse, StreamEvent};

/// Marker that introduces a data frame.
pub const DATA_PREFIX: &str = "data:";

/// Payload that ends the stream successfully.
pub const DONE_SENTINEL: &str = "[DONE]";

// ---------------------------------------------------------------------------
// Line buffering
// ---------------------------------------------------------------------------

/// Longest unterminated line accepted before the body is treated as broken.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Accumulates raw bytes and yields complete lines.
///
/// `start` marks the first unconsumed byte and `scanned` how far the search
/// for a newline has already looked, so a long line arriving in many small
/// pieces is scanned once.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    start: usize,
    scanned: usize,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.scanned -= self.start;
            self.start = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete line without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') else {
            self.scanned = self.buf.len();
            return None;
        };
        let end = self.scanned + offset;
        let line = String::from_utf8_lossy(&self.buf[self.start..end]).into_owned();
        self.start = end + 1;
        self.scanned = self.start;
        Some(line)
    }

    /// Bytes buffered after the last complete line.
    pub fn pending_len(&self) -> usize {
        self.buf.len() - self.start
    }

    /// Fail once the unterminated tail outgrows [`MAX_LINE_BYTES`].
    pub fn ensure_bounded(&self) -> Result<()> {
        if self.pending_len() > MAX_LINE_BYTES {
            return Err(AgentError::StreamRead {
                reason: format!("line exceeds {MAX_LINE_BYTES} bytes without a newline"),
            });
        }
        Ok(())
    }

    /// Whatever is left once the body has ended.
    pub fn take_rest(&mut self) -> Option<String> {
        let rest = (self.start < self.buf.len())
            .then(|| String::from_utf8_lossy(&self.buf[self.start..]).into_owned());
        self.buf.clear();
        self.start = 0;
        self.scanned = 0;
        rest
    }
}

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

/// What one line meant to the decoder.
#[derive(Debug)]
pub enum LineOutcome {
    /// Events produced by a data frame (possibly none).
    Events(Vec<StreamEvent>),
    /// The terminal sentinel was read.
    Done,
}

/// Stateful line decoder for one attempt.
#[derive(Debug, Default)]
pub struct SseDecoder {
    parser: StreamParser,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one line.  Blank lines, comments and non-data fields produce
    /// nothing; a malformed payload is logged and skipped.
    pub fn feed_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return LineOutcome::Events(Vec::new());
        };
        let payload = payload.trim();

        if payload == DONE_SENTINEL {
            return LineOutcome::Done;
        }
        if payload.is_empty() {
            return LineOutcome::Events(Vec::new());
        }

        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => LineOutcome::Events(self.parser.process_chunk(chunk)),
            Err(e) => {
                let err = AgentError::Decode {
                    reason: e.to_string(),
                };
                tracing::warn!(error = %err, data = payload, "skipping malformed stream chunk");
                LineOutcome::Events(Vec::new())
            }
        }
    }

    /// Whether the stream may be finalized without a sentinel.
    pub fn saw_finish_reason(&self) -> bool {
        self.parser.has_finish_reason()
    }

    /// Build the aggregate response.
    pub fn finish(self) -> ProviderResponse {
        self.parser.finish()
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Decode `body` until the sentinel, publishing events to `sink`.
///
/// Returns the aggregate on success; the caller publishes it as the single
/// `Complete` event.  Cancellation is checked before every line and raced
/// against every read.  A body that ends without the sentinel still
/// completes when the provider already reported a finish reason, and is a
/// retryable [`AgentError::StreamRead`] otherwise.
pub async fn decode_stream<S, B>(
    mut body: S,
    sink: &EventSink,
    scope: &CancelScope,
) -> Result<ProviderResponse>
where
    S: Stream<Item = Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut decoder = SseDecoder::new();
    let mut lines = LineBuffer::default();

    loop {
        while let Some(line) = lines.next_line() {
            scope.check()?;
            match decoder.feed_line(&line) {
                LineOutcome::Done => return Ok(decoder.finish()),
                LineOutcome::Events(events) => {
                    for event in events {
                        sink.send(event, scope).await?;
                    }
                }
            }
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

    if let Some(line) = lines.take_rest() {
        scope.check()?;
        match decoder.feed_line(&line) {
            LineOutcome::Done => return Ok(decoder.finish()),
            LineOutcome::Events(events) => {
                for event in events {
                    sink.send(event, scope).await?;
                }
            }
        }
    }

    if decoder.saw_finish_reason() {
        tracing::debug!("stream ended without sentinel after a finish reason");
        return Ok(decoder.finish());
    }
    Err(AgentError::StreamRead {
        reason: "stream ended before the [DONE] sentinel".into(),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;

    use super::*;
    use crate::error::CancelReason;
    use crate::llm::events;
    use crate::llm::types::FinishReason;

    type Body = Result<&'static [u8]>;

    fn body(parts: Vec<&'static str>) -> impl Stream<Item = Body> + Unpin {
        stream::iter(parts.into_iter().map(|p| Ok::<_, AgentError>(p.as_bytes())))
    }

    #[test]
    fn line_buffer_reassembles_split_lines() {
        let mut buf = LineBuffer::default();
        buf.push(b"data: {\"a\"");
        assert!(buf.next_line().is_none());
        buf.push(b":1}\r\n\ndata: [DO");
        assert_eq!(buf.next_line().as_deref(), Some("data: {\"a\":1}\r"));
        assert_eq!(buf.next_line().as_deref(), Some(""));
        assert!(buf.next_line().is_none());
        assert_eq!(buf.take_rest().as_deref(), Some("data: [DO"));
        assert!(buf.take_rest().is_none());
    }

    #[test]
    fn line_buffer_keeps_split_utf8_intact() {
        let snowman = "☃".as_bytes();
        let mut buf = LineBuffer::default();
        buf.push(&snowman[..1]);
        buf.push(&snowman[1..]);
        buf.push(b"\n");
        assert_eq!(buf.next_line().as_deref(), Some("☃"));
    }

    #[test]
    fn line_buffer_scans_long_line_incrementally() {
        let mut buf = LineBuffer::default();
        for _ in 0..1000 {
            buf.push(b"xy");
            assert!(buf.next_line().is_none());
        }
        assert_eq!(buf.pending_len(), 2000);
        buf.push(b"z\nnext");
        let line = buf.next_line().unwrap();
        assert_eq!(line.len(), 2001);
        assert!(line.ends_with("xyz"));
        assert_eq!(buf.pending_len(), 4);
        buf.push(b"\n");
        assert_eq!(buf.next_line().as_deref(), Some("next"));
        assert!(buf.take_rest().is_none());
    }

    #[tokio::test]
    async fn overlong_line_is_a_read_error() {
        let (sink, _stream) = events::channel();
        let input = stream::iter(vec![Ok::<Vec<u8>, AgentError>(vec![b'a'; MAX_LINE_BYTES + 1])]);
        let err = decode_stream(input, &sink, &CancelScope::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::StreamRead { .. }));
    }

    #[tokio::test]
    async fn null_optional_fields_keep_the_chunk() {
        let (sink, stream) = events::channel();
        let input = body(vec![
            "data: {\"id\":null,\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hi\",\"tool_calls\":null},\"finish_reason\":null}]}\n",
            "data: {\"choices\":null,\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2,\"completion_tokens_details\":null}}\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":null,\"tool_calls\":null},\"finish_reason\":\"stop\"}],\"usage\":null}\n",
            "data: [DONE]\n",
        ]);

        let worker = tokio::spawn(async move {
            let out = decode_stream(input, &sink, &CancelScope::new()).await;
            sink.finish(out).await;
        });

        let collected: Vec<_> = futures::StreamExt::collect(stream).await;
        worker.await.unwrap();

        assert!(
            collected
                .iter()
                .any(|e| matches!(e, StreamEvent::ContentDelta(t) if t == "Hi"))
        );
        match collected.last() {
            Some(StreamEvent::Complete(resp)) => {
                assert_eq!(resp.content, "Hi");
                assert_eq!(resp.usage.input_tokens, 5);
                assert_eq!(resp.usage.output_tokens, 2);
                assert_eq!(resp.finish_reason, FinishReason::EndTurn);
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let mut decoder = SseDecoder::new();
        for line in ["", ": keep-alive", "event: message", "id: 7", "data:"] {
            assert!(matches!(decoder.feed_line(line), LineOutcome::Events(e) if e.is_empty()));
        }
        assert!(matches!(decoder.feed_line("data: [DONE]"), LineOutcome::Done));
        assert!(matches!(decoder.feed_line("data:[DONE]"), LineOutcome::Done));
    }

    #[tokio::test]
    async fn malformed_chunk_is_skipped() {
        let (sink, stream) = events::channel();
        let scope = CancelScope::new();
        let input = body(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: {not json}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"},\"finish_reason\":\"stop\"}]}\n",
            "data: [DONE]\n",
        ]);

        let worker = tokio::spawn(async move {
            let out = decode_stream(input, &sink, &scope).await;
            sink.finish(out).await;
        });

        let collected: Vec<_> = futures::StreamExt::collect(stream).await;
        worker.await.unwrap();

        assert_eq!(collected.len(), 3);
        assert!(matches!(&collected[0], StreamEvent::ContentDelta(t) if t == "a"));
        assert!(matches!(&collected[1], StreamEvent::ContentDelta(t) if t == "b"));
        match &collected[2] {
            StreamEvent::Complete(resp) => {
                assert_eq!(resp.content, "ab");
                assert_eq!(resp.finish_reason, FinishReason::EndTurn);
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sentinel_without_trailing_newline() {
        let (sink, _stream) = events::channel();
        let input = body(vec!["data: [DONE]"]);
        let resp = decode_stream(input, &sink, &CancelScope::new()).await.unwrap();
        assert_eq!(resp.finish_reason, FinishReason::Unknown);
    }

    #[tokio::test]
    async fn eof_without_sentinel_is_retryable() {
        let (sink, mut stream) = events::channel();
        let input = body(vec!["data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n"]);
        let worker =
            tokio::spawn(async move { decode_stream(input, &sink, &CancelScope::new()).await });

        assert!(matches!(stream.recv().await, Some(StreamEvent::ContentDelta(_))));
        let err = worker.await.unwrap().unwrap_err();
        assert!(matches!(err, AgentError::StreamRead { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn eof_after_finish_reason_completes() {
        let (sink, _stream) = events::channel();
        let input = body(vec![
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"length\"}]}\n",
        ]);
        let resp = decode_stream(input, &sink, &CancelScope::new()).await.unwrap();
        assert_eq!(resp.finish_reason, FinishReason::MaxTokens);
    }

    #[tokio::test]
    async fn read_error_propagates() {
        let (sink, _stream) = events::channel();
        let input = stream::iter(vec![Err::<&'static [u8], _>(AgentError::StreamRead {
            reason: "connection reset".into(),
        })]);
        let err = decode_stream(input, &sink, &CancelScope::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::StreamRead { .. }));
    }

    #[tokio::test]
    async fn cancellation_mid_stream_withholds_complete() {
        let (sink, mut stream) = events::channel();
        let scope = CancelScope::new();
        let worker_scope = scope.clone();

        let input = stream::iter(vec![Ok::<&'static [u8], AgentError>(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
        )])
        .chain(stream::pending());

        let worker = tokio::spawn(async move {
            let out = decode_stream(input, &sink, &worker_scope).await;
            sink.finish(out).await;
        });

        let first = stream.recv().await;
        assert!(matches!(&first, Some(StreamEvent::ContentDelta(t)) if t == "Hel"));

        scope.cancel();
        let terminal = tokio::time::timeout(Duration::from_secs(5), stream.recv())
            .await
            .unwrap();
        assert!(matches!(
            terminal,
            Some(StreamEvent::Error(AgentError::Cancelled {
                reason: CancelReason::Cancelled
            }))
        ));
        assert!(stream.recv().await.is_none());
        worker.await.unwrap();
    }
}
