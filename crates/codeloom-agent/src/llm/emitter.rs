//! Per-stream accumulation and event generation.
//!
//! [`StreamParser`] owns every buffer of one attempt: content and reasoning
//! text, the [`ToolCallTable`], the latest usage snapshot and the finish
//! reason.  Each decoded chunk turns into zero or more non-terminal
//! [`StreamEvent`]s in source order; [`StreamParser::finish`] builds the
//! aggregate carried by the single `Complete` event.

use crate::llm::chunk::StreamChunk;
use crate::llm::reconcile::ToolCallTable;
use crate::llm::types::{FinishReason, ProviderResponse, StreamEvent, TokenUsage};
use crate::llm::usage::derive_usage;

#[derive(Debug, Default)]
pub struct StreamParser {
    content: String,
    reasoning: String,
    content_started: bool,
    finish_reason: Option<String>,
    usage: TokenUsage,
    tool_calls: ToolCallTable,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the provider reported a finish reason.
    pub fn has_finish_reason(&self) -> bool {
        self.finish_reason.is_some()
    }

    /// Fold one chunk into the buffers and return the events it produces.
    pub fn process_chunk(&mut self, chunk: StreamChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(usage) = &chunk.usage {
            self.usage = derive_usage(usage);
        }

        for choice in &chunk.choices {
            let delta = &choice.delta;

            if delta.is_role_marker() && !self.content_started {
                self.content_started = true;
                events.push(StreamEvent::ContentStart);
            }

            if let Some(text) = delta.content_text() {
                self.content.push_str(text);
                events.push(StreamEvent::ContentDelta(text.to_owned()));
            }

            if let Some(thinking) = delta.reasoning_text() {
                self.reasoning.push_str(thinking);
                events.push(StreamEvent::ThinkingDelta(thinking.to_owned()));
            }

            for fragment in &delta.tool_calls {
                events.extend(self.tool_calls.apply(fragment));
            }

            if let Some(reason) = choice.finish_reason.as_deref().filter(|r| !r.is_empty()) {
                if self.finish_reason.is_none() {
                    self.finish_reason = Some(reason.to_owned());
                }
                self.tool_calls.mark_all_finished();
            }
        }

        events
    }

    /// Build the aggregate response from everything accumulated so far.
    pub fn finish(self) -> ProviderResponse {
        let tool_calls = self.tool_calls.finished_calls();
        let finish_reason =
            FinishReason::from_provider(self.finish_reason.as_deref(), !tool_calls.is_empty());
        ProviderResponse {
            content: self.content,
            reasoning: self.reasoning,
            tool_calls,
            usage: self.usage,
            finish_reason,
        }
    }
}
