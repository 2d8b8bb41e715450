//! Ordered, closable event queue between a stream worker and its consumer.
//!
//! The worker owns an [`EventSink`]; the caller owns the matching
//! [`EventStream`].  Nothing else crosses the boundary.  The queue holds a
//! single event, so a slow consumer applies backpressure to the worker all
//! the way down to the socket.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::cancel::CancelScope;
use crate::error::{AgentError, CancelReason, Result};
use crate::llm::types::{ProviderResponse, StreamEvent};

/// Create a connected sink/stream pair.
pub fn channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::channel(1);
    (EventSink { tx }, EventStream { rx })
}

/// Producer half, held by the worker.
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl EventSink {
    /// Publish a non-terminal event.
    ///
    /// Fails with [`CancelReason::ConsumerGone`] once the stream is dropped,
    /// or with the scope's reason if it ends while the queue is full.
    pub async fn send(&self, event: StreamEvent, scope: &CancelScope) -> Result<()> {
        tokio::select! {
            biased;
            reason = scope.cancelled() => Err(AgentError::cancelled(reason)),
            sent = self.tx.send(event) => {
                sent.map_err(|_| AgentError::cancelled(CancelReason::ConsumerGone))
            }
        }
    }

    /// Publish the single terminal event for `outcome` and close the queue.
    pub async fn finish(self, outcome: Result<ProviderResponse>) {
        let event = match outcome {
            Ok(response) => StreamEvent::Complete(response),
            Err(err) => StreamEvent::Error(err),
        };
        if self.tx.send(event).await.is_err() {
            tracing::debug!("event consumer dropped before the terminal event");
        }
    }
}

/// Consumer half: a [`Stream`] of events ending after the terminal one.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<StreamEvent>,
}

impl EventStream {
    /// Receive the next event, or `None` once the worker is done.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Drain the stream and return only the terminal outcome.
    pub async fn into_response(mut self) -> Result<ProviderResponse> {
        while let Some(event) = self.rx.recv().await {
            match event {
                StreamEvent::Complete(response) => return Ok(response),
                StreamEvent::Error(err) => return Err(err),
                _ => {}
            }
        }
        Err(AgentError::NoResponse)
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
