//! Live, interactive streaming over a session channel.
//!
//! A stream moves through these states:
//!
//! ```text
//! NotStarted -> Streaming <-> AwaitingInput
//!                   |
//!                   +-> Completed | Failed | Cancelled
//! ```
//!
//! The channel is opened on the first poll and released when the stream
//! finishes or is dropped, whichever comes first.

use std::{future::Future, sync::Arc, time::Duration};

use futures::{StreamExt, stream::BoxStream};
use tokio::time::Instant;
use uuid::Uuid;
use vm_gateway_core::{
    ChannelEvent, GatewayError, Invocation, SessionRegistry, ShellChannel, StreamPipeline,
    VmSession, coalesce, outcome::NO_COMMAND_OUTPUT,
};

use crate::responder::InputResponder;

/// Ordered transcript chunks. A failure is always the last item.
pub type ChunkStream = BoxStream<'static, Result<String, GatewayError>>;

/// Lifecycle of one streaming invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    NotStarted,
    Streaming,
    AwaitingInput,
    Completed,
    Failed,
    Cancelled,
}

impl StreamState {
    /// Whether the stream can make no further progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Owns an open channel and closes it on drop.
struct ChannelGuard {
    channel: Box<dyn ShellChannel>,
    state: StreamState,
    id: Uuid,
}

impl ChannelGuard {
    fn new(channel: Box<dyn ShellChannel>, id: Uuid) -> Self {
        let mut guard = Self {
            channel,
            state: StreamState::NotStarted,
            id,
        };
        guard.transition(StreamState::Streaming);
        guard
    }

    fn transition(&mut self, next: StreamState) {
        if self.state != next {
            tracing::trace!(id = %self.id, from = ?self.state, to = ?next, "Stream state");
            self.state = next;
        }
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.transition(StreamState::Cancelled);
            tracing::debug!(id = %self.id, "Stream abandoned by consumer");
        }
        self.channel.close();
    }
}

/// Opens streaming channels and shapes their output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamingExecutor {
    pipeline: StreamPipeline,
}

impl StreamingExecutor {
    /// Create an executor with the given pipeline.
    #[must_use]
    pub const fn new(pipeline: StreamPipeline) -> Self {
        Self { pipeline }
    }

    /// Pipeline in use.
    #[must_use]
    pub const fn pipeline(&self) -> StreamPipeline {
        self.pipeline
    }

    /// Stream `invocation` from whatever session is registered now.
    ///
    /// The registry is read immediately; the channel is opened lazily.
    ///
    /// # Errors
    /// Returns [`GatewayError::NoActiveSession`] if nothing is registered.
    pub fn run(
        &self,
        registry: &SessionRegistry,
        invocation: Invocation,
        responder: Option<Arc<dyn InputResponder>>,
    ) -> Result<ChunkStream, GatewayError> {
        if invocation.is_empty() {
            return Ok(futures::stream::iter([Ok(NO_COMMAND_OUTPUT.to_string())]).boxed());
        }
        let session = registry.current().ok_or(GatewayError::NoActiveSession)?;
        Ok(self.run_on(session, invocation, responder))
    }

    /// Stream `invocation` from a specific session.
    #[must_use]
    pub fn run_on(
        &self,
        session: Arc<dyn VmSession>,
        invocation: Invocation,
        responder: Option<Arc<dyn InputResponder>>,
    ) -> ChunkStream {
        let chunks = drive(session, invocation, responder);
        match self.pipeline {
            StreamPipeline::Coalesced(policy) => coalesce(chunks, policy),
            StreamPipeline::Passthrough => chunks,
        }
    }
}

/// Await `fut`, giving up at `deadline`.
async fn before<F: Future>(
    deadline: Option<(Instant, Duration)>,
    fut: F,
) -> Result<F::Output, Duration> {
    match deadline {
        Some((at, limit)) => tokio::time::timeout_at(at, fut).await.map_err(|_| limit),
        None => Ok(fut.await),
    }
}

fn drive(
    session: Arc<dyn VmSession>,
    invocation: Invocation,
    responder: Option<Arc<dyn InputResponder>>,
) -> ChunkStream {
    async_stream::stream! {
        let id = invocation.id();
        let deadline = invocation.timeout.map(|limit| (Instant::now() + limit, limit));
        tracing::debug!(
            %id,
            command = %invocation.command,
            interactive = responder.is_some(),
            "Opening stream"
        );

        let channel = match before(deadline, session.open_stream(&invocation)).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                tracing::warn!(%id, "Failed to open stream: {e}");
                yield Err(GatewayError::Stream(e));
                return;
            }
            Err(limit) => {
                yield Err(GatewayError::TimedOut(limit));
                return;
            }
        };
        let mut guard = ChannelGuard::new(channel, id);

        loop {
            let event = match before(deadline, guard.channel.next_event()).await {
                Ok(event) => event,
                Err(limit) => {
                    guard.transition(StreamState::Failed);
                    tracing::warn!(%id, ?limit, "Stream timed out");
                    yield Err(GatewayError::TimedOut(limit));
                    break;
                }
            };

            match event {
                Some(Ok(ChannelEvent::Output(chunk))) => yield Ok(chunk),
                Some(Ok(ChannelEvent::AwaitingInput { prompt })) => {
                    let Some(responder) = responder.as_deref() else {
                        tracing::trace!(%id, "Input requested with no responder");
                        continue;
                    };
                    guard.transition(StreamState::AwaitingInput);

                    // Nothing is read from the channel until the responder returns.
                    let reply = match before(deadline, responder.respond(&prompt)).await {
                        Ok(reply) => reply,
                        Err(limit) => {
                            guard.transition(StreamState::Failed);
                            yield Err(GatewayError::TimedOut(limit));
                            break;
                        }
                    };
                    if let Some(reply) = reply {
                        if let Err(e) = guard.channel.send_input(&reply).await {
                            guard.transition(StreamState::Failed);
                            tracing::warn!(%id, "Failed to send input: {e}");
                            yield Err(GatewayError::Stream(e));
                            break;
                        }
                        tracing::debug!(%id, "Sent responder reply");
                    } else {
                        tracing::debug!(%id, "Responder declined");
                    }
                    guard.transition(StreamState::Streaming);
                }
                Some(Err(e)) => {
                    guard.transition(StreamState::Failed);
                    tracing::warn!(%id, "Stream failed: {e}");
                    yield Err(GatewayError::Stream(e));
                    break;
                }
                None => {
                    guard.transition(StreamState::Completed);
                    tracing::debug!(%id, "Stream completed");
                    break;
                }
            }
        }
    }
    .boxed()
}
