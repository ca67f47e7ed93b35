//! Per-connection tool call dispatch.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use vm_gateway_core::{ExecOutcome, GatewayError, StreamPipeline};
use vm_gateway_executor::InputResponder;
use vm_gateway_session::Gateway;

use crate::protocol::{ClientMessage, ServerMessage, invocation};

type Reply = oneshot::Sender<Option<String>>;
type PendingReply = Arc<Mutex<Option<Reply>>>;

/// Forwards prompts to the client and waits for its `input` or `decline`.
struct RemoteResponder {
    id: String,
    tx: mpsc::UnboundedSender<ServerMessage>,
    pending: PendingReply,
}

#[async_trait]
impl InputResponder for RemoteResponder {
    async fn respond(&self, prompt: &str) -> Option<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(reply_tx);
        self.tx
            .send(ServerMessage::AwaitingInput {
                id: self.id.clone(),
                prompt: prompt.to_string(),
            })
            .ok()?;
        reply_rx.await.ok().flatten()
    }
}

struct ActiveStream {
    id: String,
    task: JoinHandle<()>,
    pending: PendingReply,
}

/// Tool calls for one client connection.
///
/// Replies go to the sender given at construction. At most one stream runs
/// at a time; dropping the socket stops it.
pub struct ToolSocket {
    gateway: Arc<Gateway>,
    tx: mpsc::UnboundedSender<ServerMessage>,
    stream: Option<ActiveStream>,
}

impl ToolSocket {
    /// Create a dispatcher that replies on `tx`.
    #[must_use]
    pub const fn new(gateway: Arc<Gateway>, tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            gateway,
            tx,
            stream: None,
        }
    }

    fn send(&self, msg: ServerMessage) {
        if self.tx.send(msg).is_err() {
            tracing::debug!("Client went away before reply");
        }
    }

    fn active(&mut self, id: &str) -> Option<&mut ActiveStream> {
        self.stream
            .as_mut()
            .filter(|s| s.id == id && !s.task.is_finished())
    }

    /// Handle one client message.
    pub fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::Ping => self.send(ServerMessage::Pong),
            ClientMessage::Execute {
                id,
                command,
                stdin,
                timeout_ms,
                blocking,
            } => {
                let inv = match invocation(command, stdin.as_deref(), timeout_ms) {
                    Ok(inv) => inv,
                    Err(e) => return self.send(ServerMessage::error(Some(id), e)),
                };
                let gateway = Arc::clone(&self.gateway);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = if blocking {
                        tokio::task::spawn_blocking(move || gateway.execute_terminal(inv))
                            .await
                            .unwrap_or_else(|e| Ok(worker_failed(&e)))
                    } else {
                        gateway.execute_terminal_async(inv).await
                    };
                    let _ = tx.send(reply(id, result));
                });
            }
            ClientMessage::ExecuteWithSecret {
                id,
                command,
                secret,
                timeout_ms,
            } => {
                let inv = match invocation(command, None, timeout_ms) {
                    Ok(inv) => inv,
                    Err(e) => return self.send(ServerMessage::error(Some(id), e)),
                };
                let gateway = Arc::clone(&self.gateway);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = gateway.execute_with_secret_async(inv, secret).await;
                    let _ = tx.send(reply(id, result));
                });
            }
            ClientMessage::Stream {
                id,
                command,
                stdin,
                timeout_ms,
                passthrough,
            } => self.start_stream(id, command, stdin.as_deref(), timeout_ms, passthrough),
            ClientMessage::Input { id, text } => self.answer(&id, Some(text)),
            ClientMessage::Decline { id } => self.answer(&id, None),
            ClientMessage::Cancel { id } => {
                if let Some(stream) = self.active(&id) {
                    stream.task.abort();
                    self.stream = None;
                    tracing::debug!(%id, "Stream cancelled by client");
                    self.send(ServerMessage::StreamEnded {
                        id,
                        error: Some("Cancelled".into()),
                    });
                } else {
                    self.send(ServerMessage::error(Some(id), "No such stream"));
                }
            }
        }
    }

    fn start_stream(
        &mut self,
        id: String,
        command: String,
        stdin: Option<&str>,
        timeout_ms: Option<u64>,
        passthrough: bool,
    ) {
        if self.stream.as_ref().is_some_and(|s| !s.task.is_finished()) {
            return self.send(ServerMessage::error(Some(id), "A stream is already running"));
        }
        let inv = match invocation(command, stdin, timeout_ms) {
            Ok(inv) => inv,
            Err(e) => return self.send(ServerMessage::error(Some(id), e)),
        };

        let pending = PendingReply::default();
        let responder: Arc<dyn InputResponder> = Arc::new(RemoteResponder {
            id: id.clone(),
            tx: self.tx.clone(),
            pending: Arc::clone(&pending),
        });
        let chunks = if passthrough {
            self.gateway
                .execute_terminal_stream_with(inv, Some(responder), StreamPipeline::Passthrough)
        } else {
            self.gateway.execute_terminal_stream(inv, Some(responder))
        };
        let mut chunks = match chunks {
            Ok(chunks) => chunks,
            Err(e) => return self.send(ServerMessage::error(Some(id), e)),
        };

        let tx = self.tx.clone();
        let stream_id = id.clone();
        let task = tokio::spawn(async move {
            let mut error = None;
            while let Some(item) = chunks.next().await {
                match item {
                    Ok(text) => {
                        if tx
                            .send(ServerMessage::Chunk {
                                id: stream_id.clone(),
                                text,
                            })
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(e) => {
                        error = Some(e.to_string());
                        break;
                    }
                }
            }
            let _ = tx.send(ServerMessage::StreamEnded {
                id: stream_id,
                error,
            });
        });

        self.stream = Some(ActiveStream { id, task, pending });
    }

    fn answer(&mut self, id: &str, text: Option<String>) {
        let reply = self.active(id).and_then(|s| {
            s.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
        });
        match reply {
            Some(reply) => {
                let _ = reply.send(text);
            }
            None => self.send(ServerMessage::error(Some(id.to_string()), "No input pending")),
        }
    }
}

impl Drop for ToolSocket {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.task.abort();
        }
    }
}

fn worker_failed(e: &tokio::task::JoinError) -> ExecOutcome {
    tracing::error!("Execution worker failed: {e}");
    ExecOutcome::Failed {
        kind: vm_gateway_core::FailureKind::Worker,
        message: e.to_string(),
    }
}

fn reply(id: String, result: Result<ExecOutcome, GatewayError>) -> ServerMessage {
    match result {
        Ok(outcome) => ServerMessage::output(id, &outcome),
        Err(e) => ServerMessage::error(Some(id), e),
    }
}
