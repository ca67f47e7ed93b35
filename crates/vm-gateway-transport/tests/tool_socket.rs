use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use vm_gateway_core::{
    ChannelEvent, GatewayConfig, Invocation, SecretRef, SecretStore, SessionError, ShellChannel,
    VmSession,
};
use vm_gateway_session::{Gateway, MemorySecretStore};
use vm_gateway_transport::{ClientMessage, ServerMessage, ToolSocket, protocol::encode_stdin};

/// Echoes commands; streams `Name? ` then greets whoever answers.
struct Greeter {
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl VmSession for Greeter {
    fn execute(&self, invocation: &Invocation) -> Result<String, SessionError> {
        let stdin = invocation
            .stdin
            .as_ref()
            .map(|s| String::from_utf8_lossy(s.as_bytes()).into_owned())
            .unwrap_or_default();
        Ok(format!("{}{}", invocation.command, stdin.trim_end()))
    }

    async fn execute_async(&self, invocation: &Invocation) -> Result<String, SessionError> {
        self.execute(invocation)
    }

    async fn open_stream(&self, _: &Invocation) -> Result<Box<dyn ShellChannel>, SessionError> {
        Ok(Box::new(GreeterChannel {
            step: 0,
            name: None,
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct GreeterChannel {
    step: u8,
    name: Option<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl ShellChannel for GreeterChannel {
    async fn next_event(&mut self) -> Option<Result<ChannelEvent, SessionError>> {
        self.step += 1;
        match self.step {
            1 => Some(Ok(ChannelEvent::Output("Name? ".into()))),
            2 => Some(Ok(ChannelEvent::AwaitingInput {
                prompt: "Name? ".into(),
            })),
            3 => match self.name.take() {
                Some(name) => Some(Ok(ChannelEvent::Output(format!("hi {name}\n")))),
                None => {
                    std::future::pending::<()>().await;
                    None
                }
            },
            _ => None,
        }
    }

    async fn send_input(&mut self, text: &str) -> Result<(), SessionError> {
        self.name = Some(text.to_string());
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct Harness {
    socket: ToolSocket,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
    gateway: Arc<Gateway>,
    closed: Arc<AtomicBool>,
}

impl Harness {
    fn new() -> Self {
        let secrets = MemorySecretStore::new();
        secrets.insert("token", "t0k3n").unwrap();
        let gateway = Arc::new(Gateway::new(
            GatewayConfig::default(),
            Arc::new(secrets) as Arc<dyn SecretStore>,
        ));
        let closed = Arc::new(AtomicBool::new(false));
        gateway.register(Some(Arc::new(Greeter {
            closed: Arc::clone(&closed),
        }) as Arc<dyn VmSession>));
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            socket: ToolSocket::new(Arc::clone(&gateway), tx),
            rx,
            gateway,
            closed,
        }
    }

    async fn next(&mut self) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .unwrap()
            .unwrap()
    }
}

#[tokio::test]
async fn test_ping() {
    let mut h = Harness::new();
    h.socket.handle(ClientMessage::Ping);
    assert_eq!(h.next().await, ServerMessage::Pong);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_execute_paths() {
    let mut h = Harness::new();

    h.socket.handle(ClientMessage::Execute {
        id: "a".into(),
        command: "cat:".into(),
        stdin: Some(encode_stdin(b"piped\n")),
        timeout_ms: None,
        blocking: true,
    });
    assert_eq!(
        h.next().await,
        ServerMessage::Output {
            id: "a".into(),
            text: "cat:piped".into(),
            success: true,
        }
    );

    h.socket.handle(ClientMessage::ExecuteWithSecret {
        id: "b".into(),
        command: "login:".into(),
        secret: SecretRef::new("token"),
        timeout_ms: None,
    });
    assert_eq!(
        h.next().await,
        ServerMessage::Output {
            id: "b".into(),
            text: "login:t0k3n".into(),
            success: true,
        }
    );
}

#[tokio::test]
async fn test_execute_without_session() {
    let mut h = Harness::new();
    h.gateway.revoke();

    h.socket.handle(ClientMessage::execute("c", "ls"));
    assert_eq!(
        h.next().await,
        ServerMessage::Error {
            id: Some("c".into()),
            message: "No active VM for command execution".into(),
        }
    );
}

#[tokio::test]
async fn test_bad_stdin_is_reported() {
    let mut h = Harness::new();
    h.socket.handle(ClientMessage::Execute {
        id: "d".into(),
        command: "cat".into(),
        stdin: Some("%%%".into()),
        timeout_ms: None,
        blocking: false,
    });
    assert!(matches!(h.next().await, ServerMessage::Error { id: Some(id), .. } if id == "d"));
}

#[tokio::test]
async fn test_stream_round_trip_with_input() {
    let mut h = Harness::new();
    h.socket.handle(ClientMessage::Stream {
        id: "s".into(),
        command: "greet".into(),
        stdin: None,
        timeout_ms: None,
        passthrough: true,
    });

    assert_eq!(
        h.next().await,
        ServerMessage::Chunk {
            id: "s".into(),
            text: "Name? ".into(),
        }
    );
    assert_eq!(
        h.next().await,
        ServerMessage::AwaitingInput {
            id: "s".into(),
            prompt: "Name? ".into(),
        }
    );

    h.socket.handle(ClientMessage::stream("t", "greet"));
    assert!(matches!(h.next().await, ServerMessage::Error { id: Some(id), .. } if id == "t"));

    h.socket.handle(ClientMessage::Input {
        id: "s".into(),
        text: "bob".into(),
    });
    assert_eq!(
        h.next().await,
        ServerMessage::Chunk {
            id: "s".into(),
            text: "hi bob\n".into(),
        }
    );
    assert_eq!(
        h.next().await,
        ServerMessage::StreamEnded {
            id: "s".into(),
            error: None,
        }
    );
    assert!(h.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cancel_releases_channel() {
    let mut h = Harness::new();
    h.socket.handle(ClientMessage::Stream {
        id: "s".into(),
        command: "greet".into(),
        stdin: None,
        timeout_ms: None,
        passthrough: true,
    });
    h.next().await;
    assert!(matches!(h.next().await, ServerMessage::AwaitingInput { .. }));

    h.socket.handle(ClientMessage::Decline { id: "s".into() });
    h.socket.handle(ClientMessage::Cancel { id: "s".into() });
    assert_eq!(
        h.next().await,
        ServerMessage::StreamEnded {
            id: "s".into(),
            error: Some("Cancelled".into()),
        }
    );

    for _ in 0..100 {
        if h.closed.load(Ordering::SeqCst) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(h.closed.load(Ordering::SeqCst));

    h.socket.handle(ClientMessage::Input {
        id: "s".into(),
        text: "late".into(),
    });
    assert!(matches!(h.next().await, ServerMessage::Error { .. }));
}
