//! A fake VM for gateway tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use vm_gateway_core::{ChannelEvent, Invocation, SessionError, ShellChannel, VmSession};

/// Understands a handful of commands:
///
/// - `echo <text>` returns `<text>`
/// - `repeat <n>` returns `n` copies of `x`
/// - `read` returns stdin with the trailing newline removed
/// - `sleep` never finishes on the async path
/// - anything else fails with `command not found`
///
/// `open_stream` plays back a script: outputs, then a prompt, then the
/// reply echoed back, then `after`.
pub struct FakeVm {
    pub name: &'static str,
    pub calls: AtomicUsize,
    pub stdin: Mutex<Vec<Vec<u8>>>,
    pub timeouts: Mutex<Vec<Option<Duration>>>,
    pub closed: Arc<AtomicBool>,
}

impl FakeVm {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
            stdin: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn run(&self, invocation: &Invocation) -> Result<String, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.timeouts.lock().unwrap().push(invocation.timeout);
        let stdin = invocation
            .stdin
            .as_ref()
            .map(|s| s.as_bytes().to_vec())
            .unwrap_or_default();
        self.stdin.lock().unwrap().push(stdin.clone());

        let command = invocation.command.trim();
        if let Some(text) = command.strip_prefix("echo ") {
            return Ok(text.to_string());
        }
        if let Some(n) = command.strip_prefix("repeat ") {
            let n: usize = n.parse().map_err(|_| SessionError::Command("bad count".into()))?;
            return Ok("x".repeat(n));
        }
        match command {
            "whoami" => Ok(self.name.to_string()),
            "read" => Ok(String::from_utf8_lossy(&stdin).trim_end_matches('\n').to_string()),
            _ => Err(SessionError::Command(format!("{command}: command not found"))),
        }
    }
}

#[async_trait]
impl VmSession for FakeVm {
    fn execute(&self, invocation: &Invocation) -> Result<String, SessionError> {
        self.run(invocation)
    }

    async fn execute_async(&self, invocation: &Invocation) -> Result<String, SessionError> {
        if invocation.command == "sleep" {
            std::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;
        self.run(invocation)
    }

    async fn open_stream(
        &self,
        invocation: &Invocation,
    ) -> Result<Box<dyn ShellChannel>, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = match invocation.command.as_str() {
            "apt install foo" => vec![
                ChannelEvent::Output("Reading package lists...\n".into()),
                ChannelEvent::Output("Install? [y/N] ".into()),
                ChannelEvent::AwaitingInput {
                    prompt: "Install? [y/N] ".into(),
                },
            ],
            _ => vec![
                ChannelEvent::Output("line 1\n".into()),
                ChannelEvent::Output("line 2\n".into()),
                ChannelEvent::Output("line 3\n".into()),
            ],
        };
        Ok(Box::new(FakeChannel {
            events: script.into(),
            waiting: false,
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct FakeChannel {
    events: VecDeque<ChannelEvent>,
    waiting: bool,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl ShellChannel for FakeChannel {
    async fn next_event(&mut self) -> Option<Result<ChannelEvent, SessionError>> {
        if self.waiting && self.events.is_empty() {
            std::future::pending::<()>().await;
        }
        let event = self.events.pop_front()?;
        if matches!(event, ChannelEvent::AwaitingInput { .. }) {
            self.waiting = true;
        }
        Some(Ok(event))
    }

    async fn send_input(&mut self, text: &str) -> Result<(), SessionError> {
        self.waiting = false;
        self.events.push_back(ChannelEvent::Output(format!("{text}\n")));
        self.events.push_back(ChannelEvent::Output("Installed.\n".into()));
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
