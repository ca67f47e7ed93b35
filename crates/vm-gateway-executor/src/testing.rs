//! Stub sessions and channels for executor tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use vm_gateway_core::{ChannelEvent, Invocation, SessionError, ShellChannel, VmSession};

/// What a stub session does with a command.
pub enum Behavior {
    /// Return whatever follows `echo `.
    Echo,
    /// Return `n` copies of a character.
    Flood(char, usize),
    /// Fail with a message.
    Fail(&'static str),
    /// Never finish (suspendable path only).
    Hang,
}

pub struct StubSession {
    behavior: Behavior,
    channel: Mutex<Option<ScriptedChannel>>,
    pub calls: AtomicUsize,
    pub last_stdin: Mutex<Option<Vec<u8>>>,
}

impl StubSession {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            channel: Mutex::new(None),
            calls: AtomicUsize::new(0),
            last_stdin: Mutex::new(None),
        }
    }

    pub fn with_channel(channel: ScriptedChannel) -> Self {
        let session = Self::new(Behavior::Echo);
        *session.channel.lock().unwrap() = Some(channel);
        session
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn run(&self, invocation: &Invocation) -> Result<String, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_stdin.lock().unwrap() = invocation.stdin.as_ref().map(|s| s.as_bytes().to_vec());
        match &self.behavior {
            Behavior::Echo | Behavior::Hang => Ok(invocation
                .command
                .strip_prefix("echo ")
                .unwrap_or_default()
                .to_string()),
            Behavior::Flood(c, n) => Ok(std::iter::repeat_n(*c, *n).collect()),
            Behavior::Fail(msg) => Err(SessionError::Command((*msg).to_string())),
        }
    }
}

#[async_trait]
impl VmSession for StubSession {
    fn execute(&self, invocation: &Invocation) -> Result<String, SessionError> {
        self.run(invocation)
    }

    async fn execute_async(&self, invocation: &Invocation) -> Result<String, SessionError> {
        if matches!(self.behavior, Behavior::Hang) {
            std::future::pending::<()>().await;
        }
        self.run(invocation)
    }

    async fn open_stream(
        &self,
        _invocation: &Invocation,
    ) -> Result<Box<dyn ShellChannel>, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.channel
            .lock()
            .unwrap()
            .take()
            .map(|c| Box::new(c) as Box<dyn ShellChannel>)
            .ok_or_else(|| SessionError::Command("no channel scripted".into()))
    }
}

pub enum Step {
    Out(&'static str),
    Ask(&'static str),
    Fail(&'static str),
}

/// Channel that plays back a script.
///
/// After an `Ask` it stays pending until input arrives, then echoes the
/// input like a terminal would.
pub struct ScriptedChannel {
    steps: VecDeque<Step>,
    echoes: VecDeque<String>,
    awaiting: bool,
    pub closed: Arc<AtomicBool>,
    pub inputs: Arc<Mutex<Vec<String>>>,
}

impl ScriptedChannel {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            echoes: VecDeque::new(),
            awaiting: false,
            closed: Arc::new(AtomicBool::new(false)),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ShellChannel for ScriptedChannel {
    async fn next_event(&mut self) -> Option<Result<ChannelEvent, SessionError>> {
        if let Some(echo) = self.echoes.pop_front() {
            return Some(Ok(ChannelEvent::Output(echo)));
        }
        if self.awaiting {
            std::future::pending::<()>().await;
        }
        match self.steps.pop_front()? {
            Step::Out(text) => Some(Ok(ChannelEvent::Output(text.to_string()))),
            Step::Ask(prompt) => {
                self.awaiting = true;
                Some(Ok(ChannelEvent::AwaitingInput {
                    prompt: prompt.to_string(),
                }))
            }
            Step::Fail(msg) => Some(Err(SessionError::Command(msg.to_string()))),
        }
    }

    async fn send_input(&mut self, text: &str) -> Result<(), SessionError> {
        self.inputs.lock().unwrap().push(text.to_string());
        self.echoes.push_back(format!("{text}\n"));
        self.awaiting = false;
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
