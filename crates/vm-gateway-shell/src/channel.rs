//! Streaming channel over a running shell process group.

use std::{io, time::Duration};

use async_trait::async_trait;
use command_group::AsyncGroupChild;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::ChildStdin,
    sync::mpsc,
    task::JoinHandle,
};
use vm_gateway_core::{ChannelEvent, SessionError, ShellChannel, StdinPayload};

use crate::session::feed_stdin;

const READ_CHUNK_SIZE: usize = 8192;

/// Decodes UTF-8 that may be split across reads.
///
/// Incomplete trailing sequences are held back for the next read; invalid
/// bytes are replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Decode `bytes`, returning whatever forms complete characters.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[start..start + valid]));
                    start += valid;
                    // A truncated sequence at the end waits for more bytes.
                    let Some(bad) = e.error_len() else { break };
                    text.push(char::REPLACEMENT_CHARACTER);
                    start += bad;
                }
            }
        }
        self.pending.drain(..start);
        text
    }

    /// Flush anything held back.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

async fn pump<R>(mut pipe: R, tx: mpsc::Sender<io::Result<String>>)
where
    R: AsyncRead + Unpin,
{
    let mut carry = Utf8Carry::default();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = carry.push(&buf[..n]);
                if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        }
    }
    let rest = carry.finish();
    if !rest.is_empty() {
        let _ = tx.send(Ok(rest)).await;
    }
}

/// Live output of one streaming command.
///
/// A partial line that stays idle for the configured interval is reported
/// once as [`ChannelEvent::AwaitingInput`], with the partial line as prompt.
pub struct LocalShellChannel {
    child: AsyncGroupChild,
    stdin: Option<ChildStdin>,
    rx: mpsc::Receiver<io::Result<String>>,
    readers: Vec<JoinHandle<()>>,
    prompt_idle: Duration,
    tail: String,
    prompted: bool,
    closed: bool,
}

impl LocalShellChannel {
    pub(crate) async fn start(
        mut child: AsyncGroupChild,
        initial: Option<&StdinPayload>,
        prompt_idle: Duration,
    ) -> Result<Self, SessionError> {
        let (tx, rx) = mpsc::channel(64);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.inner().stdout.take() {
            readers.push(tokio::spawn(pump(stdout, tx.clone())));
        }
        if let Some(stderr) = child.inner().stderr.take() {
            readers.push(tokio::spawn(pump(stderr, tx)));
        }

        let mut stdin = child.inner().stdin.take();
        if let (Some(pipe), Some(payload)) = (stdin.as_mut(), initial) {
            feed_stdin(pipe, payload).await?;
        }

        Ok(Self {
            child,
            stdin,
            rx,
            readers,
            prompt_idle,
            tail: String::new(),
            prompted: false,
            closed: false,
        })
    }

    fn observe(&mut self, text: &str) {
        match text.rfind('\n') {
            Some(i) => {
                self.tail.clear();
                self.tail.push_str(&text[i + 1..]);
            }
            None => self.tail.push_str(text),
        }
        self.prompted = false;
    }

    async fn reap(&mut self) {
        match self.child.wait().await {
            Ok(status) => tracing::debug!(?status, "Streaming command exited"),
            Err(e) => tracing::debug!("Failed to reap streaming command: {e}"),
        }
    }
}

#[async_trait]
impl ShellChannel for LocalShellChannel {
    async fn next_event(&mut self) -> Option<Result<ChannelEvent, SessionError>> {
        if self.closed {
            return None;
        }

        let item = if self.tail.is_empty() || self.prompted {
            self.rx.recv().await
        } else {
            match tokio::time::timeout(self.prompt_idle, self.rx.recv()).await {
                Ok(item) => item,
                Err(_) => {
                    self.prompted = true;
                    return Some(Ok(ChannelEvent::AwaitingInput {
                        prompt: self.tail.clone(),
                    }));
                }
            }
        };

        match item {
            Some(Ok(text)) => {
                self.observe(&text);
                Some(Ok(ChannelEvent::Output(text)))
            }
            Some(Err(e)) => Some(Err(e.into())),
            None => {
                self.stdin = None;
                self.reap().await;
                self.closed = true;
                None
            }
        }
    }

    async fn send_input(&mut self, text: &str) -> Result<(), SessionError> {
        let stdin = self.stdin.as_mut().ok_or(SessionError::ChannelClosed)?;
        stdin.write_all(text.as_bytes()).await?;
        if !text.ends_with('\n') {
            stdin.write_all(b"\n").await?;
        }
        stdin.flush().await?;
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.stdin = None;
        for reader in &self.readers {
            reader.abort();
        }
        if let Err(e) = self.child.start_kill() {
            tracing::debug!("Failed to kill streaming process group: {e}");
        }
    }
}

impl Drop for LocalShellChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carry_joins_split_characters() {
        let bytes = "héllo ✓".as_bytes();
        let mut carry = Utf8Carry::default();
        let mut out = String::new();
        for chunk in bytes.chunks(1) {
            out.push_str(&carry.push(chunk));
        }
        out.push_str(&carry.finish());
        assert_eq!(out, "héllo ✓");
    }

    #[test]
    fn test_carry_replaces_invalid_bytes() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(b"a\xffb"), "a\u{fffd}b");
        assert_eq!(carry.push(&[0xe2, 0x9c]), "");
        assert_eq!(carry.finish(), "\u{fffd}");
    }

    #[test]
    fn test_carry_keeps_split_character_after_invalid_byte() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(b"\xff\xe2"), "\u{fffd}");
        assert_eq!(carry.push(b"\x9c\x93"), "\u{2713}");
        assert_eq!(carry.finish(), "");

        assert_eq!(carry.push(b"\xc3\xff\xe2\x9c"), "\u{fffd}\u{fffd}");
        assert_eq!(carry.push(b"\x93!"), "\u{2713}!");
    }

    #[cfg(unix)]
    mod process {
        use std::sync::Arc;

        use vm_gateway_core::{Invocation, VmSession};

        use super::*;
        use crate::LocalShellSession;

        fn session() -> Arc<LocalShellSession> {
            Arc::new(LocalShellSession::new().with_prompt_idle(Duration::from_millis(150)))
        }

        async fn drain(channel: &mut Box<dyn ShellChannel>) -> (String, Vec<String>) {
            let mut output = String::new();
            let mut prompts = Vec::new();
            while let Some(event) = channel.next_event().await {
                match event.unwrap() {
                    ChannelEvent::Output(text) => output.push_str(&text),
                    ChannelEvent::AwaitingInput { prompt } => prompts.push(prompt),
                }
            }
            (output, prompts)
        }

        #[tokio::test]
        async fn test_streams_to_completion() {
            let mut channel = session()
                .open_stream(&Invocation::new("echo one; echo two"))
                .await
                .unwrap();
            let (output, prompts) = drain(&mut channel).await;
            assert_eq!(output, "one\ntwo\n");
            assert!(prompts.is_empty());
        }

        #[tokio::test]
        async fn test_idle_partial_line_is_a_prompt() {
            let mut channel = session()
                .open_stream(&Invocation::new("printf 'Name? '; read n; echo \"hi $n\""))
                .await
                .unwrap();

            let mut seen = String::new();
            loop {
                match channel.next_event().await.unwrap().unwrap() {
                    ChannelEvent::Output(text) => seen.push_str(&text),
                    ChannelEvent::AwaitingInput { prompt } => {
                        assert_eq!(prompt, "Name? ");
                        break;
                    }
                }
            }
            assert_eq!(seen, "Name? ");

            channel.send_input("bob").await.unwrap();
            let (output, _) = drain(&mut channel).await;
            assert_eq!(output, "hi bob\n");
        }

        #[tokio::test]
        async fn test_close_stops_the_process() {
            let mut channel = session()
                .open_stream(&Invocation::new("while true; do echo tick; sleep 0.05; done"))
                .await
                .unwrap();
            assert!(matches!(
                channel.next_event().await,
                Some(Ok(ChannelEvent::Output(_)))
            ));

            channel.close();
            channel.close();
            assert!(channel.next_event().await.is_none());
            assert!(matches!(
                channel.send_input("x").await,
                Err(SessionError::ChannelClosed)
            ));
        }
    }
}
