//! Collaborator traits: the VM session and the secret store.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Invocation;

/// Failure reported by a VM session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Command(String),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("channel closed")]
    ChannelClosed,
}

/// Event produced by a live shell channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// A fragment of terminal output.
    Output(String),
    /// The command is blocked reading stdin.
    AwaitingInput {
        /// Output observed since the last line break, usually the prompt.
        prompt: String,
    },
}

/// Live bidirectional channel for one streaming command.
#[async_trait]
pub trait ShellChannel: Send {
    /// Next event, or `None` once the command has finished.
    async fn next_event(&mut self) -> Option<Result<ChannelEvent, SessionError>>;

    /// Write a reply to the command's stdin.
    async fn send_input(&mut self, text: &str) -> Result<(), SessionError>;

    /// Release the channel and anything it spawned.
    ///
    /// Must be idempotent; called on completion, failure and cancellation.
    fn close(&mut self);
}

/// Sandboxed shell environment the gateway executes commands in.
///
/// Implementations own their lifecycle; the gateway only borrows them.
#[async_trait]
pub trait VmSession: Send + Sync {
    /// Run a command, blocking the calling thread until it finishes.
    fn execute(&self, invocation: &Invocation) -> Result<String, SessionError>;

    /// Run a command without blocking the calling task.
    async fn execute_async(&self, invocation: &Invocation) -> Result<String, SessionError>;

    /// Start a command and return a live channel to it.
    async fn open_stream(
        &self,
        invocation: &Invocation,
    ) -> Result<Box<dyn ShellChannel>, SessionError>;
}

/// Secret store error.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secret not found: {0}")]
    NotFound(String),
    #[error("Secret store unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of named credentials.
pub trait SecretStore: Send + Sync {
    /// Resolve `name`, optionally asking with `prompt`. May block.
    fn resolve(&self, name: &str, prompt: Option<&str>) -> Result<SecretString, SecretError>;
}
