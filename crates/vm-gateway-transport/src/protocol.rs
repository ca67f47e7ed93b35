//! Wire protocol for tool calls.
//!
//! Every message is a JSON object tagged by `type`. Requests carry a
//! client-chosen `id` that is echoed on every reply. Stdin payloads are
//! base64 encoded.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vm_gateway_core::{ExecOutcome, Invocation, SecretRef};

/// Protocol error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid stdin encoding: {0}")]
    InvalidStdin(#[from] base64::DecodeError),
    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Run a command and reply with its output.
    Execute {
        id: String,
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stdin: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        /// Run on a blocking worker instead of the async path.
        #[serde(default)]
        blocking: bool,
    },
    /// Run a command with a named secret as its stdin.
    ExecuteWithSecret {
        id: String,
        command: String,
        secret: SecretRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Stream a command's output.
    Stream {
        id: String,
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stdin: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        /// Forward fragments as produced instead of coalescing them.
        #[serde(default)]
        passthrough: bool,
    },
    /// Answer a pending `awaiting_input`.
    Input { id: String, text: String },
    /// Refuse a pending `awaiting_input`.
    Decline { id: String },
    /// Stop a stream.
    Cancel { id: String },
    /// Ping for keepalive.
    Ping,
}

impl ClientMessage {
    /// Create an execute request.
    #[must_use]
    pub fn execute(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self::Execute {
            id: id.into(),
            command: command.into(),
            stdin: None,
            timeout_ms: None,
            blocking: false,
        }
    }

    /// Create a stream request.
    #[must_use]
    pub fn stream(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self::Stream {
            id: id.into(),
            command: command.into(),
            stdin: None,
            timeout_ms: None,
            passthrough: false,
        }
    }

    /// Parse a client message.
    ///
    /// # Errors
    /// Returns error if the text is not a valid message.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Encode stdin bytes for the wire.
#[must_use]
pub fn encode_stdin(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Build an invocation from request fields.
///
/// # Errors
/// Returns error if `stdin` is not valid base64.
pub fn invocation(
    command: String,
    stdin: Option<&str>,
    timeout_ms: Option<u64>,
) -> Result<Invocation, ProtocolError> {
    let mut invocation = Invocation::new(command);
    if let Some(data) = stdin {
        invocation = invocation.with_stdin(BASE64.decode(data)?);
    }
    if let Some(ms) = timeout_ms {
        invocation = invocation.with_timeout(Duration::from_millis(ms));
    }
    Ok(invocation)
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Result of `execute` or `execute_with_secret`.
    Output {
        id: String,
        text: String,
        success: bool,
    },
    /// One piece of a stream's transcript.
    Chunk { id: String, text: String },
    /// The stream is waiting for `input` or `decline`.
    AwaitingInput { id: String, prompt: String },
    /// The stream is over. `error` is set if it did not complete.
    StreamEnded {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Error message.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        message: String,
    },
    /// Pong response.
    Pong,
}

impl ServerMessage {
    /// Create an output message from an outcome.
    #[must_use]
    pub fn output(id: impl Into<String>, outcome: &ExecOutcome) -> Self {
        Self::Output {
            id: id.into(),
            text: outcome.text(),
            success: outcome.is_success(),
        }
    }

    /// Create an error message.
    #[must_use]
    pub fn error(id: Option<String>, message: impl std::fmt::Display) -> Self {
        Self::Error {
            id,
            message: message.to_string(),
        }
    }
}
