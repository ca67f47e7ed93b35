//! Command invocations and the payloads they carry.

use std::{fmt, time::Duration};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Data written to a command's standard input.
///
/// `Debug` never prints the payload itself, only its kind and size.
pub enum StdinPayload {
    /// UTF-8 text.
    Text(String),
    /// Arbitrary bytes.
    Bytes(Vec<u8>),
    /// A resolved credential.
    Secret(SecretString),
}

impl StdinPayload {
    /// Wrap a secret as a single input line (value plus one `\n`).
    #[must_use]
    pub fn secret_line(secret: &SecretString) -> Self {
        Self::Secret(SecretString::from(format!("{}\n", secret.expose_secret())))
    }

    /// Raw bytes to write to stdin.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
            Self::Secret(secret) => secret.expose_secret().as_bytes(),
        }
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the payload holds a credential.
    #[must_use]
    pub const fn is_secret(&self) -> bool {
        matches!(self, Self::Secret(_))
    }
}

impl fmt::Debug for StdinPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "Text(<{} bytes>)", text.len()),
            Self::Bytes(bytes) => write!(f, "Bytes(<{} bytes>)", bytes.len()),
            Self::Secret(_) => f.write_str("Secret(<redacted>)"),
        }
    }
}

impl From<String> for StdinPayload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for StdinPayload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for StdinPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// A single command to run against the VM session.
#[derive(Debug)]
pub struct Invocation {
    id: Uuid,
    /// Shell command text.
    pub command: String,
    /// Optional standard-input payload.
    pub stdin: Option<StdinPayload>,
    /// Upper bound on execution time. `None` means unbounded.
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Create an invocation with no stdin and no timeout.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            command: command.into(),
            stdin: None,
            timeout: None,
        }
    }

    /// Attach a stdin payload.
    #[must_use]
    pub fn with_stdin(mut self, stdin: impl Into<StdinPayload>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Bound execution time.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Apply `timeout` only if none was set explicitly.
    #[must_use]
    pub fn or_timeout(mut self, timeout: Option<Duration>) -> Self {
        if self.timeout.is_none() {
            self.timeout = timeout;
        }
        self
    }

    /// Correlation id used in log records.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Whether there is nothing to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.command.trim().is_empty()
    }
}

impl From<&str> for Invocation {
    fn from(command: &str) -> Self {
        Self::new(command)
    }
}

impl From<String> for Invocation {
    fn from(command: String) -> Self {
        Self::new(command)
    }
}

/// Named credential, resolved through a [`SecretStore`](crate::SecretStore) at call time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    /// Secret name.
    pub name: String,
    /// Text shown when the store has to ask for the value interactively.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl SecretRef {
    /// Reference a secret by name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: None,
        }
    }

    /// Attach an interactive prompt.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}
