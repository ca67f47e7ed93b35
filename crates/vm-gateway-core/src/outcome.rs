//! Results returned to the tool-calling layer.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{OutputLimiter, SecretError, SessionError};

/// Text returned for an empty command.
pub const NO_COMMAND_OUTPUT: &str = "No command provided.";

/// Prefix of the text a failed command is reported as.
pub const FAILURE_PREFIX: &str = "Failed to execute command in VM";

/// Why a command did not produce output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The session reported an error.
    Session,
    /// The caller's timeout elapsed.
    TimedOut,
    /// The worker running the command died.
    Worker,
}

/// Outcome of a blocking or suspendable execution.
///
/// Command failures are data, not errors: the agent reads them in-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecOutcome {
    /// Command ran; captured output.
    Output { text: String },
    /// Nothing to run.
    NoCommand,
    /// Command could not be run to completion.
    Failed { kind: FailureKind, message: String },
}

impl ExecOutcome {
    /// Build a successful outcome.
    #[must_use]
    pub fn output(text: impl Into<String>) -> Self {
        Self::Output { text: text.into() }
    }

    /// Convert a session error into a failed outcome.
    #[must_use]
    pub fn from_session_error(err: &SessionError) -> Self {
        let kind = match err {
            SessionError::TimedOut(_) => FailureKind::TimedOut,
            _ => FailureKind::Session,
        };
        Self::Failed {
            kind,
            message: err.to_string(),
        }
    }

    /// Failed outcome for an elapsed caller timeout.
    #[must_use]
    pub fn timed_out(after: Duration) -> Self {
        Self::from_session_error(&SessionError::TimedOut(after))
    }

    /// Whether the command ran.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Output { .. })
    }

    /// Text shown to the agent.
    #[must_use]
    pub fn text(&self) -> String {
        self.to_string()
    }

    /// Re-bound this outcome so its rendered text fits `limiter`.
    ///
    /// Failures keep their kind while the prefix fits, and only the message
    /// is cut. Below that, and for a sentinel that does not fit, the rendered
    /// text itself is cut and returned as plain output.
    #[must_use]
    pub fn limited(self, limiter: &OutputLimiter) -> Self {
        let budget = limiter.max_chars();
        match self {
            Self::Output { text } => Self::Output {
                text: limiter.limit_owned(text),
            },
            Self::NoCommand if NO_COMMAND_OUTPUT.chars().count() <= budget => Self::NoCommand,
            Self::Failed { kind, message } if FAILURE_PREFIX.chars().count() + 2 <= budget => {
                let room = budget - (FAILURE_PREFIX.chars().count() + 2);
                Self::Failed {
                    kind,
                    message: OutputLimiter::new(room).limit_owned(message),
                }
            }
            other => Self::Output {
                text: limiter.limit_owned(other.to_string()),
            },
        }
    }
}

impl fmt::Display for ExecOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output { text } => f.write_str(text),
            Self::NoCommand => f.write_str(NO_COMMAND_OUTPUT),
            Self::Failed { message, .. } => write!(f, "{FAILURE_PREFIX}: {message}"),
        }
    }
}

/// Error surfaced by gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No session is registered. A wiring defect, never swallowed.
    #[error("No active VM for command execution")]
    NoActiveSession,
    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("Stream failed: {0}")]
    Stream(#[source] SessionError),
    #[error("Stream timed out after {0:?}")]
    TimedOut(Duration),
}
