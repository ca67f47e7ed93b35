//! Answers to interactive prompts seen while streaming.

use std::future::Future;

use async_trait::async_trait;

/// Trait for answering a command that is waiting on stdin.
///
/// Implement this trait to plug an agent, a UI, or a script into
/// streaming execution. The stream is suspended until `respond` returns.
#[async_trait]
pub trait InputResponder: Send + Sync {
    /// Decide what to type at `prompt`.
    ///
    /// # Returns
    /// Text to send to the command, or `None` to send nothing.
    async fn respond(&self, prompt: &str) -> Option<String>;
}

/// Responder that never answers.
#[derive(Debug, Default, Clone)]
pub struct DeclineResponder;

#[async_trait]
impl InputResponder for DeclineResponder {
    async fn respond(&self, _prompt: &str) -> Option<String> {
        None
    }
}

/// Responder that gives the same answer to every prompt.
#[derive(Debug, Clone)]
pub struct FixedResponder {
    reply: String,
}

impl FixedResponder {
    /// Create a responder that always replies with `reply`.
    #[must_use]
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl InputResponder for FixedResponder {
    async fn respond(&self, _prompt: &str) -> Option<String> {
        Some(self.reply.clone())
    }
}

/// Adapts an async closure into a responder.
pub struct FnResponder<F>(F);

impl<F, Fut> FnResponder<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Option<String>> + Send,
{
    /// Wrap `f`; it receives the prompt text.
    #[must_use]
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> InputResponder for FnResponder<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Option<String>> + Send,
{
    async fn respond(&self, prompt: &str) -> Option<String> {
        (self.0)(prompt.to_owned()).await
    }
}
