//! Suspendable execution: the calling task yields while the command runs.

use vm_gateway_core::{
    ExecOutcome, GatewayError, Invocation, OutputLimiter, SessionError, SessionRegistry, VmSession,
};

/// Runs commands through the session's async primitive.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuspendableExecutor {
    limiter: Option<OutputLimiter>,
}

impl SuspendableExecutor {
    /// Create an executor; `None` returns output unbounded.
    #[must_use]
    pub const fn new(limiter: Option<OutputLimiter>) -> Self {
        Self { limiter }
    }

    /// Run `invocation` against whatever session is registered now.
    ///
    /// # Errors
    /// Returns [`GatewayError::NoActiveSession`] if nothing is registered.
    pub async fn run(
        &self,
        registry: &SessionRegistry,
        invocation: &Invocation,
    ) -> Result<ExecOutcome, GatewayError> {
        if invocation.is_empty() {
            return Ok(self.bound(ExecOutcome::NoCommand));
        }
        let session = registry.current().ok_or(GatewayError::NoActiveSession)?;
        Ok(self.run_on(session.as_ref(), invocation).await)
    }

    /// Run `invocation` against a specific session.
    pub async fn run_on(&self, session: &dyn VmSession, invocation: &Invocation) -> ExecOutcome {
        tracing::debug!(
            id = %invocation.id(),
            command = %invocation.command,
            timeout = ?invocation.timeout,
            "Running suspendable command"
        );

        let result = match invocation.timeout {
            Some(limit) => tokio::time::timeout(limit, session.execute_async(invocation))
                .await
                .unwrap_or(Err(SessionError::TimedOut(limit))),
            None => session.execute_async(invocation).await,
        };

        let outcome = match result {
            Ok(output) => ExecOutcome::output(output),
            Err(e) => {
                tracing::warn!(id = %invocation.id(), "Command failed: {e}");
                ExecOutcome::from_session_error(&e)
            }
        };

        self.bound(outcome)
    }

    fn bound(&self, outcome: ExecOutcome) -> ExecOutcome {
        match &self.limiter {
            Some(limiter) => outcome.limited(limiter),
            None => outcome,
        }
    }
}
