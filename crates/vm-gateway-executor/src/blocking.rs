//! Blocking execution against the registered session.

use vm_gateway_core::{
    ExecOutcome, GatewayError, Invocation, OutputLimiter, SessionRegistry, StdinPayload, VmSession,
};

/// Runs commands on the calling thread.
///
/// Session failures come back as [`ExecOutcome::Failed`]; every outcome is
/// bounded by the limiter.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingExecutor {
    limiter: OutputLimiter,
}

impl BlockingExecutor {
    /// Create an executor with the given output limit.
    #[must_use]
    pub const fn new(limiter: OutputLimiter) -> Self {
        Self { limiter }
    }

    /// Output limiter in use.
    #[must_use]
    pub const fn limiter(&self) -> OutputLimiter {
        self.limiter
    }

    /// Run `invocation` against whatever session is registered now.
    ///
    /// Empty commands short-circuit before the registry is consulted.
    ///
    /// # Errors
    /// Returns [`GatewayError::NoActiveSession`] if nothing is registered.
    pub fn run(
        &self,
        registry: &SessionRegistry,
        invocation: &Invocation,
    ) -> Result<ExecOutcome, GatewayError> {
        if invocation.is_empty() {
            return Ok(ExecOutcome::NoCommand.limited(&self.limiter));
        }
        let session = registry.current().ok_or(GatewayError::NoActiveSession)?;
        Ok(self.run_on(session.as_ref(), invocation))
    }

    /// Run `invocation` against a specific session.
    pub fn run_on(&self, session: &dyn VmSession, invocation: &Invocation) -> ExecOutcome {
        tracing::debug!(
            id = %invocation.id(),
            command = %invocation.command,
            stdin_bytes = invocation.stdin.as_ref().map(StdinPayload::len),
            timeout = ?invocation.timeout,
            "Running blocking command"
        );

        let outcome = match session.execute(invocation) {
            Ok(output) => ExecOutcome::output(output),
            Err(e) => {
                tracing::warn!(id = %invocation.id(), "Command failed: {e}");
                ExecOutcome::from_session_error(&e)
            }
        };
        outcome.limited(&self.limiter)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{Behavior, StubSession};

    fn registry_with(session: &Arc<StubSession>) -> SessionRegistry {
        let registry = SessionRegistry::new();
        registry.register(Some(Arc::clone(session) as Arc<dyn VmSession>));
        registry
    }

    #[test]
    fn test_output_limited_to_budget() {
        let session = Arc::new(StubSession::new(Behavior::Flood('x', 20_000)));
        let registry = registry_with(&session);
        let executor = BlockingExecutor::new(OutputLimiter::new(100));

        let outcome = executor.run(&registry, &Invocation::new("yes | head")).unwrap();
        assert_eq!(outcome.text().len(), 100);
    }

    #[test]
    fn test_empty_command_never_touches_session() {
        let session = Arc::new(StubSession::new(Behavior::Echo));
        let registry = registry_with(&session);
        let executor = BlockingExecutor::default();

        let outcome = executor.run(&registry, &Invocation::new("")).unwrap();
        assert_eq!(outcome, ExecOutcome::NoCommand);
        assert_eq!(outcome.text(), "No command provided.");
        assert_eq!(session.calls(), 0);

        // Also without any session registered.
        let empty = SessionRegistry::new();
        assert_eq!(
            executor.run(&empty, &Invocation::new("")).unwrap(),
            ExecOutcome::NoCommand
        );
    }

    #[test]
    fn test_no_session_is_configuration_error() {
        let result =
            BlockingExecutor::default().run(&SessionRegistry::new(), &Invocation::new("ls"));
        assert!(matches!(result, Err(GatewayError::NoActiveSession)));
    }

    #[test]
    fn test_failure_becomes_text() {
        let session = Arc::new(StubSession::new(Behavior::Fail("container stopped")));
        let registry = registry_with(&session);

        let outcome = BlockingExecutor::default()
            .run(&registry, &Invocation::new("ls"))
            .unwrap();
        assert!(!outcome.is_success());
        assert_eq!(
            outcome.text(),
            "Failed to execute command in VM: container stopped"
        );
    }

    #[test]
    fn test_failure_within_budget_shorter_than_prefix() {
        let session = Arc::new(StubSession::new(Behavior::Fail("container stopped")));
        let registry = registry_with(&session);

        let outcome = BlockingExecutor::new(OutputLimiter::new(20))
            .run(&registry, &Invocation::new("ls"))
            .unwrap();
        assert!(outcome.text().chars().count() <= 20);
        assert_eq!(outcome.text(), "Failed to execute co");
    }

    #[test]
    fn test_stdin_forwarded() {
        let session = Arc::new(StubSession::new(Behavior::Echo));
        let registry = registry_with(&session);

        BlockingExecutor::default()
            .run(&registry, &Invocation::new("cat").with_stdin(vec![0_u8, 159, 146]))
            .unwrap();
        assert_eq!(
            session.last_stdin.lock().unwrap().as_deref(),
            Some(&[0_u8, 159, 146][..])
        );
    }

    #[test]
    fn test_revoked_session_rejected() {
        let session = Arc::new(StubSession::new(Behavior::Echo));
        let registry = registry_with(&session);
        let executor = BlockingExecutor::default();

        assert!(executor.run(&registry, &Invocation::new("echo hi")).is_ok());
        registry.revoke();
        assert!(matches!(
            executor.run(&registry, &Invocation::new("echo hi")),
            Err(GatewayError::NoActiveSession)
        ));
    }
}
