//! Credential injection through stdin.

use std::sync::Arc;

use vm_gateway_core::{
    ExecOutcome, FailureKind, GatewayError, Invocation, SecretRef, SecretStore, SessionRegistry,
    StdinPayload,
};

use crate::blocking::BlockingExecutor;

/// Resolves a secret and feeds it to a command as its only stdin line.
///
/// The value lives only as long as the call and is never logged. It can
/// still reach the output if the command itself prints its input.
#[derive(Clone)]
pub struct SecretInjector {
    store: Arc<dyn SecretStore>,
    executor: BlockingExecutor,
}

impl SecretInjector {
    /// Create an injector backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, executor: BlockingExecutor) -> Self {
        Self { store, executor }
    }

    /// Resolve `secret` and run `invocation` with it on stdin. Blocks.
    ///
    /// Any stdin already on `invocation` is replaced. The session is
    /// checked before the store is asked, so nobody is prompted for a
    /// secret that cannot be used.
    ///
    /// # Errors
    /// Returns [`GatewayError::NoActiveSession`] if nothing is registered,
    /// or [`GatewayError::Secret`] if the secret cannot be resolved.
    pub fn run(
        &self,
        registry: &SessionRegistry,
        invocation: Invocation,
        secret: &SecretRef,
    ) -> Result<ExecOutcome, GatewayError> {
        if invocation.is_empty() {
            return Ok(ExecOutcome::NoCommand.limited(&self.executor.limiter()));
        }
        let session = registry.current().ok_or(GatewayError::NoActiveSession)?;

        tracing::debug!(
            id = %invocation.id(),
            secret = %secret.name,
            "Resolving secret for stdin"
        );
        let value = self.store.resolve(&secret.name, secret.prompt.as_deref())?;
        let invocation = invocation.with_stdin(StdinPayload::secret_line(&value));
        drop(value);

        Ok(self.executor.run_on(session.as_ref(), &invocation))
    }

    /// Like [`Self::run`], on a blocking worker so the calling task is free.
    ///
    /// # Errors
    /// Same as [`Self::run`].
    pub async fn run_async(
        &self,
        registry: &SessionRegistry,
        invocation: Invocation,
        secret: SecretRef,
    ) -> Result<ExecOutcome, GatewayError> {
        let injector = self.clone();
        let registry = registry.clone();
        let worker =
            tokio::task::spawn_blocking(move || injector.run(&registry, invocation, &secret));

        match worker.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Secret execution worker failed: {e}");
                Ok(ExecOutcome::Failed {
                    kind: FailureKind::Worker,
                    message: e.to_string(),
                }
                .limited(&self.executor.limiter()))
            }
        }
    }
}
