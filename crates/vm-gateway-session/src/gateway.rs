//! Tool-facing gateway over the registered VM session.

use std::sync::Arc;

use vm_gateway_core::{
    ExecOutcome, GatewayConfig, GatewayError, Invocation, OutputLimiter, SecretRef, SecretStore,
    SessionRegistry, StreamPipeline, VmSession,
};
use vm_gateway_executor::{
    BlockingExecutor, ChunkStream, InputResponder, SecretInjector, StreamingExecutor,
    SuspendableExecutor,
};

/// Entry point for agent tool calls.
///
/// Every operation reads the registry right before it runs, so a session
/// registered or revoked mid-process applies to all later calls. The
/// gateway does not serialize calls; concurrent commands interleave however
/// the session allows.
pub struct Gateway {
    registry: SessionRegistry,
    config: GatewayConfig,
    blocking: BlockingExecutor,
    suspendable: SuspendableExecutor,
    streaming: StreamingExecutor,
    secrets: SecretInjector,
}

impl Gateway {
    /// Create a gateway with its own, empty registry.
    #[must_use]
    pub fn new(config: GatewayConfig, secrets: Arc<dyn SecretStore>) -> Self {
        Self::with_registry(config, secrets, SessionRegistry::new())
    }

    /// Create a gateway over an existing registry.
    #[must_use]
    pub fn with_registry(
        config: GatewayConfig,
        secrets: Arc<dyn SecretStore>,
        registry: SessionRegistry,
    ) -> Self {
        let limiter = OutputLimiter::new(config.output_limit);
        let blocking = BlockingExecutor::new(limiter);
        Self {
            registry,
            blocking,
            suspendable: SuspendableExecutor::new(config.limit_async_output.then_some(limiter)),
            streaming: StreamingExecutor::new(config.stream_pipeline),
            secrets: SecretInjector::new(secrets, blocking),
            config,
        }
    }

    /// Registry this gateway reads from.
    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Register the session to run commands in, or clear it with `None`.
    pub fn register(&self, session: Option<Arc<dyn VmSession>>) {
        self.registry.register(session);
    }

    /// Clear the registered session.
    pub fn revoke(&self) {
        self.registry.revoke();
    }

    fn prepare(&self, invocation: impl Into<Invocation>) -> Invocation {
        invocation.into().or_timeout(self.config.hard_timeout)
    }

    /// Run a command and wait for it on this thread.
    ///
    /// Must not be called from an async task; use
    /// [`Self::execute_terminal_async`] or `spawn_blocking` there.
    ///
    /// # Errors
    /// Returns [`GatewayError::NoActiveSession`] if no session is registered.
    pub fn execute_terminal(
        &self,
        invocation: impl Into<Invocation>,
    ) -> Result<ExecOutcome, GatewayError> {
        self.blocking.run(&self.registry, &self.prepare(invocation))
    }

    /// Run a command, yielding the calling task until it finishes.
    ///
    /// # Errors
    /// Returns [`GatewayError::NoActiveSession`] if no session is registered.
    pub async fn execute_terminal_async(
        &self,
        invocation: impl Into<Invocation>,
    ) -> Result<ExecOutcome, GatewayError> {
        let invocation = self.prepare(invocation);
        self.suspendable.run(&self.registry, &invocation).await
    }

    /// Stream a command's output using the configured pipeline.
    ///
    /// # Errors
    /// Returns [`GatewayError::NoActiveSession`] if no session is registered.
    pub fn execute_terminal_stream(
        &self,
        invocation: impl Into<Invocation>,
        responder: Option<Arc<dyn InputResponder>>,
    ) -> Result<ChunkStream, GatewayError> {
        self.streaming
            .run(&self.registry, self.prepare(invocation), responder)
    }

    /// Stream a command's output through an explicit pipeline.
    ///
    /// # Errors
    /// Returns [`GatewayError::NoActiveSession`] if no session is registered.
    pub fn execute_terminal_stream_with(
        &self,
        invocation: impl Into<Invocation>,
        responder: Option<Arc<dyn InputResponder>>,
        pipeline: StreamPipeline,
    ) -> Result<ChunkStream, GatewayError> {
        StreamingExecutor::new(pipeline).run(&self.registry, self.prepare(invocation), responder)
    }

    /// Run a command with a secret as its only stdin line. Blocks.
    ///
    /// # Errors
    /// Returns [`GatewayError::NoActiveSession`] if no session is registered,
    /// or [`GatewayError::Secret`] if the secret cannot be resolved.
    pub fn execute_with_secret(
        &self,
        invocation: impl Into<Invocation>,
        secret: &SecretRef,
    ) -> Result<ExecOutcome, GatewayError> {
        self.secrets
            .run(&self.registry, self.prepare(invocation), secret)
    }

    /// Run a command with a secret on stdin, off the calling task.
    ///
    /// # Errors
    /// Same as [`Self::execute_with_secret`].
    pub async fn execute_with_secret_async(
        &self,
        invocation: impl Into<Invocation>,
        secret: SecretRef,
    ) -> Result<ExecOutcome, GatewayError> {
        let invocation = self.prepare(invocation);
        self.secrets
            .run_async(&self.registry, invocation, secret)
            .await
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
