//! Core abstractions for the VM command gateway.
//!
//! This crate provides the fundamental building blocks:
//! - `Invocation` - A command plus optional stdin and timeout
//! - `VmSession` / `ShellChannel` / `SecretStore` - Collaborator traits
//! - `SessionRegistry` - Late-bound slot for the active session
//! - `OutputLimiter` and `coalesce` - Output shaping
//! - `ExecOutcome` / `GatewayError` - Results and errors
//! - `GatewayConfig` - Settings

pub mod coalesce;
pub mod config;
pub mod invocation;
pub mod limit;
pub mod outcome;
pub mod registry;
pub mod traits;

pub use coalesce::{CoalescePolicy, coalesce};
pub use config::{ConfigError, GatewayConfig, StreamPipeline};
pub use invocation::{Invocation, SecretRef, StdinPayload};
pub use limit::OutputLimiter;
pub use outcome::{ExecOutcome, FailureKind, GatewayError};
pub use registry::SessionRegistry;
pub use secrecy::{ExposeSecret, SecretString};
pub use traits::{
    ChannelEvent, SecretError, SecretStore, SessionError, ShellChannel, VmSession,
};
