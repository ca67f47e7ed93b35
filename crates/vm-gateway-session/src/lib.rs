//! Tool-facing operations and secret stores for the VM gateway.
//!
//! Provides:
//! - `Gateway` - The agent-facing execute operations plus session registration
//! - Secret store implementations (memory, environment, interactive prompt)

pub mod gateway;
pub mod secrets;

pub use gateway::Gateway;
pub use secrets::MemorySecretStore;
