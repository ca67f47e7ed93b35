//! Secret store implementations.

pub mod memory;

#[cfg(feature = "env")]
pub mod env;

#[cfg(feature = "prompt")]
pub mod prompt;

pub use memory::MemorySecretStore;

#[cfg(feature = "env")]
pub use env::EnvSecretStore;

#[cfg(feature = "prompt")]
pub use prompt::PromptSecretStore;
