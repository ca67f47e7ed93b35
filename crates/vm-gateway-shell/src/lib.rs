//! Local shell implementation of the VM session.
//!
//! Provides:
//! - `LocalShellSession` - Runs commands in process groups on this machine
//! - `LocalShellChannel` - Live output with idle-prompt detection
//! - Shell detection utilities for Unix and Windows

pub mod channel;
pub mod session;
pub mod shell;

pub use channel::{LocalShellChannel, Utf8Carry};
pub use session::{DEFAULT_PROMPT_IDLE, LocalShellSession};
pub use shell::{UnixShell, get_shell_command, resolve_executable_path};
