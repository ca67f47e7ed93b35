//! Transport layer for remote tool calls.
//!
//! Provides:
//! - Wire protocol (JSON + base64 stdin)
//! - `ToolSocket` - Per-connection dispatch onto a `Gateway`
//! - WebSocket transport (feature: websocket)

pub mod dispatch;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use dispatch::ToolSocket;
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
