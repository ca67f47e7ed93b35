//! Executors that drive commands through the registered VM session.
//!
//! Provides:
//! - `BlockingExecutor` - Runs on the calling thread
//! - `SuspendableExecutor` - Yields the calling task while the command runs
//! - `StreamingExecutor` - Live, interactive output streams
//! - `SecretInjector` - Feeds a resolved secret to stdin
//! - `InputResponder` - Answers prompts during streaming

pub mod blocking;
pub mod responder;
pub mod secret;
pub mod streaming;
pub mod suspendable;

#[cfg(test)]
mod testing;

pub use blocking::BlockingExecutor;
pub use responder::{DeclineResponder, FixedResponder, FnResponder, InputResponder};
pub use secret::SecretInjector;
pub use streaming::{ChunkStream, StreamState, StreamingExecutor};
pub use suspendable::SuspendableExecutor;
