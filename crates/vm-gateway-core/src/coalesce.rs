//! Lossless regrouping of stream fragments.

use std::time::Duration;

use futures::{Stream, StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// When a buffered unit is flushed downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoalescePolicy {
    /// Flush once the buffer holds at least this many bytes.
    pub max_bytes: usize,
    /// Flush once the oldest buffered fragment is this old.
    pub max_delay: Duration,
}

impl Default for CoalescePolicy {
    fn default() -> Self {
        Self {
            max_bytes: 4096,
            max_delay: Duration::from_millis(50),
        }
    }
}

/// Merge adjacent fragments of `input` into larger units.
///
/// Concatenating the output yields exactly the concatenated input. Empty
/// fragments are dropped. Buffered text is flushed before an error is
/// passed through, and the stream ends after the first error.
pub fn coalesce<S, E>(input: S, policy: CoalescePolicy) -> BoxStream<'static, Result<String, E>>
where
    S: Stream<Item = Result<String, E>> + Send + 'static,
    E: Send + 'static,
{
    async_stream::stream! {
        let mut input = Box::pin(input);
        let mut buf = String::new();
        let mut deadline: Option<Instant> = None;

        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, input.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        deadline = None;
                        yield Ok(std::mem::take(&mut buf));
                        continue;
                    }
                },
                None => input.next().await,
            };

            match next {
                Some(Ok(fragment)) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    if buf.is_empty() {
                        deadline = Some(Instant::now() + policy.max_delay);
                    }
                    buf.push_str(&fragment);
                    if buf.len() >= policy.max_bytes {
                        deadline = None;
                        yield Ok(std::mem::take(&mut buf));
                    }
                }
                Some(Err(e)) => {
                    if !buf.is_empty() {
                        yield Ok(std::mem::take(&mut buf));
                    }
                    yield Err(e);
                    break;
                }
                None => {
                    if !buf.is_empty() {
                        yield Ok(std::mem::take(&mut buf));
                    }
                    break;
                }
            }
        }
    }
    .boxed()
}
