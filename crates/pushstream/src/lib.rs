//! Push-to-Pull Async Streams
//!
//! This crate adapts push-based producers (callbacks, polling closures,
//! external event sources) into a single-consumer `futures::Stream` with
//! configurable backpressure and cooperative cancellation.
//!
//! # Features
//!
//! - **Rendezvous**: a waiting consumer receives elements directly, bypassing the buffer
//! - **Backpressure policies**: unbounded, keep-oldest (rejects) or keep-newest (evicts)
//! - **Non-blocking producers**: `yield_value` is callable from any thread and never waits
//! - **Termination exactly once**: `finish()`, cancellation or drop fire the handler once
//! - **Unfolding streams**: wrap an async produce-next closure with an optional cancel hook
//!
//! # Example
//!
//! ```
//! use pushstream::{AsyncStream, BufferingPolicy, StreamExt, YieldResult};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (mut stream, continuation) = AsyncStream::make(BufferingPolicy::buffer_oldest(2).unwrap());
//!
//! // Producers push from anywhere; a full buffer rejects the newest element.
//! assert!(continuation.yield_value(1).is_enqueued());
//! assert!(continuation.yield_value(2).is_enqueued());
//! assert_eq!(continuation.yield_value(3), YieldResult::Dropped(3));
//! continuation.finish();
//!
//! // The consumer pulls until the end marker.
//! let mut received = Vec::new();
//! while let Some(item) = stream.next().await {
//!     received.push(item);
//! }
//! assert_eq!(received, vec![1, 2]);
//! # }
//! ```

mod cancel;
mod config;
mod continuation;
mod error;
mod invariants;
mod storage;
mod stream;
mod unfold;

pub use cancel::{CancelToken, Cancelled};
pub use config::{BufferingPolicy, StreamConfig};
pub use continuation::{Continuation, YieldResult};
pub use error::StreamError;
pub use storage::{Termination, TerminationHandler};
pub use stream::{AsyncStream, Pull, PullUntil};

// Re-export useful stream combinators
pub use tokio_stream::StreamExt;
