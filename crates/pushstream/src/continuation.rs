//! Producer-facing handle implementing `futures::Sink`.

use crate::config::BufferingPolicy;
use crate::error::StreamError;
use crate::storage::{Storage, Termination, TerminationHandler};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_sink::Sink;

/// Outcome of handing one element to a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YieldResult<T> {
    /// The element was accepted, either buffered or delivered straight to a
    /// waiting consumer.
    ///
    /// `remaining` is the buffer space left after the element was accepted.
    /// Unbounded streams report `usize::MAX`.
    Enqueued {
        /// Free buffer slots after this element.
        remaining: usize,
    },

    /// The buffer was full under `BufferOldest`; the element was not accepted
    /// and is handed back.
    Dropped(T),

    /// The stream has finished or been cancelled; nothing was buffered.
    Terminated,
}

impl<T> YieldResult<T> {
    /// Returns `true` if the element was accepted.
    #[inline]
    pub fn is_enqueued(&self) -> bool {
        matches!(self, Self::Enqueued { .. })
    }

    /// Returns `true` if the element was rejected by a full buffer.
    #[inline]
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped(_))
    }

    /// Returns `true` if the stream no longer accepts elements.
    #[inline]
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// Producer handle for a buffered [`AsyncStream`](crate::AsyncStream).
///
/// All methods take `&self` and are safe to call concurrently from any thread;
/// none of them block. Elements accepted by `yield_value` reach the consumer in
/// acceptance order.
///
/// `Continuation` is `Clone`. When the last clone is dropped the stream
/// finishes exactly as if [`finish`](Self::finish) had been called.
///
/// # Sink
///
/// As a `Sink`, the continuation is always ready. `start_send` applies the
/// buffering policy (a `Dropped` element is discarded) and fails with
/// `StreamError::Terminated` once the stream has ended. `poll_close` finishes
/// the stream.
pub struct Continuation<T> {
    storage: Arc<Storage<T>>,
}

impl<T> Continuation<T> {
    pub(crate) fn new(storage: Arc<Storage<T>>) -> Self {
        storage.retain_producer();
        Self { storage }
    }

    /// Hands `value` to the stream.
    ///
    /// If the consumer is waiting, the value is delivered directly without
    /// touching the buffer. Otherwise the buffering policy decides:
    ///
    /// - `Unbounded`: always buffered.
    /// - `BufferOldest(n)`: buffered while fewer than `n` are held, otherwise
    ///   returned as [`YieldResult::Dropped`].
    /// - `BufferNewest(n)`: buffered; if `n` are already held the oldest is
    ///   evicted without notice.
    ///
    /// After termination every call returns [`YieldResult::Terminated`].
    pub fn yield_value(&self, value: T) -> YieldResult<T> {
        self.storage.yield_value(value)
    }

    /// Finishes the stream.
    ///
    /// The consumer still receives every buffered element before the end of
    /// the sequence. Only the first call has an effect: it runs the termination
    /// handler with [`Termination::Finished`] and wakes a waiting consumer.
    pub fn finish(&self) {
        self.storage.finish();
    }

    /// Returns the installed termination handler, if any.
    pub fn on_termination(&self) -> Option<TerminationHandler> {
        self.storage.on_termination()
    }

    /// Installs the termination handler, replacing any previous one.
    ///
    /// The handler runs once, when the stream first finishes or is cancelled,
    /// before a waiting consumer observes the end. Installing a handler on a
    /// stream that has already terminated discards it; it never runs.
    pub fn set_on_termination<F>(&self, handler: F)
    where
        F: Fn(Termination) + Send + Sync + 'static,
    {
        self.storage.set_on_termination(Some(Arc::new(handler)));
    }

    /// Removes the termination handler.
    pub fn clear_on_termination(&self) {
        self.storage.set_on_termination(None);
    }

    /// Returns `true` once the stream has finished or been cancelled.
    pub fn is_terminated(&self) -> bool {
        self.storage.is_terminated()
    }

    /// Returns the buffering policy the stream was built with.
    pub fn policy(&self) -> BufferingPolicy {
        self.storage.policy()
    }
}

impl Continuation<()> {
    /// Signals one unit event.
    pub fn yield_unit(&self) -> YieldResult<()> {
        self.yield_value(())
    }
}

impl<T> Clone for Continuation<T> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.storage))
    }
}

impl<T> Drop for Continuation<T> {
    fn drop(&mut self) {
        if self.storage.release_producer() {
            self.storage.finish();
        }
    }
}

impl<T> fmt::Debug for Continuation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("storage", &self.storage)
            .finish()
    }
}

impl<T> Sink<T> for Continuation<T> {
    type Error = StreamError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.storage.is_terminated() {
            return Poll::Ready(Err(StreamError::Terminated));
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: T) -> Result<(), Self::Error> {
        match self.storage.yield_value(item) {
            YieldResult::Enqueued { .. } | YieldResult::Dropped(_) => Ok(()),
            YieldResult::Terminated => Err(StreamError::Terminated),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.storage.finish();
        Poll::Ready(Ok(()))
    }
}
