//! Consumer-facing stream implementing `futures::Stream`.

use crate::cancel::{CancelToken, Cancelled};
use crate::config::{BufferingPolicy, StreamConfig};
use crate::continuation::Continuation;
use crate::storage::{Storage, Waiter};
use crate::unfold::{OnCancel, Produce, Unfold};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

use futures_core::future::BoxFuture;
use futures_core::stream::FusedStream;
use futures_core::{Future, Stream};
use pin_project_lite::pin_project;

enum Source<T> {
    Buffered {
        storage: Arc<Storage<T>>,
        // Lives here rather than in `Pull` so a dropped pull keeps its place.
        waiter: Option<Waiter<T>>,
    },
    Unfolding(Unfold<T>),
}

/// Single-consumer asynchronous sequence fed by push-based producers.
///
/// A buffered stream is built with [`new`](Self::new) (or
/// [`with_config`](Self::with_config) / [`make`](Self::make)) and fed through a
/// [`Continuation`]. An unfolding stream is built with
/// [`unfolding`](Self::unfolding) and runs an async closure per pull.
///
/// Consume with [`pull`](Self::pull), [`pull_until`](Self::pull_until), or any
/// `StreamExt` combinator. Elements arrive in the order producers handed them
/// over; `None` marks the end and is returned only after every buffered element
/// has been delivered.
///
/// # Cancellation
///
/// Dropping the stream cancels it: the termination handler runs with
/// [`Termination::Cancelled`](crate::Termination::Cancelled) and producers see
/// `YieldResult::Terminated` from then on.
pub struct AsyncStream<T> {
    source: Source<T>,
}

impl<T> AsyncStream<T> {
    /// Creates a buffered stream and runs `setup` with its producer handle.
    ///
    /// `setup` runs to completion before this returns, so producer wiring
    /// (registering callbacks, spawning tasks) is in place before the first
    /// pull. If `setup` drops the continuation without cloning or storing it,
    /// the stream finishes once the elements yielded during setup are drained.
    ///
    /// # Example
    ///
    /// ```
    /// use pushstream::{AsyncStream, BufferingPolicy};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let mut stream = AsyncStream::new(BufferingPolicy::Unbounded, |continuation| {
    ///     continuation.yield_value(1);
    ///     continuation.yield_value(2);
    ///     continuation.finish();
    /// });
    ///
    /// assert_eq!(stream.pull().await, Some(1));
    /// assert_eq!(stream.pull().await, Some(2));
    /// assert_eq!(stream.pull().await, None);
    /// # }
    /// ```
    pub fn new<F>(policy: BufferingPolicy, setup: F) -> Self
    where
        F: FnOnce(Continuation<T>),
    {
        Self::with_config(StreamConfig::default().with_policy(policy), setup)
    }

    /// Creates a buffered stream from a full configuration.
    pub fn with_config<F>(config: StreamConfig, setup: F) -> Self
    where
        F: FnOnce(Continuation<T>),
    {
        let (stream, continuation) = Self::make_with_config(config);
        setup(continuation);
        stream
    }

    /// Creates a buffered stream and returns its producer handle alongside it.
    pub fn make(policy: BufferingPolicy) -> (Self, Continuation<T>) {
        Self::make_with_config(StreamConfig::default().with_policy(policy))
    }

    /// Like [`make`](Self::make), from a full configuration.
    pub fn make_with_config(config: StreamConfig) -> (Self, Continuation<T>) {
        let storage = Arc::new(Storage::new(&config));
        let continuation = Continuation::new(Arc::clone(&storage));
        let stream = Self {
            source: Source::Buffered {
                storage,
                waiter: None,
            },
        };
        (stream, continuation)
    }

    /// Waits for the next element; `None` marks the end of the sequence.
    ///
    /// The returned future is cancel-safe: if it is dropped before
    /// completing, an element delivered in the meantime is returned by the
    /// next pull.
    pub fn pull(&mut self) -> Pull<'_, T> {
        Pull { stream: self }
    }

    /// Waits for the next element unless `token` is cancelled first.
    ///
    /// For buffered streams, cancellation terminates the stream with
    /// `Termination::Cancelled`. A parked pull resolves to `None`; elements
    /// already buffered are still delivered by this and later pulls.
    ///
    /// For unfolding streams, cancellation runs the cancel callback (at most
    /// once) and drops the producer. A production already running completes
    /// and its element is returned; if the token was cancelled before the
    /// pull started, the pull returns `None` without producing.
    pub fn pull_until<'a>(&'a mut self, token: &'a CancelToken) -> PullUntil<'a, T> {
        PullUntil {
            stream: self,
            token,
            cancelled: token.cancelled(),
            started: false,
            observed: false,
        }
    }

    /// Returns the number of elements waiting in the buffer.
    ///
    /// Always zero for unfolding streams.
    pub fn buffered_count(&self) -> usize {
        match &self.source {
            Source::Buffered { storage, .. } => storage.buffered_len(),
            Source::Unfolding(_) => 0,
        }
    }

    fn poll_pull(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        match &mut self.source {
            Source::Buffered { storage, waiter } => storage.poll_next(cx, waiter),
            Source::Unfolding(unfold) => unfold.poll_next(cx),
        }
    }

    fn observe_cancel(&mut self, before_pull: bool) {
        match &mut self.source {
            Source::Buffered { storage, .. } => {
                storage.cancel();
            }
            Source::Unfolding(unfold) if before_pull => unfold.cancel_now(),
            Source::Unfolding(unfold) => unfold.cancel(),
        }
    }
}

impl<T: Send + 'static> AsyncStream<T> {
    /// Creates a stream that calls `produce` once per pull.
    ///
    /// `produce` returning `None` ends the stream; it is not called again.
    ///
    /// # Example
    ///
    /// ```
    /// use pushstream::AsyncStream;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let mut next = 0;
    /// let mut stream = AsyncStream::unfolding(move || {
    ///     next += 1;
    ///     let current = next;
    ///     async move { (current <= 2).then_some(current) }
    /// });
    ///
    /// assert_eq!(stream.pull().await, Some(1));
    /// assert_eq!(stream.pull().await, Some(2));
    /// assert_eq!(stream.pull().await, None);
    /// # }
    /// ```
    pub fn unfolding<F, Fut>(produce: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        Self::from_unfold(boxed_produce(produce), None)
    }

    /// Like [`unfolding`](Self::unfolding), running `on_cancel` once if a
    /// [`pull_until`](Self::pull_until) observes cancellation before the
    /// producer reaches its end.
    pub fn unfolding_with_cancel<F, Fut, C>(produce: F, on_cancel: C) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        Self::from_unfold(boxed_produce(produce), Some(Box::new(on_cancel)))
    }

    fn from_unfold(produce: Produce<T>, on_cancel: Option<OnCancel>) -> Self {
        Self {
            source: Source::Unfolding(Unfold::new(produce, on_cancel)),
        }
    }
}

fn boxed_produce<T, F, Fut>(mut produce: F) -> Produce<T>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Option<T>> + Send + 'static,
{
    Box::new(move || -> BoxFuture<'static, Option<T>> { Box::pin(produce()) })
}

impl<T> Stream for AsyncStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_pull(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.buffered_count(), None)
    }
}

impl<T> FusedStream for AsyncStream<T> {
    fn is_terminated(&self) -> bool {
        match &self.source {
            Source::Buffered { storage, waiter } => {
                waiter.is_none() && storage.is_terminated() && storage.buffered_len() == 0
            }
            Source::Unfolding(unfold) => unfold.is_exhausted(),
        }
    }
}

impl<T> Drop for AsyncStream<T> {
    fn drop(&mut self) {
        if let Source::Buffered { storage, .. } = &self.source {
            if storage.cancel() {
                debug!("consumer dropped before the stream ended");
            }
        }
    }
}

impl<T> fmt::Debug for AsyncStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Buffered { storage, waiter } => f
                .debug_struct("AsyncStream")
                .field("storage", storage)
                .field("parked", &waiter.is_some())
                .finish(),
            Source::Unfolding(unfold) => f
                .debug_struct("AsyncStream")
                .field("unfolding", &true)
                .field("exhausted", &unfold.is_exhausted())
                .finish(),
        }
    }
}

/// Future returned by [`AsyncStream::pull`].
#[must_use = "futures do nothing unless polled"]
pub struct Pull<'a, T> {
    stream: &'a mut AsyncStream<T>,
}

impl<T> Future for Pull<'_, T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.stream.poll_pull(cx)
    }
}

pin_project! {
    /// Future returned by [`AsyncStream::pull_until`].
    #[must_use = "futures do nothing unless polled"]
    pub struct PullUntil<'a, T> {
        stream: &'a mut AsyncStream<T>,
        token: &'a CancelToken,
        #[pin]
        cancelled: Cancelled<'a>,
        started: bool,
        observed: bool,
    }
}

impl<T> Future for PullUntil<'_, T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        if !*this.started {
            *this.started = true;
            if this.token.is_cancelled() {
                *this.observed = true;
                this.stream.observe_cancel(true);
            }
        }

        if !*this.observed && this.cancelled.poll(cx).is_ready() {
            *this.observed = true;
            this.stream.observe_cancel(false);
        }

        this.stream.poll_pull(cx)
    }
}
