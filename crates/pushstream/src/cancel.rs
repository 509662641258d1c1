//! Cooperative cancellation for pulls.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use pin_project_lite::pin_project;

struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cloneable signal for cancelling the consumer side of a stream.
///
/// Pass the token to [`Stream::pull_until`](crate::Stream::pull_until).
/// Cancelling a pull that is parked resolves it to `None` and terminates the
/// stream with [`Termination::Cancelled`](crate::Termination::Cancelled).
///
/// Multiple clones share the same state: only the first `cancel()` has an
/// effect, subsequent calls are no-ops.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Requests cancellation and wakes every task awaiting [`cancelled`](Self::cancelled).
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::AcqRel) {
            self.state.notify.notify_waiters();
        }
    }

    /// Returns `true` once cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Returns a future that completes once cancellation has been requested.
    pub fn cancelled(&self) -> Cancelled<'_> {
        Cancelled {
            token: self,
            notified: self.state.notify.notified(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

pin_project! {
    /// Future returned by [`CancelToken::cancelled`].
    #[must_use = "futures do nothing unless polled"]
    pub struct Cancelled<'a> {
        token: &'a CancelToken,
        // Created together with the future, so a `notify_waiters` issued
        // before the first poll is still observed.
        #[pin]
        notified: Notified<'a>,
    }
}

impl Future for Cancelled<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.project();
        if this.token.is_cancelled() {
            return Poll::Ready(());
        }
        // `notify_waiters` is only issued by `cancel`.
        this.notified.poll(cx)
    }
}
