//! Streams driven by an async produce-next-or-end closure.

use std::task::{Context, Poll};
use tracing::debug;

use futures_core::future::BoxFuture;
use futures_core::Future;
use futures_util::ready;

pub(crate) type Produce<T> = Box<dyn FnMut() -> BoxFuture<'static, Option<T>> + Send>;
pub(crate) type OnCancel = Box<dyn FnOnce() + Send>;

/// Pull state for an unfolding stream.
///
/// There is no buffer: each pull runs the producer once. A production that is
/// interrupted by a dropped pull stays in `in_flight` and is resumed by the
/// next pull, so its element is not lost.
pub(crate) struct Unfold<T> {
    produce: Option<Produce<T>>,
    on_cancel: Option<OnCancel>,
    in_flight: Option<BoxFuture<'static, Option<T>>>,
}

impl<T> Unfold<T> {
    pub(crate) fn new(produce: Produce<T>, on_cancel: Option<OnCancel>) -> Self {
        Self {
            produce: Some(produce),
            on_cancel,
            in_flight: None,
        }
    }

    pub(crate) fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        if self.in_flight.is_none() {
            match self.produce.as_mut() {
                Some(produce) => self.in_flight = Some(produce()),
                None => return Poll::Ready(None),
            }
        }
        let Some(fut) = self.in_flight.as_mut() else {
            return Poll::Ready(None);
        };

        let produced = ready!(fut.as_mut().poll(cx));
        self.in_flight = None;
        if produced.is_none() {
            // A completed stream has nothing left to cancel.
            debug!("unfolding producer reached the end");
            self.produce = None;
            self.on_cancel = None;
        }
        Poll::Ready(produced)
    }

    /// Observes cancellation: drops the producer and runs the cancel callback
    /// if it has not run yet. A production already in flight keeps running.
    pub(crate) fn cancel(&mut self) {
        self.produce = None;
        if let Some(on_cancel) = self.on_cancel.take() {
            debug!("unfolding stream cancelled");
            on_cancel();
        }
    }

    /// Like [`cancel`](Self::cancel), but also abandons any in-flight production.
    pub(crate) fn cancel_now(&mut self) {
        self.cancel();
        self.in_flight = None;
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.produce.is_none() && self.in_flight.is_none()
    }
}
