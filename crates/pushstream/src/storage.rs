//! Shared rendezvous state between producers and the single consumer.
//!
//! Every producer call (`yield_value`, `finish`, handler updates) and every
//! consumer poll funnels through one mutex. The consumer parks on a tokio
//! `oneshot` that a later yield or termination resolves exactly once.

use crate::config::{BufferingPolicy, StreamConfig};
use crate::continuation::YieldResult;
#[cfg(debug_assertions)]
use crate::invariants::{
    debug_assert_bypass_with_empty_buffer, debug_assert_drained,
    debug_assert_end_requires_terminal, debug_assert_handler_cleared, debug_assert_single_waiter,
    debug_assert_within_capacity,
};
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

use futures_core::Future;
use futures_util::ready;

/// Why a stream stopped producing elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// A producer called `finish()`, or every continuation was dropped.
    Finished,
    /// The consumer was cancelled or dropped.
    Cancelled,
}

/// Callback invoked once when the stream leaves the active state.
pub type TerminationHandler = Arc<dyn Fn(Termination) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Active,
    Finished,
    Cancelled,
}

impl Lifecycle {
    #[inline]
    fn is_terminal(self) -> bool {
        self != Self::Active
    }
}

impl From<Termination> for Lifecycle {
    fn from(reason: Termination) -> Self {
        match reason {
            Termination::Finished => Self::Finished,
            Termination::Cancelled => Self::Cancelled,
        }
    }
}

/// Receiving half of a parked consumer.
pub(crate) type Waiter<T> = oneshot::Receiver<Option<T>>;

struct State<T> {
    buffer: VecDeque<T>,
    /// Resolves the parked consumer with an element or end-of-sequence.
    pending: Option<oneshot::Sender<Option<T>>>,
    lifecycle: Lifecycle,
    on_termination: Option<TerminationHandler>,
}

pub(crate) struct Storage<T> {
    state: Mutex<State<T>>,
    policy: BufferingPolicy,
    /// Set for the whole window in which a pull is outstanding.
    pulling: AtomicBool,
    /// Live `Continuation` handles; the last one to drop finishes the stream.
    producers: AtomicUsize,
}

impl<T> Storage<T> {
    pub(crate) fn new(config: &StreamConfig) -> Self {
        Self {
            state: Mutex::new(State {
                buffer: VecDeque::with_capacity(config.initial_capacity()),
                pending: None,
                lifecycle: Lifecycle::Active,
                on_termination: None,
            }),
            policy: config.policy,
            pulling: AtomicBool::new(false),
            producers: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // Handlers and element drops run outside the lock, so a poisoned
        // guard still holds consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub(crate) fn policy(&self) -> BufferingPolicy {
        self.policy
    }

    /// Hands one element to the consumer or buffers it per policy.
    pub(crate) fn yield_value(&self, value: T) -> YieldResult<T> {
        let mut evicted = None;
        let mut state = self.lock();

        if state.lifecycle.is_terminal() {
            return YieldResult::Terminated;
        }

        if let Some(waiter) = state.pending.take() {
            #[cfg(debug_assertions)]
            debug_assert_bypass_with_empty_buffer!(state.buffer.len());
            drop(state);

            trace!("delivering element directly to parked consumer");
            if waiter.send(Some(value)).is_err() {
                trace!("parked consumer went away before delivery");
            }
            return YieldResult::Enqueued {
                remaining: self.policy.capacity().unwrap_or(usize::MAX),
            };
        }

        let len = state.buffer.len();
        let result = match self.policy {
            BufferingPolicy::Unbounded => {
                state.buffer.push_back(value);
                YieldResult::Enqueued {
                    remaining: usize::MAX,
                }
            }
            BufferingPolicy::BufferOldest(capacity) => {
                if len < capacity.get() {
                    state.buffer.push_back(value);
                    YieldResult::Enqueued {
                        remaining: capacity.get() - len - 1,
                    }
                } else {
                    YieldResult::Dropped(value)
                }
            }
            BufferingPolicy::BufferNewest(capacity) => {
                if len >= capacity.get() {
                    evicted = state.buffer.pop_front();
                }
                state.buffer.push_back(value);
                YieldResult::Enqueued {
                    remaining: capacity.get() - state.buffer.len(),
                }
            }
        };

        #[cfg(debug_assertions)]
        debug_assert_within_capacity!(state.buffer.len(), self.policy.capacity());

        // Evicted elements run their destructor outside the lock.
        drop(state);
        drop(evicted);
        result
    }

    /// Transitions `Active → Finished`. Returns `false` if already terminal.
    pub(crate) fn finish(&self) -> bool {
        self.terminate(Termination::Finished)
    }

    /// Transitions `Active → Cancelled`. Returns `false` if already terminal.
    pub(crate) fn cancel(&self) -> bool {
        self.terminate(Termination::Cancelled)
    }

    fn terminate(&self, reason: Termination) -> bool {
        let (handler, waiter) = {
            let mut state = self.lock();
            if state.lifecycle.is_terminal() {
                return false;
            }
            state.lifecycle = reason.into();
            let taken = (state.on_termination.take(), state.pending.take());

            #[cfg(debug_assertions)]
            debug_assert_handler_cleared!(state.on_termination.is_some());

            taken
        };

        debug!(
            ?reason,
            resumes_consumer = waiter.is_some(),
            "stream left the active state"
        );

        // The handler observes termination before the consumer sees the end.
        if let Some(handler) = handler {
            handler(reason);
        }
        if let Some(waiter) = waiter {
            let _ = waiter.send(None);
        }
        true
    }

    /// Polls for the next element, parking the consumer in `waiter` if none
    /// is available yet.
    ///
    /// # Panics
    ///
    /// Panics if another pull is already outstanding on this storage.
    pub(crate) fn poll_next(
        &self,
        cx: &mut Context<'_>,
        waiter: &mut Option<Waiter<T>>,
    ) -> Poll<Option<T>> {
        if let Some(rx) = waiter.as_mut() {
            let delivered = ready!(Pin::new(rx).poll(cx));
            *waiter = None;
            self.release_pull();
            return Poll::Ready(delivered.ok().flatten());
        }

        self.acquire_pull();
        let mut state = self.lock();

        if let Some(value) = state.buffer.pop_front() {
            drop(state);
            self.release_pull();
            return Poll::Ready(Some(value));
        }

        if state.lifecycle.is_terminal() {
            #[cfg(debug_assertions)]
            {
                debug_assert_drained!(state.buffer.len());
                debug_assert_end_requires_terminal!(state.lifecycle);
            }
            drop(state);
            self.release_pull();
            return Poll::Ready(None);
        }

        #[cfg(debug_assertions)]
        debug_assert_single_waiter!(state.pending.is_some());

        let (tx, mut rx) = oneshot::channel();
        state.pending = Some(tx);
        drop(state);
        trace!("consumer parked awaiting next element");

        // A producer may already have resolved the waiter since the unlock.
        match Pin::new(&mut rx).poll(cx) {
            Poll::Ready(delivered) => {
                self.release_pull();
                Poll::Ready(delivered.ok().flatten())
            }
            Poll::Pending => {
                *waiter = Some(rx);
                Poll::Pending
            }
        }
    }

    fn acquire_pull(&self) {
        if self.pulling.swap(true, Ordering::AcqRel) {
            error!("overlapping pull on a single-consumer stream");
            panic!("concurrent pull detected: a stream supports exactly one outstanding pull");
        }
    }

    #[inline]
    fn release_pull(&self) {
        self.pulling.store(false, Ordering::Release);
    }

    /// Installs, replaces, or clears the termination handler.
    ///
    /// Once the stream is terminal the handler is discarded and never runs.
    pub(crate) fn set_on_termination(&self, handler: Option<TerminationHandler>) {
        let mut state = self.lock();
        let replaced = if state.lifecycle.is_terminal() {
            handler
        } else {
            std::mem::replace(&mut state.on_termination, handler)
        };
        drop(state);
        drop(replaced);
    }

    pub(crate) fn on_termination(&self) -> Option<TerminationHandler> {
        self.lock().on_termination.clone()
    }

    pub(crate) fn buffered_len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.lock().lifecycle.is_terminal()
    }

    #[inline]
    pub(crate) fn retain_producer(&self) {
        self.producers.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns `true` if this was the last live producer.
    #[inline]
    pub(crate) fn release_producer(&self) -> bool {
        self.producers.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

impl<T> fmt::Debug for Storage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Storage")
            .field("policy", &self.policy)
            .field("buffered", &state.buffer.len())
            .field("pending_consumer", &state.pending.is_some())
            .field("lifecycle", &state.lifecycle)
            .field("producers", &self.producers.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::task::noop_waker;

    fn storage(policy: BufferingPolicy) -> Storage<u32> {
        Storage::new(&StreamConfig::default().with_policy(policy))
    }

    #[test]
    fn yield_to_parked_consumer_bypasses_buffer() {
        let storage = storage(BufferingPolicy::Unbounded);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut waiter = None;

        assert!(storage.poll_next(&mut cx, &mut waiter).is_pending());
        assert!(waiter.is_some());

        assert_eq!(
            storage.yield_value(5),
            YieldResult::Enqueued {
                remaining: usize::MAX
            }
        );
        assert_eq!(storage.buffered_len(), 0);

        assert_eq!(storage.poll_next(&mut cx, &mut waiter), Poll::Ready(Some(5)));
        assert!(waiter.is_none());
    }

    #[test]
    fn bypass_reports_bounded_capacity_as_remaining() {
        let storage = storage(BufferingPolicy::buffer_oldest(3).unwrap());
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut waiter = None;

        assert!(storage.poll_next(&mut cx, &mut waiter).is_pending());
        assert_eq!(storage.yield_value(1), YieldResult::Enqueued { remaining: 3 });
    }

    #[test]
    fn finish_resumes_parked_consumer_with_end() {
        let storage = storage(BufferingPolicy::Unbounded);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut waiter = None;

        assert!(storage.poll_next(&mut cx, &mut waiter).is_pending());
        assert!(storage.finish());
        assert_eq!(storage.poll_next(&mut cx, &mut waiter), Poll::Ready(None));
    }

    #[test]
    fn buffered_elements_drain_after_termination() {
        let storage = storage(BufferingPolicy::Unbounded);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut waiter = None;

        storage.yield_value(1);
        storage.yield_value(2);
        assert!(storage.cancel());
        assert_eq!(storage.yield_value(3), YieldResult::Terminated);

        assert_eq!(storage.poll_next(&mut cx, &mut waiter), Poll::Ready(Some(1)));
        assert_eq!(storage.poll_next(&mut cx, &mut waiter), Poll::Ready(Some(2)));
        assert_eq!(storage.poll_next(&mut cx, &mut waiter), Poll::Ready(None));
    }

    #[test]
    fn first_termination_wins() {
        let storage = storage(BufferingPolicy::Unbounded);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        storage.set_on_termination(Some(Arc::new(move |reason: Termination| {
            assert_eq!(reason, Termination::Cancelled);
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        assert!(storage.cancel());
        assert!(!storage.finish());
        assert!(!storage.cancel());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(storage.on_termination().is_none());
    }

    #[test]
    fn newest_policy_evicts_front() {
        let storage = storage(BufferingPolicy::buffer_newest(2).unwrap());
        assert_eq!(storage.yield_value(1), YieldResult::Enqueued { remaining: 1 });
        assert_eq!(storage.yield_value(2), YieldResult::Enqueued { remaining: 0 });
        assert_eq!(storage.yield_value(3), YieldResult::Enqueued { remaining: 0 });
        assert_eq!(storage.buffered_len(), 2);

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut waiter = None;
        assert_eq!(storage.poll_next(&mut cx, &mut waiter), Poll::Ready(Some(2)));
        assert_eq!(storage.poll_next(&mut cx, &mut waiter), Poll::Ready(Some(3)));
    }

    #[test]
    fn producer_count_tracks_last_release() {
        let storage = storage(BufferingPolicy::Unbounded);
        storage.retain_producer();
        storage.retain_producer();
        assert!(!storage.release_producer());
        assert!(storage.release_producer());
    }

    #[test]
    #[should_panic(expected = "concurrent pull detected")]
    fn overlapping_pull_is_fatal() {
        let storage = storage(BufferingPolicy::Unbounded);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut first = None;
        let mut second = None;

        assert!(storage.poll_next(&mut cx, &mut first).is_pending());
        let _ = storage.poll_next(&mut cx, &mut second);
    }
}
