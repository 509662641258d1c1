//! Configuration for stream buffering behavior.

use crate::error::StreamError;
use std::num::NonZeroUsize;

/// Rule governing what happens when producers outpace the consumer.
///
/// `yield_value` never waits for the consumer: excess elements are buffered,
/// rejected, or evicted depending on the policy. The policy is fixed once the
/// stream is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferingPolicy {
    /// Buffer every element. No bound is enforced.
    #[default]
    Unbounded,

    /// Keep the oldest `n` elements. When the buffer is full the incoming
    /// element is rejected and handed back as `YieldResult::Dropped`.
    BufferOldest(NonZeroUsize),

    /// Keep the newest `n` elements. When the buffer is full the oldest
    /// buffered element is evicted silently to make room.
    BufferNewest(NonZeroUsize),
}

impl BufferingPolicy {
    /// Bounded policy that rejects new elements once `capacity` are buffered.
    pub fn buffer_oldest(capacity: usize) -> Result<Self, StreamError> {
        NonZeroUsize::new(capacity)
            .map(Self::BufferOldest)
            .ok_or(StreamError::ZeroCapacity)
    }

    /// Bounded policy that evicts the oldest element once `capacity` are buffered.
    pub fn buffer_newest(capacity: usize) -> Result<Self, StreamError> {
        NonZeroUsize::new(capacity)
            .map(Self::BufferNewest)
            .ok_or(StreamError::ZeroCapacity)
    }

    /// Returns the buffer bound, or `None` for [`BufferingPolicy::Unbounded`].
    #[inline]
    pub fn capacity(&self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::BufferOldest(n) | Self::BufferNewest(n) => Some(n.get()),
        }
    }

    /// Returns `true` if the policy enforces a bound.
    #[inline]
    pub fn is_bounded(&self) -> bool {
        self.capacity().is_some()
    }
}

/// Configuration for a buffered [`Stream`](crate::Stream).
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Backpressure policy applied by `Continuation::yield_value`.
    ///
    /// Default: `Unbounded`
    pub policy: BufferingPolicy,

    /// Initial allocation for the element buffer.
    ///
    /// Bounded policies never allocate more than their capacity up front.
    ///
    /// Default: 16
    pub capacity_hint: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            policy: BufferingPolicy::Unbounded,
            capacity_hint: 16,
        }
    }
}

impl StreamConfig {
    /// Creates a configuration that keeps only the latest `capacity` elements.
    ///
    /// Suited to state snapshots where stale values are worthless.
    pub fn latest(capacity: usize) -> Result<Self, StreamError> {
        Ok(Self::default().with_policy(BufferingPolicy::buffer_newest(capacity)?))
    }

    /// Creates a configuration that buffers up to `capacity` elements and
    /// rejects the rest.
    pub fn bounded(capacity: usize) -> Result<Self, StreamError> {
        Ok(Self::default().with_policy(BufferingPolicy::buffer_oldest(capacity)?))
    }

    /// Sets the buffering policy.
    pub fn with_policy(mut self, policy: BufferingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the initial buffer allocation.
    pub fn with_capacity_hint(mut self, hint: usize) -> Self {
        self.capacity_hint = hint;
        self
    }

    /// Initial buffer allocation, clamped to the policy bound.
    pub(crate) fn initial_capacity(&self) -> usize {
        match self.policy.capacity() {
            Some(bound) => self.capacity_hint.min(bound),
            None => self.capacity_hint,
        }
    }
}
