//! Error types for pushstream operations.

use thiserror::Error;

/// Errors that can occur when configuring or feeding a stream.
///
/// Backpressure outcomes are not errors: a rejected element comes back as
/// [`YieldResult::Dropped`](crate::YieldResult::Dropped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    /// A bounded buffering policy was requested with a capacity of zero.
    #[error("buffer capacity must be greater than zero")]
    ZeroCapacity,

    /// The stream has already finished or been cancelled.
    #[error("stream has terminated")]
    Terminated,
}

impl StreamError {
    /// Returns `true` if this error indicates the stream is permanently unusable.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}
