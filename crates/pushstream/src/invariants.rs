//! Debug assertion macros for stream storage invariants.
//!
//! These macros are only active in debug builds (`#[cfg(debug_assertions)]`),
//! so there is zero overhead in release builds.

// =============================================================================
// Bounded buffer
// =============================================================================

/// Assert that a bounded buffer never holds more than its capacity.
///
/// **Invariant**: `len(buffer) ≤ capacity` for `BufferOldest` / `BufferNewest`
///
/// Used in: `Storage::yield_value()` after enqueueing
macro_rules! debug_assert_within_capacity {
    ($len:expr, $capacity:expr) => {
        if let Some(capacity) = $capacity {
            debug_assert!(
                $len <= capacity,
                "buffer bound violated: {} elements buffered, capacity {}",
                $len,
                capacity
            )
        }
    };
}

// =============================================================================
// Single pending consumer
// =============================================================================

/// Assert that no consumer is already parked before registering a new one.
///
/// **Invariant**: at most one pending consumer at any instant
///
/// Used in: `Storage::poll_next()` before storing the waiter
macro_rules! debug_assert_single_waiter {
    ($already_pending:expr) => {
        debug_assert!(
            !$already_pending,
            "single consumer violated: a pending consumer is already registered"
        )
    };
}

/// Assert that a pending consumer never coexists with buffered elements.
///
/// **Invariant**: `pending.is_some() → buffer.is_empty()`
///
/// Used in: `Storage::yield_value()` on the bypass path
macro_rules! debug_assert_bypass_with_empty_buffer {
    ($buffer_len:expr) => {
        debug_assert!(
            $buffer_len == 0,
            "bypass violated: consumer parked while {} elements are buffered",
            $buffer_len
        )
    };
}

// =============================================================================
// End only after termination
// =============================================================================

/// Assert that end-of-sequence is only produced from a terminal lifecycle.
///
/// **Invariant**: `pull → None` implies `lifecycle ∈ {Finished, Cancelled}`
///
/// Used in: `Storage::poll_next()` when returning `None`
macro_rules! debug_assert_end_requires_terminal {
    ($lifecycle:expr) => {
        debug_assert!(
            $lifecycle != crate::storage::Lifecycle::Active,
            "termination violated: end-of-sequence produced while {:?}",
            $lifecycle
        )
    };
}

/// Assert that the termination handler was taken by the terminal transition.
///
/// **Invariant**: the handler fires at most once and is cleared afterward
///
/// Used in: `Storage::terminate()`
macro_rules! debug_assert_handler_cleared {
    ($handler_present:expr) => {
        debug_assert!(
            !$handler_present,
            "termination violated: handler still installed after terminal transition"
        )
    };
}

// =============================================================================
// Drain before end
// =============================================================================

/// Assert that end-of-sequence is only produced once the buffer is empty.
///
/// **Invariant**: terminal state still drains every buffered element first
///
/// Used in: `Storage::poll_next()` when returning `None`
macro_rules! debug_assert_drained {
    ($buffer_len:expr) => {
        debug_assert!(
            $buffer_len == 0,
            "drain violated: end-of-sequence with {} elements still buffered",
            $buffer_len
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_bypass_with_empty_buffer;
pub(crate) use debug_assert_drained;
pub(crate) use debug_assert_end_requires_terminal;
pub(crate) use debug_assert_handler_cleared;
pub(crate) use debug_assert_single_waiter;
pub(crate) use debug_assert_within_capacity;
