//! Property-based tests for buffering policies and termination.
//!
//! Every scenario here yields before pulling, so no pull ever parks and the
//! futures can be driven with `block_on`.

use futures::executor::block_on;
use proptest::prelude::*;
use pushstream::{AsyncStream, BufferingPolicy, Termination, YieldResult};
use std::sync::{Arc, Mutex};

fn drain<T>(stream: &mut AsyncStream<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Some(item) = block_on(stream.pull()) {
        out.push(item);
    }
    out
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Yield(u16),
    Finish,
    Cancel,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => any::<u16>().prop_map(Op::Yield),
        1 => Just(Op::Finish),
        1 => Just(Op::Cancel),
    ]
}

proptest! {
    /// Unbounded streams deliver every accepted element once, in order, then end.
    #[test]
    fn prop_unbounded_preserves_order(values in prop::collection::vec(any::<u32>(), 0..200)) {
        let (mut stream, continuation) = AsyncStream::make(BufferingPolicy::Unbounded);
        for &v in &values {
            prop_assert_eq!(continuation.yield_value(v), YieldResult::Enqueued { remaining: usize::MAX });
        }
        continuation.finish();

        prop_assert_eq!(drain(&mut stream), values);
        prop_assert_eq!(block_on(stream.pull()), None);
    }

    /// BufferOldest keeps the first `n` elements and hands back the rest.
    #[test]
    fn prop_buffer_oldest_keeps_first(
        values in prop::collection::vec(any::<u32>(), 0..100),
        capacity in 1usize..16,
    ) {
        let policy = BufferingPolicy::buffer_oldest(capacity).unwrap();
        let (mut stream, continuation) = AsyncStream::make(policy);

        for (i, &v) in values.iter().enumerate() {
            let result = continuation.yield_value(v);
            if i < capacity {
                prop_assert_eq!(result, YieldResult::Enqueued { remaining: capacity - i - 1 });
            } else {
                prop_assert_eq!(result, YieldResult::Dropped(v));
            }
        }
        prop_assert!(stream.buffered_count() <= capacity);
        continuation.finish();

        let kept = values.len().min(capacity);
        prop_assert_eq!(drain(&mut stream), values[..kept].to_vec());
    }

    /// BufferNewest keeps the last `n` elements in order and never reports a drop.
    #[test]
    fn prop_buffer_newest_keeps_last(
        values in prop::collection::vec(any::<u32>(), 0..100),
        capacity in 1usize..16,
    ) {
        let policy = BufferingPolicy::buffer_newest(capacity).unwrap();
        let (mut stream, continuation) = AsyncStream::make(policy);

        for &v in &values {
            let result = continuation.yield_value(v);
            prop_assert!(result.is_enqueued());
            prop_assert!(stream.buffered_count() <= capacity);
        }
        continuation.finish();

        let skip = values.len().saturating_sub(capacity);
        prop_assert_eq!(drain(&mut stream), values[skip..].to_vec());
    }

    /// Termination happens once: the handler fires with the first terminal
    /// reason, and only elements yielded before it are delivered.
    #[test]
    fn prop_termination_fires_once(ops in prop::collection::vec(op(), 0..60)) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let (mut stream, continuation) = AsyncStream::make(BufferingPolicy::Unbounded);
        continuation.set_on_termination(move |reason| sink.lock().unwrap().push(reason));

        let mut accepted = Vec::new();
        let mut first_reason = None;
        for op in ops {
            match op {
                Op::Yield(v) => {
                    let result = continuation.yield_value(v);
                    if first_reason.is_none() {
                        prop_assert!(result.is_enqueued());
                        accepted.push(v);
                    } else {
                        prop_assert_eq!(result, YieldResult::Terminated);
                    }
                }
                Op::Finish => {
                    continuation.finish();
                    first_reason.get_or_insert(Termination::Finished);
                }
                Op::Cancel => {
                    let token = pushstream::CancelToken::new();
                    token.cancel();
                    // Observing cancellation also delivers the front element.
                    if let Some(v) = block_on(stream.pull_until(&token)) {
                        prop_assert_eq!(v, accepted.remove(0));
                    }
                    first_reason.get_or_insert(Termination::Cancelled);
                }
            }
        }

        let expected: Vec<_> = first_reason.into_iter().collect();
        prop_assert_eq!(log.lock().unwrap().clone(), expected);

        continuation.finish();
        prop_assert_eq!(drain(&mut stream), accepted);
    }
}
