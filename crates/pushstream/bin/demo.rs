//! Demonstration of pushstream features.
//!
//! Run with: `cargo run -p pushstream --bin demo`

use futures_util::SinkExt;
use pushstream::{
    AsyncStream, BufferingPolicy, CancelToken, StreamConfig, StreamExt, YieldResult,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== pushstream Demo ===\n");

    demo_basic_usage().await?;
    demo_callback_bridge().await?;
    demo_buffering_policies().await?;
    demo_sink_trait().await?;
    demo_cancellation().await?;
    demo_unfolding().await?;

    println!("\n=== All demos completed successfully! ===");
    Ok(())
}

/// Demo 1: Setup closure wiring a producer before the first pull
async fn demo_basic_usage() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 1: Basic Usage ---");

    let mut stream = AsyncStream::new(BufferingPolicy::Unbounded, |continuation| {
        // The producer task owns the continuation; dropping it finishes the stream.
        tokio::spawn(async move {
            for i in 0..5u64 {
                continuation.yield_value(i);
                println!("  Yielded: {}", i);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });
    });

    while let Some(item) = stream.pull().await {
        println!("  Received: {}", item);
    }

    println!("  ✓ Basic usage complete\n");
    Ok(())
}

/// Demo 2: Bridging a callback-style event source running on its own thread
async fn demo_callback_bridge() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 2: Callback Bridge ---");

    struct Ticker {
        stopped: Arc<AtomicBool>,
    }

    impl Ticker {
        fn start<F: Fn(u64) + Send + 'static>(on_tick: F) -> Self {
            let stopped = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&stopped);
            thread::spawn(move || {
                let mut tick = 0;
                while !flag.load(Ordering::Acquire) {
                    on_tick(tick);
                    tick += 1;
                    thread::sleep(Duration::from_millis(2));
                }
            });
            Self { stopped }
        }

        fn stop(&self) {
            self.stopped.store(true, Ordering::Release);
        }
    }

    let mut stream = AsyncStream::new(BufferingPolicy::Unbounded, |continuation| {
        let producer = continuation.clone();
        let ticker = Ticker::start(move |tick| {
            producer.yield_value(tick);
        });
        // Stop the external source once the consumer goes away.
        continuation.set_on_termination(move |reason| {
            println!("  Ticker stopped ({:?})", reason);
            ticker.stop();
        });
    });

    let mut received = Vec::new();
    while let Some(tick) = stream.pull().await {
        received.push(tick);
        if received.len() == 5 {
            break;
        }
    }
    drop(stream);

    println!("  Received ticks: {:?}", received);
    println!("  ✓ Callback bridge complete\n");
    Ok(())
}

/// Demo 3: Buffering policies under a slow consumer
async fn demo_buffering_policies() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 3: Buffering Policies ---");

    for config in [
        StreamConfig::default(),
        StreamConfig::bounded(4)?,
        StreamConfig::latest(4)?,
    ] {
        let policy = config.policy;
        let (stream, continuation) = AsyncStream::make_with_config(config);

        let mut dropped = 0;
        for i in 0..10u32 {
            if let YieldResult::Dropped(_) = continuation.yield_value(i) {
                dropped += 1;
            }
        }
        continuation.finish();

        let received: Vec<_> = stream.collect().await;
        println!(
            "  {:?}: received {:?}, {} rejected",
            policy, received, dropped
        );
    }

    println!("  ✓ Buffering policies complete\n");
    Ok(())
}

/// Demo 4: Using the Sink trait
async fn demo_sink_trait() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 4: Sink Trait ---");

    let (stream, mut continuation) = AsyncStream::<&str>::make(BufferingPolicy::Unbounded);

    continuation.send("alpha").await?;
    continuation.send("beta").await?;
    continuation.close().await?;
    println!("  Sent 2 items and closed the sink");

    match continuation.send("gamma").await {
        Ok(()) => println!("  Unexpected: send after close succeeded"),
        Err(e) => println!("  Send after close rejected: {}", e),
    }

    let received: Vec<_> = stream.collect().await;
    println!("  Received via Stream: {:?}", received);
    println!("  ✓ Sink trait demo complete\n");
    Ok(())
}

/// Demo 5: Cooperative cancellation with CancelToken
async fn demo_cancellation() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 5: Cancellation ---");

    let (mut stream, continuation) = AsyncStream::<u64>::make(BufferingPolicy::Unbounded);
    continuation.set_on_termination(|reason| {
        println!("  Termination handler: {:?}", reason);
    });

    let token = CancelToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        println!("  Cancelling the consumer...");
        canceller.cancel();
    });

    // Nothing is ever yielded, so the pull parks until cancellation.
    let result = stream.pull_until(&token).await;
    println!("  Parked pull resolved to {:?}", result);

    let late = continuation.yield_value(1);
    println!("  Yield after cancellation: {:?}", late);
    assert_eq!(late, YieldResult::Terminated);

    println!("  ✓ Cancellation complete\n");
    Ok(())
}

/// Demo 6: Unfolding stream polling an async source
async fn demo_unfolding() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 6: Unfolding ---");

    let polls = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&polls);
    let mut stream = AsyncStream::unfolding_with_cancel(
        move || {
            let n = counter.fetch_add(1, Ordering::Relaxed);
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Some(n * n)
            }
        },
        || println!("  Unfolding producer cancelled"),
    );

    let token = CancelToken::new();
    let mut squares = Vec::new();
    while let Some(square) = stream.pull_until(&token).await {
        squares.push(square);
        if squares.len() == 4 {
            token.cancel();
        }
    }

    println!(
        "  Squares: {:?} after {} productions",
        squares,
        polls.load(Ordering::Relaxed)
    );
    println!("  ✓ Unfolding complete\n");
    Ok(())
}
