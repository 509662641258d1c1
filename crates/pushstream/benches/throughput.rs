use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pushstream::{AsyncStream, BufferingPolicy};
use std::thread;

const MSG_COUNT: u64 = 100_000;

fn bench_policies(c: &mut Criterion) {
    let mut group = c.benchmark_group("yield_then_drain");
    group.throughput(Throughput::Elements(MSG_COUNT));

    let policies = [
        ("unbounded", BufferingPolicy::Unbounded),
        ("oldest_1024", BufferingPolicy::buffer_oldest(1024).unwrap()),
        ("newest_1024", BufferingPolicy::buffer_newest(1024).unwrap()),
    ];

    for (name, policy) in policies {
        group.bench_with_input(BenchmarkId::from_parameter(name), &policy, |b, &policy| {
            b.iter(|| {
                let (mut stream, continuation) = AsyncStream::make(policy);
                for i in 0..MSG_COUNT {
                    black_box(continuation.yield_value(i));
                }
                continuation.finish();

                futures::executor::block_on(async {
                    while let Some(item) = stream.pull().await {
                        black_box(item);
                    }
                });
            });
        });
    }

    group.finish();
}

fn bench_cross_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_thread");
    group.throughput(Throughput::Elements(MSG_COUNT));

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    for producers in [1u64, 4] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}P_1C", producers)),
            &producers,
            |b, &n| {
                b.to_async(&rt).iter(|| async move {
                    let (mut stream, continuation) = AsyncStream::make(BufferingPolicy::Unbounded);

                    let handles: Vec<_> = (0..n)
                        .map(|_| {
                            let tx = continuation.clone();
                            thread::spawn(move || {
                                for i in 0..MSG_COUNT / n {
                                    tx.yield_value(i);
                                }
                            })
                        })
                        .collect();
                    drop(continuation);

                    let mut count = 0u64;
                    while let Some(item) = stream.pull().await {
                        black_box(item);
                        count += 1;
                    }
                    assert_eq!(count, (MSG_COUNT / n) * n);

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_policies, bench_cross_thread);
criterion_main!(benches);
