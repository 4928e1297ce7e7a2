//! Basic benchmarks for the `shared_handle` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use shared_handle::SharedHandle;

criterion_group!(benches, entrypoint);
criterion_main!(benches);

type TestItem = [u64; 4];
const TEST_VALUE: TestItem = [1, 2, 3, 4];

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared_handle_basic");

    group.bench_function("new_drop", |b| {
        b.iter(|| drop(black_box(SharedHandle::new(black_box(TEST_VALUE)))));
    });

    group.bench_function("clone_drop", |b| {
        let handle = SharedHandle::new(TEST_VALUE);

        b.iter(|| drop(black_box(handle.clone())));
    });

    group.bench_function("assign_other", |b| {
        let source = SharedHandle::new(TEST_VALUE);

        b.iter_batched_ref(
            || SharedHandle::new(TEST_VALUE),
            |target| target.assign(black_box(&source)),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("reset_with", |b| {
        let mut handle = SharedHandle::new(TEST_VALUE);

        b.iter(|| handle.reset_with(black_box(TEST_VALUE)));
    });

    group.finish();
}
