//! Rope performance benchmarks.

#![allow(clippy::semicolon_if_nothing_returned)]

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use opentui_text::text::{Rope, RopeItem};
use std::hint::black_box;

#[derive(Clone, Copy, Debug)]
struct Span(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Boundary;

impl RopeItem for Span {
    type Summary = u64;
    type Marker = Boundary;

    fn measure(&self) -> u64 {
        u64::from(self.0)
    }

    fn marker(&self) -> Option<Boundary> {
        (self.0 % 16 == 0).then_some(Boundary)
    }

    fn empty() -> Self {
        Self(0)
    }
}

fn build(n: u32) -> Rope<Span> {
    Rope::from_vec((0..n).map(|i| Span(i % 64 + 1)).collect()).unwrap()
}

fn rope_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("rope_construction");
    for n in [1_000u32, 100_000] {
        let items: Vec<Span> = (0..n).map(|i| Span(i % 64 + 1)).collect();
        group.bench_with_input(BenchmarkId::new("from_slice", n), &items, |b, items| {
            b.iter(|| Rope::from_slice(black_box(items)));
        });
    }
    group.finish();
}

fn rope_inserts(c: &mut Criterion) {
    let mut group = c.benchmark_group("rope_insert_run");

    // Typing 1000 items at one spot: positional descent every time versus a
    // finger that stays at the edit point.
    group.bench_function("positional", |b| {
        b.iter_batched(
            || build(100_000),
            |mut rope| {
                for i in 0..1000 {
                    rope.insert(50_000 + i, Span(3)).unwrap();
                }
                rope
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("finger", |b| {
        b.iter_batched(
            || build(100_000),
            |mut rope| {
                let mut finger = rope.make_finger(50_000).unwrap();
                for _ in 0..1000 {
                    rope.insert_at_finger(&mut finger, Span(3)).unwrap();
                }
                rope
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn rope_split_concat(c: &mut Criterion) {
    c.bench_function("rope_split_concat_100k", |b| {
        b.iter_batched(
            || build(100_000),
            |mut rope| {
                let mut right = rope.split(black_box(37_000)).unwrap();
                rope.concat(&mut right);
                rope
            },
            BatchSize::LargeInput,
        );
    });

    c.bench_function("rope_delete_range_100k", |b| {
        b.iter_batched(
            || build(100_000),
            |mut rope| {
                rope.delete_range(black_box(20_000), black_box(60_000)).unwrap();
                rope
            },
            BatchSize::LargeInput,
        );
    });
}

fn rope_queries(c: &mut Criterion) {
    let mut rope = build(100_000);
    let total = rope.summary();

    c.bench_function("rope_find_by", |b| {
        b.iter(|| rope.find_by(black_box(total / 3), |s| *s));
    });

    c.bench_function("rope_prefix_summary", |b| {
        b.iter(|| rope.prefix_summary(black_box(73_000)));
    });

    c.bench_function("rope_rebuild_marker_index", |b| {
        b.iter_batched(
            || build(100_000),
            |mut rope| {
                rope.rebuild_marker_index();
                rope
            },
            BatchSize::LargeInput,
        );
    });

    rope.rebuild_marker_index();
    c.bench_function("rope_get_marker", |b| {
        b.iter(|| rope.get_marker(Boundary, black_box(1_000)));
    });

    c.bench_function("rope_iter_sum", |b| {
        b.iter(|| rope.iter().map(|s| u64::from(s.0)).sum::<u64>());
    });
}

criterion_group!(
    benches,
    rope_construction,
    rope_inserts,
    rope_split_concat,
    rope_queries
);
criterion_main!(benches);
