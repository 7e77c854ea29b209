// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use canopy_handle::{Arena, define_handle};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

define_handle! {
    /// Bench handle with the node-sized split.
    pub struct BenchHandle(u32): index 20, generation 12;
}

#[derive(Clone)]
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u32(&mut self) -> u32 {
        // Numerical Recipes LCG parameters.
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.0 >> 32) as u32
    }

    fn gen_range_usize(&mut self, upper_exclusive: usize) -> usize {
        if upper_exclusive == 0 {
            return 0;
        }
        (self.next_u32() as usize) % upper_exclusive
    }
}

fn build_arena(size: usize) -> Arena<BenchHandle, u64> {
    let mut arena = Arena::new();
    for value in 0..size as u64 {
        arena.allocate(value).expect("within index capacity");
    }
    arena
}

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("arena_allocate");
    for size in [1_000_usize, 10_000, 100_000] {
        group.bench_function(format!("fresh_{size}"), |b| {
            b.iter_batched(
                Arena::<BenchHandle, u64>::new,
                |mut arena| {
                    for value in 0..size as u64 {
                        black_box(arena.allocate(value).expect("within index capacity"));
                    }
                    arena
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("arena_churn");
    for size in [1_000_usize, 10_000] {
        group.bench_function(format!("remove_allocate_{size}"), |b| {
            b.iter_batched(
                || (build_arena(size), Lcg::new(0x5eed)),
                |(mut arena, mut rng)| {
                    for _ in 0..size {
                        let index = rng.gen_range_usize(size);
                        if let Some(handle) = arena.handle_at(index) {
                            arena.remove(handle);
                            arena.allocate(0).expect("slot was just freed");
                        }
                    }
                    arena
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_validity(c: &mut Criterion) {
    let arena = build_arena(100_000);
    let handle = arena.handle_at(50_000).expect("slot is live");
    c.bench_function("arena_is_valid", |b| {
        b.iter(|| black_box(arena.is_valid(black_box(handle))));
    });
}

criterion_group!(benches, bench_allocate, bench_churn, bench_validity);
criterion_main!(benches);
