//! Benchmarks for the settlement hot path: board generation and payout math.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use stakehouse::games::generator::{draw_crash_point, place_mines, speedrun_multiplier_at};
use stakehouse::games::payout::{compute_payout, mines_multiplier, PayoutEvent};

fn bench_mines_generation(c: &mut Criterion) {
    c.bench_function("place_mines_5", |b| {
        let mut rng = StdRng::seed_from_u64(1);
        b.iter(|| black_box(place_mines(&mut rng, 5)));
    });

    // Worst case for rejection sampling: nearly every draw collides.
    c.bench_function("place_mines_24", |b| {
        let mut rng = StdRng::seed_from_u64(2);
        b.iter(|| black_box(place_mines(&mut rng, 24)));
    });
}

fn bench_payout(c: &mut Criterion) {
    c.bench_function("mines_multiplier_sweep", |b| {
        b.iter(|| {
            for gems in 0..=15u8 {
                black_box(mines_multiplier(10, gems));
            }
        });
    });

    c.bench_function("compute_payout_mines_cashout", |b| {
        b.iter(|| {
            black_box(compute_payout(
                black_box(500),
                PayoutEvent::MinesCashout {
                    mine_count: 10,
                    gems_found: 7,
                },
            ))
        });
    });
}

fn bench_speedrun(c: &mut Criterion) {
    c.bench_function("crash_point_draw", |b| {
        let mut rng = StdRng::seed_from_u64(3);
        b.iter(|| black_box(draw_crash_point(&mut rng)));
    });

    c.bench_function("speedrun_multiplier_at_120", |b| {
        b.iter(|| black_box(speedrun_multiplier_at(black_box(120))));
    });
}

criterion_group!(benches, bench_mines_generation, bench_payout, bench_speedrun);
criterion_main!(benches);
