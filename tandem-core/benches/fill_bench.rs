//! Fill accounting hot-path cost

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tandem_core::core::Side;
use tandem_core::oms::PositionState;

fn bench_round_trip(c: &mut Criterion) {
    c.bench_function("fill_round_trip", |b| {
        let mut pos = PositionState::new(15.0, 0.25);
        b.iter(|| {
            pos.apply_fill(Side::Buy, black_box(4100.0), 10);
            pos.apply_fill(Side::Sell, black_box(4101.0), 10);
        })
    });
}

fn bench_mark(c: &mut Criterion) {
    c.bench_function("position_mark", |b| {
        let mut pos = PositionState::new(15.0, 0.0);
        pos.apply_fill(Side::Buy, 4100.0, 50);
        let mut px = 4100.0;
        b.iter(|| {
            px += 0.5;
            if px > 4200.0 {
                px = 4100.0;
            }
            pos.mark(black_box(px));
            black_box(pos.unrealized());
        })
    });
}

criterion_group!(benches, bench_round_trip, bench_mark);
criterion_main!(benches);
