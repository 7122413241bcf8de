use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use mvast_timing::{Clock, FlickerEngine, PhaseScheduler, SimulatedClock, FLICKER_POLL_INTERVAL};
use std::time::Duration;

const PHASE: Duration = Duration::from_secs(20);

pub fn bench_flicker(c: &mut Criterion) {
    let mut g = c.benchmark_group("flicker");
    g.sample_size(30);

    g.bench_function("tick_no_flip", |b| {
        let mut engine = FlickerEngine::new(0, PHASE, 8.0);
        b.iter(|| engine.tick(black_box(1_000)))
    });

    g.bench_function("tick_late_by_many_frames", |b| {
        b.iter_batched(
            || FlickerEngine::new(0, PHASE, 8.0),
            |mut engine| engine.tick(black_box(19_900_000_000)),
            BatchSize::SmallInput,
        )
    });

    // whole checkerboard phase at the flicker poll rate on a virtual clock
    g.bench_function("simulated_phase", |b| {
        b.iter_batched(
            || {
                let clock = SimulatedClock::new();
                let engine = FlickerEngine::new(clock.now(), PHASE, 8.0);
                let scheduler = PhaseScheduler::new(clock.now(), PHASE);
                (clock, engine, scheduler)
            },
            |(clock, mut engine, scheduler)| {
                loop {
                    let now = clock.now();
                    engine.tick(now);
                    if scheduler.is_elapsed(now) {
                        break;
                    }
                    let wake = scheduler
                        .next_wakeup(now, FLICKER_POLL_INTERVAL)
                        .min(engine.next_flip_deadline());
                    clock.sleep_until(wake);
                }
                engine.report()
            },
            BatchSize::SmallInput,
        )
    });

    g.finish();
}

criterion_group!(benches, bench_flicker);
criterion_main!(benches);
