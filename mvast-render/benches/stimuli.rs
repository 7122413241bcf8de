use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

use mvast_core::{CheckerImage, ColorScheme, Stimulus};
use mvast_render::{fixation_cross, SkiaRenderer};

const WIDTH: u32 = 1920;
const HEIGHT: u32 = 1080;

/// Renderer with both checkerboard slots filled, without touching the filesystem.
fn prepare_renderer() -> SkiaRenderer {
    let mut r = SkiaRenderer::new(WIDTH, HEIGHT);
    for (stimulus, scheme) in [
        (Stimulus::Fixation, ColorScheme::BlueYellow),
        (Stimulus::Checkerboard(CheckerImage::First), ColorScheme::BlueYellow),
        (Stimulus::Checkerboard(CheckerImage::Second), ColorScheme::BlackWhite),
    ] {
        if let Some(frame) = fixation_cross(WIDTH, HEIGHT, scheme) {
            let _ = r.insert(stimulus, frame);
        }
    }
    r
}

pub fn bench_draw_into(c: &mut Criterion) {
    let mut group = c.benchmark_group("draw_into");
    group
        .sample_size(50)
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(2));

    let renderer = prepare_renderer();
    let mut frame = vec![0u8; (WIDTH * HEIGHT * 4) as usize];

    group.bench_function("checkerboard_flip", |b| {
        let mut visible = 0;
        b.iter(|| {
            visible ^= 1;
            let stimulus = Stimulus::Checkerboard(CheckerImage::from_index(visible));
            let _ = renderer.draw_into(black_box(stimulus), &mut frame);
        });
    });

    group.finish();
}

pub fn bench_pre_render(c: &mut Criterion) {
    c.bench_function("fixation_cross_1080p", |b| {
        b.iter(|| fixation_cross(black_box(WIDTH), black_box(HEIGHT), ColorScheme::BlueYellow));
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .confidence_level(0.95)
        .noise_threshold(0.02)
        .significance_level(0.05);
    targets = bench_draw_into, bench_pre_render
}

criterion_main!(benches);
