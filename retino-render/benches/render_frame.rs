use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use retino_core::{BarPair, FrameCommands, MonitorGeometry, Orientation, Polarity, SweepPhase, MASK_GREY};
use retino_experiment::CheckerboardTiling;
use retino_render::SkiaRenderer;

fn harness() -> (SkiaRenderer, CheckerboardTiling, Vec<u8>) {
    let geometry = MonitorGeometry::default();
    let tiling = CheckerboardTiling::build(&geometry, &Default::default()).expect("tiling");
    let (w, h) = geometry.resolution;
    let r = SkiaRenderer::with_tiling(w, h, &tiling).expect("renderer");
    let fb = vec![0u8; (w * h * 4) as usize];
    (r, tiling, fb)
}

pub fn bench_sweep_frames(c: &mut Criterion) {
    let mut g = c.benchmark_group("render_frame");
    g.sample_size(40);

    g.bench_function("vertical_bar", |b| {
        b.iter_batched(
            harness,
            |(mut r, tiling, mut fb)| {
                let cmds = FrameCommands {
                    frame: 120,
                    phase: SweepPhase::LeftToRight,
                    polarity: Polarity::Normal,
                    bars: Some(BarPair {
                        orientation: Orientation::Vertical,
                        leading: 840,
                        trailing: 840 - 1720,
                        fill: MASK_GREY,
                    }),
                };
                black_box(r.render_frame(&tiling, &cmds, &mut fb))
            },
            BatchSize::LargeInput,
        )
    });

    g.bench_function("horizontal_bar", |b| {
        b.iter_batched(
            harness,
            |(mut r, tiling, mut fb)| {
                let cmds = FrameCommands {
                    frame: 600,
                    phase: SweepPhase::BottomToTop,
                    polarity: Polarity::Inverted,
                    bars: Some(BarPair {
                        orientation: Orientation::Horizontal,
                        leading: 560,
                        trailing: 560 - 1020,
                        fill: MASK_GREY,
                    }),
                };
                black_box(r.render_frame(&tiling, &cmds, &mut fb))
            },
            BatchSize::LargeInput,
        )
    });

    g.finish();
}

criterion_group!(benches, bench_sweep_frames);
criterion_main!(benches);
