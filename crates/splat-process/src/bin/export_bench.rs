//! Times every export format on a synthetic multi-source scene.
//!
//! Run with: cargo run --release -p splat-process --bin export_bench

use std::time::Instant;

use glam::{Mat4, Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use splat_serde::{
    ColorAdjustment, ExportOptions, MemorySink, SplatSource, TransformPalette, state,
    write_compact_splat, write_compressed_ply, write_ply, write_viewer,
};

fn synthetic_source(rng: &mut StdRng, num_splats: usize, sh_bands: u32) -> anyhow::Result<SplatSource> {
    let rest_per_channel = ((sh_bands + 1) * (sh_bands + 1) - 1) as usize;

    let means: Vec<f32> = (0..num_splats * 3).map(|_| rng.random_range(-10.0..10.0)).collect();
    let rotations: Vec<f32> = (0..num_splats)
        .flat_map(|_| {
            let q = Quat::from_euler(
                glam::EulerRot::XYZ,
                rng.random_range(-3.1..3.1),
                rng.random_range(-3.1..3.1),
                rng.random_range(-3.1..3.1),
            );
            [q.w, q.x, q.y, q.z]
        })
        .collect();
    let log_scales: Vec<f32> = (0..num_splats * 3).map(|_| rng.random_range(-5.0..0.0)).collect();
    let f_dc: Vec<f32> = (0..num_splats * 3).map(|_| rng.random_range(-1.5..1.5)).collect();
    let opacities: Vec<f32> = (0..num_splats).map(|_| rng.random_range(-4.0..4.0)).collect();
    let rest: Vec<f32> = (0..num_splats * 3 * rest_per_channel)
        .map(|_| rng.random_range(-0.2..0.2))
        .collect();

    let mut palette = TransformPalette::new();
    let lifted = palette.push(Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)));
    let transform = (0..num_splats).map(|i| if i % 4 == 0 { lifted } else { 0 }).collect();
    let states = (0..num_splats)
        .map(|i| if i % 50 == 0 { state::DELETED } else { 0 })
        .collect();

    Ok(
        SplatSource::from_raw(&means, &rotations, &log_scales, &f_dc, &opacities)?
            .with_sh_rest(sh_bands, &rest)?
            .with_state(states)?
            .with_transform_indices(transform)?
            .with_palette(palette)
            .with_world_transform(Mat4::from_rotation_y(0.3))
            .with_color(ColorAdjustment {
                tint: Vec3::new(1.0, 0.9, 0.8),
                ..Default::default()
            }),
    )
}

fn report(name: &str, start: Instant, count: usize, bytes: usize) {
    let elapsed = start.elapsed();
    let throughput = count as f64 / elapsed.as_secs_f64() / 1_000_000.0;
    println!("  {name:<16} {elapsed:>10.2?} ({throughput:.2} M splats/sec, {bytes} bytes)");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let sizes = [10_000, 100_000, 500_000];
    let mut rng = StdRng::seed_from_u64(42);

    println!("Splat Export Benchmark");
    println!("======================");
    println!();

    for &size in &sizes {
        let sources = vec![
            synthetic_source(&mut rng, size / 2, 3)?,
            synthetic_source(&mut rng, size / 2, 3)?,
        ];
        println!("{size} splats over {} sources", sources.len());
        println!("-----------------------------------------");

        let options = ExportOptions::default();

        let mut sink = MemorySink::new();
        let start = Instant::now();
        let count = write_ply(&sources, &options, &mut sink).await?;
        report("ply", start, count, sink.data.len());

        let mut sink = MemorySink::new();
        let start = Instant::now();
        let count = write_compressed_ply(&sources, &mut sink).await?;
        report("compressed ply", start, count, sink.data.len());

        let mut sink = MemorySink::new();
        let start = Instant::now();
        let count = write_compact_splat(&sources, &mut sink).await?;
        report("splat", start, count, sink.data.len());

        let mut sink = MemorySink::new();
        let start = Instant::now();
        let count = write_viewer(&sources, &options.viewer, &mut sink).await?;
        report("html", start, count, sink.data.len());

        println!();
    }

    Ok(())
}
