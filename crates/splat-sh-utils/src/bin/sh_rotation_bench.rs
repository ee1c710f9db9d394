//! Throughput check for SH rotation.
//!
//! Run with: cargo run --release -p splat-sh-utils --bin sh_rotation_bench

use glam::Quat;
use splat_sh_utils::{ShRotation, rotate_sh_coefficients_in_place, sh_coeffs_for_bands};
use std::time::Instant;

fn main() {
    let sizes = [10_000, 100_000, 1_000_000];
    let bands = [1, 2, 3];

    let rotation = Quat::from_euler(glam::EulerRot::XYZ, 0.3, 0.5, 0.7);

    println!("SH Rotation Benchmark");
    println!("=====================");
    println!();

    let iterations = 10;
    let start = Instant::now();
    for _ in 0..iterations * 1000 {
        std::hint::black_box(ShRotation::from_quat(rotation));
    }
    println!(
        "Matrix setup: {:.2?} per rotation",
        start.elapsed() / (iterations * 1000)
    );
    println!();

    for &band_count in &bands {
        let coeffs_per_channel = sh_coeffs_for_bands(band_count);
        println!("SH bands {band_count}: {coeffs_per_channel} coefficients per channel");
        println!("-----------------------------------------");

        for &num_splats in &sizes {
            let floats_per_splat = coeffs_per_channel * 3;
            let mut data: Vec<f32> = (0..num_splats * floats_per_splat)
                .map(|i| (i as f32) * 0.001)
                .collect();

            // Warm up
            rotate_sh_coefficients_in_place(&mut data, band_count, rotation);

            let start = Instant::now();
            for _ in 0..iterations {
                rotate_sh_coefficients_in_place(&mut data, band_count, rotation);
            }
            let per_iter = start.elapsed() / iterations;
            let throughput = num_splats as f64 / per_iter.as_secs_f64() / 1_000_000.0;

            println!("  {num_splats:>8} splats: {per_iter:>8.2?} ({throughput:.2} M splats/sec)");
        }
        println!();
    }
}
