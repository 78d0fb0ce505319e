//! Benchmark: full MAE forward pass across the named presets.

use std::time::Instant;

use veil_core::PrngKey;
use veil_mae::{mae_loss, MAEConfig, MAEViT};

fn bench_forward(model: &MAEViT, params: &veil_nn::Params, batch: usize, iters: usize) -> f64 {
    let images = PrngKey::new(1).uniform(&[
        batch,
        model.config.in_channels,
        model.config.img_size,
        model.config.img_size,
    ]);
    let start = Instant::now();
    for i in 0..iters {
        let _ = model
            .forward(params, &images, 0.75, true, PrngKey::new(i as u64))
            .unwrap();
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn bench_loss(model: &MAEViT, params: &veil_nn::Params, batch: usize, iters: usize) -> f64 {
    let images = PrngKey::new(2).uniform(&[
        batch,
        model.config.in_channels,
        model.config.img_size,
        model.config.img_size,
    ]);
    let mut key = PrngKey::new(0);
    let start = Instant::now();
    for _ in 0..iters {
        let (_, carry) = mae_loss(model, params, &images, 0.75, true, key).unwrap();
        key = carry;
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn main() {
    println!("=== MAE Forward Benchmark ===\n");

    let presets: &[(&str, MAEConfig)] =
        &[("small_arch", MAEConfig::small_arch()), ("med_arch", MAEConfig::med_arch())];
    let batches: &[usize] = &[1, 8, 32];

    println!(
        "{:<12} {:>6} {:>10} {:>14} {:>14}",
        "Preset", "Batch", "Params", "Forward (ms)", "Loss (ms)"
    );
    println!("{}", "-".repeat(60));

    for (name, config) in presets {
        let model = MAEViT::new(config.clone()).unwrap();
        let params = model.init_params(PrngKey::new(0));

        for &batch in batches {
            let iters = if batch <= 8 { 20 } else { 5 };
            let fwd_s = bench_forward(&model, &params, batch, iters);
            let loss_s = bench_loss(&model, &params, batch, iters);

            println!(
                "{:<12} {:>6} {:>10} {:>12.3}ms {:>12.3}ms",
                name,
                batch,
                params.param_count(),
                fwd_s * 1000.0,
                loss_s * 1000.0,
            );
        }
    }
}
