//! Runs vector addition, reduction and bitonic sort on random data and checks
//! each result against the host.
//!
//! Run with: cargo run --release -p compute --bin compute_demo [config.yaml|config.json]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use compute::{ComputeConfig, GpuBitonicSorter, GpuContext, GpuError, GpuReduce, GpuVectorAdd};

fn main() -> ExitCode {
    env_logger::init();

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => match ComputeConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => ComputeConfig::default(),
    };

    let ctx = match GpuContext::new_blocking(&config.adapter) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("GPU setup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!(
        "Using GPU: {} ({:?})",
        ctx.adapter_info.name, ctx.adapter_info.backend
    );

    let mut rng = match config.demo.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let n = config.demo.element_count as usize;
    println!("=== {} elements ===", n);

    let results = [
        report("add_arrays", run_add(&ctx, &mut rng, n)),
        report(
            "reduce",
            run_reduce(&ctx, &mut rng, n, config.demo.reduce_max_value),
        ),
        report("bitonic_sort", run_sort(&ctx, &config, &mut rng, n)),
    ];

    if results.iter().all(|ok| *ok) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn report(name: &str, outcome: Result<bool, GpuError>) -> bool {
    match outcome {
        Ok(true) => {
            println!("{:>14}: Ok", name);
            true
        }
        Ok(false) => {
            println!("{:>14}: Error (result differs from host)", name);
            false
        }
        Err(e) => {
            println!("{:>14}: Error ({})", name, e);
            false
        }
    }
}

fn run_add(ctx: &GpuContext, rng: &mut StdRng, n: usize) -> Result<bool, GpuError> {
    let lhs: Vec<f32> = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();
    let rhs: Vec<f32> = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();

    let adder = GpuVectorAdd::new(ctx)?;
    let start = Instant::now();
    let sum = adder.add(&lhs, &rhs)?;
    log::info!("add_arrays: {:.2?}", start.elapsed());

    Ok(sum
        .iter()
        .zip(lhs.iter().zip(&rhs))
        .all(|(s, (a, b))| (s - (a + b)).abs() <= f32::EPSILON))
}

fn run_reduce(
    ctx: &GpuContext,
    rng: &mut StdRng,
    n: usize,
    max_value: i32,
) -> Result<bool, GpuError> {
    let values: Vec<i32> = (0..n).map(|_| rng.gen_range(0..max_value.max(1))).collect();
    let expected = values.iter().fold(0i32, |acc, v| acc.wrapping_add(*v));

    let reducer = GpuReduce::new(ctx)?;
    let start = Instant::now();
    let total = reducer.sum(&values)?;
    log::info!("reduce: {:.2?}", start.elapsed());

    Ok(total == expected)
}

fn run_sort(
    ctx: &GpuContext,
    config: &ComputeConfig,
    rng: &mut StdRng,
    n: usize,
) -> Result<bool, GpuError> {
    let mut values: Vec<i32> = (0..n).map(|_| rng.gen()).collect();
    let mut expected = values.clone();
    expected.sort_unstable_by(|a, b| b.cmp(a));

    let mut sorter = GpuBitonicSorter::new(ctx, &config.sort);
    let plan = sorter.plan(n)?;
    println!(
        "bitonic plan: {} dispatches, {} workgroups of {} threads",
        plan.len(),
        plan.workgroup_count(),
        plan.workgroup_width()
    );
    sorter.sort_in_place(&mut values)?;

    Ok(values == expected)
}
