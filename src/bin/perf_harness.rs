//! Runs one kernel variant in a tight loop, for profilers and quick A/B timing.
//!
//! Usage:
//!   perf_harness --list
//!   perf_harness --bench dot_fma_avx2 --len 1000000 --iters 50 --report
//!   perf_harness --bench matmul_blocked --len 512 --verify --report

use std::hint::black_box;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use nn_kernels::{
    BatchNormParams, CpuFeatures, DEFAULT_EPSILON, batchnorm_avx1, batchnorm_avx2, batchnorm_basic,
    batchnorm_fission, batchnorm_fission_scaled, batchnorm_fusion_fission, batchnorm_no_params,
    dot_avx1, dot_avx2, dot_basic, dot_chunked_leftover, dot_chunked_padded, dot_fma_avx1,
    dot_fma_avx2, dot_iter, dot_pointer_arith, dot_reverse, dot_unroll4_basic, dot_unroll4_better,
    dot_unroll4_duffs_device, dot_zero_skipping, expize, expize_avx2, gelu_in_place, l1_norm,
    l1_norm_bitwise_fabs, l1_norm_if_test, matmul_avx2, matmul_baseline, matmul_blocked,
    matmul_bt_avx1, matmul_bt_avx2, matmul_bt_avx2_inlined, matmul_bt_basic, matmul_bt_unrolled4,
    matmul_bt_unrolled8, matmul_hoisted, matmul_ikj, matmul_register_blocked_2x2,
    matmul_transposed, matmul_unrolled4, matvec_accumulate, matvec_avx1, matvec_avx2,
    matvec_basic, matvec_interchange, matvec_interchange_hoisted, matvec_pointer_arith,
    matvec_relu_avx2, matvec_relu_fused, matvec_relu_unfused, matvec_row_hoisted,
    matvec_tiled_2x2, matvec_tiled_4x4, matvec_tiled_4x4_cse, matvec_unrolled4, matvec_unrolled8,
    mean_and_variance, mean_and_variance_fused, mean_and_variance_fused_avx1,
    mean_and_variance_fused_avx2, min_max_basic, min_max_fused, min_max_pointer_arith,
    min_max_reciprocal, relu_in_place, relu_in_place_avx1, relu_in_place_avx2, rmsnorm_avx1,
    rmsnorm_avx2, rmsnorm_basic, rmsnorm_reciprocal, silu_in_place, softmax_avx1, softmax_avx2,
    softmax_basic, softmax_exponentiate_first, softmax_fused_exp_sum, softmax_reciprocal,
    softmax_stable, sum, sum_avx1, sum_avx2, sum_pointer_arith, sum_squares, sum_squares_avx1,
    sum_squares_avx2, top_k_insertion, top_k_select, top_k_sort, top_k_sort_indices, zscore_avx1,
    zscore_avx2, zscore_basic, zscore_fixed_mean, zscore_fused, zscore_reciprocal,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_SEED: u64 = 0x1234_5678_9ABC_DEF0;

type DotFn = fn(&[f32], &[f32]) -> f32;
type ReduceFn = fn(&[f32]) -> f32;
type MomentsFn = fn(&[f32]) -> (f32, f32);
type MapFn = fn(&mut [f32]);
type FallibleFn = fn(&mut [f32]) -> nn_kernels::Result<()>;
type BatchNormFn = fn(&mut [f32], &BatchNormParams);
type EpsilonFn = fn(&mut [f32], f32);
type TopKFn = fn(&[f32], usize) -> nn_kernels::Result<Vec<f32>>;
type MatmulFn = fn(&[f32], &[f32], &mut [f32], usize);
type MatvecFn = fn(&[f32], &[f32], &mut [f32], usize);

#[derive(Parser)]
#[command(
    name = "perf_harness",
    version,
    about = "Run one kernel variant in a tight loop"
)]
struct Cli {
    /// Kernel variant to run (see --list)
    #[arg(long, required_unless_present = "list")]
    bench: Option<String>,

    /// Input length (elements, or matrix side for matmul/matvec)
    #[arg(long)]
    len: Option<usize>,

    /// Iterations (variant-specific default)
    #[arg(long)]
    iters: Option<usize>,

    /// Input generator seed, decimal or 0x-prefixed hex
    #[arg(long, default_value = "0x123456789ABCDEF0", value_parser = parse_seed)]
    seed: u64,

    /// Number of values kept by the top-k variants
    #[arg(long, default_value_t = 10)]
    k: usize,

    /// Skip resetting in-place inputs each iteration
    #[arg(long)]
    no_reset: bool,

    /// Check the variant against its baseline before timing
    #[arg(long)]
    verify: bool,

    /// Print a throughput summary after the run
    #[arg(long)]
    report: bool,

    /// Show available variants and exit
    #[arg(long)]
    list: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy)]
enum Kernel {
    Dot(DotFn),
    Reduce(ReduceFn),
    Moments(MomentsFn),
    Map(MapFn),
    Fallible(FallibleFn),
    BatchNorm(BatchNormFn),
    Epsilon(EpsilonFn),
    TopK(TopKFn),
    Matmul(MatmulFn),
    Matvec(MatvecFn),
}

/// A named variant and the variant it is verified against.
struct Bench {
    name: &'static str,
    baseline: &'static str,
    kernel: Kernel,
}

#[derive(Clone, Copy)]
struct Config {
    len: usize,
    iters: usize,
    seed: u64,
    k: usize,
    reset: bool,
    report: bool,
}

const fn bench(name: &'static str, baseline: &'static str, kernel: Kernel) -> Bench {
    Bench {
        name,
        baseline,
        kernel,
    }
}

fn top_k_sort_indices_values(v: &[f32], k: usize) -> nn_kernels::Result<Vec<f32>> {
    Ok(top_k_sort_indices(v, k)?.into_iter().map(|t| t.value).collect())
}

const BENCHES: &[Bench] = &[
    bench("dot_basic", "dot_basic", Kernel::Dot(dot_basic)),
    bench("dot_iter", "dot_basic", Kernel::Dot(dot_iter)),
    bench("dot_pointer_arith", "dot_basic", Kernel::Dot(dot_pointer_arith)),
    bench("dot_reverse", "dot_basic", Kernel::Dot(dot_reverse)),
    bench("dot_unroll4_basic", "dot_basic", Kernel::Dot(dot_unroll4_basic)),
    bench("dot_unroll4_better", "dot_basic", Kernel::Dot(dot_unroll4_better)),
    bench("dot_unroll4_duffs_device", "dot_basic", Kernel::Dot(dot_unroll4_duffs_device)),
    bench("dot_zero_skipping", "dot_basic", Kernel::Dot(dot_zero_skipping)),
    bench("dot_chunked_leftover", "dot_basic", Kernel::Dot(dot_chunked_leftover)),
    bench("dot_chunked_padded", "dot_basic", Kernel::Dot(dot_chunked_padded)),
    bench("dot_avx1", "dot_basic", Kernel::Dot(dot_avx1)),
    bench("dot_avx2", "dot_basic", Kernel::Dot(dot_avx2)),
    bench("dot_fma_avx1", "dot_basic", Kernel::Dot(dot_fma_avx1)),
    bench("dot_fma_avx2", "dot_basic", Kernel::Dot(dot_fma_avx2)),
    bench("sum", "sum", Kernel::Reduce(sum)),
    bench("sum_pointer_arith", "sum", Kernel::Reduce(sum_pointer_arith)),
    bench("sum_avx1", "sum", Kernel::Reduce(sum_avx1)),
    bench("sum_avx2", "sum", Kernel::Reduce(sum_avx2)),
    bench("sum_squares", "sum_squares", Kernel::Reduce(sum_squares)),
    bench("sum_squares_avx1", "sum_squares", Kernel::Reduce(sum_squares_avx1)),
    bench("sum_squares_avx2", "sum_squares", Kernel::Reduce(sum_squares_avx2)),
    bench("l1_norm", "l1_norm", Kernel::Reduce(l1_norm)),
    bench("l1_norm_if_test", "l1_norm", Kernel::Reduce(l1_norm_if_test)),
    bench("l1_norm_bitwise_fabs", "l1_norm", Kernel::Reduce(l1_norm_bitwise_fabs)),
    bench("mean_and_variance", "mean_and_variance", Kernel::Moments(mean_and_variance)),
    bench("mean_and_variance_fused", "mean_and_variance", Kernel::Moments(mean_and_variance_fused)),
    bench(
        "mean_and_variance_fused_avx1",
        "mean_and_variance",
        Kernel::Moments(mean_and_variance_fused_avx1),
    ),
    bench(
        "mean_and_variance_fused_avx2",
        "mean_and_variance",
        Kernel::Moments(mean_and_variance_fused_avx2),
    ),
    bench("relu_in_place", "relu_in_place", Kernel::Map(relu_in_place)),
    bench("relu_in_place_avx1", "relu_in_place", Kernel::Map(relu_in_place_avx1)),
    bench("relu_in_place_avx2", "relu_in_place", Kernel::Map(relu_in_place_avx2)),
    bench("expize", "expize", Kernel::Map(expize)),
    bench("expize_avx2", "expize", Kernel::Map(expize_avx2)),
    bench("gelu_in_place", "gelu_in_place", Kernel::Map(gelu_in_place)),
    bench("silu_in_place", "silu_in_place", Kernel::Map(silu_in_place)),
    bench("softmax_basic", "softmax_basic", Kernel::Fallible(softmax_basic)),
    bench("softmax_reciprocal", "softmax_basic", Kernel::Fallible(softmax_reciprocal)),
    bench(
        "softmax_exponentiate_first",
        "softmax_basic",
        Kernel::Fallible(softmax_exponentiate_first),
    ),
    bench("softmax_fused_exp_sum", "softmax_basic", Kernel::Fallible(softmax_fused_exp_sum)),
    bench("softmax_stable", "softmax_basic", Kernel::Fallible(softmax_stable)),
    bench("softmax_avx1", "softmax_basic", Kernel::Fallible(softmax_avx1)),
    bench("softmax_avx2", "softmax_basic", Kernel::Fallible(softmax_avx2)),
    bench("min_max_basic", "min_max_basic", Kernel::Fallible(min_max_basic)),
    bench("min_max_reciprocal", "min_max_basic", Kernel::Fallible(min_max_reciprocal)),
    bench("min_max_pointer_arith", "min_max_basic", Kernel::Fallible(min_max_pointer_arith)),
    bench("min_max_fused", "min_max_basic", Kernel::Fallible(min_max_fused)),
    bench("zscore_basic", "zscore_basic", Kernel::Fallible(zscore_basic)),
    bench("zscore_fixed_mean", "zscore_basic", Kernel::Fallible(zscore_fixed_mean)),
    bench("zscore_reciprocal", "zscore_basic", Kernel::Fallible(zscore_reciprocal)),
    bench("zscore_fused", "zscore_basic", Kernel::Fallible(zscore_fused)),
    bench("zscore_avx1", "zscore_basic", Kernel::Fallible(zscore_avx1)),
    bench("zscore_avx2", "zscore_basic", Kernel::Fallible(zscore_avx2)),
    bench("batchnorm_basic", "batchnorm_basic", Kernel::BatchNorm(batchnorm_basic)),
    bench("batchnorm_fission", "batchnorm_basic", Kernel::BatchNorm(batchnorm_fission)),
    bench(
        "batchnorm_fission_scaled",
        "batchnorm_basic",
        Kernel::BatchNorm(batchnorm_fission_scaled),
    ),
    bench(
        "batchnorm_fusion_fission",
        "batchnorm_basic",
        Kernel::BatchNorm(batchnorm_fusion_fission),
    ),
    bench("batchnorm_avx1", "batchnorm_basic", Kernel::BatchNorm(batchnorm_avx1)),
    bench("batchnorm_avx2", "batchnorm_basic", Kernel::BatchNorm(batchnorm_avx2)),
    bench("batchnorm_no_params", "batchnorm_no_params", Kernel::Epsilon(batchnorm_no_params)),
    bench("rmsnorm_basic", "rmsnorm_basic", Kernel::Epsilon(rmsnorm_basic)),
    bench("rmsnorm_reciprocal", "rmsnorm_basic", Kernel::Epsilon(rmsnorm_reciprocal)),
    bench("rmsnorm_avx1", "rmsnorm_basic", Kernel::Epsilon(rmsnorm_avx1)),
    bench("rmsnorm_avx2", "rmsnorm_basic", Kernel::Epsilon(rmsnorm_avx2)),
    bench("top_k_sort", "top_k_sort", Kernel::TopK(top_k_sort)),
    bench("top_k_sort_indices", "top_k_sort", Kernel::TopK(top_k_sort_indices_values)),
    bench("top_k_insertion", "top_k_sort", Kernel::TopK(top_k_insertion)),
    bench("top_k_select", "top_k_sort", Kernel::TopK(top_k_select)),
    bench("matmul_baseline", "matmul_baseline", Kernel::Matmul(matmul_baseline)),
    bench("matmul_hoisted", "matmul_baseline", Kernel::Matmul(matmul_hoisted)),
    bench("matmul_unrolled4", "matmul_baseline", Kernel::Matmul(matmul_unrolled4)),
    bench("matmul_transposed", "matmul_baseline", Kernel::Matmul(matmul_transposed)),
    bench("matmul_ikj", "matmul_baseline", Kernel::Matmul(matmul_ikj)),
    bench("matmul_register_2x2", "matmul_baseline", Kernel::Matmul(matmul_register_blocked_2x2)),
    bench("matmul_blocked", "matmul_baseline", Kernel::Matmul(matmul_blocked)),
    bench("matmul_avx2", "matmul_baseline", Kernel::Matmul(matmul_avx2)),
    bench("matmul_bt_basic", "matmul_bt_basic", Kernel::Matmul(matmul_bt_basic)),
    bench("matmul_bt_unrolled4", "matmul_bt_basic", Kernel::Matmul(matmul_bt_unrolled4)),
    bench("matmul_bt_unrolled8", "matmul_bt_basic", Kernel::Matmul(matmul_bt_unrolled8)),
    bench("matmul_bt_avx1", "matmul_bt_basic", Kernel::Matmul(matmul_bt_avx1)),
    bench("matmul_bt_avx2", "matmul_bt_basic", Kernel::Matmul(matmul_bt_avx2)),
    bench("matmul_bt_avx2_inlined", "matmul_bt_basic", Kernel::Matmul(matmul_bt_avx2_inlined)),
    bench("matvec_basic", "matvec_basic", Kernel::Matvec(matvec_basic)),
    bench("matvec_accumulate", "matvec_basic", Kernel::Matvec(matvec_accumulate)),
    bench("matvec_row_hoisted", "matvec_basic", Kernel::Matvec(matvec_row_hoisted)),
    bench("matvec_pointer_arith", "matvec_basic", Kernel::Matvec(matvec_pointer_arith)),
    bench("matvec_interchange", "matvec_basic", Kernel::Matvec(matvec_interchange)),
    bench("matvec_interchange_hoisted", "matvec_basic", Kernel::Matvec(matvec_interchange_hoisted)),
    bench("matvec_tiled_2x2", "matvec_basic", Kernel::Matvec(matvec_tiled_2x2)),
    bench("matvec_tiled_4x4", "matvec_basic", Kernel::Matvec(matvec_tiled_4x4)),
    bench("matvec_tiled_4x4_cse", "matvec_basic", Kernel::Matvec(matvec_tiled_4x4_cse)),
    bench("matvec_unrolled4", "matvec_basic", Kernel::Matvec(matvec_unrolled4)),
    bench("matvec_unrolled8", "matvec_basic", Kernel::Matvec(matvec_unrolled8)),
    bench("matvec_avx1", "matvec_basic", Kernel::Matvec(matvec_avx1)),
    bench("matvec_avx2", "matvec_basic", Kernel::Matvec(matvec_avx2)),
    bench("matvec_relu_fused", "matvec_relu_unfused", Kernel::Matvec(matvec_relu_fused)),
    bench("matvec_relu_unfused", "matvec_relu_unfused", Kernel::Matvec(matvec_relu_unfused)),
    bench("matvec_relu_avx2", "matvec_relu_unfused", Kernel::Matvec(matvec_relu_avx2)),
];

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "nn_kernels=debug,perf_harness=debug"
    } else {
        "nn_kernels=info,perf_harness=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    if cli.list {
        list_benches();
        return Ok(());
    }

    let name = cli.bench.context("missing --bench")?;
    let bench = find_bench(&name).with_context(|| format!("unknown bench: {name} (see --list)"))?;
    let config = Config {
        len: cli.len.unwrap_or_else(|| bench.kernel.default_len()),
        iters: cli.iters.unwrap_or_else(|| bench.kernel.default_iters()),
        seed: cli.seed,
        k: cli.k,
        reset: !cli.no_reset,
        report: cli.report,
    };

    let features = CpuFeatures::detect();
    tracing::info!(
        bench = bench.name,
        len = config.len,
        iters = config.iters,
        path = features.best_path(),
        "starting"
    );

    if cli.verify {
        verify_bench(bench, &config)
            .with_context(|| format!("{} disagrees with {}", bench.name, bench.baseline))?;
        tracing::info!(baseline = bench.baseline, "verified");
    }

    run_bench(bench, &config)
}

fn parse_seed(value: &str) -> Result<u64, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => value.replace('_', "").parse::<u64>(),
    };
    parsed.map_err(|_| format!("expected a decimal or 0x-prefixed hex integer, got {value}"))
}

fn find_bench(name: &str) -> Option<&'static Bench> {
    BENCHES.iter().find(|b| b.name == name)
}

fn list_benches() {
    for bench in BENCHES {
        println!("{}", bench.name);
    }
}

impl Kernel {
    fn default_len(self) -> usize {
        match self {
            Kernel::Dot(_) | Kernel::Reduce(_) | Kernel::Moments(_) => 1_000_000,
            Kernel::Map(_) | Kernel::Fallible(_) | Kernel::BatchNorm(_) | Kernel::Epsilon(_) => {
                1_000_000
            }
            Kernel::TopK(_) => 100_000,
            Kernel::Matmul(_) => 256,
            Kernel::Matvec(_) => 2048,
        }
    }

    fn default_iters(self) -> usize {
        match self {
            Kernel::Dot(_) | Kernel::Reduce(_) | Kernel::Moments(_) => 100,
            Kernel::Map(_) | Kernel::Fallible(_) | Kernel::BatchNorm(_) | Kernel::Epsilon(_) => 20,
            Kernel::TopK(_) => 20,
            Kernel::Matmul(_) => 3,
            Kernel::Matvec(_) => 20,
        }
    }

    /// Floating-point operations per work item, when the kernel has a
    /// meaningful FLOP count.
    fn flops_per_item(self) -> Option<f64> {
        match self {
            Kernel::Dot(_) | Kernel::Matmul(_) | Kernel::Matvec(_) => Some(2.0),
            _ => None,
        }
    }
}

struct BenchStats {
    work_items: u128,
    bytes: u128,
    unit: &'static str,
}

fn bench_stats(kernel: Kernel, config: &Config) -> BenchStats {
    let len = config.len as u128;
    let iters = config.iters as u128;
    let work_items = len * iters;
    match kernel {
        Kernel::Dot(_) => BenchStats {
            work_items,
            bytes: work_items * 8,
            unit: "elem",
        },
        Kernel::Reduce(_) | Kernel::Moments(_) | Kernel::TopK(_) => BenchStats {
            work_items,
            bytes: work_items * 4,
            unit: "elem",
        },
        Kernel::Map(_) | Kernel::Fallible(_) | Kernel::BatchNorm(_) | Kernel::Epsilon(_) => {
            BenchStats {
                work_items,
                bytes: work_items * 8,
                unit: "elem",
            }
        }
        Kernel::Matmul(_) => BenchStats {
            work_items: len * len * len * iters,
            bytes: len * len * 12 * iters,
            unit: "mul",
        },
        Kernel::Matvec(_) => BenchStats {
            work_items: len * len * iters,
            bytes: (len * len + 2 * len) * 4 * iters,
            unit: "mul",
        },
    }
}

fn print_report(bench: &Bench, config: &Config, stats: BenchStats, elapsed: Duration) {
    let elapsed_s = elapsed.as_secs_f64();
    let items_per_s = stats.work_items as f64 / elapsed_s;
    let bytes_per_s = stats.bytes as f64 / elapsed_s;
    let ns_per_item = (elapsed_s * 1.0e9) / stats.work_items as f64;

    let mut lines = Vec::with_capacity(5);
    lines.push(format!(
        "bench={} len={} iters={}",
        bench.name, config.len, config.iters
    ));
    lines.push(format!(
        "elapsed_s={:.6} ns_per_item={:.3} throughput={}",
        elapsed_s,
        ns_per_item,
        format_rate(items_per_s, stats.unit)
    ));
    lines.push(format!(
        "work_items={} unit={}",
        stats.work_items, stats.unit
    ));
    lines.push(format!(
        "bytes={} byte_throughput={}",
        stats.bytes,
        format_rate(bytes_per_s, "B")
    ));
    if let Some(flops) = bench.kernel.flops_per_item() {
        lines.push(format!("gflops={}", format_rate(items_per_s * flops, "FLOP")));
    }

    println!("{}", lines.join("\n"));
}

fn format_rate(rate: f64, unit: &str) -> String {
    let (value, prefix) = if rate >= 1.0e12 {
        (rate / 1.0e12, "T")
    } else if rate >= 1.0e9 {
        (rate / 1.0e9, "G")
    } else if rate >= 1.0e6 {
        (rate / 1.0e6, "M")
    } else if rate >= 1.0e3 {
        (rate / 1.0e3, "K")
    } else {
        (rate, "")
    };
    format!("{value:.3} {prefix}{unit}/s")
}

#[inline]
fn next_u64(state: &mut u64) -> u64 {
    let mut x = *state;
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    *state = x;
    x.wrapping_mul(0x2545_F491_4F6C_DD1D)
}

/// Values in [-1, 1).
fn make_f32_input(len: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        let v = (next_u64(&mut state) & 0xFFFF) as f32;
        values.push(v / 32_768.0 - 1.0);
    }
    values
}

fn make_f32_matrix(n: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    let mut values = Vec::with_capacity(n * n);
    for _ in 0..n * n {
        let v = (next_u64(&mut state) & 0xFF) as f32;
        values.push(v / 255.0);
    }
    values
}

fn second_seed(seed: u64) -> u64 {
    seed ^ 0x9E37_79B9_7F4A_7C15
}

fn run_bench(bench: &Bench, config: &Config) -> Result<()> {
    let stats = bench_stats(bench.kernel, config);
    let elapsed = match bench.kernel {
        Kernel::Dot(func) => bench_dot(config, func),
        Kernel::Reduce(func) => bench_reduce(config, |v| func(v)),
        Kernel::Moments(func) => bench_reduce(config, |v| {
            let (m, var) = func(v);
            m + var
        }),
        Kernel::Map(func) => bench_in_place(config, |v| {
            func(v);
            Ok(())
        })?,
        Kernel::Fallible(func) => bench_in_place(config, func)?,
        Kernel::BatchNorm(func) => {
            let params = BatchNormParams::default();
            bench_in_place(config, |v| {
                func(v, &params);
                Ok(())
            })?
        }
        Kernel::Epsilon(func) => bench_in_place(config, |v| {
            func(v, DEFAULT_EPSILON);
            Ok(())
        })?,
        Kernel::TopK(func) => bench_top_k(config, func)?,
        Kernel::Matmul(func) => bench_matmul(config, func),
        Kernel::Matvec(func) => bench_matvec(config, func),
    };
    tracing::debug!(elapsed_ms = elapsed.as_secs_f64() * 1.0e3, "finished");
    if config.report {
        print_report(bench, config, stats, elapsed);
    }
    Ok(())
}

fn bench_dot(config: &Config, func: DotFn) -> Duration {
    let a = make_f32_input(config.len, config.seed);
    let b = make_f32_input(config.len, second_seed(config.seed));
    let start = Instant::now();
    let mut acc = 0.0f64;
    for _ in 0..config.iters {
        acc += func(black_box(&a), black_box(&b)) as f64;
    }
    black_box(acc);
    start.elapsed()
}

fn bench_reduce(config: &Config, func: impl Fn(&[f32]) -> f32) -> Duration {
    let input = make_f32_input(config.len, config.seed);
    let start = Instant::now();
    let mut acc = 0.0f64;
    for _ in 0..config.iters {
        acc += func(black_box(&input)) as f64;
    }
    black_box(acc);
    start.elapsed()
}

fn bench_in_place(
    config: &Config,
    func: impl Fn(&mut [f32]) -> nn_kernels::Result<()>,
) -> Result<Duration> {
    let base = make_f32_input(config.len, config.seed);
    let mut values = base.clone();
    let start = Instant::now();
    let mut acc = 0.0f64;
    for _ in 0..config.iters {
        if config.reset {
            values.copy_from_slice(&base);
        }
        func(black_box(values.as_mut_slice()))?;
        acc += values.get(config.len / 2).copied().unwrap_or(0.0) as f64;
    }
    black_box(acc);
    Ok(start.elapsed())
}

fn bench_top_k(config: &Config, func: TopKFn) -> Result<Duration> {
    let input = make_f32_input(config.len, config.seed);
    let k = config.k.min(config.len);
    let start = Instant::now();
    let mut acc = 0.0f64;
    for _ in 0..config.iters {
        let best = func(black_box(&input), k)?;
        acc += best.first().copied().unwrap_or(0.0) as f64;
    }
    black_box(acc);
    Ok(start.elapsed())
}

fn bench_matmul(config: &Config, func: MatmulFn) -> Duration {
    let n = config.len;
    let a = make_f32_matrix(n, config.seed);
    let b = make_f32_matrix(n, second_seed(config.seed));
    let mut c = vec![0.0f32; n * n];
    let sample = (n / 2) * n + (n / 2);

    let start = Instant::now();
    let mut acc = 0.0f64;
    for _ in 0..config.iters {
        func(black_box(&a), black_box(&b), black_box(&mut c), n);
        acc += c.get(sample).copied().unwrap_or(0.0) as f64;
    }
    black_box(acc);
    start.elapsed()
}

fn bench_matvec(config: &Config, func: MatvecFn) -> Duration {
    let n = config.len;
    let m = make_f32_input(n * n, config.seed);
    let v = make_f32_input(n, second_seed(config.seed));
    let mut out = vec![0.0f32; n];

    let start = Instant::now();
    let mut acc = 0.0f64;
    for _ in 0..config.iters {
        func(black_box(&m), black_box(&v), black_box(&mut out), n);
        acc += out.get(n / 2).copied().unwrap_or(0.0) as f64;
    }
    black_box(acc);
    start.elapsed()
}

/// Inputs are capped so verification stays quick for large `--len`.
fn verify_bench(bench: &Bench, config: &Config) -> Result<()> {
    let baseline = find_bench(bench.baseline)
        .with_context(|| format!("baseline {} is not registered", bench.baseline))?;
    match (bench.kernel, baseline.kernel) {
        (Kernel::Dot(func), Kernel::Dot(reference)) => {
            let len = config.len.min(1 << 16);
            let a = make_f32_input(len, config.seed);
            let b = make_f32_input(len, second_seed(config.seed));
            let scale: f32 = a.iter().zip(&b).map(|(x, y)| (x * y).abs()).sum();
            check_scalar(func(&a, &b), reference(&a, &b), 1.0e-4 * (scale + 1.0))
        }
        (Kernel::Reduce(func), Kernel::Reduce(reference)) => {
            let input = make_f32_input(config.len.min(1 << 16), config.seed);
            let scale: f32 = input.iter().map(|x| x.abs()).sum();
            check_scalar(func(&input), reference(&input), 1.0e-4 * (scale + 1.0))
        }
        (Kernel::Moments(func), Kernel::Moments(reference)) => {
            let input = make_f32_input(config.len.min(1 << 16), config.seed);
            let (got, want) = (func(&input), reference(&input));
            check_scalar(got.0, want.0, 1.0e-4)?;
            check_scalar(got.1, want.1, 1.0e-3)
        }
        (Kernel::Map(func), Kernel::Map(reference)) => verify_in_place(
            config,
            1.0e-5,
            |v| {
                func(v);
                Ok(())
            },
            |v| {
                reference(v);
                Ok(())
            },
        ),
        (Kernel::Fallible(func), Kernel::Fallible(reference)) => {
            verify_in_place(config, 1.0e-4, func, reference)
        }
        (Kernel::BatchNorm(func), Kernel::BatchNorm(reference)) => {
            let params = BatchNormParams::default();
            verify_in_place(
                config,
                1.0e-3,
                |v| {
                    func(v, &params);
                    Ok(())
                },
                |v| {
                    reference(v, &params);
                    Ok(())
                },
            )
        }
        (Kernel::Epsilon(func), Kernel::Epsilon(reference)) => verify_in_place(
            config,
            1.0e-4,
            |v| {
                func(v, DEFAULT_EPSILON);
                Ok(())
            },
            |v| {
                reference(v, DEFAULT_EPSILON);
                Ok(())
            },
        ),
        (Kernel::TopK(func), Kernel::TopK(reference)) => {
            let input = make_f32_input(config.len.min(1 << 16), config.seed);
            let k = config.k.min(input.len());
            let (got, want) = (func(&input, k)?, reference(&input, k)?);
            if got != want {
                bail!("top-{k} mismatch: {got:?} vs {want:?}");
            }
            Ok(())
        }
        (Kernel::Matmul(func), Kernel::Matmul(reference)) => {
            let n = config.len.min(96);
            let a = make_f32_matrix(n, config.seed);
            let b = make_f32_matrix(n, second_seed(config.seed));
            let mut got = vec![0.0f32; n * n];
            let mut want = vec![0.0f32; n * n];
            func(&a, &b, &mut got, n);
            reference(&a, &b, &mut want, n);
            check_slices(&got, &want, 1.0e-5 * n as f32)
        }
        (Kernel::Matvec(func), Kernel::Matvec(reference)) => {
            let n = config.len.min(512);
            let m = make_f32_input(n * n, config.seed);
            let v = make_f32_input(n, second_seed(config.seed));
            let mut got = vec![0.0f32; n];
            let mut want = vec![0.0f32; n];
            func(&m, &v, &mut got, n);
            reference(&m, &v, &mut want, n);
            check_slices(&got, &want, 1.0e-5 * n as f32)
        }
        _ => bail!("{} and {} have different signatures", bench.name, baseline.name),
    }
}

fn verify_in_place(
    config: &Config,
    tolerance: f32,
    func: impl Fn(&mut [f32]) -> nn_kernels::Result<()>,
    reference: impl Fn(&mut [f32]) -> nn_kernels::Result<()>,
) -> Result<()> {
    let base = make_f32_input(config.len.min(1 << 16), config.seed);
    let mut got = base.clone();
    let mut want = base;
    func(&mut got)?;
    reference(&mut want)?;
    check_slices(&got, &want, tolerance)
}

fn check_scalar(got: f32, want: f32, tolerance: f32) -> Result<()> {
    if (got - want).abs() > tolerance * want.abs().max(1.0) {
        bail!("got {got}, expected {want}");
    }
    Ok(())
}

fn check_slices(got: &[f32], want: &[f32], tolerance: f32) -> Result<()> {
    for (idx, (&g, &w)) in got.iter().zip(want).enumerate() {
        check_scalar(g, w, tolerance).with_context(|| format!("at index {idx}"))?;
    }
    Ok(())
}
