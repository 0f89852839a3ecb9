use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nn_kernels::{
    l1_norm, l1_norm_bitwise_fabs, l1_norm_if_test, max, max_avx2, mean_and_variance,
    mean_and_variance_fused, mean_and_variance_fused_avx1, mean_and_variance_fused_avx2, min,
    min_and_max, min_avx2, sum, sum_avx1, sum_avx2, sum_pointer_arith, sum_squares,
    sum_squares_avx1, sum_squares_avx2,
};

const INPUT_SIZES: &[(&str, usize)] = &[
    ("l1_4k", 4 * 1024),
    ("l2_64k", 64 * 1024),
    ("l3_1m", 1024 * 1024),
];

#[inline]
fn next_u64(state: &mut u64) -> u64 {
    let mut x = *state;
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    *state = x;
    x.wrapping_mul(0x2545_F491_4F6C_DD1D)
}

fn make_values(len: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    (0..len)
        .map(|_| (next_u64(&mut state) & 0xFFFF) as f32 / 32_767.5 - 1.0)
        .collect()
}

fn bench_variant<T>(c: &mut Criterion, name: &str, func: fn(&[f32]) -> T) {
    let mut group = c.benchmark_group(name);
    for &(label, len) in INPUT_SIZES {
        group.throughput(Throughput::Elements(len as u64));
        let input = make_values(len, 0xC0FF_EE42_1234_5678u64 ^ len as u64);
        group.bench_function(BenchmarkId::new("random", label), |b| {
            b.iter(|| black_box(func(black_box(&input))));
        });
    }
    group.finish();
}

fn bench_sums(c: &mut Criterion) {
    bench_variant(c, "sum", sum);
    bench_variant(c, "sum_pointer_arith", sum_pointer_arith);
    bench_variant(c, "sum_avx1", sum_avx1);
    bench_variant(c, "sum_avx2", sum_avx2);
    bench_variant(c, "sum_squares", sum_squares);
    bench_variant(c, "sum_squares_avx1", sum_squares_avx1);
    bench_variant(c, "sum_squares_avx2", sum_squares_avx2);
    bench_variant(c, "l1_norm", l1_norm);
    bench_variant(c, "l1_norm_if_test", l1_norm_if_test);
    bench_variant(c, "l1_norm_bitwise_fabs", l1_norm_bitwise_fabs);
}

fn bench_extrema(c: &mut Criterion) {
    bench_variant(c, "min", min);
    bench_variant(c, "max", max);
    bench_variant(c, "min_avx2", min_avx2);
    bench_variant(c, "max_avx2", max_avx2);
    bench_variant(c, "min_and_max", min_and_max);
}

fn bench_moments(c: &mut Criterion) {
    bench_variant(c, "mean_and_variance", mean_and_variance);
    bench_variant(c, "mean_and_variance_fused", mean_and_variance_fused);
    bench_variant(c, "mean_and_variance_fused_avx1", mean_and_variance_fused_avx1);
    bench_variant(c, "mean_and_variance_fused_avx2", mean_and_variance_fused_avx2);
}

criterion_group!(benches, bench_sums, bench_extrema, bench_moments);
criterion_main!(benches);
