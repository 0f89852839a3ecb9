use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nn_kernels::{
    dot_avx1, dot_avx2, dot_basic, dot_chunked_leftover, dot_chunked_padded, dot_fma_avx1,
    dot_fma_avx2, dot_iter, dot_pointer_arith, dot_reverse, dot_unroll4_basic, dot_unroll4_better,
    dot_unroll4_duffs_device, dot_zero_skipping,
};

type DotFn = fn(&[f32], &[f32]) -> f32;

const INPUT_SIZES: &[(&str, usize)] = &[
    ("l1_4k", 4 * 1024),
    ("l2_32k", 32 * 1024),
    ("l3_512k", 512 * 1024),
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

/// Roughly `zero_percent` of the weights set to exactly zero.
fn make_sparse(len: usize, seed: u64, zero_percent: u64) -> Vec<f32> {
    let mut state = seed;
    let mut out = make_values(len, seed.rotate_left(7));
    for x in &mut out {
        if next_u64(&mut state) % 100 < zero_percent {
            *x = 0.0;
        }
    }
    out
}

fn bench_variant(c: &mut Criterion, name: &str, func: DotFn) {
    let mut group = c.benchmark_group(name);
    for &(label, len) in INPUT_SIZES {
        group.throughput(Throughput::Elements(len as u64));

        let a = make_values(len, 0xC0FF_EE42_1234_5678u64 ^ len as u64);
        let b = make_values(len, 0xBADC_0FFE_EE11_D00Du64 ^ len as u64);
        group.bench_function(BenchmarkId::new("random", label), |bench| {
            bench.iter(|| black_box(func(black_box(&a), black_box(&b))));
        });

        let sparse = make_sparse(len, 0x5EED_5EED_0000_0001u64 ^ len as u64, 90);
        group.bench_function(BenchmarkId::new("sparse90", label), |bench| {
            bench.iter(|| black_box(func(black_box(&a), black_box(&sparse))));
        });
    }
    group.finish();
}

fn bench_dot(c: &mut Criterion) {
    bench_variant(c, "dot_basic", dot_basic);
    bench_variant(c, "dot_iter", dot_iter);
    bench_variant(c, "dot_pointer_arith", dot_pointer_arith);
    bench_variant(c, "dot_reverse", dot_reverse);
    bench_variant(c, "dot_unroll4_basic", dot_unroll4_basic);
    bench_variant(c, "dot_unroll4_better", dot_unroll4_better);
    bench_variant(c, "dot_unroll4_duffs_device", dot_unroll4_duffs_device);
    bench_variant(c, "dot_zero_skipping", dot_zero_skipping);
    bench_variant(c, "dot_chunked_leftover", dot_chunked_leftover);
    bench_variant(c, "dot_chunked_padded", dot_chunked_padded);
    bench_variant(c, "dot_avx1", dot_avx1);
    bench_variant(c, "dot_avx2", dot_avx2);
    bench_variant(c, "dot_fma_avx1", dot_fma_avx1);
    bench_variant(c, "dot_fma_avx2", dot_fma_avx2);
}

criterion_group!(benches, bench_dot);
criterion_main!(benches);
