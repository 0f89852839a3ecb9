use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};
use nn_kernels::{
    BatchNormParams, DEFAULT_EPSILON, batchnorm_avx1, batchnorm_avx2, batchnorm_basic,
    batchnorm_fission, batchnorm_fission_scaled, batchnorm_fusion_fission, batchnorm_no_params,
    min_max_basic, min_max_fused, min_max_pointer_arith, min_max_reciprocal, rmsnorm_avx1,
    rmsnorm_avx2, rmsnorm_basic, rmsnorm_reciprocal, zscore_avx1, zscore_avx2, zscore_basic,
    zscore_fixed_mean, zscore_fused, zscore_reciprocal,
};

const INPUT_SIZES: &[(&str, usize)] = &[("l1_4k", 4 * 1024), ("l2_64k", 64 * 1024)];

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
        .map(|_| (next_u64(&mut state) & 0xFFFF) as f32 / 655.35 - 50.0)
        .collect()
}

fn bench_variant(c: &mut Criterion, name: &str, func: impl Fn(&mut [f32])) {
    let mut group = c.benchmark_group(name);
    for &(label, len) in INPUT_SIZES {
        group.throughput(Throughput::Elements(len as u64));
        let input = make_values(len, 0xC0FF_EE42_1234_5678u64 ^ len as u64);
        group.bench_function(BenchmarkId::new("random", label), |b| {
            b.iter_batched_ref(
                || input.clone(),
                |v| {
                    func(v.as_mut_slice());
                    black_box(v[len / 2]);
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_min_max(c: &mut Criterion) {
    bench_variant(c, "min_max_basic", |v| {
        let _ = min_max_basic(v);
    });
    bench_variant(c, "min_max_reciprocal", |v| {
        let _ = min_max_reciprocal(v);
    });
    bench_variant(c, "min_max_pointer_arith", |v| {
        let _ = min_max_pointer_arith(v);
    });
    bench_variant(c, "min_max_fused", |v| {
        let _ = min_max_fused(v);
    });
}

fn bench_zscore(c: &mut Criterion) {
    bench_variant(c, "zscore_basic", |v| {
        let _ = zscore_basic(v);
    });
    bench_variant(c, "zscore_fixed_mean", |v| {
        let _ = zscore_fixed_mean(v);
    });
    bench_variant(c, "zscore_reciprocal", |v| {
        let _ = zscore_reciprocal(v);
    });
    bench_variant(c, "zscore_fused", |v| {
        let _ = zscore_fused(v);
    });
    bench_variant(c, "zscore_avx1", |v| {
        let _ = zscore_avx1(v);
    });
    bench_variant(c, "zscore_avx2", |v| {
        let _ = zscore_avx2(v);
    });
}

fn bench_batchnorm(c: &mut Criterion) {
    let params = BatchNormParams::default();
    bench_variant(c, "batchnorm_basic", |v| batchnorm_basic(v, &params));
    bench_variant(c, "batchnorm_fission", |v| batchnorm_fission(v, &params));
    bench_variant(c, "batchnorm_fission_scaled", |v| batchnorm_fission_scaled(v, &params));
    bench_variant(c, "batchnorm_fusion_fission", |v| batchnorm_fusion_fission(v, &params));
    bench_variant(c, "batchnorm_no_params", |v| batchnorm_no_params(v, params.epsilon));
    bench_variant(c, "batchnorm_avx1", |v| batchnorm_avx1(v, &params));
    bench_variant(c, "batchnorm_avx2", |v| batchnorm_avx2(v, &params));
}

fn bench_rmsnorm(c: &mut Criterion) {
    bench_variant(c, "rmsnorm_basic", |v| rmsnorm_basic(v, DEFAULT_EPSILON));
    bench_variant(c, "rmsnorm_reciprocal", |v| rmsnorm_reciprocal(v, DEFAULT_EPSILON));
    bench_variant(c, "rmsnorm_avx1", |v| rmsnorm_avx1(v, DEFAULT_EPSILON));
    bench_variant(c, "rmsnorm_avx2", |v| rmsnorm_avx2(v, DEFAULT_EPSILON));
}

criterion_group!(benches, bench_min_max, bench_zscore, bench_batchnorm, bench_rmsnorm);
criterion_main!(benches);
