use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nn_kernels::{
    matvec_accumulate, matvec_avx1, matvec_avx2, matvec_basic, matvec_interchange,
    matvec_interchange_hoisted, matvec_pointer_arith, matvec_relu_avx2, matvec_relu_fused,
    matvec_relu_unfused, matvec_row_hoisted, matvec_tiled_2x2, matvec_tiled_4x4,
    matvec_tiled_4x4_cse, matvec_unrolled4, matvec_unrolled8,
};

type MatvecFn = fn(&[f32], &[f32], &mut [f32], usize);

const INPUT_SIZES: &[(&str, usize)] = &[("n64", 64), ("n256", 256), ("n1024", 1024)];

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
        .map(|_| (next_u64(&mut state) & 0xFF) as f32 / 127.5 - 1.0)
        .collect()
}

fn bench_variant(c: &mut Criterion, name: &str, func: MatvecFn) {
    let mut group = c.benchmark_group(name);
    for &(label, n) in INPUT_SIZES {
        group.throughput(Throughput::Elements((n * n) as u64));

        let m = make_values(n * n, 0xC0FF_EE42_1234_5678u64 ^ n as u64);
        let v = make_values(n, 0xBADC_0FFE_EE11_D00Du64 ^ n as u64);
        let mut out = vec![0.0f32; n];

        group.bench_function(BenchmarkId::new("random", label), |bench| {
            bench.iter(|| {
                func(black_box(&m), black_box(&v), black_box(&mut out), n);
                black_box(out[n / 2]);
            });
        });
    }
    group.finish();
}

fn bench_matvec(c: &mut Criterion) {
    bench_variant(c, "matvec_basic", matvec_basic);
    bench_variant(c, "matvec_accumulate", matvec_accumulate);
    bench_variant(c, "matvec_row_hoisted", matvec_row_hoisted);
    bench_variant(c, "matvec_pointer_arith", matvec_pointer_arith);
    bench_variant(c, "matvec_interchange", matvec_interchange);
    bench_variant(c, "matvec_interchange_hoisted", matvec_interchange_hoisted);
    bench_variant(c, "matvec_tiled_2x2", matvec_tiled_2x2);
    bench_variant(c, "matvec_tiled_4x4", matvec_tiled_4x4);
    bench_variant(c, "matvec_tiled_4x4_cse", matvec_tiled_4x4_cse);
    bench_variant(c, "matvec_unrolled4", matvec_unrolled4);
    bench_variant(c, "matvec_unrolled8", matvec_unrolled8);
    bench_variant(c, "matvec_avx1", matvec_avx1);
    bench_variant(c, "matvec_avx2", matvec_avx2);
}

fn bench_matvec_relu(c: &mut Criterion) {
    bench_variant(c, "matvec_relu_fused", matvec_relu_fused);
    bench_variant(c, "matvec_relu_unfused", matvec_relu_unfused);
    bench_variant(c, "matvec_relu_avx2", matvec_relu_avx2);
}

criterion_group!(benches, bench_matvec, bench_matvec_relu);
criterion_main!(benches);
