use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nn_kernels::{Result, top_k_insertion, top_k_select, top_k_sort, top_k_sort_indices, top_k_two};

type TopKFn = fn(&[f32], usize) -> Result<Vec<f32>>;

const INPUT_SIZES: &[(&str, usize)] = &[("vocab_1k", 1024), ("vocab_32k", 32 * 1024)];
const K_VALUES: &[usize] = &[5, 50];

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
        .map(|_| (next_u64(&mut state) & 0xFF_FFFF) as f32 / 16_777_216.0)
        .collect()
}

fn sort_indices_values(v: &[f32], k: usize) -> Result<Vec<f32>> {
    Ok(top_k_sort_indices(v, k)?.into_iter().map(|t| t.value).collect())
}

fn bench_variant(c: &mut Criterion, name: &str, func: TopKFn) {
    let mut group = c.benchmark_group(name);
    for &(label, len) in INPUT_SIZES {
        group.throughput(Throughput::Elements(len as u64));
        let input = make_values(len, 0xC0FF_EE42_1234_5678u64 ^ len as u64);
        for &k in K_VALUES {
            group.bench_function(BenchmarkId::new(format!("k{k}"), label), |b| {
                b.iter(|| black_box(func(black_box(&input), k)));
            });
        }
    }
    group.finish();
}

fn bench_topk(c: &mut Criterion) {
    bench_variant(c, "top_k_sort", top_k_sort);
    bench_variant(c, "top_k_sort_indices", sort_indices_values);
    bench_variant(c, "top_k_insertion", top_k_insertion);
    bench_variant(c, "top_k_select", top_k_select);

    let mut group = c.benchmark_group("top_k_two");
    for &(label, len) in INPUT_SIZES {
        group.throughput(Throughput::Elements(len as u64));
        let input = make_values(len, 0xBADC_0FFE_EE11_D00Du64 ^ len as u64);
        group.bench_function(BenchmarkId::new("k2", label), |b| {
            b.iter(|| black_box(top_k_two(black_box(&input))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_topk);
criterion_main!(benches);
