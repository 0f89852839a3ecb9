//! Vector dot product, the reduction at the heart of every matmul.
//!
//! All variants compute `sum(a[i] * b[i])` over the common prefix of the two
//! slices (lengths should match; this is debug-asserted).
//!
//! # Strategies
//!
//! | Function | Strategy |
//! |----------|----------|
//! | [`dot_basic`] | Indexed loop |
//! | [`dot_iter`] | `zip`/`map`/`sum` iterator chain |
//! | [`dot_pointer_arith`] | Raw pointer walk, no indexing |
//! | [`dot_reverse`] | Count down to zero |
//! | [`dot_unroll4_basic`] | Body unrolled x4, single accumulator |
//! | [`dot_unroll4_better`] | Unrolled x4, four independent accumulators |
//! | [`dot_unroll4_duffs_device`] | Remainder first, then unrolled x4 |
//! | [`dot_zero_skipping`] | Branch around zero weights |
//! | [`dot_perforated`] | Randomly skip a percentage of iterations |
//! | [`dot_chunked_exact`] / [`dot_chunked_leftover`] / [`dot_chunked_padded`] | Fixed 512-element sections |
//! | [`dot_avx1`] / [`dot_avx2`] | 4 / 8 lanes, separate multiply and add |
//! | [`dot_fma_avx1`] / [`dot_fma_avx2`] | 4 / 8 lanes, fused multiply-add |
//!
//! The single-accumulator loops are latency bound: each `+=` waits for the
//! previous one. Independent accumulators (and SIMD lanes) break that chain,
//! at the price of a different summation order and slightly different
//! rounding.

use crate::cpu::{use_avx, use_avx2, use_avx2_fma, use_fma};
use crate::error::{KernelError, Result};

/// Section length for the chunked variants (a fixed-size "device" kernel).
pub const CHUNK_SIZE: usize = 512;

const PERFORATION_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

#[inline]
fn common_len(a: &[f32], b: &[f32]) -> usize {
    debug_assert_eq!(a.len(), b.len());
    a.len().min(b.len())
}

pub fn dot_basic(a: &[f32], b: &[f32]) -> f32 {
    let n = common_len(a, b);
    let mut sum = 0.0f32;
    for i in 0..n {
        sum += a[i] * b[i];
    }
    sum
}

pub fn dot_iter(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn dot_pointer_arith(a: &[f32], b: &[f32]) -> f32 {
    let n = common_len(a, b);
    let mut sum = 0.0f32;
    let mut pa = a.as_ptr();
    let mut pb = b.as_ptr();
    // SAFETY: both pointers advance in lockstep and stop after `n` elements,
    // which is within bounds of both slices.
    unsafe {
        let end = pa.add(n);
        while pa != end {
            sum += *pa * *pb;
            pa = pa.add(1);
            pb = pb.add(1);
        }
    }
    sum
}

pub fn dot_reverse(a: &[f32], b: &[f32]) -> f32 {
    let n = common_len(a, b);
    let mut sum = 0.0f32;
    for i in (0..n).rev() {
        sum += a[i] * b[i];
    }
    sum
}

/// Unrolled x4 into a single accumulator.
pub fn dot_unroll4_basic(a: &[f32], b: &[f32]) -> f32 {
    let n = common_len(a, b);
    let mut sum = 0.0f32;
    let mut i = 0;
    while i + 4 <= n {
        sum += a[i] * b[i] + a[i + 1] * b[i + 1] + a[i + 2] * b[i + 2] + a[i + 3] * b[i + 3];
        i += 4;
    }
    while i < n {
        sum += a[i] * b[i];
        i += 1;
    }
    sum
}

/// Unrolled x4 with four independent accumulators.
pub fn dot_unroll4_better(a: &[f32], b: &[f32]) -> f32 {
    let n = common_len(a, b);
    let (mut s0, mut s1, mut s2, mut s3) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
    let mut i = 0;
    while i + 4 <= n {
        s0 += a[i] * b[i];
        s1 += a[i + 1] * b[i + 1];
        s2 += a[i + 2] * b[i + 2];
        s3 += a[i + 3] * b[i + 3];
        i += 4;
    }
    let mut sum = (s0 + s1) + (s2 + s3);
    while i < n {
        sum += a[i] * b[i];
        i += 1;
    }
    sum
}

/// `LANES` independent accumulators, combined once at the end. Backs the
/// unrolled row kernels in `matmul` and `matvec`.
#[inline]
pub(crate) fn dot_lanes<const LANES: usize>(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut acc = [0.0f32; LANES];
    let (xs, ys) = (a.chunks_exact(LANES), b.chunks_exact(LANES));
    let (x_tail, y_tail) = (xs.remainder(), ys.remainder());
    for (xc, yc) in xs.zip(ys) {
        for lane in 0..LANES {
            acc[lane] += xc[lane] * yc[lane];
        }
    }
    let mut sum: f32 = acc.iter().sum();
    for (&x, &y) in x_tail.iter().zip(y_tail) {
        sum += x * y;
    }
    sum
}

/// Duff's device: enter the unrolled ladder part-way so the remainder is
/// consumed first, then run whole rungs of four.
pub fn dot_unroll4_duffs_device(a: &[f32], b: &[f32]) -> f32 {
    let n = common_len(a, b);
    let mut sum = 0.0f32;
    let mut i = 0;

    let lead = n % 4;
    if lead >= 3 {
        sum += a[i] * b[i];
        i += 1;
    }
    if lead >= 2 {
        sum += a[i] * b[i];
        i += 1;
    }
    if lead >= 1 {
        sum += a[i] * b[i];
        i += 1;
    }

    while i < n {
        sum += a[i] * b[i];
        sum += a[i + 1] * b[i + 1];
        sum += a[i + 2] * b[i + 2];
        sum += a[i + 3] * b[i + 3];
        i += 4;
    }
    sum
}

/// Skips terms whose weight is exactly zero (sparse weight vectors).
pub fn dot_zero_skipping(values: &[f32], weights: &[f32]) -> f32 {
    let n = common_len(values, weights);
    let mut sum = 0.0f32;
    for i in 0..n {
        if weights[i] != 0.0 {
            sum += values[i] * weights[i];
        }
    }
    sum
}

/// Loop perforation: each iteration is skipped with probability
/// `percent / 100`, drawn from a deterministic xorshift stream.
///
/// `percent == 0` is exact and `percent >= 100` always returns zero.
pub fn dot_perforated(a: &[f32], b: &[f32], percent: u32, seed: u64) -> f32 {
    let n = common_len(a, b);
    let mut state = if seed == 0 { PERFORATION_SEED } else { seed };
    let mut sum = 0.0f32;
    for i in 0..n {
        if (next_u64(&mut state) % 100) as u32 + 1 <= percent {
            continue;
        }
        sum += a[i] * b[i];
    }
    sum
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

#[inline]
fn dot_section(a: &[f32], b: &[f32]) -> f32 {
    let a = &a[..CHUNK_SIZE];
    let b = &b[..CHUNK_SIZE];
    let mut sum = 0.0f32;
    for i in 0..CHUNK_SIZE {
        sum += a[i] * b[i];
    }
    sum
}

/// Dot product over whole [`CHUNK_SIZE`] sections. Fails unless the length is
/// an exact multiple of the section size.
pub fn dot_chunked_exact(a: &[f32], b: &[f32]) -> Result<f32> {
    let n = common_len(a, b);
    if n % CHUNK_SIZE != 0 {
        tracing::debug!(len = n, "chunked dot rejected uneven length");
        return Err(KernelError::NotMultiple {
            len: n,
            multiple: CHUNK_SIZE,
        });
    }
    Ok(a[..n]
        .chunks_exact(CHUNK_SIZE)
        .zip(b[..n].chunks_exact(CHUNK_SIZE))
        .map(|(x, y)| dot_section(x, y))
        .sum())
}

/// Whole sections, then a plain loop over the leftover.
pub fn dot_chunked_leftover(a: &[f32], b: &[f32]) -> f32 {
    let n = common_len(a, b);
    let a_chunks = a[..n].chunks_exact(CHUNK_SIZE);
    let b_chunks = b[..n].chunks_exact(CHUNK_SIZE);
    let (a_rest, b_rest) = (a_chunks.remainder(), b_chunks.remainder());
    let sum: f32 = a_chunks.zip(b_chunks).map(|(x, y)| dot_section(x, y)).sum();
    sum + dot_basic(a_rest, b_rest)
}

/// Whole sections, then the leftover copied into a zero-padded section so
/// the same fixed-size kernel handles it.
pub fn dot_chunked_padded(a: &[f32], b: &[f32]) -> f32 {
    let n = common_len(a, b);
    let a_chunks = a[..n].chunks_exact(CHUNK_SIZE);
    let b_chunks = b[..n].chunks_exact(CHUNK_SIZE);
    let (a_rest, b_rest) = (a_chunks.remainder(), b_chunks.remainder());
    let mut sum: f32 = a_chunks.zip(b_chunks).map(|(x, y)| dot_section(x, y)).sum();

    if !a_rest.is_empty() {
        let mut pad_a = [0.0f32; CHUNK_SIZE];
        let mut pad_b = [0.0f32; CHUNK_SIZE];
        pad_a[..a_rest.len()].copy_from_slice(a_rest);
        pad_b[..b_rest.len()].copy_from_slice(b_rest);
        sum += dot_section(&pad_a, &pad_b);
    }
    sum
}

/// Integer dot product with wrapping arithmetic.
pub fn dot_i32(a: &[i32], b: &[i32]) -> i32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .fold(0i32, |acc, (&x, &y)| acc.wrapping_add(x.wrapping_mul(y)))
}

/// Fixed-point dot product: inputs carry `frac_bits` fractional bits, each
/// product carries twice that, so the wide sum is shifted back once.
pub fn dot_fixed_point(a: &[i32], b: &[i32], frac_bits: u32) -> i32 {
    debug_assert_eq!(a.len(), b.len());
    let sum: i64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| i64::from(x) * i64::from(y))
        .sum();
    (sum >> frac_bits) as i32
}

/// 128-bit (4-lane) dot product with separate multiply and add.
pub fn dot_avx1(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx() {
            // SAFETY: guarded by AVX runtime detection.
            return unsafe { x86::dot_avx1(a, b) };
        }
    }
    dot_basic(a, b)
}

/// 256-bit (8-lane) dot product with separate multiply and add.
pub fn dot_avx2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2() {
            // SAFETY: guarded by AVX2 runtime detection.
            return unsafe { x86::dot_avx2(a, b) };
        }
    }
    dot_basic(a, b)
}

/// 128-bit dot product using fused multiply-add.
pub fn dot_fma_avx1(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    #[cfg(target_arch = "x86_64")]
    {
        if use_fma() {
            // SAFETY: guarded by AVX and FMA runtime detection.
            return unsafe { x86::dot_fma_avx1(a, b) };
        }
    }
    dot_basic(a, b)
}

/// 256-bit dot product using fused multiply-add.
pub fn dot_fma_avx2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2_fma() {
            // SAFETY: guarded by AVX2 and FMA runtime detection.
            return unsafe { x86::dot_fma_avx2(a, b) };
        }
    }
    dot_basic(a, b)
}

/// x86_64 intrinsics shared by the dot, matvec and matmul kernels.
#[cfg(target_arch = "x86_64")]
#[allow(unsafe_op_in_unsafe_fn)]
pub(crate) mod x86 {
    use std::arch::x86_64::{
        __m128, __m256, _mm_add_ps, _mm_fmadd_ps, _mm_loadu_ps, _mm_mul_ps, _mm_setzero_ps,
        _mm_storeu_ps, _mm256_add_ps, _mm256_castps256_ps128, _mm256_extractf128_ps,
        _mm256_fmadd_ps, _mm256_loadu_ps, _mm256_mul_ps, _mm256_setzero_ps,
    };

    /// Horizontal sum of 4 lanes.
    #[target_feature(enable = "avx")]
    pub unsafe fn hsum128(v: __m128) -> f32 {
        let mut tmp = [0.0f32; 4];
        _mm_storeu_ps(tmp.as_mut_ptr(), v);
        (tmp[0] + tmp[1]) + (tmp[2] + tmp[3])
    }

    /// Horizontal sum of 8 lanes: fold the high half onto the low half first.
    #[target_feature(enable = "avx")]
    pub unsafe fn hsum256(v: __m256) -> f32 {
        let hi = _mm256_extractf128_ps(v, 1);
        let lo = _mm256_castps256_ps128(v);
        hsum128(_mm_add_ps(lo, hi))
    }

    #[target_feature(enable = "avx")]
    pub unsafe fn dot_avx1(a: &[f32], b: &[f32]) -> f32 {
        let n = a.len().min(b.len());
        let (pa, pb) = (a.as_ptr(), b.as_ptr());
        let mut acc = _mm_setzero_ps();
        let mut i = 0usize;
        while i + 4 <= n {
            let va = _mm_loadu_ps(pa.add(i));
            let vb = _mm_loadu_ps(pb.add(i));
            acc = _mm_add_ps(acc, _mm_mul_ps(va, vb));
            i += 4;
        }
        let mut sum = hsum128(acc);
        while i < n {
            sum += *pa.add(i) * *pb.add(i);
            i += 1;
        }
        sum
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn dot_avx2(a: &[f32], b: &[f32]) -> f32 {
        let n = a.len().min(b.len());
        let (pa, pb) = (a.as_ptr(), b.as_ptr());
        let mut acc = _mm256_setzero_ps();
        let mut i = 0usize;
        while i + 8 <= n {
            let va = _mm256_loadu_ps(pa.add(i));
            let vb = _mm256_loadu_ps(pb.add(i));
            acc = _mm256_add_ps(acc, _mm256_mul_ps(va, vb));
            i += 8;
        }
        let mut sum = hsum256(acc);
        while i < n {
            sum += *pa.add(i) * *pb.add(i);
            i += 1;
        }
        sum
    }

    #[target_feature(enable = "avx,fma")]
    pub unsafe fn dot_fma_avx1(a: &[f32], b: &[f32]) -> f32 {
        let n = a.len().min(b.len());
        let (pa, pb) = (a.as_ptr(), b.as_ptr());
        let mut acc = _mm_setzero_ps();
        let mut i = 0usize;
        while i + 4 <= n {
            acc = _mm_fmadd_ps(_mm_loadu_ps(pa.add(i)), _mm_loadu_ps(pb.add(i)), acc);
            i += 4;
        }
        let mut sum = hsum128(acc);
        while i < n {
            sum += *pa.add(i) * *pb.add(i);
            i += 1;
        }
        sum
    }

    /// 8-lane FMA dot with two accumulators to overlap FMA latency.
    #[target_feature(enable = "avx2,fma")]
    pub unsafe fn dot_fma_avx2(a: &[f32], b: &[f32]) -> f32 {
        let n = a.len().min(b.len());
        let (pa, pb) = (a.as_ptr(), b.as_ptr());
        let mut acc0 = _mm256_setzero_ps();
        let mut acc1 = _mm256_setzero_ps();
        let mut i = 0usize;
        while i + 16 <= n {
            acc0 = _mm256_fmadd_ps(_mm256_loadu_ps(pa.add(i)), _mm256_loadu_ps(pb.add(i)), acc0);
            acc1 = _mm256_fmadd_ps(
                _mm256_loadu_ps(pa.add(i + 8)),
                _mm256_loadu_ps(pb.add(i + 8)),
                acc1,
            );
            i += 16;
        }
        if i + 8 <= n {
            acc0 = _mm256_fmadd_ps(_mm256_loadu_ps(pa.add(i)), _mm256_loadu_ps(pb.add(i)), acc0);
            i += 8;
        }
        let mut sum = hsum256(_mm256_add_ps(acc0, acc1));
        while i < n {
            sum += *pa.add(i) * *pb.add(i);
            i += 1;
        }
        sum
    }
}
