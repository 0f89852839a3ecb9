//! Square matrix products for dense layers: `c = a * b`, everything `n x n`
//! and row-major.
//!
//! Shapes are only checked with `debug_assert`.
//!
//! The variants differ in loop order and in how much they keep in registers:
//!
//! - [`matmul_baseline`] is the textbook i-j-k triple loop; [`matmul_hoisted`]
//!   and [`matmul_unrolled4`] shave index math and loop overhead off it.
//! - [`matmul_transposed`] copies `b` into column order first so the inner
//!   loop reads both operands sequentially.
//! - [`matmul_ikj`] swaps the two inner loops, turning the hot loop into an
//!   axpy over a row of `b`.
//! - [`matmul_register_blocked_2x2`] keeps a 2x2 block of `c` in registers.
//! - [`matmul_blocked`] tiles for L2 and L1 and finishes with a 4x4
//!   micro-kernel.
//! - [`matmul_avx2`] transposes `b` and runs an 8-lane FMA dot per output.
//!
//! # Weights stored transposed
//!
//! Dense-layer weights usually arrive as `out_features x in_features`, which
//! is `b` already transposed. The `matmul_bt_*` functions take that layout
//! directly: `c[i][j]` is row `i` of `a` dotted with row `j` of `bt`.
//! [`matmul_bt_basic`] is the scalar form, [`matmul_bt_unrolled4`] and
//! [`matmul_bt_unrolled8`] split the dot into independent accumulators,
//! [`matmul_bt_avx1`] and [`matmul_bt_avx2`] dispatch a SIMD dot per output,
//! and [`matmul_bt_avx2_inlined`] dispatches once and computes four outputs
//! per pass over a row of `a`.
//!
//! Tile sizes assume 64 KiB of L1 and 4 MiB of L2; three `f32` tiles of each
//! size must fit (checked at compile time below).

use crate::cpu::use_avx2_fma;

/// L1 data cache size (bytes) the block sizes are tuned for.
pub const L1_BYTES: usize = 64 * 1024;
/// L2 cache size (bytes) the block sizes are tuned for.
pub const L2_BYTES: usize = 4 * 1024 * 1024;

/// L1 tile size used by [`matmul_blocked`].
pub const BLOCK_L1: usize = 64;
/// L2 tile size used by [`matmul_blocked`].
pub const BLOCK_L2: usize = 256;

const MICRO_TILE: usize = 4;

const _: () = assert!(3 * BLOCK_L1 * BLOCK_L1 * size_of::<f32>() <= L1_BYTES);
const _: () = assert!(3 * BLOCK_L2 * BLOCK_L2 * size_of::<f32>() <= L2_BYTES);

#[inline]
fn check_dims(a: &[f32], b: &[f32], c: &[f32], n: usize) {
    let len = n * n;
    debug_assert_eq!(a.len(), len);
    debug_assert_eq!(b.len(), len);
    debug_assert_eq!(c.len(), len);
}

/// Returns the transpose of an `n x n` matrix.
pub fn transpose(m: &[f32], n: usize) -> Vec<f32> {
    debug_assert_eq!(m.len(), n * n);
    let mut out = vec![0.0f32; n * n];
    for i in 0..n {
        let row = i * n;
        for j in 0..n {
            out[j * n + i] = m[row + j];
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Overwrites `m` with the identity matrix.
pub fn matrix_identity(m: &mut [f32], n: usize) {
    debug_assert_eq!(m.len(), n * n);
    m.fill(0.0);
    for i in 0..n {
        m[i * n + i] = 1.0;
    }
}

/// Fills `m` in row-major order with `0, 1, .., max - 1, 0, 1, ..`.
pub fn matrix_set_sequence_cycling(m: &mut [f32], n: usize, max: usize) {
    debug_assert_eq!(m.len(), n * n);
    crate::elementwise::set_sequence_cycling(m, max);
}

pub fn matrix_count_zeros(m: &[f32], n: usize) -> usize {
    debug_assert_eq!(m.len(), n * n);
    crate::elementwise::count_zeros(m)
}

pub fn matrix_count_nonzeros(m: &[f32], n: usize) -> usize {
    debug_assert_eq!(m.len(), n * n);
    crate::elementwise::count_nonzeros(m)
}

pub fn sum_matrix(m: &[f32], n: usize) -> f32 {
    debug_assert_eq!(m.len(), n * n);
    let mut total = 0.0f32;
    for row in m.chunks_exact(n.max(1)) {
        total += crate::reduce::sum(row);
    }
    total
}

// ---------------------------------------------------------------------------
// C = A x B
// ---------------------------------------------------------------------------

/// Baseline matrix multiplication (i-j-k order).
pub fn matmul_baseline(a: &[f32], b: &[f32], c: &mut [f32], n: usize) {
    check_dims(a, b, c, n);
    for i in 0..n {
        let a_row = i * n;
        for j in 0..n {
            let mut sum = 0.0f32;
            for k in 0..n {
                sum += a[a_row + k] * b[k * n + j];
            }
            c[a_row + j] = sum;
        }
    }
}

/// i-j-k with the A row and C row taken as slices once per `i`.
pub fn matmul_hoisted(a: &[f32], b: &[f32], c: &mut [f32], n: usize) {
    check_dims(a, b, c, n);
    for (a_row, c_row) in a.chunks_exact(n.max(1)).zip(c.chunks_exact_mut(n.max(1))) {
        for (j, out) in c_row.iter_mut().enumerate() {
            let mut sum = 0.0f32;
            let mut b_idx = j;
            for &a_ik in a_row {
                sum += a_ik * b[b_idx];
                b_idx += n;
            }
            *out = sum;
        }
    }
}

/// i-j-k with the k loop unrolled by 4. Keeps the baseline's summation
/// order, so results are bit-identical to [`matmul_baseline`].
pub fn matmul_unrolled4(a: &[f32], b: &[f32], c: &mut [f32], n: usize) {
    check_dims(a, b, c, n);
    for i in 0..n {
        let a_row = i * n;
        for j in 0..n {
            let mut sum = 0.0f32;
            let mut k = 0;
            while k + 4 <= n {
                sum += a[a_row + k] * b[k * n + j];
                sum += a[a_row + k + 1] * b[(k + 1) * n + j];
                sum += a[a_row + k + 2] * b[(k + 2) * n + j];
                sum += a[a_row + k + 3] * b[(k + 3) * n + j];
                k += 4;
            }
            while k < n {
                sum += a[a_row + k] * b[k * n + j];
                k += 1;
            }
            c[a_row + j] = sum;
        }
    }
}

/// Multiply with B transposed to make the inner loop contiguous.
pub fn matmul_transposed(a: &[f32], b: &[f32], c: &mut [f32], n: usize) {
    check_dims(a, b, c, n);
    let b_t = transpose(b, n);
    matmul_bt_basic(a, &b_t, c, n);
}

/// Loop-reordered multiplication (i-k-j order).
pub fn matmul_ikj(a: &[f32], b: &[f32], c: &mut [f32], n: usize) {
    check_dims(a, b, c, n);
    c.fill(0.0);
    for i in 0..n {
        let row = i * n;
        for k in 0..n {
            let a_ik = a[row + k];
            let b_row = k * n;
            for j in 0..n {
                c[row + j] += a_ik * b[b_row + j];
            }
        }
    }
}

/// 2x2 register-blocked kernel with scalar edges for odd `n`.
pub fn matmul_register_blocked_2x2(a: &[f32], b: &[f32], c: &mut [f32], n: usize) {
    check_dims(a, b, c, n);
    c.fill(0.0);

    let mut i = 0;
    while i + 1 < n {
        let (r0, r1) = (i * n, (i + 1) * n);
        let mut j = 0;
        while j + 1 < n {
            let (mut c00, mut c01, mut c10, mut c11) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
            for k in 0..n {
                let (a0, a1) = (a[r0 + k], a[r1 + k]);
                let (b0, b1) = (b[k * n + j], b[k * n + j + 1]);
                c00 += a0 * b0;
                c01 += a0 * b1;
                c10 += a1 * b0;
                c11 += a1 * b1;
            }
            c[r0 + j] = c00;
            c[r0 + j + 1] = c01;
            c[r1 + j] = c10;
            c[r1 + j + 1] = c11;
            j += 2;
        }

        if j < n {
            let (mut c0, mut c1) = (0.0f32, 0.0f32);
            for k in 0..n {
                let b0 = b[k * n + j];
                c0 += a[r0 + k] * b0;
                c1 += a[r1 + k] * b0;
            }
            c[r0 + j] = c0;
            c[r1 + j] = c1;
        }

        i += 2;
    }

    if i < n {
        let row = i * n;
        for j in 0..n {
            let mut sum = 0.0f32;
            for k in 0..n {
                sum += a[row + k] * b[k * n + j];
            }
            c[row + j] = sum;
        }
    }
}

/// Accumulates the `k0..k1` slice of a 4x4 block of C at `(i, j)`.
#[allow(clippy::too_many_arguments)]
#[inline]
fn kernel_4x4(
    a: &[f32],
    b: &[f32],
    c: &mut [f32],
    n: usize,
    i: usize,
    j: usize,
    k0: usize,
    k1: usize,
) {
    let rows = [i * n, (i + 1) * n, (i + 2) * n, (i + 3) * n];
    let mut acc = [[0.0f32; MICRO_TILE]; MICRO_TILE];
    for (r, row) in rows.iter().enumerate() {
        acc[r].copy_from_slice(&c[row + j..row + j + MICRO_TILE]);
    }

    for k in k0..k1 {
        let b_row = k * n + j;
        let bk = [b[b_row], b[b_row + 1], b[b_row + 2], b[b_row + 3]];
        for (r, row) in rows.iter().enumerate() {
            let a_rk = a[row + k];
            acc[r][0] += a_rk * bk[0];
            acc[r][1] += a_rk * bk[1];
            acc[r][2] += a_rk * bk[2];
            acc[r][3] += a_rk * bk[3];
        }
    }

    for (r, row) in rows.iter().enumerate() {
        c[row + j..row + j + MICRO_TILE].copy_from_slice(&acc[r]);
    }
}

/// `c[rows, cols] += a[rows, ks] * b[ks, cols]` in i-k-j order.
#[inline]
fn edge_ikj(
    a: &[f32],
    b: &[f32],
    c: &mut [f32],
    n: usize,
    rows: std::ops::Range<usize>,
    ks: std::ops::Range<usize>,
    cols: std::ops::Range<usize>,
) {
    for ii in rows {
        let row = ii * n;
        for k in ks.clone() {
            let a_ik = a[row + k];
            let b_row = k * n;
            for jj in cols.clone() {
                c[row + jj] += a_ik * b[b_row + jj];
            }
        }
    }
}

/// Cache-blocked multiplication with a 4x4 micro-kernel.
pub fn matmul_blocked(a: &[f32], b: &[f32], c: &mut [f32], n: usize) {
    check_dims(a, b, c, n);
    c.fill(0.0);

    let l2 = BLOCK_L2.min(n);
    let l1 = BLOCK_L1.min(n);
    if n == 0 {
        return;
    }

    for ii2 in (0..n).step_by(l2) {
        let i2_max = (ii2 + l2).min(n);
        for kk2 in (0..n).step_by(l2) {
            let k2_max = (kk2 + l2).min(n);
            for jj2 in (0..n).step_by(l2) {
                let j2_max = (jj2 + l2).min(n);
                for ii1 in (ii2..i2_max).step_by(l1) {
                    let i1_max = (ii1 + l1).min(i2_max);
                    for kk1 in (kk2..k2_max).step_by(l1) {
                        let k1_max = (kk1 + l1).min(k2_max);
                        for jj1 in (jj2..j2_max).step_by(l1) {
                            let j1_max = (jj1 + l1).min(j2_max);

                            let mut i = ii1;
                            while i + MICRO_TILE <= i1_max {
                                let mut j = jj1;
                                while j + MICRO_TILE <= j1_max {
                                    kernel_4x4(a, b, c, n, i, j, kk1, k1_max);
                                    j += MICRO_TILE;
                                }
                                if j < j1_max {
                                    edge_ikj(a, b, c, n, i..i + MICRO_TILE, kk1..k1_max, j..j1_max);
                                }
                                i += MICRO_TILE;
                            }
                            if i < i1_max {
                                edge_ikj(a, b, c, n, i..i1_max, kk1..k1_max, jj1..j1_max);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Transposes B once, then one 8-lane FMA dot product per output element.
pub fn matmul_avx2(a: &[f32], b: &[f32], c: &mut [f32], n: usize) {
    check_dims(a, b, c, n);
    let b_t = transpose(b, n);
    matmul_bt_avx2(a, &b_t, c, n);
}

// ---------------------------------------------------------------------------
// C = A x BT^T
// ---------------------------------------------------------------------------

/// Applies `dot(row_i(a), row_j(bt))` to every output element.
#[inline]
fn matmul_bt_with(
    a: &[f32],
    bt: &[f32],
    c: &mut [f32],
    n: usize,
    dot: impl Fn(&[f32], &[f32]) -> f32,
) {
    check_dims(a, bt, c, n);
    if n == 0 {
        return;
    }
    for (a_row, c_row) in a.chunks_exact(n).zip(c.chunks_exact_mut(n)) {
        for (out, bt_row) in c_row.iter_mut().zip(bt.chunks_exact(n)) {
            *out = dot(a_row, bt_row);
        }
    }
}

pub fn matmul_bt_basic(a: &[f32], bt: &[f32], c: &mut [f32], n: usize) {
    matmul_bt_with(a, bt, c, n, crate::dot::dot_basic);
}

pub fn matmul_bt_unrolled4(a: &[f32], bt: &[f32], c: &mut [f32], n: usize) {
    matmul_bt_with(a, bt, c, n, crate::dot::dot_lanes::<4>);
}

pub fn matmul_bt_unrolled8(a: &[f32], bt: &[f32], c: &mut [f32], n: usize) {
    matmul_bt_with(a, bt, c, n, crate::dot::dot_lanes::<8>);
}

pub fn matmul_bt_avx1(a: &[f32], bt: &[f32], c: &mut [f32], n: usize) {
    matmul_bt_with(a, bt, c, n, crate::dot::dot_avx1);
}

pub fn matmul_bt_avx2(a: &[f32], bt: &[f32], c: &mut [f32], n: usize) {
    matmul_bt_with(a, bt, c, n, crate::dot::dot_fma_avx2);
}

/// Feature check hoisted out of the loops; each A chunk is loaded once and
/// multiplied against four BT rows.
///
/// Panics if any operand is shorter than `n * n`.
pub fn matmul_bt_avx2_inlined(a: &[f32], bt: &[f32], c: &mut [f32], n: usize) {
    check_dims(a, bt, c, n);
    let len = n * n;
    let (a, bt, c) = (&a[..len], &bt[..len], &mut c[..len]);
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2_fma() {
            // SAFETY: guarded by AVX2 and FMA runtime detection.
            unsafe { x86::matmul_bt_avx2_inlined(a, bt, c, n) };
            return;
        }
    }
    matmul_bt_unrolled8(a, bt, c, n);
}

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod x86 {
    use std::arch::x86_64::{_mm256_fmadd_ps, _mm256_loadu_ps, _mm256_setzero_ps};

    use crate::dot::x86::{dot_fma_avx2, hsum256};

    /// `a` and `bt` must hold at least `n * n` elements.
    #[target_feature(enable = "avx2,fma")]
    pub unsafe fn matmul_bt_avx2_inlined(a: &[f32], bt: &[f32], c: &mut [f32], n: usize) {
        let pa = a.as_ptr();
        let pb = bt.as_ptr();
        for i in 0..n {
            let a_row = pa.add(i * n);
            let mut j = 0usize;
            while j + 4 <= n {
                let b0 = pb.add(j * n);
                let b1 = pb.add((j + 1) * n);
                let b2 = pb.add((j + 2) * n);
                let b3 = pb.add((j + 3) * n);
                let (mut s0, mut s1, mut s2, mut s3) = (
                    _mm256_setzero_ps(),
                    _mm256_setzero_ps(),
                    _mm256_setzero_ps(),
                    _mm256_setzero_ps(),
                );
                let mut k = 0usize;
                while k + 8 <= n {
                    let x = _mm256_loadu_ps(a_row.add(k));
                    s0 = _mm256_fmadd_ps(x, _mm256_loadu_ps(b0.add(k)), s0);
                    s1 = _mm256_fmadd_ps(x, _mm256_loadu_ps(b1.add(k)), s1);
                    s2 = _mm256_fmadd_ps(x, _mm256_loadu_ps(b2.add(k)), s2);
                    s3 = _mm256_fmadd_ps(x, _mm256_loadu_ps(b3.add(k)), s3);
                    k += 8;
                }
                let mut sums = [hsum256(s0), hsum256(s1), hsum256(s2), hsum256(s3)];
                while k < n {
                    let x = *a_row.add(k);
                    sums[0] += x * *b0.add(k);
                    sums[1] += x * *b1.add(k);
                    sums[2] += x * *b2.add(k);
                    sums[3] += x * *b3.add(k);
                    k += 1;
                }
                c[i * n + j..i * n + j + 4].copy_from_slice(&sums);
                j += 4;
            }
            while j < n {
                c[i * n + j] = dot_fma_avx2(&a[i * n..(i + 1) * n], &bt[j * n..(j + 1) * n]);
                j += 1;
            }
        }
    }
}
