//! Matrix-vector multiplication (VMM): `out = M x v`.
//!
//! `M` is `n x n` row-major, `v` and `out` have length `n`. Every variant
//! overwrites `out` completely.
//!
//! # Strategies
//!
//! | Function | Strategy |
//! |----------|----------|
//! | [`matvec_basic`] | One dot product per row |
//! | [`matvec_accumulate`] | Accumulate straight into `out[i]` |
//! | [`matvec_row_hoisted`] | Row slice taken once per row |
//! | [`matvec_pointer_arith`] | Single raw pointer walk over `M` |
//! | [`matvec_interchange`] / [`matvec_interchange_hoisted`] | Column-outer loops, `v[j]` reloaded / hoisted |
//! | [`matvec_tiled_2x2`] / [`matvec_tiled_4x4`] | 2 / 4 rows by 2 / 4 columns per step |
//! | [`matvec_tiled_4x4_cse`] | 4x4 tile with each `v` chunk loaded once for all four rows |
//! | [`matvec_unrolled4`] / [`matvec_unrolled8`] | Row dot with 4 / 8 accumulators |
//! | [`matvec_avx1`] / [`matvec_avx2`] | Row dot with 4-lane / 8-lane FMA SIMD |
//! | [`matvec_relu_fused`] / [`matvec_relu_unfused`] / [`matvec_relu_avx2`] | `relu(M x v)` |
//!
//! Tiled variants fall back to scalar code on the rows and columns left
//! over when `n` is not a multiple of the tile.

use crate::activation::{relu, relu_in_place};
use crate::dot::{dot_basic, dot_fma_avx2, dot_lanes};

#[inline]
fn check_dims(m: &[f32], v: &[f32], out: &[f32], n: usize) {
    debug_assert_eq!(m.len(), n * n);
    debug_assert_eq!(v.len(), n);
    debug_assert_eq!(out.len(), n);
}

#[inline]
fn rows_with(
    m: &[f32],
    v: &[f32],
    out: &mut [f32],
    n: usize,
    dot: impl Fn(&[f32], &[f32]) -> f32,
) {
    check_dims(m, v, out, n);
    if n == 0 {
        return;
    }
    for (slot, row) in out.iter_mut().zip(m.chunks_exact(n)) {
        *slot = dot(row, v);
    }
}

pub fn matvec_basic(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    rows_with(m, v, out, n, dot_basic);
}

pub fn matvec_accumulate(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    check_dims(m, v, out, n);
    for i in 0..n {
        out[i] = 0.0;
        for j in 0..n {
            out[i] += m[i * n + j] * v[j];
        }
    }
}

pub fn matvec_row_hoisted(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    check_dims(m, v, out, n);
    for i in 0..n {
        let row = &m[i * n..(i + 1) * n];
        let mut sum = 0.0f32;
        for j in 0..n {
            sum += row[j] * v[j];
        }
        out[i] = sum;
    }
}

/// Panics if `m`, `v` or `out` is shorter than `n x n`, `n`, `n`.
pub fn matvec_pointer_arith(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    check_dims(m, v, out, n);
    let (m, v, out) = (&m[..n * n], &v[..n], &mut out[..n]);
    let mut pm = m.as_ptr();
    // SAFETY: `m` holds exactly `n * n` elements and `pm` advances once per
    // element; `pv` walks the `n` elements of `v` once per row.
    unsafe {
        for slot in out.iter_mut() {
            let mut pv = v.as_ptr();
            let end = pv.add(n);
            let mut sum = 0.0f32;
            while pv != end {
                sum += *pm * *pv;
                pm = pm.add(1);
                pv = pv.add(1);
            }
            *slot = sum;
        }
    }
}

/// Column-outer order: strided over `M`, but each pass streams `out`.
pub fn matvec_interchange(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    check_dims(m, v, out, n);
    out.fill(0.0);
    for j in 0..n {
        for i in 0..n {
            out[i] += m[i * n + j] * v[j];
        }
    }
}

pub fn matvec_interchange_hoisted(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    check_dims(m, v, out, n);
    out.fill(0.0);
    for (j, &vj) in v.iter().enumerate() {
        let mut idx = j;
        for slot in out.iter_mut() {
            *slot += m[idx] * vj;
            idx += n;
        }
    }
}

/// `out[rows] = M[rows, ..] x v`, one row at a time.
#[inline]
fn scalar_rows(m: &[f32], v: &[f32], out: &mut [f32], n: usize, rows: std::ops::Range<usize>) {
    for i in rows {
        out[i] = dot_basic(&m[i * n..(i + 1) * n], v);
    }
}

pub fn matvec_tiled_2x2(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    check_dims(m, v, out, n);
    let mut i = 0;
    while i + 2 <= n {
        let (r0, r1) = (i * n, (i + 1) * n);
        let (mut s0, mut s1) = (0.0f32, 0.0f32);
        let mut j = 0;
        while j + 2 <= n {
            s0 += m[r0 + j] * v[j] + m[r0 + j + 1] * v[j + 1];
            s1 += m[r1 + j] * v[j] + m[r1 + j + 1] * v[j + 1];
            j += 2;
        }
        if j < n {
            s0 += m[r0 + j] * v[j];
            s1 += m[r1 + j] * v[j];
        }
        out[i] = s0;
        out[i + 1] = s1;
        i += 2;
    }
    scalar_rows(m, v, out, n, i..n);
}

pub fn matvec_tiled_4x4(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    check_dims(m, v, out, n);
    let mut i = 0;
    while i + 4 <= n {
        let rows = [i * n, (i + 1) * n, (i + 2) * n, (i + 3) * n];
        let mut sums = [0.0f32; 4];
        let mut j = 0;
        while j + 4 <= n {
            for (sum, &r) in sums.iter_mut().zip(&rows) {
                *sum += m[r + j] * v[j]
                    + m[r + j + 1] * v[j + 1]
                    + m[r + j + 2] * v[j + 2]
                    + m[r + j + 3] * v[j + 3];
            }
            j += 4;
        }
        for jj in j..n {
            for (sum, &r) in sums.iter_mut().zip(&rows) {
                *sum += m[r + jj] * v[jj];
            }
        }
        out[i..i + 4].copy_from_slice(&sums);
        i += 4;
    }
    scalar_rows(m, v, out, n, i..n);
}

/// 4x4 tile with the four `v` values loaded once and shared by four rows.
pub fn matvec_tiled_4x4_cse(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    check_dims(m, v, out, n);
    let mut i = 0;
    while i + 4 <= n {
        let (r0, r1, r2, r3) = (i * n, (i + 1) * n, (i + 2) * n, (i + 3) * n);
        let (mut s0, mut s1, mut s2, mut s3) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
        let mut j = 0;
        while j + 4 <= n {
            let (v0, v1, v2, v3) = (v[j], v[j + 1], v[j + 2], v[j + 3]);
            s0 += m[r0 + j] * v0 + m[r0 + j + 1] * v1 + m[r0 + j + 2] * v2 + m[r0 + j + 3] * v3;
            s1 += m[r1 + j] * v0 + m[r1 + j + 1] * v1 + m[r1 + j + 2] * v2 + m[r1 + j + 3] * v3;
            s2 += m[r2 + j] * v0 + m[r2 + j + 1] * v1 + m[r2 + j + 2] * v2 + m[r2 + j + 3] * v3;
            s3 += m[r3 + j] * v0 + m[r3 + j + 1] * v1 + m[r3 + j + 2] * v2 + m[r3 + j + 3] * v3;
            j += 4;
        }
        while j < n {
            let vj = v[j];
            s0 += m[r0 + j] * vj;
            s1 += m[r1 + j] * vj;
            s2 += m[r2 + j] * vj;
            s3 += m[r3 + j] * vj;
            j += 1;
        }
        out[i] = s0;
        out[i + 1] = s1;
        out[i + 2] = s2;
        out[i + 3] = s3;
        i += 4;
    }
    scalar_rows(m, v, out, n, i..n);
}

pub fn matvec_unrolled4(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    rows_with(m, v, out, n, dot_lanes::<4>);
}

pub fn matvec_unrolled8(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    rows_with(m, v, out, n, dot_lanes::<8>);
}

pub fn matvec_avx1(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    rows_with(m, v, out, n, crate::dot::dot_fma_avx1);
}

pub fn matvec_avx2(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    rows_with(m, v, out, n, dot_fma_avx2);
}

/// `relu` applied as each row's dot product is stored.
pub fn matvec_relu_fused(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    rows_with(m, v, out, n, |row, v| relu(dot_basic(row, v)));
}

/// Full matvec, then a separate `relu` pass over `out`.
pub fn matvec_relu_unfused(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    matvec_basic(m, v, out, n);
    relu_in_place(out);
}

pub fn matvec_relu_avx2(m: &[f32], v: &[f32], out: &mut [f32], n: usize) {
    rows_with(m, v, out, n, |row, v| relu(dot_fma_avx2(row, v)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type MatvecFn = fn(&[f32], &[f32], &mut [f32], usize);

    const VARIANTS: &[(&str, MatvecFn)] = &[
        ("accumulate", matvec_accumulate),
        ("row_hoisted", matvec_row_hoisted),
        ("pointer_arith", matvec_pointer_arith),
        ("interchange", matvec_interchange),
        ("interchange_hoisted", matvec_interchange_hoisted),
        ("tiled_2x2", matvec_tiled_2x2),
        ("tiled_4x4", matvec_tiled_4x4),
        ("tiled_4x4_cse", matvec_tiled_4x4_cse),
        ("unrolled4", matvec_unrolled4),
        ("unrolled8", matvec_unrolled8),
        ("avx1", matvec_avx1),
        ("avx2", matvec_avx2),
    ];

    const RELU_VARIANTS: &[(&str, MatvecFn)] = &[
        ("relu_fused", matvec_relu_fused),
        ("relu_unfused", matvec_relu_unfused),
        ("relu_avx2", matvec_relu_avx2),
    ];

    fn make_inputs(n: usize) -> (Vec<f32>, Vec<f32>) {
        let m = (0..n * n).map(|k| ((k * 7 + 3) % 11) as f32 - 5.0).collect();
        let v = (0..n).map(|j| (j % 5) as f32 - 2.0).collect();
        (m, v)
    }

    #[test]
    fn variants_match_basic_exactly_on_integers() {
        for n in [0, 1, 2, 3, 4, 5, 7, 8, 9, 16, 33] {
            let (m, v) = make_inputs(n);
            let mut expected = vec![0.0f32; n];
            matvec_basic(&m, &v, &mut expected, n);
            for (name, func) in VARIANTS {
                let mut out = vec![f32::NAN; n];
                func(&m, &v, &mut out, n);
                assert_eq!(out, expected, "{name} n={n}");
            }

            let relu: Vec<f32> = expected.iter().map(|x| x.max(0.0)).collect();
            for (name, func) in RELU_VARIANTS {
                let mut out = vec![f32::NAN; n];
                func(&m, &v, &mut out, n);
                assert_eq!(out, relu, "{name} n={n}");
            }
        }
    }

    #[test]
    fn relu_forms_agree_on_nan_rows() {
        let n = 3;
        let mut m = vec![0.0f32; n * n];
        m[0] = f32::NAN;
        m[4] = -1.0;
        m[8] = 2.0;
        let v = [1.0f32, 1.0, 1.0];
        for (name, func) in RELU_VARIANTS {
            let mut out = [7.0f32; 3];
            func(&m, &v, &mut out, n);
            assert!(out[0].is_nan(), "{name} {out:?}");
            assert_eq!(&out[1..], &[0.0, 2.0], "{name}");
        }
    }

    #[test]
    #[should_panic]
    fn pointer_walk_rejects_short_matrix() {
        let m = [1.0f32, 2.0];
        let v = [1.0f32; 3];
        let mut out = [0.0f32; 3];
        matvec_pointer_arith(&m, &v, &mut out, 3);
    }

    #[test]
    #[should_panic]
    fn pointer_walk_rejects_short_vector() {
        let m = [1.0f32; 9];
        let v = [1.0f32; 2];
        let mut out = [0.0f32; 3];
        matvec_pointer_arith(&m, &v, &mut out, 3);
    }

    #[test]
    fn identity_returns_vector() {
        let n = 6;
        let mut m = vec![0.0f32; n * n];
        crate::matmul::matrix_identity(&mut m, n);
        let v = [1.5f32, -2.0, 0.0, 3.25, 7.0, -0.5];
        let mut out = [0.0f32; 6];
        for (name, func) in VARIANTS {
            func(&m, &v, &mut out, n);
            assert_eq!(out, v, "{name}");
        }
    }

    proptest! {
        #[test]
        fn random_inputs_close_to_reference(
            (n, m, v) in (1usize..=40).prop_flat_map(|n| (
                Just(n),
                proptest::collection::vec(-1.0f32..1.0, n * n),
                proptest::collection::vec(-1.0f32..1.0, n),
            ))
        ) {
            let expected: Vec<f64> = (0..n)
                .map(|i| (0..n).map(|j| m[i * n + j] as f64 * v[j] as f64).sum())
                .collect();
            let tol = 1.0e-5 * n as f64;
            let mut out = vec![0.0f32; n];
            for (name, func) in VARIANTS.iter().chain(RELU_VARIANTS) {
                func(&m, &v, &mut out, n);
                let relu = name.starts_with("relu");
                for (i, (&got, &want)) in out.iter().zip(&expected).enumerate() {
                    let want = if relu { want.max(0.0) } else { want };
                    prop_assert!((got as f64 - want).abs() <= tol, "{} i={} {} vs {}", name, i, got, want);
                }
            }
        }
    }
}
