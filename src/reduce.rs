//! Horizontal reductions: sum, product, sum of squares and extrema.
//!
//! # Strategies
//!
//! | Function | Strategy |
//! |----------|----------|
//! | [`sum`] | Sequential loop |
//! | [`sum_pointer_arith`] | Raw pointer walk |
//! | [`sum_avx1`] / [`sum_avx2`] | 4 / 8 lane partial sums, horizontal add at the end |
//! | [`min`] / [`max`] | Sequential compare |
//! | [`min_avx2`] / [`max_avx2`] | 8 lane `minps`/`maxps`, then scalar reduction |
//! | [`min_and_max`] | Both extrema in one pass |
//!
//! The SIMD extrema use `_mm256_min_ps`, which is not NaN-symmetric; inputs
//! are assumed NaN-free.

use crate::cpu::{use_avx, use_avx2};

pub fn sum(v: &[f32]) -> f32 {
    let mut total = 0.0f32;
    for &x in v {
        total += x;
    }
    total
}

pub fn sum_pointer_arith(v: &[f32]) -> f32 {
    let mut total = 0.0f32;
    let mut p = v.as_ptr();
    // SAFETY: `p` walks from the first element up to one-past-the-end.
    unsafe {
        let end = p.add(v.len());
        while p != end {
            total += *p;
            p = p.add(1);
        }
    }
    total
}

pub fn sum_avx1(v: &[f32]) -> f32 {
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx() {
            // SAFETY: guarded by AVX runtime detection.
            return unsafe { x86::sum_avx1(v) };
        }
    }
    sum(v)
}

pub fn sum_avx2(v: &[f32]) -> f32 {
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2() {
            // SAFETY: guarded by AVX2 runtime detection.
            return unsafe { x86::sum_avx2(v) };
        }
    }
    sum(v)
}

/// Product of all elements; `1.0` for an empty slice.
pub fn product(v: &[f32]) -> f32 {
    v.iter().product()
}

pub fn sum_squares(v: &[f32]) -> f32 {
    let mut total = 0.0f32;
    for &x in v {
        total += x * x;
    }
    total
}

pub fn sum_squares_avx1(v: &[f32]) -> f32 {
    crate::dot::dot_avx1(v, v)
}

pub fn sum_squares_avx2(v: &[f32]) -> f32 {
    crate::dot::dot_avx2(v, v)
}

/// Euclidean length: `sqrt(sum(x^2))`.
pub fn magnitude(v: &[f32]) -> f32 {
    sum_squares(v).sqrt()
}

pub fn min(v: &[f32]) -> Option<f32> {
    let (&first, rest) = v.split_first()?;
    let mut lo = first;
    for &x in rest {
        if x < lo {
            lo = x;
        }
    }
    Some(lo)
}

pub fn max(v: &[f32]) -> Option<f32> {
    let (&first, rest) = v.split_first()?;
    let mut hi = first;
    for &x in rest {
        if x > hi {
            hi = x;
        }
    }
    Some(hi)
}

pub fn min_avx2(v: &[f32]) -> Option<f32> {
    if v.is_empty() {
        return None;
    }
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2() {
            // SAFETY: guarded by AVX2 runtime detection and non-empty slice.
            return Some(unsafe { x86::min_avx2(v) });
        }
    }
    min(v)
}

pub fn max_avx2(v: &[f32]) -> Option<f32> {
    if v.is_empty() {
        return None;
    }
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2() {
            // SAFETY: guarded by AVX2 runtime detection and non-empty slice.
            return Some(unsafe { x86::max_avx2(v) });
        }
    }
    max(v)
}

/// `(min, max)` in a single pass.
pub fn min_and_max(v: &[f32]) -> Option<(f32, f32)> {
    let (&first, rest) = v.split_first()?;
    let (mut lo, mut hi) = (first, first);
    for &x in rest {
        if x < lo {
            lo = x;
        }
        if x > hi {
            hi = x;
        }
    }
    Some((lo, hi))
}

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod x86 {
    use std::arch::x86_64::{
        _mm_add_ps, _mm_loadu_ps, _mm_setzero_ps, _mm256_add_ps, _mm256_loadu_ps, _mm256_max_ps,
        _mm256_min_ps, _mm256_set1_ps, _mm256_setzero_ps, _mm256_storeu_ps,
    };

    use crate::dot::x86::{hsum128, hsum256};

    #[target_feature(enable = "avx")]
    pub unsafe fn sum_avx1(v: &[f32]) -> f32 {
        let len = v.len();
        let ptr = v.as_ptr();
        let mut acc = _mm_setzero_ps();
        let mut i = 0usize;
        while i + 4 <= len {
            acc = _mm_add_ps(acc, _mm_loadu_ps(ptr.add(i)));
            i += 4;
        }
        let mut total = hsum128(acc);
        while i < len {
            total += *ptr.add(i);
            i += 1;
        }
        total
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn sum_avx2(v: &[f32]) -> f32 {
        let len = v.len();
        let ptr = v.as_ptr();
        let mut acc = _mm256_setzero_ps();
        let mut i = 0usize;
        while i + 8 <= len {
            acc = _mm256_add_ps(acc, _mm256_loadu_ps(ptr.add(i)));
            i += 8;
        }
        let mut total = hsum256(acc);
        while i < len {
            total += *ptr.add(i);
            i += 1;
        }
        total
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn min_avx2(v: &[f32]) -> f32 {
        let len = v.len();
        let ptr = v.as_ptr();
        let mut i = 0usize;
        let mut min_v = _mm256_set1_ps(f32::INFINITY);
        while i + 8 <= len {
            min_v = _mm256_min_ps(min_v, _mm256_loadu_ps(ptr.add(i)));
            i += 8;
        }

        let mut tmp = [0.0f32; 8];
        _mm256_storeu_ps(tmp.as_mut_ptr(), min_v);
        let mut lo = *ptr;
        for &x in &tmp {
            if x < lo {
                lo = x;
            }
        }

        while i < len {
            let x = *ptr.add(i);
            if x < lo {
                lo = x;
            }
            i += 1;
        }
        lo
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn max_avx2(v: &[f32]) -> f32 {
        let len = v.len();
        let ptr = v.as_ptr();
        let mut i = 0usize;
        let mut max_v = _mm256_set1_ps(f32::NEG_INFINITY);
        while i + 8 <= len {
            max_v = _mm256_max_ps(max_v, _mm256_loadu_ps(ptr.add(i)));
            i += 8;
        }

        let mut tmp = [0.0f32; 8];
        _mm256_storeu_ps(tmp.as_mut_ptr(), max_v);
        let mut hi = *ptr;
        for &x in &tmp {
            if x > hi {
                hi = x;
            }
        }

        while i < len {
            let x = *ptr.add(i);
            if x > hi {
                hi = x;
            }
            i += 1;
        }
        hi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sum_bound(v: &[f32]) -> f32 {
        let magnitude: f32 = v.iter().map(|x| x.abs()).sum();
        1.0e-5 * magnitude * (v.len() as f32).sqrt().max(1.0) + 1.0e-6
    }

    proptest! {
        #[test]
        fn sum_variants_match(values in proptest::collection::vec(-1.0e3f32..1.0e3, 0..=1024)) {
            let expected: f64 = values.iter().map(|&x| x as f64).sum();
            let tol = sum_bound(&values) as f64;
            for got in [sum(&values), sum_pointer_arith(&values), sum_avx1(&values), sum_avx2(&values)] {
                prop_assert!((got as f64 - expected).abs() <= tol, "got {got}, expected {expected}");
            }

            let expected: f64 = values.iter().map(|&x| x as f64 * x as f64).sum();
            for got in [sum_squares(&values), sum_squares_avx1(&values), sum_squares_avx2(&values)] {
                prop_assert!((got as f64 - expected).abs() <= expected * 1.0e-4 + 1.0e-6);
            }
        }

        #[test]
        fn extrema_variants_match(values in proptest::collection::vec(-1.0e6f32..1.0e6, 0..=300)) {
            let expected_min = values.iter().copied().reduce(f32::min);
            let expected_max = values.iter().copied().reduce(f32::max);
            prop_assert_eq!(min(&values), expected_min);
            prop_assert_eq!(max(&values), expected_max);
            prop_assert_eq!(min_avx2(&values), expected_min);
            prop_assert_eq!(max_avx2(&values), expected_max);
            prop_assert_eq!(min_and_max(&values), expected_min.zip(expected_max));
        }
    }

    #[test]
    fn basic_cases() {
        let empty: [f32; 0] = [];
        assert_eq!(min(&empty), None);
        assert_eq!(max_avx2(&empty), None);
        assert_eq!(min_and_max(&empty), None);
        assert_eq!(sum(&empty), 0.0);
        assert_eq!(product(&empty), 1.0);

        let v = [3.0f32, -1.0, 4.0, 1.0, -5.0, 9.0, 2.0, 6.0, 5.0];
        assert_eq!(min_and_max(&v), Some((-5.0, 9.0)));
        assert_eq!(sum(&v), 24.0);
        assert_eq!(product(&[2.0, 3.0, 4.0]), 24.0);
        assert_eq!(magnitude(&[3.0, 4.0]), 5.0);
    }
}
