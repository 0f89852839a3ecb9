//! Mean, variance and standard deviation (population statistics).
//!
//! The two-pass forms compute the mean first and then the squared
//! differences. The fused forms get both moments from one pass over the data
//! via `E[x^2] - E[x]^2`, which halves memory traffic but cancels badly when
//! the mean is large relative to the spread.
//!
//! Empty slices have mean and variance `0.0`.

use crate::cpu::{use_avx, use_avx2};

pub fn mean(v: &[f32]) -> f32 {
    if v.is_empty() {
        return 0.0;
    }
    crate::reduce::sum(v) / v.len() as f32
}

pub fn mean_avx1(v: &[f32]) -> f32 {
    if v.is_empty() {
        return 0.0;
    }
    crate::reduce::sum_avx1(v) / v.len() as f32
}

pub fn mean_avx2(v: &[f32]) -> f32 {
    if v.is_empty() {
        return 0.0;
    }
    crate::reduce::sum_avx2(v) / v.len() as f32
}

/// `sum((x - mean)^2)`.
pub fn sum_diff_squared(v: &[f32], mean: f32) -> f32 {
    let mut total = 0.0f32;
    for &x in v {
        let d = x - mean;
        total += d * d;
    }
    total
}

/// Variance around an already computed mean.
pub fn variance_of_mean(v: &[f32], mean: f32) -> f32 {
    if v.is_empty() {
        return 0.0;
    }
    sum_diff_squared(v, mean) / v.len() as f32
}

pub fn variance(v: &[f32]) -> f32 {
    variance_of_mean(v, mean(v))
}

pub fn std_dev(v: &[f32]) -> f32 {
    variance(v).sqrt()
}

/// Two passes: mean, then variance around it. Returns `(mean, variance)`.
pub fn mean_and_variance(v: &[f32]) -> (f32, f32) {
    let m = mean(v);
    (m, variance_of_mean(v, m))
}

/// One pass accumulating both `sum(x)` and `sum(x^2)`.
pub fn mean_and_variance_fused(v: &[f32]) -> (f32, f32) {
    if v.is_empty() {
        return (0.0, 0.0);
    }
    let mut total = 0.0f32;
    let mut total_sq = 0.0f32;
    for &x in v {
        total += x;
        total_sq += x * x;
    }
    moments(total, total_sq, v.len())
}

#[inline]
fn moments(total: f32, total_sq: f32, n: usize) -> (f32, f32) {
    let inv_n = 1.0 / n as f32;
    let m = total * inv_n;
    // Cancellation can push the difference slightly negative.
    let var = (total_sq * inv_n - m * m).max(0.0);
    (m, var)
}

pub fn mean_and_variance_fused_avx1(v: &[f32]) -> (f32, f32) {
    if v.is_empty() {
        return (0.0, 0.0);
    }
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx() {
            // SAFETY: guarded by AVX runtime detection.
            let (total, total_sq) = unsafe { x86::sum_and_squares_avx1(v) };
            return moments(total, total_sq, v.len());
        }
    }
    mean_and_variance_fused(v)
}

pub fn mean_and_variance_fused_avx2(v: &[f32]) -> (f32, f32) {
    if v.is_empty() {
        return (0.0, 0.0);
    }
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2() {
            // SAFETY: guarded by AVX2 runtime detection.
            let (total, total_sq) = unsafe { x86::sum_and_squares_avx2(v) };
            return moments(total, total_sq, v.len());
        }
    }
    mean_and_variance_fused(v)
}

/// `(mean, std_dev)` with the two-pass variance.
pub fn mean_and_std_dev(v: &[f32]) -> (f32, f32) {
    let (m, var) = mean_and_variance(v);
    (m, var.sqrt())
}

/// Variance around `mean`, leaving `v[i] - mean` in `v` for the caller's
/// next loop (fusion of "subtract mean" into the variance pass).
pub fn variance_of_mean_fused(v: &mut [f32], mean: f32) -> f32 {
    if v.is_empty() {
        return 0.0;
    }
    let mut total = 0.0f32;
    for x in v.iter_mut() {
        let d = *x - mean;
        *x = d;
        total += d * d;
    }
    total / v.len() as f32
}

pub fn variance_of_mean_fused_avx2(v: &mut [f32], mean: f32) -> f32 {
    if v.is_empty() {
        return 0.0;
    }
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2() {
            // SAFETY: guarded by AVX2 runtime detection.
            return unsafe { x86::subtract_and_sum_squares_avx2(v, mean) } / v.len() as f32;
        }
    }
    variance_of_mean_fused(v, mean)
}

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod x86 {
    use std::arch::x86_64::{
        _mm_add_ps, _mm_loadu_ps, _mm_mul_ps, _mm_setzero_ps, _mm256_add_ps, _mm256_loadu_ps,
        _mm256_mul_ps, _mm256_set1_ps, _mm256_setzero_ps, _mm256_storeu_ps, _mm256_sub_ps,
    };

    use crate::dot::x86::{hsum128, hsum256};

    #[target_feature(enable = "avx")]
    pub unsafe fn sum_and_squares_avx1(v: &[f32]) -> (f32, f32) {
        let len = v.len();
        let ptr = v.as_ptr();
        let mut acc = _mm_setzero_ps();
        let mut acc_sq = _mm_setzero_ps();
        let mut i = 0usize;
        while i + 4 <= len {
            let x = _mm_loadu_ps(ptr.add(i));
            acc = _mm_add_ps(acc, x);
            acc_sq = _mm_add_ps(acc_sq, _mm_mul_ps(x, x));
            i += 4;
        }
        let (mut total, mut total_sq) = (hsum128(acc), hsum128(acc_sq));
        while i < len {
            let x = *ptr.add(i);
            total += x;
            total_sq += x * x;
            i += 1;
        }
        (total, total_sq)
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn sum_and_squares_avx2(v: &[f32]) -> (f32, f32) {
        let len = v.len();
        let ptr = v.as_ptr();
        let mut acc = _mm256_setzero_ps();
        let mut acc_sq = _mm256_setzero_ps();
        let mut i = 0usize;
        while i + 8 <= len {
            let x = _mm256_loadu_ps(ptr.add(i));
            acc = _mm256_add_ps(acc, x);
            acc_sq = _mm256_add_ps(acc_sq, _mm256_mul_ps(x, x));
            i += 8;
        }
        let (mut total, mut total_sq) = (hsum256(acc), hsum256(acc_sq));
        while i < len {
            let x = *ptr.add(i);
            total += x;
            total_sq += x * x;
            i += 1;
        }
        (total, total_sq)
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn subtract_and_sum_squares_avx2(v: &mut [f32], mean: f32) -> f32 {
        let len = v.len();
        let ptr = v.as_mut_ptr();
        let vmean = _mm256_set1_ps(mean);
        let mut acc = _mm256_setzero_ps();
        let mut i = 0usize;
        while i + 8 <= len {
            let d = _mm256_sub_ps(_mm256_loadu_ps(ptr.add(i)), vmean);
            _mm256_storeu_ps(ptr.add(i), d);
            acc = _mm256_add_ps(acc, _mm256_mul_ps(d, d));
            i += 8;
        }
        let mut total = hsum256(acc);
        while i < len {
            let d = *ptr.add(i) - mean;
            *ptr.add(i) = d;
            total += d * d;
            i += 1;
        }
        total
    }
}
