//! In-place normalization: min-max scaling, z-score standardization,
//! batch normalization and RMS normalization.
//!
//! Min-max and z-score fail on constant input (zero range, zero standard
//! deviation) and leave `v` untouched when they do. BatchNorm and RMSNorm add
//! `epsilon` under the square root, so they always succeed.
//!
//! | Family | Variants |
//! |--------|----------|
//! | Min-max | [`min_max_basic`], [`min_max_reciprocal`], [`min_max_pointer_arith`], [`min_max_fused`] |
//! | Z-score | [`zscore_basic`], [`zscore_fixed_mean`], [`zscore_reciprocal`], [`zscore_fused`], [`zscore_avx1`], [`zscore_avx2`] |
//! | BatchNorm | [`batchnorm_basic`], [`batchnorm_fission`], [`batchnorm_fission_scaled`], [`batchnorm_fusion_fission`], [`batchnorm_no_params`], [`batchnorm_avx1`], [`batchnorm_avx2`] |
//! | RMSNorm | [`rmsnorm_basic`], [`rmsnorm_reciprocal`], [`rmsnorm_avx1`], [`rmsnorm_avx2`] |

use crate::cpu::{use_avx, use_avx2_fma};
use crate::error::{KernelError, Result};
use crate::stats::{
    mean, mean_and_std_dev, mean_and_variance_fused, mean_and_variance_fused_avx1,
    mean_and_variance_fused_avx2, std_dev, variance, variance_of_mean_fused,
};

/// Epsilon used by BatchNorm and RMSNorm when none is given.
pub const DEFAULT_EPSILON: f32 = 5.0e-5;

/// Learned BatchNorm parameters: `(v - mean) / sqrt(var + epsilon) * gamma + beta`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchNormParams {
    pub epsilon: f32,
    pub gamma: f32,
    pub beta: f32,
}

impl Default for BatchNormParams {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            gamma: 1.0,
            beta: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Min-max
// ---------------------------------------------------------------------------

#[inline]
fn check_range(lo: f32, hi: f32) -> Result<f32> {
    let range = hi - lo;
    if range == 0.0 {
        tracing::debug!(value = lo, "min-max normalization of constant input");
        return Err(KernelError::ZeroRange { value: lo });
    }
    Ok(range)
}

pub fn min_max_basic(v: &mut [f32]) -> Result<()> {
    let (Some(lo), Some(hi)) = (crate::reduce::min(v), crate::reduce::max(v)) else {
        return Ok(());
    };
    let range = check_range(lo, hi)?;
    for x in v.iter_mut() {
        *x = (*x - lo) / range;
    }
    Ok(())
}

pub fn min_max_reciprocal(v: &mut [f32]) -> Result<()> {
    let (Some(lo), Some(hi)) = (crate::reduce::min(v), crate::reduce::max(v)) else {
        return Ok(());
    };
    let scale = 1.0 / check_range(lo, hi)?;
    for x in v.iter_mut() {
        *x = (*x - lo) * scale;
    }
    Ok(())
}

pub fn min_max_pointer_arith(v: &mut [f32]) -> Result<()> {
    let (Some(lo), Some(hi)) = (crate::reduce::min(v), crate::reduce::max(v)) else {
        return Ok(());
    };
    let scale = 1.0 / check_range(lo, hi)?;
    let mut p = v.as_mut_ptr();
    // SAFETY: `p` walks from the start of `v` to one past its end.
    unsafe {
        let end = p.add(v.len());
        while p != end {
            *p = (*p - lo) * scale;
            p = p.add(1);
        }
    }
    Ok(())
}

/// Both extrema from one pass, then one scaling pass.
pub fn min_max_fused(v: &mut [f32]) -> Result<()> {
    let Some((lo, hi)) = crate::reduce::min_and_max(v) else {
        return Ok(());
    };
    let scale = 1.0 / check_range(lo, hi)?;
    for x in v.iter_mut() {
        *x = (*x - lo) * scale;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Z-score
// ---------------------------------------------------------------------------

/// Rejects constant input exactly. The computed deviation of a constant
/// vector is not always zero once the mean has been rounded.
#[inline]
fn check_spread(v: &[f32]) -> Result<()> {
    if let Some((lo, hi)) = crate::reduce::min_and_max(v) {
        if lo == hi {
            tracing::debug!(value = lo, "z-score normalization of constant input");
            return Err(KernelError::ZeroVariance);
        }
    }
    Ok(())
}

#[inline]
fn check_std_dev(sd: f32) -> Result<f32> {
    if sd == 0.0 {
        tracing::debug!("z-score standard deviation rounded to zero");
        return Err(KernelError::ZeroVariance);
    }
    Ok(sd)
}

/// Separate passes for mean and standard deviation, then divide.
pub fn zscore_basic(v: &mut [f32]) -> Result<()> {
    if v.is_empty() {
        return Ok(());
    }
    check_spread(v)?;
    let m = mean(v);
    let sd = check_std_dev(std_dev(v))?;
    for x in v.iter_mut() {
        *x = (*x - m) / sd;
    }
    Ok(())
}

/// Mean computed once and shared with the standard deviation pass.
pub fn zscore_fixed_mean(v: &mut [f32]) -> Result<()> {
    if v.is_empty() {
        return Ok(());
    }
    check_spread(v)?;
    let (m, sd) = mean_and_std_dev(v);
    let sd = check_std_dev(sd)?;
    for x in v.iter_mut() {
        *x = (*x - m) / sd;
    }
    Ok(())
}

pub fn zscore_reciprocal(v: &mut [f32]) -> Result<()> {
    if v.is_empty() {
        return Ok(());
    }
    check_spread(v)?;
    let (m, sd) = mean_and_std_dev(v);
    let scale = 1.0 / check_std_dev(sd)?;
    for x in v.iter_mut() {
        *x = (*x - m) * scale;
    }
    Ok(())
}

/// Mean and variance from a single `sum(x)` / `sum(x^2)` pass.
pub fn zscore_fused(v: &mut [f32]) -> Result<()> {
    if v.is_empty() {
        return Ok(());
    }
    check_spread(v)?;
    let (m, var) = mean_and_variance_fused(v);
    let scale = 1.0 / check_std_dev(var.max(0.0).sqrt())?;
    for x in v.iter_mut() {
        *x = (*x - m) * scale;
    }
    Ok(())
}

pub fn zscore_avx1(v: &mut [f32]) -> Result<()> {
    if v.is_empty() {
        return Ok(());
    }
    check_spread(v)?;
    let (m, var) = mean_and_variance_fused_avx1(v);
    let scale = 1.0 / check_std_dev(var.max(0.0).sqrt())?;
    affine_avx1(v, m, scale, 0.0);
    Ok(())
}

pub fn zscore_avx2(v: &mut [f32]) -> Result<()> {
    if v.is_empty() {
        return Ok(());
    }
    check_spread(v)?;
    let (m, var) = mean_and_variance_fused_avx2(v);
    let scale = 1.0 / check_std_dev(var.max(0.0).sqrt())?;
    affine_avx2(v, m, scale, 0.0);
    Ok(())
}

// ---------------------------------------------------------------------------
// BatchNorm
// ---------------------------------------------------------------------------

pub fn batchnorm_basic(v: &mut [f32], params: &BatchNormParams) {
    if v.is_empty() {
        return;
    }
    let m = mean(v);
    let var = variance(v);
    for x in v.iter_mut() {
        *x = (*x - m) / (var + params.epsilon).sqrt() * params.gamma + params.beta;
    }
}

/// One loop per arithmetic step.
pub fn batchnorm_fission(v: &mut [f32], params: &BatchNormParams) {
    if v.is_empty() {
        return;
    }
    let m = mean(v);
    let denom = (variance(v) + params.epsilon).sqrt();
    for x in v.iter_mut() {
        *x -= m;
    }
    for x in v.iter_mut() {
        *x /= denom;
    }
    for x in v.iter_mut() {
        *x *= params.gamma;
    }
    for x in v.iter_mut() {
        *x += params.beta;
    }
}

/// `gamma / sqrt(var + eps)` folded into one scale factor.
pub fn batchnorm_fission_scaled(v: &mut [f32], params: &BatchNormParams) {
    if v.is_empty() {
        return;
    }
    let m = mean(v);
    let scale = params.gamma / (variance(v) + params.epsilon).sqrt();
    for x in v.iter_mut() {
        *x -= m;
    }
    for x in v.iter_mut() {
        *x = *x * scale + params.beta;
    }
}

/// The variance pass also subtracts the mean, so only the scaling pass
/// remains.
pub fn batchnorm_fusion_fission(v: &mut [f32], params: &BatchNormParams) {
    if v.is_empty() {
        return;
    }
    let m = mean(v);
    let var = variance_of_mean_fused(v, m);
    let scale = params.gamma / (var + params.epsilon).sqrt();
    for x in v.iter_mut() {
        *x = *x * scale + params.beta;
    }
}

/// BatchNorm with `gamma = 1` and `beta = 0`.
pub fn batchnorm_no_params(v: &mut [f32], epsilon: f32) {
    if v.is_empty() {
        return;
    }
    let m = mean(v);
    let scale = 1.0 / (variance_of_mean_fused(v, m) + epsilon).sqrt();
    for x in v.iter_mut() {
        *x *= scale;
    }
}

pub fn batchnorm_avx1(v: &mut [f32], params: &BatchNormParams) {
    if v.is_empty() {
        return;
    }
    let (m, var) = mean_and_variance_fused_avx1(v);
    let scale = params.gamma / (var + params.epsilon).sqrt();
    affine_avx1(v, m, scale, params.beta);
}

pub fn batchnorm_avx2(v: &mut [f32], params: &BatchNormParams) {
    if v.is_empty() {
        return;
    }
    let (m, var) = mean_and_variance_fused_avx2(v);
    let scale = params.gamma / (var + params.epsilon).sqrt();
    affine_avx2(v, m, scale, params.beta);
}

// ---------------------------------------------------------------------------
// RMSNorm
// ---------------------------------------------------------------------------

#[inline]
fn rms(total_sq: f32, n: usize, epsilon: f32) -> f32 {
    (total_sq / n as f32 + epsilon).sqrt()
}

pub fn rmsnorm_basic(v: &mut [f32], epsilon: f32) {
    if v.is_empty() {
        return;
    }
    let denom = rms(crate::reduce::sum_squares(v), v.len(), epsilon);
    for x in v.iter_mut() {
        *x /= denom;
    }
}

pub fn rmsnorm_reciprocal(v: &mut [f32], epsilon: f32) {
    if v.is_empty() {
        return;
    }
    let scale = 1.0 / rms(crate::reduce::sum_squares(v), v.len(), epsilon);
    crate::elementwise::multiply_scalar(v, scale);
}

pub fn rmsnorm_avx1(v: &mut [f32], epsilon: f32) {
    if v.is_empty() {
        return;
    }
    let scale = 1.0 / rms(crate::reduce::sum_squares_avx1(v), v.len(), epsilon);
    crate::elementwise::multiply_scalar_avx1(v, scale);
}

pub fn rmsnorm_avx2(v: &mut [f32], epsilon: f32) {
    if v.is_empty() {
        return;
    }
    let scale = 1.0 / rms(crate::reduce::sum_squares_avx2(v), v.len(), epsilon);
    crate::elementwise::multiply_scalar_avx2(v, scale);
}

// ---------------------------------------------------------------------------
// Shared affine pass: v = (v - shift) * scale + offset
// ---------------------------------------------------------------------------

#[inline]
fn affine(v: &mut [f32], shift: f32, scale: f32, offset: f32) {
    for x in v.iter_mut() {
        *x = (*x - shift) * scale + offset;
    }
}

fn affine_avx1(v: &mut [f32], shift: f32, scale: f32, offset: f32) {
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx() {
            // SAFETY: guarded by AVX runtime detection.
            unsafe { x86::affine_avx1(v, shift, scale, offset) };
            return;
        }
    }
    affine(v, shift, scale, offset);
}

fn affine_avx2(v: &mut [f32], shift: f32, scale: f32, offset: f32) {
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2_fma() {
            // SAFETY: guarded by AVX2 and FMA runtime detection.
            unsafe { x86::affine_avx2(v, shift, scale, offset) };
            return;
        }
    }
    affine(v, shift, scale, offset);
}

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod x86 {
    use std::arch::x86_64::{
        _mm_add_ps, _mm_loadu_ps, _mm_mul_ps, _mm_set1_ps, _mm_storeu_ps, _mm_sub_ps,
        _mm256_fmadd_ps, _mm256_loadu_ps, _mm256_set1_ps, _mm256_storeu_ps, _mm256_sub_ps,
    };

    #[target_feature(enable = "avx")]
    pub unsafe fn affine_avx1(v: &mut [f32], shift: f32, scale: f32, offset: f32) {
        let len = v.len();
        let ptr = v.as_mut_ptr();
        let (vshift, vscale, voffset) = (
            _mm_set1_ps(shift),
            _mm_set1_ps(scale),
            _mm_set1_ps(offset),
        );
        let mut i = 0usize;
        while i + 4 <= len {
            let d = _mm_sub_ps(_mm_loadu_ps(ptr.add(i)), vshift);
            _mm_storeu_ps(ptr.add(i), _mm_add_ps(_mm_mul_ps(d, vscale), voffset));
            i += 4;
        }
        while i < len {
            *ptr.add(i) = (*ptr.add(i) - shift) * scale + offset;
            i += 1;
        }
    }

    #[target_feature(enable = "avx2,fma")]
    pub unsafe fn affine_avx2(v: &mut [f32], shift: f32, scale: f32, offset: f32) {
        let len = v.len();
        let ptr = v.as_mut_ptr();
        let (vshift, vscale, voffset) = (
            _mm256_set1_ps(shift),
            _mm256_set1_ps(scale),
            _mm256_set1_ps(offset),
        );
        let mut i = 0usize;
        while i + 8 <= len {
            let d = _mm256_sub_ps(_mm256_loadu_ps(ptr.add(i)), vshift);
            _mm256_storeu_ps(ptr.add(i), _mm256_fmadd_ps(d, vscale, voffset));
            i += 8;
        }
        while i < len {
            *ptr.add(i) = (*ptr.add(i) - shift).mul_add(scale, offset);
            i += 1;
        }
    }
}
