//! In-place element-wise maps, fills and counting over `f32` vectors.
//!
//! The scalar-broadcast kernels ([`add_scalar`], [`multiply_scalar`]) are the
//! building blocks that normalization and softmax finish with, so they come in
//! 4-lane and 8-lane flavours. [`expize_avx2`] uses a polynomial `exp` that is
//! also shared with the SIMD softmax.

use crate::cpu::{use_avx, use_avx2, use_avx2_fma};

pub fn clear(v: &mut [f32]) {
    v.fill(0.0);
}

pub fn set_constant(v: &mut [f32], c: f32) {
    v.fill(c);
}

/// `1, 2, ..., n`.
pub fn set_sequence(v: &mut [f32]) {
    for (i, x) in v.iter_mut().enumerate() {
        *x = (i + 1) as f32;
    }
}

/// `1, 2, ..., max, 1, 2, ...`. A `max` of zero behaves like one.
pub fn set_sequence_cycling(v: &mut [f32], max: usize) {
    let max = max.max(1);
    for (i, x) in v.iter_mut().enumerate() {
        *x = (i % max + 1) as f32;
    }
}

/// `start, start + 1, ...`.
pub fn set_range(v: &mut [f32], start: f32) {
    for (i, x) in v.iter_mut().enumerate() {
        *x = start + i as f32;
    }
}

pub fn add_scalar(v: &mut [f32], c: f32) {
    for x in v.iter_mut() {
        *x += c;
    }
}

pub fn add_scalar_avx1(v: &mut [f32], c: f32) {
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx() {
            // SAFETY: guarded by AVX runtime detection.
            return unsafe { x86::add_scalar_avx1(v, c) };
        }
    }
    add_scalar(v, c)
}

pub fn add_scalar_avx2(v: &mut [f32], c: f32) {
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2() {
            // SAFETY: guarded by AVX2 runtime detection.
            return unsafe { x86::add_scalar_avx2(v, c) };
        }
    }
    add_scalar(v, c)
}

pub fn multiply_scalar(v: &mut [f32], c: f32) {
    for x in v.iter_mut() {
        *x *= c;
    }
}

pub fn multiply_scalar_avx1(v: &mut [f32], c: f32) {
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx() {
            // SAFETY: guarded by AVX runtime detection.
            return unsafe { x86::multiply_scalar_avx1(v, c) };
        }
    }
    multiply_scalar(v, c)
}

pub fn multiply_scalar_avx2(v: &mut [f32], c: f32) {
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2() {
            // SAFETY: guarded by AVX2 runtime detection.
            return unsafe { x86::multiply_scalar_avx2(v, c) };
        }
    }
    multiply_scalar(v, c)
}

pub fn divide_scalar(v: &mut [f32], c: f32) {
    for x in v.iter_mut() {
        *x /= c;
    }
}

/// Division replaced by one reciprocal and a multiply per element.
pub fn divide_scalar_reciprocal(v: &mut [f32], c: f32) {
    multiply_scalar(v, 1.0 / c);
}

/// `dst[i] += src[i]`.
pub fn add_vectors(dst: &mut [f32], src: &[f32]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, &s) in dst.iter_mut().zip(src) {
        *d += s;
    }
}

pub fn add_vectors_avx2(dst: &mut [f32], src: &[f32]) {
    debug_assert_eq!(dst.len(), src.len());
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2() {
            // SAFETY: guarded by AVX2 runtime detection.
            return unsafe { x86::add_vectors_avx2(dst, src) };
        }
    }
    add_vectors(dst, src)
}

/// `dst[i] *= src[i]`.
pub fn multiply_vectors(dst: &mut [f32], src: &[f32]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, &s) in dst.iter_mut().zip(src) {
        *d *= s;
    }
}

pub fn multiply_vectors_avx2(dst: &mut [f32], src: &[f32]) {
    debug_assert_eq!(dst.len(), src.len());
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2() {
            // SAFETY: guarded by AVX2 runtime detection.
            return unsafe { x86::multiply_vectors_avx2(dst, src) };
        }
    }
    multiply_vectors(dst, src)
}

pub fn expize(v: &mut [f32]) {
    for x in v.iter_mut() {
        *x = x.exp();
    }
}

/// 8-lane `exp` via range reduction and a degree-6 polynomial.
///
/// Relative error is below 1e-6. Overflow to infinity, subnormal results,
/// underflow to zero and NaN all match [`expize`].
pub fn expize_avx2(v: &mut [f32]) {
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2_fma() {
            // SAFETY: guarded by AVX2 and FMA runtime detection.
            return unsafe { x86::expize_avx2(v) };
        }
    }
    expize(v)
}

pub fn logize(v: &mut [f32]) {
    for x in v.iter_mut() {
        *x = x.ln();
    }
}

pub fn log10ize(v: &mut [f32]) {
    for x in v.iter_mut() {
        *x = x.log10();
    }
}

pub fn square(v: &mut [f32]) {
    for x in v.iter_mut() {
        *x *= *x;
    }
}

pub fn sqrtize(v: &mut [f32]) {
    for x in v.iter_mut() {
        *x = x.sqrt();
    }
}

pub fn fabs(v: &mut [f32]) {
    for x in v.iter_mut() {
        *x = x.abs();
    }
}

pub fn tanhize(v: &mut [f32]) {
    for x in v.iter_mut() {
        *x = x.tanh();
    }
}

/// Heaviside step: `1.0` for positive values, else `0.0`.
pub fn step_in_place(v: &mut [f32]) {
    for x in v.iter_mut() {
        *x = crate::activation::step(*x);
    }
}

/// `-1.0`, `0.0` or `1.0`.
pub fn sign_in_place(v: &mut [f32]) {
    for x in v.iter_mut() {
        *x = crate::activation::sign(*x);
    }
}

pub fn count_zeros(v: &[f32]) -> usize {
    v.iter().filter(|&&x| x == 0.0).count()
}

pub fn count_nonzeros(v: &[f32]) -> usize {
    v.iter().filter(|&&x| x != 0.0).count()
}

pub fn count_negatives(v: &[f32]) -> usize {
    v.iter().filter(|&&x| x < 0.0).count()
}

pub fn count_positives(v: &[f32]) -> usize {
    v.iter().filter(|&&x| x > 0.0).count()
}

pub fn count_greater(v: &[f32], threshold: f32) -> usize {
    v.iter().filter(|&&x| x > threshold).count()
}

pub fn count_less(v: &[f32], threshold: f32) -> usize {
    v.iter().filter(|&&x| x < threshold).count()
}

/// Elements in the closed range `[lo, hi]`.
pub fn count_in_range(v: &[f32], lo: f32, hi: f32) -> usize {
    v.iter().filter(|&&x| x >= lo && x <= hi).count()
}

pub fn count_outside_range(v: &[f32], lo: f32, hi: f32) -> usize {
    v.iter().filter(|&&x| x < lo || x > hi).count()
}

pub fn has_negative(v: &[f32]) -> bool {
    v.iter().any(|&x| x < 0.0)
}

/// Same answer as [`has_negative`], but the scan loop has no bounds test: a
/// negative sentinel is written into the last slot so the loop always stops.
/// The last element is restored before returning.
pub fn has_negative_sentinel(v: &mut [f32]) -> bool {
    let Some(&last) = v.last() else {
        return false;
    };
    if last < 0.0 {
        return true;
    }

    let n = v.len();
    v[n - 1] = -1.0;
    let p = v.as_ptr();
    let mut i = 0usize;
    // SAFETY: v[n - 1] is negative, so the scan stops at or before index n - 1.
    unsafe {
        while !(*p.add(i) < 0.0) {
            i += 1;
        }
    }
    v[n - 1] = last;
    i < n - 1
}

/// Same length and every pair within `tolerance`.
pub fn approx_equal(a: &[f32], b: &[f32], tolerance: f32) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tolerance)
}

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_op_in_unsafe_fn)]
pub(crate) mod x86 {
    use std::arch::x86_64::{
        _CMP_UNORD_Q, __m256, _mm_add_ps, _mm_loadu_ps, _mm_mul_ps, _mm_set1_ps, _mm_storeu_ps,
        _mm256_add_epi32, _mm256_add_ps, _mm256_blendv_ps, _mm256_castps_si256,
        _mm256_castsi256_ps, _mm256_cmp_ps, _mm256_cvtps_epi32, _mm256_floor_ps, _mm256_fmadd_ps,
        _mm256_fnmadd_ps, _mm256_loadu_ps, _mm256_max_ps, _mm256_min_ps, _mm256_mul_ps,
        _mm256_set1_ps, _mm256_slli_epi32, _mm256_storeu_ps, _mm256_sub_ps,
    };

    /// Above this `exp` overflows to infinity.
    const EXP_HI: f32 = 89.0;
    /// Below this `exp` rounds to zero, even as a subnormal.
    const EXP_LO: f32 = -104.0;

    /// `exp` of 8 lanes: `e^x = 2^k * e^r` with `k = round(x * log2 e)` and
    /// `r = x - k ln 2`, where `e^r` is a degree-6 Taylor polynomial.
    ///
    /// `2^k` is applied as two factors so that overflow, subnormal results and
    /// underflow to zero round the way scalar `exp` does. NaN lanes pass
    /// through unchanged.
    #[target_feature(enable = "avx2,fma")]
    #[inline]
    pub unsafe fn exp256(x: __m256) -> __m256 {
        let one = _mm256_set1_ps(1.0);
        let nan = _mm256_cmp_ps(x, x, _CMP_UNORD_Q);
        let clamped = _mm256_max_ps(
            _mm256_min_ps(x, _mm256_set1_ps(EXP_HI)),
            _mm256_set1_ps(EXP_LO),
        );

        let k = _mm256_floor_ps(_mm256_fmadd_ps(
            clamped,
            _mm256_set1_ps(std::f32::consts::LOG2_E),
            _mm256_set1_ps(0.5),
        ));
        let r = _mm256_fnmadd_ps(k, _mm256_set1_ps(std::f32::consts::LN_2), clamped);

        let mut p = _mm256_set1_ps(0.001_388_889);
        p = _mm256_fmadd_ps(p, r, _mm256_set1_ps(0.008_333_334));
        p = _mm256_fmadd_ps(p, r, _mm256_set1_ps(0.041_666_668));
        p = _mm256_fmadd_ps(p, r, _mm256_set1_ps(0.166_666_67));
        p = _mm256_fmadd_ps(p, r, _mm256_set1_ps(0.5));
        p = _mm256_fmadd_ps(p, r, one);
        p = _mm256_fmadd_ps(p, r, one);

        // |k| <= 150 here, so each half stays a normal power of two.
        let k_lo = _mm256_floor_ps(_mm256_mul_ps(k, _mm256_set1_ps(0.5)));
        let k_hi = _mm256_sub_ps(k, k_lo);
        let e = _mm256_mul_ps(_mm256_mul_ps(p, pow2(k_lo)), pow2(k_hi));
        _mm256_blendv_ps(e, x, nan)
    }

    /// `2^k` for integral `k` in the normal exponent range, by adding `k`
    /// straight into the exponent field of 1.0.
    #[target_feature(enable = "avx2")]
    #[inline]
    unsafe fn pow2(k: __m256) -> __m256 {
        _mm256_castsi256_ps(_mm256_add_epi32(
            _mm256_castps_si256(_mm256_set1_ps(1.0)),
            _mm256_slli_epi32(_mm256_cvtps_epi32(k), 23),
        ))
    }

    #[target_feature(enable = "avx2,fma")]
    pub unsafe fn expize_avx2(v: &mut [f32]) {
        let len = v.len();
        let ptr = v.as_mut_ptr();
        let mut i = 0usize;
        while i + 8 <= len {
            _mm256_storeu_ps(ptr.add(i), exp256(_mm256_loadu_ps(ptr.add(i))));
            i += 8;
        }
        while i < len {
            *ptr.add(i) = (*ptr.add(i)).exp();
            i += 1;
        }
    }

    #[target_feature(enable = "avx")]
    pub unsafe fn add_scalar_avx1(v: &mut [f32], c: f32) {
        let len = v.len();
        let ptr = v.as_mut_ptr();
        let vc = _mm_set1_ps(c);
        let mut i = 0usize;
        while i + 4 <= len {
            _mm_storeu_ps(ptr.add(i), _mm_add_ps(_mm_loadu_ps(ptr.add(i)), vc));
            i += 4;
        }
        while i < len {
            *ptr.add(i) += c;
            i += 1;
        }
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn add_scalar_avx2(v: &mut [f32], c: f32) {
        let len = v.len();
        let ptr = v.as_mut_ptr();
        let vc = _mm256_set1_ps(c);
        let mut i = 0usize;
        while i + 8 <= len {
            _mm256_storeu_ps(ptr.add(i), _mm256_add_ps(_mm256_loadu_ps(ptr.add(i)), vc));
            i += 8;
        }
        while i < len {
            *ptr.add(i) += c;
            i += 1;
        }
    }

    #[target_feature(enable = "avx")]
    pub unsafe fn multiply_scalar_avx1(v: &mut [f32], c: f32) {
        let len = v.len();
        let ptr = v.as_mut_ptr();
        let vc = _mm_set1_ps(c);
        let mut i = 0usize;
        while i + 4 <= len {
            _mm_storeu_ps(ptr.add(i), _mm_mul_ps(_mm_loadu_ps(ptr.add(i)), vc));
            i += 4;
        }
        while i < len {
            *ptr.add(i) *= c;
            i += 1;
        }
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn multiply_scalar_avx2(v: &mut [f32], c: f32) {
        let len = v.len();
        let ptr = v.as_mut_ptr();
        let vc = _mm256_set1_ps(c);
        let mut i = 0usize;
        while i + 8 <= len {
            _mm256_storeu_ps(ptr.add(i), _mm256_mul_ps(_mm256_loadu_ps(ptr.add(i)), vc));
            i += 8;
        }
        while i < len {
            *ptr.add(i) *= c;
            i += 1;
        }
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn add_vectors_avx2(dst: &mut [f32], src: &[f32]) {
        let len = dst.len().min(src.len());
        let (pd, ps) = (dst.as_mut_ptr(), src.as_ptr());
        let mut i = 0usize;
        while i + 8 <= len {
            let sum = _mm256_add_ps(_mm256_loadu_ps(pd.add(i)), _mm256_loadu_ps(ps.add(i)));
            _mm256_storeu_ps(pd.add(i), sum);
            i += 8;
        }
        while i < len {
            *pd.add(i) += *ps.add(i);
            i += 1;
        }
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn multiply_vectors_avx2(dst: &mut [f32], src: &[f32]) {
        let len = dst.len().min(src.len());
        let (pd, ps) = (dst.as_mut_ptr(), src.as_ptr());
        let mut i = 0usize;
        while i + 8 <= len {
            let product = _mm256_mul_ps(_mm256_loadu_ps(pd.add(i)), _mm256_loadu_ps(ps.add(i)));
            _mm256_storeu_ps(pd.add(i), product);
            i += 8;
        }
        while i < len {
            *pd.add(i) *= *ps.add(i);
            i += 1;
        }
    }
}
