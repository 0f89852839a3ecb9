//! Softmax: `v[i] = exp(v[i]) / sum(exp(v))`, in place.
//!
//! # Strategies
//!
//! | Function | Strategy |
//! |----------|----------|
//! | [`softmax_basic`] | Sum of exponentials, then `exp` again and divide |
//! | [`softmax_reciprocal`] | Divide replaced by multiply with `1 / sum` |
//! | [`softmax_exponentiate_first`] | `exp` once in place, then sum, then scale |
//! | [`softmax_fused_exp_sum`] | `exp` and sum fused in one loop |
//! | [`softmax_stable`] | Subtract the maximum first so `exp` cannot overflow |
//! | [`softmax_avx1`] | Fused scalar `exp` + sum, 4-lane scale |
//! | [`softmax_avx2`] | 8-lane polynomial `exp` + sum, 8-lane scale |
//!
//! Empty input is a no-op. If every exponential underflows the denominator is
//! zero and [`KernelError::ZeroDenominator`] is returned. Variants that
//! exponentiate in place have then already overwritten `v`.

use crate::cpu::use_avx2_fma;
use crate::elementwise::{expize, multiply_scalar, multiply_scalar_avx1, multiply_scalar_avx2};
use crate::error::{KernelError, Result};

pub fn sum_of_exponentials(v: &[f32]) -> f32 {
    let mut total = 0.0f32;
    for &x in v {
        total += x.exp();
    }
    total
}

#[inline]
fn check_denominator(denom: f32) -> Result<()> {
    if denom == 0.0 {
        tracing::debug!("softmax denominator underflowed to zero");
        return Err(KernelError::ZeroDenominator);
    }
    Ok(())
}

pub fn softmax_basic(v: &mut [f32]) -> Result<()> {
    if v.is_empty() {
        return Ok(());
    }
    let denom = sum_of_exponentials(v);
    check_denominator(denom)?;
    for x in v.iter_mut() {
        *x = x.exp() / denom;
    }
    Ok(())
}

pub fn softmax_reciprocal(v: &mut [f32]) -> Result<()> {
    if v.is_empty() {
        return Ok(());
    }
    let denom = sum_of_exponentials(v);
    check_denominator(denom)?;
    let recip = 1.0 / denom;
    for x in v.iter_mut() {
        *x = x.exp() * recip;
    }
    Ok(())
}

/// Exponentiates once and reuses the stored values for the sum.
pub fn softmax_exponentiate_first(v: &mut [f32]) -> Result<()> {
    if v.is_empty() {
        return Ok(());
    }
    expize(v);
    let denom = crate::reduce::sum(v);
    check_denominator(denom)?;
    multiply_scalar(v, 1.0 / denom);
    Ok(())
}

pub fn softmax_fused_exp_sum(v: &mut [f32]) -> Result<()> {
    if v.is_empty() {
        return Ok(());
    }
    let denom = exp_and_sum(v);
    check_denominator(denom)?;
    multiply_scalar(v, 1.0 / denom);
    Ok(())
}

#[inline]
fn exp_and_sum(v: &mut [f32]) -> f32 {
    let mut total = 0.0f32;
    for x in v.iter_mut() {
        *x = x.exp();
        total += *x;
    }
    total
}

/// Max-subtracted softmax; the largest exponential is exactly 1, so the
/// denominator is at least 1 for finite input.
pub fn softmax_stable(v: &mut [f32]) -> Result<()> {
    let Some(hi) = crate::reduce::max(v) else {
        return Ok(());
    };
    crate::elementwise::add_scalar(v, -hi);
    softmax_fused_exp_sum(v)
}

pub fn softmax_avx1(v: &mut [f32]) -> Result<()> {
    if v.is_empty() {
        return Ok(());
    }
    let denom = exp_and_sum(v);
    check_denominator(denom)?;
    multiply_scalar_avx1(v, 1.0 / denom);
    Ok(())
}

pub fn softmax_avx2(v: &mut [f32]) -> Result<()> {
    if v.is_empty() {
        return Ok(());
    }
    #[cfg(target_arch = "x86_64")]
    let denom = if use_avx2_fma() {
        // SAFETY: guarded by AVX2 and FMA runtime detection.
        unsafe { x86::exp_and_sum_avx2(v) }
    } else {
        exp_and_sum(v)
    };
    #[cfg(not(target_arch = "x86_64"))]
    let denom = exp_and_sum(v);

    check_denominator(denom)?;
    multiply_scalar_avx2(v, 1.0 / denom);
    Ok(())
}

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod x86 {
    use std::arch::x86_64::{_mm256_add_ps, _mm256_loadu_ps, _mm256_setzero_ps, _mm256_storeu_ps};

    use crate::dot::x86::hsum256;
    use crate::elementwise::x86::exp256;

    #[target_feature(enable = "avx2,fma")]
    pub unsafe fn exp_and_sum_avx2(v: &mut [f32]) -> f32 {
        let len = v.len();
        let ptr = v.as_mut_ptr();
        let mut acc = _mm256_setzero_ps();
        let mut i = 0usize;
        while i + 8 <= len {
            let e = exp256(_mm256_loadu_ps(ptr.add(i)));
            _mm256_storeu_ps(ptr.add(i), e);
            acc = _mm256_add_ps(acc, e);
            i += 8;
        }
        let mut total = hsum256(acc);
        while i < len {
            let e = (*ptr.add(i)).exp();
            *ptr.add(i) = e;
            total += e;
            i += 1;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type SoftmaxFn = fn(&mut [f32]) -> Result<()>;

    const VARIANTS: &[(&str, SoftmaxFn)] = &[
        ("basic", softmax_basic),
        ("reciprocal", softmax_reciprocal),
        ("exponentiate_first", softmax_exponentiate_first),
        ("fused_exp_sum", softmax_fused_exp_sum),
        ("stable", softmax_stable),
        ("avx1", softmax_avx1),
        ("avx2", softmax_avx2),
    ];

    fn reference(v: &[f32]) -> Vec<f64> {
        let hi = v.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
        let exps: Vec<f64> = v.iter().map(|&x| (x as f64 - hi).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.iter().map(|e| e / total).collect()
    }

    #[test]
    fn sums_to_one_for_small_sequences() {
        for n in 1..=16 {
            for (name, func) in VARIANTS {
                let mut v: Vec<f32> = (1..=n).map(|i| i as f32).collect();
                func(&mut v).unwrap();
                let total: f32 = v.iter().sum();
                assert!((total - 1.0).abs() < 1.0e-5, "{name} n={n} total={total}");
                assert!(v.windows(2).all(|w| w[0] < w[1]), "{name} n={n}");
            }
        }
    }

    proptest! {
        #[test]
        fn variants_match_reference(values in proptest::collection::vec(-20.0f32..20.0, 1..=200)) {
            let expected = reference(&values);
            for (name, func) in VARIANTS {
                let mut v = values.clone();
                func(&mut v).unwrap();
                for (idx, (&got, &want)) in v.iter().zip(&expected).enumerate() {
                    prop_assert!(
                        (got as f64 - want).abs() <= 1.0e-4 * want + 1.0e-9,
                        "{name} idx={idx} got={got} want={want}"
                    );
                }
            }
        }
    }

    #[test]
    fn empty_and_degenerate_inputs() {
        for (name, func) in VARIANTS {
            let mut empty: [f32; 0] = [];
            assert_eq!(func(&mut empty), Ok(()), "{name}");
        }

        let mut underflow = [-200.0f32, -400.0];
        assert_eq!(softmax_basic(&mut underflow), Err(KernelError::ZeroDenominator));
        assert_eq!(underflow, [-200.0, -400.0]);

        // Long enough to hit both the 8-lane body and the scalar tail.
        for (name, func) in VARIANTS {
            let mut v = [-200.0f32; 11];
            if *name == "stable" {
                func(&mut v).unwrap();
                assert!(v.iter().all(|&x| (x - 1.0 / 11.0).abs() < 1.0e-6), "{name} {v:?}");
            } else {
                assert_eq!(func(&mut v), Err(KernelError::ZeroDenominator), "{name}");
            }
        }

        let mut underflow = [-200.0f32, -400.0];
        softmax_stable(&mut underflow).unwrap();
        assert_eq!(underflow[0], 1.0);
        assert_eq!(underflow[1], 0.0);
    }

    #[test]
    fn nan_poisons_every_output() {
        for (name, func) in VARIANTS {
            for pos in [0, 3, 9] {
                let mut v: Vec<f32> = (0..11).map(|i| i as f32 * 0.5).collect();
                v[pos] = f32::NAN;
                assert_eq!(func(&mut v), Ok(()), "{name} pos={pos}");
                assert!(v.iter().all(|x| x.is_nan()), "{name} pos={pos} {v:?}");
            }
        }
    }

    #[test]
    fn sum_of_exponentials_known() {
        assert_eq!(sum_of_exponentials(&[0.0, 0.0, 0.0]), 3.0);
        assert_eq!(sum_of_exponentials(&[]), 0.0);
    }
}
