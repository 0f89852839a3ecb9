//! Activation functions: RELU, ELU, GELU (exact and approximated), SiLU and
//! Swish, plus vectorized and table-lookup forms.
//!
//! # GELU variants
//!
//! | Function | Formula |
//! |----------|---------|
//! | [`gelu_erf`] | `x * 0.5 * (1 + erf(x / sqrt 2))` |
//! | [`gelu_erf_reciprocal`] | Same, multiplying by `1 / sqrt 2` |
//! | [`gelu_tanh`] | `0.5x * (1 + tanh(sqrt(2/pi) * (x + 0.044715x^3)))` |
//! | [`gelu_tanh_hoisted`] | Same with `sqrt(2/pi)` folded into a constant |
//! | [`gelu_tanh_factored`] | `x + 0.044715x^3` factored as `x(1 + 0.044715x^2)` |
//! | [`gelu_sigmoid`] | `x * sigmoid(1.702x)` |
//! | [`gelu_sigmoid_inline`] | `x / (1 + exp(-1.702x))` |
//! | [`GeluTable`] | Precomputed [`gelu_erf`] keyed on the top float bits |
//!
//! The tanh form stays within 0.001 of the exact GELU; the sigmoid form is
//! off by up to about 0.021 around `|x| = 2.3`.
//!
//! # References
//!
//! - Hendrycks and Gimpel, *Gaussian Error Linear Units (GELUs)*, arXiv:1606.08415

use std::f32::consts::{FRAC_1_SQRT_2, PI};

use crate::cpu::{use_avx, use_avx2};
use crate::error::Result;
use crate::precompute::LookupTable;

/// `sqrt(2 / pi)`.
const SQRT_2_OVER_PI: f32 = 0.797_884_6;
const GELU_CUBIC: f32 = 0.044_715;
const GELU_SIGMOID_SCALE: f32 = 1.702;

/// Error function, Abramowitz and Stegun 7.1.26 (absolute error below 1.5e-7).
pub fn erf(x: f32) -> f32 {
    const A1: f32 = 0.254_829_6;
    const A2: f32 = -0.284_496_74;
    const A3: f32 = 1.421_413_8;
    const A4: f32 = -1.453_152;
    const A5: f32 = 1.061_405_4;
    const P: f32 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

#[inline]
pub fn relu(x: f32) -> f32 {
    if x <= 0.0 { 0.0 } else { x }
}

/// `x` for positive inputs, `alpha * (e^x - 1)` otherwise.
#[inline]
pub fn elu(x: f32, alpha: f32) -> f32 {
    if x <= 0.0 { alpha * (x.exp() - 1.0) } else { x }
}

pub fn gelu_erf(x: f32) -> f32 {
    let phi = 0.5 * (1.0 + erf(x / 2.0f32.sqrt()));
    x * phi
}

pub fn gelu_erf_reciprocal(x: f32) -> f32 {
    x * (0.5 * (1.0 + erf(x * FRAC_1_SQRT_2)))
}

pub fn gelu_tanh(x: f32) -> f32 {
    0.5 * x * (1.0 + ((2.0 / PI).sqrt() * (x + GELU_CUBIC * (x * x * x))).tanh())
}

pub fn gelu_tanh_hoisted(x: f32) -> f32 {
    0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + GELU_CUBIC * (x * x * x))).tanh())
}

/// One multiplication fewer: `x^3` is never formed.
pub fn gelu_tanh_factored(x: f32) -> f32 {
    0.5 * x * (1.0 + (SQRT_2_OVER_PI * x * (1.0 + GELU_CUBIC * (x * x))).tanh())
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn gelu_sigmoid(x: f32) -> f32 {
    x * sigmoid(GELU_SIGMOID_SCALE * x)
}

pub fn gelu_sigmoid_inline(x: f32) -> f32 {
    x / (1.0 + (-GELU_SIGMOID_SCALE * x).exp())
}

/// `x * sigmoid(beta * x)`.
pub fn swish(x: f32, beta: f32) -> f32 {
    x * sigmoid(beta * x)
}

pub fn swish_inline(x: f32, beta: f32) -> f32 {
    x * (1.0 / (1.0 + (-(beta * x)).exp()))
}

/// Swish with `beta = 1`.
pub fn silu(x: f32) -> f32 {
    x / (1.0 + (-x).exp())
}

#[inline]
pub fn step(x: f32) -> f32 {
    if x > 0.0 { 1.0 } else { 0.0 }
}

#[inline]
pub fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

pub fn relu_in_place(v: &mut [f32]) {
    for x in v.iter_mut() {
        *x = relu(*x);
    }
}

/// 4-lane RELU via `maxps` against zero.
pub fn relu_in_place_avx1(v: &mut [f32]) {
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx() {
            // SAFETY: guarded by AVX runtime detection.
            return unsafe { x86::relu_avx1(v) };
        }
    }
    relu_in_place(v)
}

/// 8-lane RELU via `maxps` against zero.
pub fn relu_in_place_avx2(v: &mut [f32]) {
    #[cfg(target_arch = "x86_64")]
    {
        if use_avx2() {
            // SAFETY: guarded by AVX2 runtime detection.
            return unsafe { x86::relu_avx2(v) };
        }
    }
    relu_in_place(v)
}

pub fn gelu_in_place(v: &mut [f32]) {
    for x in v.iter_mut() {
        *x = gelu_erf(*x);
    }
}

pub fn silu_in_place(v: &mut [f32]) {
    for x in v.iter_mut() {
        *x = silu(*x);
    }
}

pub fn elu_in_place(v: &mut [f32], alpha: f32) {
    for x in v.iter_mut() {
        *x = elu(*x, alpha);
    }
}

/// Table-driven GELU. A 24-bit table costs 64 MiB and keeps 15 mantissa
/// bits; a 16-bit table costs 256 KiB and keeps 7.
#[derive(Clone, Debug)]
pub struct GeluTable {
    table: LookupTable,
}

impl GeluTable {
    pub const BITS_24: u32 = 24;
    pub const BITS_16: u32 = 16;

    pub fn new(bits: u32) -> Result<Self> {
        Ok(Self {
            table: LookupTable::build(bits, gelu_erf)?,
        })
    }

    #[inline]
    pub fn lookup(&self, x: f32) -> f32 {
        self.table.lookup(x)
    }

    pub fn apply(&self, v: &mut [f32]) {
        self.table.apply(v)
    }

    pub fn table(&self) -> &LookupTable {
        &self.table
    }
}

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod x86 {
    use std::arch::x86_64::{
        _mm_add_ps, _mm_loadu_ps, _mm_max_ps, _mm_setzero_ps, _mm_storeu_ps, _mm256_add_ps,
        _mm256_loadu_ps, _mm256_max_ps, _mm256_setzero_ps, _mm256_storeu_ps,
    };

    // `max(zero, x)` returns the second operand when either is NaN, so NaN
    // propagates like the scalar version. It also returns `x` for `-0.0`;
    // adding `+0.0` turns that into `+0.0` and leaves every other lane as is.

    #[target_feature(enable = "avx")]
    pub unsafe fn relu_avx1(v: &mut [f32]) {
        let len = v.len();
        let ptr = v.as_mut_ptr();
        let zero = _mm_setzero_ps();
        let mut i = 0usize;
        while i + 4 <= len {
            let r = _mm_max_ps(zero, _mm_loadu_ps(ptr.add(i)));
            _mm_storeu_ps(ptr.add(i), _mm_add_ps(r, zero));
            i += 4;
        }
        while i < len {
            *ptr.add(i) = super::relu(*ptr.add(i));
            i += 1;
        }
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn relu_avx2(v: &mut [f32]) {
        let len = v.len();
        let ptr = v.as_mut_ptr();
        let zero = _mm256_setzero_ps();
        let mut i = 0usize;
        while i + 8 <= len {
            let r = _mm256_max_ps(zero, _mm256_loadu_ps(ptr.add(i)));
            _mm256_storeu_ps(ptr.add(i), _mm256_add_ps(r, zero));
            i += 8;
        }
        while i < len {
            *ptr.add(i) = super::relu(*ptr.add(i));
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid() -> impl Iterator<Item = f32> {
        (-400..=400).map(|i| i as f32 * 0.01)
    }

    #[test]
    fn erf_known_values() {
        assert!(erf(0.0).abs() < 5.0e-7);
        assert!((erf(1.0) - 0.842_700_8).abs() < 5.0e-7);
        assert!((erf(-1.0) + 0.842_700_8).abs() < 5.0e-7);
        assert!((erf(3.0) - 0.999_977_9).abs() < 5.0e-7);
        assert!((erf(6.0) - 1.0).abs() < 1.0e-7);
    }

    #[test]
    fn gelu_forms_agree() {
        for x in grid() {
            let exact = gelu_erf(x);
            assert!((gelu_erf_reciprocal(x) - exact).abs() < 2.0e-6, "x={x}");
            assert!((gelu_tanh(x) - exact).abs() < 0.01, "x={x}");
            assert!((gelu_tanh_hoisted(x) - gelu_tanh(x)).abs() < 2.0e-6, "x={x}");
            assert!((gelu_tanh_factored(x) - gelu_tanh(x)).abs() < 1.0e-5, "x={x}");
            assert!((gelu_sigmoid(x) - exact).abs() < 0.025, "x={x}");
            assert!((gelu_sigmoid_inline(x) - gelu_sigmoid(x)).abs() < 1.0e-5, "x={x}");
        }
    }

    #[test]
    fn gelu_shape() {
        assert_eq!(gelu_erf(0.0), 0.0);
        assert!((gelu_erf(10.0) - 10.0).abs() < 1.0e-5);
        assert!(gelu_erf(-10.0).abs() < 1.0e-5);
        // Slightly negative for moderate negative inputs.
        assert!(gelu_erf(-1.0) < 0.0);
    }

    #[test]
    fn simple_activations() {
        assert_eq!(relu(-1.0), 0.0);
        assert_eq!(relu(0.0), 0.0);
        assert_eq!(relu(2.5), 2.5);
        assert_eq!(elu(2.0, 1.0), 2.0);
        assert!((elu(-1.0, 1.0) - ((-1.0f32).exp() - 1.0)).abs() < 1.0e-7);
        assert_eq!(sigmoid(0.0), 0.5);
        assert_eq!(silu(0.0), 0.0);
        assert_eq!(step(0.0), 0.0);
        assert_eq!(step(1.0e-3), 1.0);
        assert_eq!(sign(-4.0), -1.0);
        assert_eq!(sign(0.0), 0.0);
        for x in grid() {
            assert!((swish(x, 1.0) - silu(x)).abs() < 2.0e-6);
            assert!((swish_inline(x, 1.5) - swish(x, 1.5)).abs() < 1.0e-6);
        }
    }

    #[test]
    fn relu_variants_agree_on_signed_zero_and_nan() {
        let mut expected = vec![
            -0.0f32,
            f32::NAN,
            0.0,
            -1.0,
            2.0,
            f32::NEG_INFINITY,
            -0.0,
            3.5,
            -0.0,
        ];
        let input = expected.clone();
        relu_in_place(&mut expected);
        for func in [relu_in_place_avx1, relu_in_place_avx2] {
            let mut got = input.clone();
            func(&mut got);
            for (idx, (g, e)) in got.iter().zip(&expected).enumerate() {
                assert!(
                    g.to_bits() == e.to_bits() || (g.is_nan() && e.is_nan()),
                    "idx={idx} got={g} expected={e}"
                );
            }
        }
        assert_eq!(relu(-0.0).to_bits(), 0.0f32.to_bits());
    }

    proptest! {
        #[test]
        fn relu_variants_match(values in proptest::collection::vec(-1.0e3f32..1.0e3, 0..=300)) {
            let mut expected = values.clone();
            relu_in_place(&mut expected);
            prop_assert!(expected.iter().all(|&x| x >= 0.0));

            let mut got = values.clone();
            relu_in_place_avx1(&mut got);
            prop_assert_eq!(&got, &expected);

            let mut got = values.clone();
            relu_in_place_avx2(&mut got);
            prop_assert_eq!(&got, &expected);
        }

        #[test]
        fn vector_forms_match_scalar(values in proptest::collection::vec(-8.0f32..8.0, 0..=64)) {
            let mut v = values.clone();
            gelu_in_place(&mut v);
            prop_assert!(v.iter().zip(&values).all(|(&g, &x)| g == gelu_erf(x)));

            let mut v = values.clone();
            silu_in_place(&mut v);
            prop_assert!(v.iter().zip(&values).all(|(&g, &x)| g == silu(x)));

            let mut v = values.clone();
            elu_in_place(&mut v, 0.5);
            prop_assert!(v.iter().zip(&values).all(|(&g, &x)| g == elu(x, 0.5)));
        }
    }

    #[test]
    fn gelu_table_tracks_exact() {
        let table = GeluTable::new(GeluTable::BITS_16).unwrap();
        assert_eq!(table.table().len(), 1 << 16);
        for x in grid() {
            let err = (table.lookup(x) - gelu_erf(x)).abs();
            assert!(err <= 0.01 * x.abs() + 1.0e-6, "x={x} err={err}");
        }

        let mut v = [1.0f32, -2.0, 0.0];
        table.apply(&mut v);
        assert_eq!(v, [gelu_erf(1.0), gelu_erf(-2.0), 0.0]);

        assert!(GeluTable::new(30).is_err());
    }
}
