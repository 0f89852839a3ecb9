//! Bit-level manipulation of FP32, FP16 and BF16 values.
//!
//! Reduced-precision formats are stored as raw `u16` bit patterns. The
//! conversions come in two flavours:
//!
//! | Function | Strategy |
//! |----------|----------|
//! | [`f32_to_fp16_truncate`] / [`f32_to_bf16_truncate`] | Repack bit fields, drop low mantissa bits |
//! | [`f32_to_fp16`] / [`f32_to_bf16`] | Round to nearest, ties to even (FP16 subnormals kept) |
//! | [`fp16_to_f32`] / [`bf16_to_f32`] | Exact widening |
//!
//! ```text
//! FP32  s eeeeeeee mmmmmmmmmmmmmmmmmmmmmmm   bias 127
//! FP16  s eeeee mmmmmmmmmm                   bias 15
//! BF16  s eeeeeeee mmmmmmm                   bias 127
//! ```
//!
//! BF16 is simply the top half of an FP32, which is why its conversions are a
//! shift while FP16 needs the exponent rebiased.

const F32_EXP_BIAS: i32 = 127;
const F32_MANTISSA_MASK: u32 = 0x007F_FFFF;
const FP16_EXP_BIAS: i32 = 15;
const FP16_MANTISSA_MASK: u16 = 0x03FF;
const BF16_MANTISSA_MASK: u16 = 0x007F;

/// Sign, unbiased exponent and raw mantissa bits of a float.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FloatParts {
    pub sign: u32,
    pub exponent: i32,
    pub mantissa: u32,
}

pub fn f32_to_parts(f: f32) -> FloatParts {
    let u = f.to_bits();
    FloatParts {
        sign: u >> 31,
        exponent: ((u >> 23) & 0xFF) as i32 - F32_EXP_BIAS,
        mantissa: u & F32_MANTISSA_MASK,
    }
}

/// Inverse of [`f32_to_parts`]. Out-of-range fields are masked to their width.
pub fn f32_from_parts(parts: FloatParts) -> f32 {
    let exp = ((parts.exponent + F32_EXP_BIAS) as u32) & 0xFF;
    f32::from_bits(((parts.sign & 1) << 31) | (exp << 23) | (parts.mantissa & F32_MANTISSA_MASK))
}

pub fn fp16_to_parts(h: u16) -> FloatParts {
    FloatParts {
        sign: u32::from(h >> 15),
        exponent: i32::from((h >> 10) & 0x1F) - FP16_EXP_BIAS,
        mantissa: u32::from(h & FP16_MANTISSA_MASK),
    }
}

pub fn fp16_from_parts(parts: FloatParts) -> u16 {
    let exp = ((parts.exponent + FP16_EXP_BIAS) as u16) & 0x1F;
    (((parts.sign & 1) as u16) << 15) | (exp << 10) | (parts.mantissa as u16 & FP16_MANTISSA_MASK)
}

pub fn bf16_to_parts(b: u16) -> FloatParts {
    FloatParts {
        sign: u32::from(b >> 15),
        exponent: i32::from((b >> 7) & 0xFF) - F32_EXP_BIAS,
        mantissa: u32::from(b & BF16_MANTISSA_MASK),
    }
}

pub fn bf16_from_parts(parts: FloatParts) -> u16 {
    let exp = ((parts.exponent + F32_EXP_BIAS) as u16) & 0xFF;
    (((parts.sign & 1) as u16) << 15) | (exp << 7) | (parts.mantissa as u16 & BF16_MANTISSA_MASK)
}

/// FP32 to FP16 by repacking the bit fields.
///
/// The low 13 mantissa bits are dropped. Values outside the FP16 normal range
/// saturate to signed infinity or flush to signed zero; FP16 subnormals are
/// never produced.
pub fn f32_to_fp16_truncate(f: f32) -> u16 {
    let parts = f32_to_parts(f);
    let sign = (parts.sign as u16) << 15;

    if is_inf_or_nan(f) {
        let quiet = if parts.mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7C00 | quiet;
    }
    if is_zero_or_subnormal(f) || parts.exponent < 1 - FP16_EXP_BIAS {
        return sign;
    }
    if parts.exponent > FP16_EXP_BIAS {
        return sign | 0x7C00;
    }

    fp16_from_parts(FloatParts {
        sign: parts.sign,
        exponent: parts.exponent,
        mantissa: parts.mantissa >> 13,
    })
}

/// FP32 to FP16 with round-to-nearest-even, including FP16 subnormals.
pub fn f32_to_fp16(f: f32) -> u16 {
    let x = f.to_bits();
    let sign = x & 0x8000_0000;
    let exp = x & 0x7F80_0000;
    let man = x & F32_MANTISSA_MASK;
    let half_sign = sign >> 16;

    if exp == 0x7F80_0000 {
        let nan_bit = if man == 0 { 0 } else { 0x0200 };
        return (half_sign | 0x7C00 | nan_bit | (man >> 13)) as u16;
    }

    let half_exp = ((exp >> 23) as i32) - F32_EXP_BIAS + FP16_EXP_BIAS;
    if half_exp >= 0x1F {
        return (half_sign | 0x7C00) as u16;
    }

    if half_exp <= 0 {
        // Result is an FP16 subnormal (or rounds to zero).
        if 14 - half_exp > 24 {
            return half_sign as u16;
        }
        let man = man | 0x0080_0000;
        let mut half_man = man >> (14 - half_exp);
        let round_bit = 1u32 << (13 - half_exp);
        if (man & round_bit) != 0 && (man & (3 * round_bit - 1)) != 0 {
            half_man += 1;
        }
        return (half_sign | half_man) as u16;
    }

    let packed = half_sign | ((half_exp as u32) << 10) | (man >> 13);
    let round_bit = 0x0000_1000;
    // A carry out of the mantissa bumps the exponent, which is the correct result.
    if (man & round_bit) != 0 && (man & (3 * round_bit - 1)) != 0 {
        (packed + 1) as u16
    } else {
        packed as u16
    }
}

/// Exact FP16 to FP32 widening.
pub fn fp16_to_f32(h: u16) -> f32 {
    if h & 0x7FFF == 0 {
        return f32::from_bits(u32::from(h) << 16);
    }

    let sign = u32::from(h & 0x8000) << 16;
    let half_exp = u32::from(h & 0x7C00);
    let half_man = u32::from(h & FP16_MANTISSA_MASK);

    if half_exp == 0x7C00 {
        return if half_man == 0 {
            f32::from_bits(sign | 0x7F80_0000)
        } else {
            f32::from_bits(sign | 0x7FC0_0000 | (half_man << 13))
        };
    }

    if half_exp == 0 {
        // Subnormal: normalize by shifting the leading one into the hidden bit.
        let e = (half_man as u16).leading_zeros() - 6;
        let exp = (127 - 15 - e) << 23;
        let man = (half_man << (14 + e)) & F32_MANTISSA_MASK;
        return f32::from_bits(sign | exp | man);
    }

    let exp = (((half_exp >> 10) as i32 - FP16_EXP_BIAS + F32_EXP_BIAS) as u32) << 23;
    f32::from_bits(sign | exp | (half_man << 13))
}

/// FP32 to BF16 by keeping the top 16 bits. NaN payloads that would vanish are
/// replaced by a quiet NaN.
pub fn f32_to_bf16_truncate(f: f32) -> u16 {
    let x = f.to_bits();
    if f.is_nan() {
        return ((x >> 16) as u16) | 0x0040;
    }
    (x >> 16) as u16
}

/// FP32 to BF16 with round-to-nearest-even.
pub fn f32_to_bf16(f: f32) -> u16 {
    let x = f.to_bits();
    if x & 0x7FFF_FFFF > 0x7F80_0000 {
        return ((x >> 16) | 0x0040) as u16;
    }
    let round_bit = 0x0000_8000;
    if (x & round_bit) != 0 && (x & (3 * round_bit - 1)) != 0 {
        (x >> 16) as u16 + 1
    } else {
        (x >> 16) as u16
    }
}

pub fn bf16_to_f32(b: u16) -> f32 {
    f32::from_bits(u32::from(b) << 16)
}

pub fn f32_slice_to_fp16(src: &[f32], dst: &mut [u16]) {
    debug_assert_eq!(src.len(), dst.len());
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = f32_to_fp16(s);
    }
}

pub fn fp16_slice_to_f32(src: &[u16], dst: &mut [f32]) {
    debug_assert_eq!(src.len(), dst.len());
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = fp16_to_f32(s);
    }
}

pub fn f32_slice_to_bf16(src: &[f32], dst: &mut [u16]) {
    debug_assert_eq!(src.len(), dst.len());
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = f32_to_bf16(s);
    }
}

pub fn bf16_slice_to_f32(src: &[u16], dst: &mut [f32]) {
    debug_assert_eq!(src.len(), dst.len());
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = bf16_to_f32(s);
    }
}

#[inline]
pub fn sign_bit(f: f32) -> u32 {
    f.to_bits() >> 31
}

#[inline]
pub fn is_negative_zero(f: f32) -> bool {
    f.to_bits() == 0x8000_0000
}

/// Exponent bits all zero: +-0.0 or a subnormal.
#[inline]
pub fn is_zero_or_subnormal(f: f32) -> bool {
    (f.to_bits() >> 23) & 0xFF == 0
}

/// Exponent bits all one: +-infinity or NaN.
#[inline]
pub fn is_inf_or_nan(f: f32) -> bool {
    (f.to_bits() >> 23) & 0xFF == 0xFF
}

/// Approximate product by adding the bit patterns as integers (Mogami 2020).
///
/// Adding the exponent fields multiplies the powers of two, and adding the
/// mantissas approximates `(1 + a)(1 + b)` by `1 + a + b`. Relative error is
/// at most about 11%. Only meaningful for normal, finite inputs.
#[inline]
pub fn approx_mul_mogami(a: f32, b: f32) -> f32 {
    f32::from_bits(
        a.to_bits()
            .wrapping_add(b.to_bits())
            .wrapping_sub(0x3F80_0000),
    )
}

/// Multiply by `2^shift` by adding to the exponent field.
///
/// Zero is returned unchanged. No overflow checks: an exponent that leaves
/// the normal range spills into the sign bit or the mantissa.
#[inline]
pub fn mul_pow2_bitshift(f: f32, shift: i32) -> f32 {
    let u = f.to_bits();
    if u == 0 {
        return f;
    }
    f32::from_bits(u.wrapping_add((shift as u32) << 23))
}

/// `floor(log2(|f|))` for normal floats, read straight from the exponent.
#[inline]
pub fn ilog2_exponent(f: f32) -> i32 {
    ((f.to_bits() >> 23) & 0xFF) as i32 - F32_EXP_BIAS
}

#[inline]
pub fn log2_exponent(f: f32) -> f32 {
    ilog2_exponent(f) as f32
}
