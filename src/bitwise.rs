//! Integer bit tricks used by the quantization and table-lookup kernels.
//!
//! # Strategies
//!
//! | Function | Strategy |
//! |----------|----------|
//! | [`popcount_basic`] | Test every bit |
//! | [`popcount_kernighan`] | Clear the lowest set bit until zero |
//! | [`popcount_intrinsic`] | `count_ones` (`POPCNT` when enabled) |
//! | [`clz_slow`] | Shift left until the top bit is set |
//! | [`clz_intrinsic`] | `leading_zeros` (`LZCNT`/`BSR`) |
//! | [`log2_integer_slow`] / [`log2_integer_clz`] | `floor(log2(u))` |

pub fn popcount_basic(mut x: u32) -> u32 {
    let mut count = 0;
    while x != 0 {
        count += x & 1;
        x >>= 1;
    }
    count
}

/// Brian Kernighan's method: one iteration per set bit.
pub fn popcount_kernighan(mut x: u32) -> u32 {
    let mut count = 0;
    while x != 0 {
        x &= x - 1;
        count += 1;
    }
    count
}

#[inline]
pub fn popcount_intrinsic(x: u32) -> u32 {
    x.count_ones()
}

pub fn clz_slow(mut u: u32) -> u32 {
    if u == 0 {
        return 32;
    }
    let mut count = 0;
    while u & 0x8000_0000 == 0 {
        u <<= 1;
        count += 1;
    }
    count
}

#[inline]
pub fn clz_intrinsic(u: u32) -> u32 {
    u.leading_zeros()
}

/// `floor(log2(u))`, or `None` for zero.
pub fn log2_integer_slow(mut u: u32) -> Option<u32> {
    if u == 0 {
        return None;
    }
    let mut log = 0;
    while u > 1 {
        u >>= 1;
        log += 1;
    }
    Some(log)
}

#[inline]
pub fn log2_integer_clz(u: u32) -> Option<u32> {
    if u == 0 {
        None
    } else {
        Some(31 - u.leading_zeros())
    }
}

#[inline]
pub fn is_power_of_two_popcount(u: u32) -> bool {
    u.count_ones() == 1
}

#[inline]
pub fn nand(x: u32, y: u32) -> u32 {
    !(x & y)
}

#[inline]
pub fn nor(x: u32, y: u32) -> u32 {
    !(x | y)
}

#[inline]
pub fn xnor(x: u32, y: u32) -> u32 {
    !(x ^ y)
}

#[inline]
pub fn any_bits_set(x: u32, bits: u32) -> bool {
    x & bits != 0
}

#[inline]
pub fn all_bits_set(x: u32, bits: u32) -> bool {
    x & bits == bits
}

#[inline]
pub fn no_bits_set(x: u32, bits: u32) -> bool {
    x & bits == 0
}

#[inline]
pub fn set_bits(x: u32, bits: u32) -> u32 {
    x | bits
}

#[inline]
pub fn clear_bits(x: u32, bits: u32) -> u32 {
    x & !bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn popcount_variants_agree(x in any::<u32>()) {
            let expected = x.count_ones();
            prop_assert_eq!(popcount_basic(x), expected);
            prop_assert_eq!(popcount_kernighan(x), expected);
            prop_assert_eq!(popcount_intrinsic(x), expected);
        }

        #[test]
        fn clz_and_log2_agree(u in any::<u32>()) {
            prop_assert_eq!(clz_slow(u), clz_intrinsic(u));
            prop_assert_eq!(log2_integer_slow(u), log2_integer_clz(u));
            prop_assert_eq!(is_power_of_two_popcount(u), u.is_power_of_two());
        }
    }

    #[test]
    fn known_values() {
        assert_eq!(popcount_basic(0b1011), 3);
        assert_eq!(clz_slow(0), 32);
        assert_eq!(clz_slow(1), 31);
        assert_eq!(clz_slow(u32::MAX), 0);
        assert_eq!(log2_integer_slow(0), None);
        assert_eq!(log2_integer_clz(1), Some(0));
        assert_eq!(log2_integer_clz(1024), Some(10));
        assert_eq!(log2_integer_clz(1023), Some(9));
    }

    #[test]
    fn bit_flags() {
        let flags = 0b1010;
        assert!(any_bits_set(flags, 0b0011));
        assert!(!all_bits_set(flags, 0b0011));
        assert!(all_bits_set(flags, 0b1000));
        assert!(no_bits_set(flags, 0b0101));
        assert_eq!(set_bits(flags, 0b0101), 0b1111);
        assert_eq!(clear_bits(flags, 0b0010), 0b1000);
        assert_eq!(nand(0b1100, 0b1010), !0b1000);
        assert_eq!(nor(0b1100, 0b1010), !0b1110);
        assert_eq!(xnor(0b1100, 0b1010), !0b0110);
    }
}
