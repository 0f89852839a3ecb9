//! Errors for kernels whose preconditions depend on the input data.
//!
//! Shape mismatches between slices are caller bugs and are caught with
//! `debug_assert!` in the kernels themselves; they never show up here.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    /// Min-max normalization of a vector whose elements are all equal.
    #[error("cannot rescale: every element equals {value}")]
    ZeroRange { value: f32 },

    /// Z-score normalization of a vector with zero standard deviation.
    #[error("cannot standardize: standard deviation is zero")]
    ZeroVariance,

    /// Softmax whose sum of exponentials underflowed to zero.
    #[error("softmax denominator is zero")]
    ZeroDenominator,

    #[error("k = {k} exceeds input length {len}")]
    KTooLarge { k: usize, len: usize },

    #[error("length {len} is not a multiple of {multiple}")]
    NotMultiple { len: usize, multiple: usize },

    #[error("lookup table width must be 8..=24 bits, got {0}")]
    InvalidTableBits(u32),
}

pub type Result<T> = std::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_values() {
        let err = KernelError::KTooLarge { k: 7, len: 3 };
        assert_eq!(err.to_string(), "k = 7 exceeds input length 3");

        let err = KernelError::NotMultiple {
            len: 100,
            multiple: 512,
        };
        assert_eq!(err.to_string(), "length 100 is not a multiple of 512");

        let err = KernelError::InvalidTableBits(30);
        assert!(err.to_string().contains("30"));
    }
}
