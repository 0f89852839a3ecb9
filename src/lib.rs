//! Variants of the numeric kernels at the heart of neural-network inference.
//!
//! Every operation comes in several implementations side by side: a naive
//! loop, hand-unrolled and pointer-walking forms, fused and fissioned loop
//! bodies, and explicit SIMD. They compute the same thing (up to rounding),
//! so they can be compared and benchmarked against each other.
//!
//! SIMD variants are named after the vector width they use: `_avx1` runs
//! 128-bit (4 x f32) operations, `_avx2` runs 256-bit (8 x f32) ones. Each
//! checks CPU features at runtime and falls back to scalar code, and accepts
//! any length by finishing with a scalar tail. Setting
//! `NN_KERNELS_FORCE_SCALAR=1` forces the fallbacks (see [`CpuFeatures`]).
//!
//! # Kernels
//!
//! - **Activations** ([`gelu_erf`], [`gelu_tanh`], [`relu_in_place_avx2`], [`silu`], [`GeluTable`], etc.)
//! - **Dot products** ([`dot_basic`], [`dot_unroll4_better`], [`dot_fma_avx2`], etc.)
//! - **Reductions and statistics** ([`sum_avx2`], [`min_and_max`], [`mean_and_variance_fused`], etc.)
//! - **Element-wise maps and counts** ([`add_scalar_avx2`], [`expize_avx2`], [`count_in_range`], etc.)
//! - **Norms** ([`l1_norm`], [`l2_norm`], [`l3_norm`])
//! - **Normalization** ([`min_max_fused`], [`zscore_avx2`], [`batchnorm_fusion_fission`], [`rmsnorm_avx2`], etc.)
//! - **Softmax** ([`softmax_basic`], [`softmax_stable`], [`softmax_avx2`], etc.)
//! - **Top-k** ([`top_k_two`], [`top_k_insertion`], [`top_k_select`], etc.)
//! - **MatMul** ([`matmul_baseline`], [`matmul_blocked`], [`matmul_bt_avx2_inlined`], etc.)
//! - **VMM** ([`matvec_basic`], [`matvec_tiled_4x4_cse`], [`matvec_relu_avx2`], etc.)
//! - **FP16/BF16 and bit tricks** ([`f32_to_fp16`], [`bf16_to_f32`], [`approx_mul_mogami`], [`popcount_kernighan`], etc.)
//! - **Precomputed tables** ([`LookupTable`], [`IndexTable`])
//!
//! # References
//!
//! - [Algorithms for Modern Hardware](https://en.algorithmica.org/hpc/)
//! - [Gaussian Error Linear Units (GELUs)](https://arxiv.org/abs/1606.08415)
//! - [Root Mean Square Layer Normalization](https://arxiv.org/abs/1910.07467)

mod activation;
mod bitwise;
mod cpu;
mod dot;
mod elementwise;
mod error;
mod float_bits;
mod matmul;
mod matvec;
mod normalize;
mod norms;
mod precompute;
mod reduce;
mod softmax;
mod stats;
mod topk;

pub use activation::*;
pub use bitwise::*;
pub use cpu::*;
pub use dot::*;
pub use elementwise::*;
pub use error::*;
pub use float_bits::*;
pub use matmul::*;
pub use matvec::*;
pub use normalize::*;
pub use norms::*;
pub use precompute::*;
pub use reduce::*;
pub use softmax::*;
pub use stats::*;
pub use topk::*;
