//! Runtime CPU feature detection and SIMD dispatch policy.
//!
//! Every `*_avx1`, `*_avx2` and `*_fma_*` kernel checks these predicates before
//! entering its intrinsics path, and falls back to the scalar variant otherwise.
//! Naming follows the usual inference-engine convention: "AVX1" kernels work on
//! 128-bit registers (4 floats), "AVX2" kernels on 256-bit registers (8 floats).
//!
//! Setting `NN_KERNELS_FORCE_SCALAR=1` disables every SIMD path, which makes it
//! easy to benchmark or verify the fallbacks on a machine that has AVX2.

use std::sync::OnceLock;

/// Environment variable that forces the scalar fallbacks.
pub const FORCE_SCALAR_ENV: &str = "NN_KERNELS_FORCE_SCALAR";

/// Runtime detection for AVX support.
pub fn avx_available() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        std::arch::is_x86_feature_detected!("avx")
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

/// Runtime detection for AVX2 support.
pub fn avx2_available() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        std::arch::is_x86_feature_detected!("avx2")
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

/// Runtime detection for FMA3 support.
pub fn fma_available() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        std::arch::is_x86_feature_detected!("fma")
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

/// Whether SIMD kernels may be used at all (see [`FORCE_SCALAR_ENV`]).
pub fn simd_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        let forced = std::env::var(FORCE_SCALAR_ENV)
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        if forced {
            tracing::debug!(env = FORCE_SCALAR_ENV, "SIMD kernels disabled");
        }
        !forced
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Snapshot of the features the dispatchers look at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CpuFeatures {
    pub avx: bool,
    pub avx2: bool,
    pub fma: bool,
    pub simd_enabled: bool,
}

impl CpuFeatures {
    pub fn detect() -> Self {
        let features = Self {
            avx: avx_available(),
            avx2: avx2_available(),
            fma: fma_available(),
            simd_enabled: simd_enabled(),
        };
        tracing::debug!(
            avx = features.avx,
            avx2 = features.avx2,
            fma = features.fma,
            simd_enabled = features.simd_enabled,
            "detected CPU features"
        );
        features
    }

    /// Name of the widest path the dispatchers will take.
    pub fn best_path(&self) -> &'static str {
        if !self.simd_enabled {
            "scalar (forced)"
        } else if self.avx2 && self.fma {
            "avx2+fma"
        } else if self.avx {
            "avx"
        } else {
            "scalar"
        }
    }
}

#[inline]
pub(crate) fn use_avx() -> bool {
    simd_enabled() && avx_available()
}

#[inline]
pub(crate) fn use_fma() -> bool {
    simd_enabled() && avx_available() && fma_available()
}

#[inline]
pub(crate) fn use_avx2() -> bool {
    simd_enabled() && avx2_available()
}

#[inline]
pub(crate) fn use_avx2_fma() -> bool {
    simd_enabled() && avx2_available() && fma_available()
}
