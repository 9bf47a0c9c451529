//! SIMD detection and register blocking
//!
//! The batch dimension of the output is tiled in stripes that a kernel can
//! hold in vector registers. The stripe width depends on the vector width
//! of the host and on how many registers a row accumulator may occupy.
//!
//! | Architecture | Instruction Set | f32 lanes | Register block | Stripe |
//! |--------------|-----------------|-----------|----------------|--------|
//! | x86-64       | AVX-512F + FMA  | 16        | 4              | 64     |
//! | x86-64       | AVX2 + FMA      | 8         | 8              | 64     |
//! | ARM64        | NEON            | 4         | 8              | 32     |
//! | Any          | Scalar          | 4         | 8              | 32     |

use std::sync::OnceLock;

/// SIMD capability level detected at runtime
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[allow(dead_code)] // Variants may not be constructed on all architectures
pub enum SimdLevel {
    /// AVX-512F with FMA support (512-bit vectors, 16 f32s)
    Avx512 = 3,
    /// AVX2 with FMA support (256-bit vectors, 8 f32s)
    Avx2Fma = 2,
    /// NEON baseline for AArch64 (128-bit vectors, 4 f32s)
    Neon = 1,
    /// Scalar fallback, blocked as if 128-bit vectors were present
    Scalar = 0,
}

impl SimdLevel {
    /// Returns the number of f32 elements per vector register
    #[inline]
    pub const fn f32_lanes(self) -> usize {
        match self {
            Self::Avx512 => 16,
            Self::Avx2Fma => 8,
            Self::Neon | Self::Scalar => 4,
        }
    }

    /// Number of vector registers a row accumulator is spread across
    #[inline]
    pub const fn register_block(self) -> usize {
        match self {
            Self::Avx512 => 4,
            Self::Avx2Fma | Self::Neon | Self::Scalar => 8,
        }
    }

    /// Batch-block width: lanes × register block
    #[inline]
    pub const fn batch_block_width(self) -> usize {
        self.f32_lanes() * self.register_block()
    }

    /// Returns the name of this SIMD level as a string
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Avx512 => "AVX-512",
            Self::Avx2Fma => "AVX2+FMA",
            Self::Neon => "NEON",
            Self::Scalar => "Scalar",
        }
    }
}

impl std::fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static SIMD_LEVEL: OnceLock<SimdLevel> = OnceLock::new();

/// Detect the best available SIMD level for the current CPU (cached)
#[inline]
pub fn detect_simd() -> SimdLevel {
    *SIMD_LEVEL.get_or_init(detect_simd_uncached)
}

#[cold]
fn detect_simd_uncached() -> SimdLevel {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("fma") {
            return SimdLevel::Avx512;
        }

        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            return SimdLevel::Avx2Fma;
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        return SimdLevel::Neon;
    }

    #[allow(unreachable_code)]
    SimdLevel::Scalar
}

/// Default batch-block width for the host CPU
pub fn default_batch_block_width() -> usize {
    detect_simd().batch_block_width()
}
