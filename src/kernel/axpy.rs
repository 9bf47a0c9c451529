//! Dense AXPY on a row stripe: acc += scale * x
//!
//! This is the inner loop of the tiled kernel: one sparse weight times one
//! input row stripe, accumulated into one output row stripe.

#[cfg(target_arch = "x86_64")]
use crate::runtime::{SimdLevel, detect_simd};

/// acc[i] += scale * x[i] for i in 0..acc.len()
///
/// # Panics
///
/// Panics if `x` is shorter than `acc`.
#[inline]
pub fn axpy(scale: f32, x: &[f32], acc: &mut [f32]) {
    assert!(x.len() >= acc.len(), "axpy: x shorter than accumulator");

    #[cfg(target_arch = "x86_64")]
    {
        if detect_simd() >= SimdLevel::Avx2Fma && acc.len() >= 8 {
            // SAFETY: AVX2+FMA presence checked by detect_simd; lengths checked above
            unsafe {
                axpy_avx2(scale, x, acc);
            }
            return;
        }
    }

    axpy_scalar(scale, x, acc);
}

#[inline]
fn axpy_scalar(scale: f32, x: &[f32], acc: &mut [f32]) {
    for (a, &v) in acc.iter_mut().zip(x) {
        *a += scale * v;
    }
}

/// AVX2 + FMA AXPY, 8 lanes at a time with a scalar tail
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn axpy_avx2(scale: f32, x: &[f32], acc: &mut [f32]) {
    use std::arch::x86_64::{_mm256_fmadd_ps, _mm256_loadu_ps, _mm256_set1_ps, _mm256_storeu_ps};

    let n = acc.len();
    let s = _mm256_set1_ps(scale);
    let mut i = 0;

    while i + 8 <= n {
        // SAFETY: i + 8 <= n <= x.len()
        unsafe {
            let xv = _mm256_loadu_ps(x.as_ptr().add(i));
            let av = _mm256_loadu_ps(acc.as_ptr().add(i));
            _mm256_storeu_ps(acc.as_mut_ptr().add(i), _mm256_fmadd_ps(s, xv, av));
        }
        i += 8;
    }

    while i < n {
        acc[i] += scale * x[i];
        i += 1;
    }
}
