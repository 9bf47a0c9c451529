//! Deterministic input and bias fills
//!
//! Values repeat with period 123 so every run of the same shape sees the same
//! data without a random source; biases are the negated pattern so some
//! outputs rectify to zero.

use crate::blocking::DenseMatrix;

const PERIOD: usize = 123;

/// `cols × batch` input with element `i` (row-major) equal to `i mod 123`
pub fn input(cols: usize, batch: usize) -> DenseMatrix {
    DenseMatrix::from_fn(cols, batch, |i, j| ((i * batch + j) % PERIOD) as f32)
}

/// Bias for `rows` outputs: `bias[r] = -(r mod 123)`
pub fn bias(rows: usize) -> Vec<f32> {
    (0..rows).map(|r| -((r % PERIOD) as f32)).collect()
}
