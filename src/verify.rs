//! Reference oracle and element-wise verification
//!
//! The oracle multiplies the unblocked CSR matrix by the canonical dense
//! input with f64 accumulation; the verifier compares the de-blocked result
//! against it with a relative tolerance and stops at the first mismatch.

use tracing::{debug, trace};

use crate::blocking::DenseMatrix;
use crate::error::{Error, Result};
use crate::sparse::CsrMatrix;

/// Default relative tolerance
pub const DEFAULT_TOLERANCE: f32 = 1e-3;

/// `A · B` for CSR `A` (`rows × cols`) and dense `B` (`cols × batch`)
///
/// # Errors
///
/// Returns `ShapeMismatch` if `B` has the wrong number of rows.
pub fn reference_spmm(csr: &CsrMatrix, dense: &DenseMatrix) -> Result<DenseMatrix> {
    if dense.rows() != csr.cols() {
        return Err(Error::shape_mismatch(
            &[csr.cols(), dense.cols()],
            &[dense.rows(), dense.cols()],
        ));
    }
    let batch = dense.cols();
    let mut out = DenseMatrix::zeros(csr.rows(), batch);
    let mut acc = vec![0.0f64; batch];

    for i in 0..csr.rows() {
        acc.fill(0.0);
        let (cols, vals) = csr.row(i);
        for (&k, &v) in cols.iter().zip(vals) {
            for (a, &b) in acc.iter_mut().zip(dense.row(k)) {
                *a += v as f64 * b as f64;
            }
        }
        for (dst, &a) in out.data_mut()[i * batch..(i + 1) * batch].iter_mut().zip(&acc) {
            *dst = a as f32;
        }
    }
    Ok(out)
}

/// `relu(bias + A · B)`, the value every output element must have
///
/// # Errors
///
/// Returns `ShapeMismatch` for a wrong-sized `B` or `bias`.
pub fn reference_fc(csr: &CsrMatrix, dense: &DenseMatrix, bias: &[f32]) -> Result<DenseMatrix> {
    if bias.len() != csr.rows() {
        return Err(Error::shape_mismatch(&[csr.rows()], &[bias.len()]));
    }
    let mut out = reference_spmm(csr, dense)?;
    let batch = out.cols();
    if batch > 0 {
        for (row, &b) in out.data_mut().chunks_exact_mut(batch).zip(bias) {
            for c in row {
                *c = (*c + b).max(0.0);
            }
        }
    }
    Ok(out)
}

/// Trace the terms of one output element before rectification
///
/// Logs `bias + w·x` term by term at trace level and returns the f32 sum,
/// accumulated in row order the way a single kernel stripe would.
///
/// # Errors
///
/// Returns `InvalidArgument` if `(row, col)` is outside the output, and
/// `ShapeMismatch` for a wrong-sized input or bias.
pub fn trace_element(
    csr: &CsrMatrix,
    dense: &DenseMatrix,
    bias: &[f32],
    row: usize,
    col: usize,
) -> Result<f32> {
    if dense.rows() != csr.cols() {
        return Err(Error::shape_mismatch(&[csr.cols()], &[dense.rows()]));
    }
    if bias.len() != csr.rows() {
        return Err(Error::shape_mismatch(&[csr.rows()], &[bias.len()]));
    }
    if row >= csr.rows() || col >= dense.cols() {
        return Err(Error::invalid_argument(
            "trace",
            format!(
                "({row}, {col}) outside {}x{} output",
                csr.rows(),
                dense.cols()
            ),
        ));
    }

    let mut sum = bias[row];
    trace!(row, col, bias = sum, "element trace start");
    let (cols, vals) = csr.row(row);
    for (&k, &w) in cols.iter().zip(vals) {
        let x = dense.get(k, col);
        trace!(weight = w, input_row = k, input = x, "+ w*x");
        sum += w * x;
    }
    trace!(row, col, sum, "element trace end");
    Ok(sum)
}

/// What to do when the expected value is exactly zero
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ZeroPolicy {
    /// Accept `|actual| ≤ tolerance`
    #[default]
    AbsoluteFallback,
    /// Require `actual == 0`
    Exact,
}

impl ZeroPolicy {
    /// Name used on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AbsoluteFallback => "absolute",
            Self::Exact => "exact",
        }
    }
}

impl std::fmt::Display for ZeroPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element-wise relative-error comparison
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Verifier {
    tolerance: f32,
    zero_policy: ZeroPolicy,
}

impl Default for Verifier {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            zero_policy: ZeroPolicy::default(),
        }
    }
}

impl Verifier {
    /// Verifier with a custom tolerance and zero policy
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a negative or non-finite tolerance.
    pub fn new(tolerance: f32, zero_policy: ZeroPolicy) -> Result<Self> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::invalid_argument(
                "tolerance",
                format!("{tolerance} is not a finite non-negative number"),
            ));
        }
        Ok(Self { tolerance, zero_policy })
    }

    /// Relative tolerance
    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Zero-expected handling
    pub fn zero_policy(&self) -> ZeroPolicy {
        self.zero_policy
    }

    /// Whether `actual` is close enough to `expected`
    #[inline]
    pub fn accepts(&self, expected: f32, actual: f32) -> bool {
        if expected == 0.0 {
            return match self.zero_policy {
                ZeroPolicy::AbsoluteFallback => actual.abs() <= self.tolerance,
                ZeroPolicy::Exact => actual == 0.0,
            };
        }
        let rel = (expected - actual).abs() / expected.abs();
        // NaN on either side fails
        rel <= self.tolerance
    }

    /// Compare two matrices in row-major order
    ///
    /// # Errors
    ///
    /// Returns `VerificationMismatch` at the first rejected element, or
    /// `ShapeMismatch` if the shapes differ.
    pub fn verify(&self, expected: &DenseMatrix, actual: &DenseMatrix) -> Result<()> {
        if expected.rows() != actual.rows() || expected.cols() != actual.cols() {
            return Err(Error::shape_mismatch(
                &[expected.rows(), expected.cols()],
                &[actual.rows(), actual.cols()],
            ));
        }
        let batch = expected.cols();
        let mismatch = expected
            .data()
            .iter()
            .zip(actual.data())
            .position(|(&e, &a)| !self.accepts(e, a));

        if let Some(idx) = mismatch {
            return Err(Error::VerificationMismatch {
                row: idx / batch,
                col: idx % batch,
                expected: expected.data()[idx],
                actual: actual.data()[idx],
            });
        }

        debug!(
            elements = expected.data().len(),
            tolerance = self.tolerance,
            zero_policy = %self.zero_policy,
            "verification passed"
        );
        Ok(())
    }
}
