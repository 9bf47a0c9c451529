//! Fused sparse × dense + bias + ReLU kernels
//!
//! A kernel consumes the blocked weights and blocked input and fills the
//! blocked output so that, for every output element,
//!
//! ```text
//! C[row, j] = max(0, bias[row] + Σ_k A[row, k] · B[k, j])
//! ```
//!
//! Tile `(rb, nbk)` is owned by worker `rb · nb + nbk`; a kernel must only
//! write inside the tiles handed to it and only touch its own telemetry slot.

mod axpy;
mod passthrough;
mod tiled;

pub use axpy::axpy;
pub use passthrough::PassThroughKernel;
pub use tiled::TiledKernel;

use crate::blocking::{BlockedCsr, BlockedDense, BlockedOutput};
use crate::error::{Error, Result};
use crate::sparse::SparseIndex;
use crate::telemetry::WorkerTelemetry;

/// Read-only operands of one kernel invocation
#[derive(Clone, Copy, Debug)]
pub struct KernelArgs<'a, I: SparseIndex> {
    /// Blocked sparse weights
    pub weights: &'a BlockedCsr<I>,
    /// Rearranged dense input
    pub input: &'a BlockedDense,
    /// One bias per output row
    pub bias: &'a [f32],
}

impl<'a, I: SparseIndex> KernelArgs<'a, I> {
    /// Bundle kernel operands
    pub fn new(weights: &'a BlockedCsr<I>, input: &'a BlockedDense, bias: &'a [f32]) -> Self {
        Self {
            weights,
            input,
            bias,
        }
    }

    /// Check that operands, output and telemetry agree on grid and layout
    pub fn validate(
        &self,
        kernel: &'static str,
        output: &BlockedOutput,
        telemetry: &[WorkerTelemetry],
    ) -> Result<()> {
        let grid = self.weights.grid();
        if self.input.grid() != grid || output.grid() != grid {
            return Err(Error::kernel(kernel, "operands were blocked with different grids"));
        }
        if self.input.layout() != self.weights.layout() {
            return Err(Error::kernel(
                kernel,
                format!(
                    "weights indexed for {} input but input is {}",
                    self.weights.layout(),
                    self.input.layout()
                ),
            ));
        }
        if self.bias.len() != grid.rows() {
            return Err(Error::kernel(
                kernel,
                format!("bias has {} entries for {} rows", self.bias.len(), grid.rows()),
            ));
        }
        if telemetry.len() < grid.tiles() {
            return Err(Error::kernel(
                kernel,
                format!("{} telemetry slots for {} tiles", telemetry.len(), grid.tiles()),
            ));
        }
        Ok(())
    }
}

/// A fused multiply-add-bias-ReLU primitive over blocked operands
pub trait FusedKernel<I: SparseIndex>: Send + Sync {
    /// Short name for logs and errors
    fn name(&self) -> &'static str;

    /// Compute every output tile
    ///
    /// `telemetry[t]` belongs to the worker computing tile `t`.
    fn compute(
        &self,
        args: &KernelArgs<'_, I>,
        output: &mut BlockedOutput,
        telemetry: &mut [WorkerTelemetry],
    ) -> Result<()>;
}
