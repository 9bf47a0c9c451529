//! Identity kernel used to check the blocking round trip
//!
//! Copies input row `i` straight into output row `i`, ignoring weights and
//! bias. With a square grid, rearrange → pass-through → de-block must
//! reproduce the dense input exactly.

use rayon::prelude::*;

use super::{FusedKernel, KernelArgs};
use crate::error::{Error, Result};
use crate::sparse::SparseIndex;

/// Copies each tile's input rows to its output rows
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThroughKernel;

impl PassThroughKernel {
    const NAME: &'static str = "pass-through";
}

impl<I: SparseIndex> FusedKernel<I> for PassThroughKernel {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn compute(
        &self,
        args: &KernelArgs<'_, I>,
        output: &mut crate::blocking::BlockedOutput,
        telemetry: &mut [crate::telemetry::WorkerTelemetry],
    ) -> Result<()> {
        args.validate(Self::NAME, output, telemetry)?;
        let grid = *args.weights.grid();
        if grid.rows() != grid.cols() {
            return Err(Error::kernel(
                Self::NAME,
                format!("needs a square grid, got {} × {}", grid.rows(), grid.cols()),
            ));
        }
        let bn = grid.batch_block_width();

        output.par_tiles_mut().enumerate().for_each(|(t, tile)| {
            let (rb, nbk) = grid.tile_coords(t);
            let panel = args.input.panel(rb, nbk);
            for (local, row) in grid.row_range(rb).enumerate() {
                tile[local * bn..local * bn + panel.width].copy_from_slice(panel.row(row));
            }
        });

        Ok(())
    }
}
