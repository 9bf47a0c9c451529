//! Tiled CPU kernel
//!
//! # Algorithm
//!
//! ```text
//! for each tile (rb, nbk) in parallel:
//!   C_tile = 0
//!   for cb in 0..kb:                       // column blocks, in order
//!     for each local row r of segment (rb, cb):
//!       for each (k, w) in row r:
//!         C_tile[r, :] += w * B_panel[k, :]
//!   C_tile[r, :] = max(0, C_tile[r, :] + bias[row])
//! ```
//!
//! Pre-scaled indices are used directly as offsets into the panel; raw
//! indices are multiplied by the panel stride.

use std::time::Instant;

use rayon::prelude::*;

use super::{FusedKernel, KernelArgs, axpy};
use crate::blocking::{BlockGrid, BlockedOutput};
use crate::error::Result;
use crate::sparse::SparseIndex;
use crate::telemetry::WorkerTelemetry;

/// Scalar/SIMD fused kernel with one task per output tile
#[derive(Clone, Copy, Debug, Default)]
pub struct TiledKernel;

impl TiledKernel {
    const NAME: &'static str = "tiled";
}

impl<I: SparseIndex> FusedKernel<I> for TiledKernel {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn compute(
        &self,
        args: &KernelArgs<'_, I>,
        output: &mut BlockedOutput,
        telemetry: &mut [WorkerTelemetry],
    ) -> Result<()> {
        args.validate(Self::NAME, output, telemetry)?;
        let grid = *args.weights.grid();
        let tiles = grid.tiles();

        output
            .par_tiles_mut()
            .zip(telemetry[..tiles].par_iter_mut())
            .enumerate()
            .for_each(|(t, (tile, slot))| {
                let (rb, nbk) = grid.tile_coords(t);
                compute_tile(args, &grid, rb, nbk, tile, slot);
            });

        Ok(())
    }
}

fn compute_tile<I: SparseIndex>(
    args: &KernelArgs<'_, I>,
    grid: &BlockGrid,
    rb: usize,
    nbk: usize,
    tile: &mut [f32],
    slot: &mut WorkerTelemetry,
) {
    let start = Instant::now();
    let bn = grid.batch_block_width();
    let panel = args.input.panel(rb, nbk);
    let width = panel.width;
    let stride = if I::PRESCALED { 1 } else { panel.stride };
    let col_indices = args.weights.col_indices();
    let values = args.weights.values();

    tile.fill(0.0);

    for cb in 0..grid.col_blocks() {
        let seg = args.weights.segment(rb, cb);
        for r in 0..seg.rows() {
            let acc = &mut tile[r * bn..r * bn + width];
            for k in seg.entries(r) {
                let offset = col_indices[k].to_usize() * stride;
                axpy(values[k], &panel.data[offset..offset + width], acc);
            }
        }
    }
    slot.record_conv(start.elapsed());

    let start = Instant::now();
    for (r, row) in grid.row_range(rb).enumerate() {
        let b = args.bias[row];
        for c in &mut tile[r * bn..r * bn + width] {
            *c = (*c + b).max(0.0);
        }
    }
    slot.record_reduce(start.elapsed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocking::{
        ColumnBlocking, DenseMatrix, InputLayout, block_sparse, deblock, rearrange,
    };
    use crate::runtime::Arena;
    use crate::sparse::CsrMatrix;

    fn run<I: SparseIndex>(layout: InputLayout, threads: usize) -> DenseMatrix {
        // [1 0 2]
        // [0 3 0]
        // [4 0 5]
        // [0 0 -6]
        let csr = CsrMatrix::from_triplets(
            4,
            3,
            &[(0, 0, 1.0), (0, 2, 2.0), (1, 1, 3.0), (2, 0, 4.0), (2, 2, 5.0), (3, 2, -6.0)],
        )
        .unwrap();
        let input = DenseMatrix::from_fn(3, 5, |i, j| (i + j) as f32);
        let bias = [0.5f32, -1.0, 0.0, 1.0];

        let grid = BlockGrid::new(4, 3, 5, threads, 2, ColumnBlocking::Count(2)).unwrap();
        let arena = Arena::new();
        let weights: crate::blocking::BlockedCsr<I> =
            block_sparse(&arena, &csr, &grid, layout).unwrap();
        let blocked_input = rearrange(&arena, &input, &grid, layout).unwrap();
        let mut output = BlockedOutput::new(&arena, &grid).unwrap();
        let mut telemetry = vec![WorkerTelemetry::default(); grid.tiles()];

        let args = KernelArgs::new(&weights, &blocked_input, &bias);
        TiledKernel.compute(&args, &mut output, &mut telemetry).unwrap();
        deblock(&output)
    }

    fn expected() -> Vec<f32> {
        // B[i][j] = i + j
        let b = |i: usize, j: usize| (i + j) as f32;
        let mut out = Vec::new();
        for (row, bias) in [(0usize, 0.5f32), (1, -1.0), (2, 0.0), (3, 1.0)] {
            for j in 0..5 {
                let v = match row {
                    0 => b(0, j) + 2.0 * b(2, j),
                    1 => 3.0 * b(1, j),
                    2 => 4.0 * b(0, j) + 5.0 * b(2, j),
                    _ => -6.0 * b(2, j),
                };
                out.push((v + bias).max(0.0));
            }
        }
        out
    }

    #[test]
    fn test_all_layouts_and_index_widths_agree() {
        let expected = expected();
        for layout in [InputLayout::RowMajor, InputLayout::Partitioned, InputLayout::Replicated] {
            for threads in [1, 3, 6] {
                let wide = run::<u32>(layout, threads);
                let narrow = run::<u16>(layout, threads);
                assert_eq!(wide.data(), expected.as_slice(), "{layout} {threads}");
                assert_eq!(narrow.data(), expected.as_slice(), "{layout} {threads}");
            }
        }
    }

    #[test]
    fn test_rejects_mismatched_layouts() {
        let csr = CsrMatrix::from_triplets(2, 2, &[(0, 0, 1.0)]).unwrap();
        let grid = BlockGrid::new(2, 2, 2, 1, 2, ColumnBlocking::Count(1)).unwrap();
        let arena = Arena::new();
        let weights: crate::blocking::BlockedCsr<u32> =
            block_sparse(&arena, &csr, &grid, InputLayout::RowMajor).unwrap();
        let input =
            rearrange(&arena, &DenseMatrix::zeros(2, 2), &grid, InputLayout::Partitioned).unwrap();
        let mut output = BlockedOutput::new(&arena, &grid).unwrap();
        let mut telemetry = vec![WorkerTelemetry::default(); 1];

        let err = TiledKernel
            .compute(&KernelArgs::new(&weights, &input, &[0.0, 0.0]), &mut output, &mut telemetry)
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Kernel { kernel: "tiled", .. }));
    }
}
