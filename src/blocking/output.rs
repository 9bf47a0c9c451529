//! Blocked output tiles and de-blocking
//!
//! Each worker writes its tile `(rb, nbk)` to a contiguous
//! `rows_per_block × bn` region so its stores stay local:
//!
//! ```text
//! output: [ tile(0,0) | tile(0,1) | ... | tile(1,0) | ... ]   tile = [local_row][0..bn]
//! ```
//!
//! De-blocking copies each tile back to its rectangle of the canonical
//! `rows × batch` matrix.

use rayon::prelude::*;

use super::{BlockGrid, DenseMatrix};
use crate::error::{Error, Result};
use crate::runtime::{AlignedBuffer, Arena};

/// Output of the fused kernel in tile order
#[derive(Debug)]
pub struct BlockedOutput {
    grid: BlockGrid,
    data: AlignedBuffer<f32>,
}

impl BlockedOutput {
    /// Zeroed output buffer sized for `grid`
    pub fn new(arena: &Arena, grid: &BlockGrid) -> Result<Self> {
        Ok(Self {
            grid: *grid,
            data: arena.alloc(grid.blocked_output_len())?,
        })
    }

    /// Grid the tiles follow
    pub fn grid(&self) -> &BlockGrid {
        &self.grid
    }

    /// Raw tile-ordered buffer
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// One tile's region
    pub fn tile(&self, rb: usize, nbk: usize) -> &[f32] {
        let len = self.grid.tile_len();
        let start = self.grid.tile_index(rb, nbk) * len;
        &self.data[start..start + len]
    }

    /// All tiles as disjoint mutable chunks, indexed by [`BlockGrid::tile_index`]
    pub fn tiles_mut(&mut self) -> std::slice::ChunksExactMut<'_, f32> {
        let len = self.grid.tile_len();
        self.data.chunks_exact_mut(len)
    }

    /// Parallel iterator over the tiles, one disjoint chunk per worker
    pub fn par_tiles_mut(&mut self) -> rayon::slice::ChunksExactMut<'_, f32> {
        let len = self.grid.tile_len();
        self.data.par_chunks_exact_mut(len)
    }
}

/// Place a canonical `rows × batch` matrix into tile order
///
/// Inverse of [`deblock`]; padding inside tiles is left zero.
pub fn tile(arena: &Arena, dense: &DenseMatrix, grid: &BlockGrid) -> Result<BlockedOutput> {
    if dense.rows() != grid.rows() || dense.cols() != grid.batch() {
        return Err(Error::shape_mismatch(
            &[grid.rows(), grid.batch()],
            &[dense.rows(), dense.cols()],
        ));
    }
    let mut out = BlockedOutput::new(arena, grid)?;
    let bn = grid.batch_block_width();
    for (t, chunk) in out.tiles_mut().enumerate() {
        let (rb, nbk) = grid.tile_coords(t);
        let rows = grid.row_range(rb);
        let cols = grid.batch_range(nbk);
        for (local, i) in rows.enumerate() {
            chunk[local * bn..local * bn + cols.len()]
                .copy_from_slice(&dense.row(i)[cols.clone()]);
        }
    }
    Ok(out)
}

/// Reassemble the canonical `rows × batch` matrix from tiles
///
/// Row blocks are copied in parallel; their destinations do not overlap.
pub fn deblock(output: &BlockedOutput) -> DenseMatrix {
    let grid = output.grid();
    let (rows, batch) = (grid.rows(), grid.batch());
    let bn = grid.batch_block_width();
    let rpb = grid.rows_per_block();
    let mut dense = DenseMatrix::zeros(rows, batch);

    if rows == 0 || batch == 0 {
        return dense;
    }

    dense
        .data_mut()
        .par_chunks_mut(rpb * batch)
        .enumerate()
        .for_each(|(rb, dst)| {
            let row_range = grid.row_range(rb);
            for nbk in 0..grid.batch_blocks() {
                let cols = grid.batch_range(nbk);
                let src = output.tile(rb, nbk);
                for local in 0..row_range.len() {
                    dst[local * batch + cols.start..local * batch + cols.end]
                        .copy_from_slice(&src[local * bn..local * bn + cols.len()]);
                }
            }
        });

    dense
}
