//! Dense matrices and the input rearrangement
//!
//! The kernel for tile `(rb, nbk)` reads the input columns of batch block
//! `nbk` for every sparse column. Rearranging gathers those columns into a
//! contiguous `[col][bn]` panel per batch block so the reads are unit
//! stride; the replicated variant gives every row partition its own copy of
//! the panel.

use tracing::debug;

use super::{BlockGrid, InputLayout};
use crate::error::{Error, Result};
use crate::runtime::{AlignedBuffer, Arena};

/// Row-major dense f32 matrix
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl DenseMatrix {
    /// Wrap row-major data
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::shape_mismatch(&[rows * cols], &[data.len()]));
        }
        Ok(Self { rows, cols, data })
    }

    /// All-zero matrix
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Matrix with `f(row, col)` at each position
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Self { rows, cols, data }
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Element at `(row, col)`
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    /// One row as a slice
    #[inline]
    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Row-major data
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable row-major data
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consume into the row-major vector
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Dense input rearranged for the kernel
#[derive(Debug)]
pub struct BlockedDense {
    grid: BlockGrid,
    layout: InputLayout,
    data: AlignedBuffer<f32>,
}

/// Input data visible to one tile
#[derive(Clone, Copy, Debug)]
pub struct Panel<'a> {
    /// Starts at the tile's first batch column of input row 0
    pub data: &'a [f32],
    /// Distance between input rows
    pub stride: usize,
    /// Valid batch columns in each row (≤ stride for panel layouts)
    pub width: usize,
}

impl Panel<'_> {
    /// The `width` valid values of input row `k`
    #[inline]
    pub fn row(&self, k: usize) -> &[f32] {
        let start = k * self.stride;
        &self.data[start..start + self.width]
    }
}

/// Rearrange a `cols × batch` dense matrix into the layout the kernel reads
///
/// # Errors
///
/// Returns `ShapeMismatch` if `dense` is not `grid.cols() × grid.batch()`.
pub fn rearrange(
    arena: &Arena,
    dense: &DenseMatrix,
    grid: &BlockGrid,
    layout: InputLayout,
) -> Result<BlockedDense> {
    if dense.rows() != grid.cols() || dense.cols() != grid.batch() {
        return Err(Error::shape_mismatch(
            &[grid.cols(), grid.batch()],
            &[dense.rows(), dense.cols()],
        ));
    }

    let k = grid.cols();
    let batch = grid.batch();
    let bn = grid.batch_block_width();
    let mb = grid.row_blocks();
    let mut data: AlignedBuffer<f32> = arena.alloc(layout.blocked_len(grid))?;

    match layout {
        InputLayout::RowMajor => data.copy_from_slice(dense.data()),
        InputLayout::Partitioned => {
            for nbk in 0..grid.batch_blocks() {
                let cols = grid.batch_range(nbk);
                for i in 0..k {
                    let src = &dense.data()[i * batch + cols.start..i * batch + cols.end];
                    let dst = (nbk * k + i) * bn;
                    data[dst..dst + src.len()].copy_from_slice(src);
                }
            }
        }
        InputLayout::Replicated => {
            for nbk in 0..grid.batch_blocks() {
                let cols = grid.batch_range(nbk);
                for i in 0..k {
                    let src = &dense.data()[i * batch + cols.start..i * batch + cols.end];
                    for rb in 0..mb {
                        let dst = ((nbk * mb + rb) * k + i) * bn;
                        data[dst..dst + src.len()].copy_from_slice(src);
                    }
                }
            }
        }
    }

    debug!(
        layout = %layout,
        panels = layout.panel_count(grid),
        bytes = data.size_bytes(),
        "rearranged dense input"
    );

    Ok(BlockedDense {
        grid: *grid,
        layout,
        data,
    })
}

impl BlockedDense {
    /// Grid the input was rearranged for
    pub fn grid(&self) -> &BlockGrid {
        &self.grid
    }

    /// Layout variant
    pub fn layout(&self) -> InputLayout {
        self.layout
    }

    /// Raw blocked buffer
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Input data read by tile `(rb, nbk)`
    #[inline]
    pub fn panel(&self, rb: usize, nbk: usize) -> Panel<'_> {
        let offset = self.layout.panel_offset(&self.grid, rb, nbk);
        let stride = self.layout.row_stride(&self.grid);
        let width = self.grid.batch_range(nbk).len();
        let end = match self.layout {
            // Row-major panels end at the last valid element of the last row
            InputLayout::RowMajor => {
                offset + self.grid.cols().saturating_sub(1) * stride + width
            }
            InputLayout::Partitioned | InputLayout::Replicated => {
                offset + self.grid.cols() * stride
            }
        };
        Panel {
            data: &self.data[offset..end],
            stride,
            width,
        }
    }

    /// Reassemble the canonical `cols × batch` matrix from panel 0 of each batch block
    pub fn to_dense(&self) -> DenseMatrix {
        let (k, batch) = (self.grid.cols(), self.grid.batch());
        let mut out = DenseMatrix::zeros(k, batch);
        for nbk in 0..self.grid.batch_blocks() {
            let cols = self.grid.batch_range(nbk);
            let panel = self.panel(0, nbk);
            for i in 0..k {
                out.data_mut()[i * batch + cols.start..i * batch + cols.end]
                    .copy_from_slice(panel.row(i));
            }
        }
        out
    }
}
