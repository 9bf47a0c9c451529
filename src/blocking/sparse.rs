//! 2D blocking of the sparse weight matrix
//!
//! The CSR matrix is cut into `mb × kb` rectangles. Each rectangle becomes a
//! small CSR segment, and the segments are concatenated row block by row
//! block, column block by column block:
//!
//! ```text
//! row_ptrs: [ (rb0,cb0) rows.. | (rb0,cb1) rows.. | ... | (rb1,cb0) rows.. | ... ]
//! ```
//!
//! A kernel working on row block `rb` walks its `kb` segments in order, so
//! the slice of the input it touches stays within one column block at a time.

use std::ops::Range;

use tracing::debug;

use super::{BlockGrid, InputLayout};
use crate::error::{Error, Result};
use crate::runtime::{AlignedBuffer, Arena};
use crate::sparse::{CsrMatrix, SparseIndex};

/// Sparse matrix reordered into `(row block, column block, local row)` segments
#[derive(Debug)]
pub struct BlockedCsr<I: SparseIndex> {
    grid: BlockGrid,
    layout: InputLayout,
    row_ptrs: AlignedBuffer<usize>,
    col_indices: AlignedBuffer<I>,
    values: AlignedBuffer<f32>,
}

/// One local CSR segment: the rows of a row block restricted to a column block
#[derive(Clone, Copy, Debug)]
pub struct Segment<'a> {
    /// First global row of the segment
    pub first_row: usize,
    /// Cumulative counts, `rows + 1` entries
    pub row_ptrs: &'a [usize],
}

impl Segment<'_> {
    /// Number of rows in the segment
    pub fn rows(&self) -> usize {
        self.row_ptrs.len() - 1
    }

    /// Range into the blocked index/value arrays for local row `r`
    #[inline]
    pub fn entries(&self, r: usize) -> Range<usize> {
        self.row_ptrs[r]..self.row_ptrs[r + 1]
    }
}

/// Block a CSR matrix according to `grid`
///
/// Column indices are stored as `col · stride` when `I` is wide enough,
/// where `stride` is the row stride of `layout`; otherwise the raw column.
///
/// # Errors
///
/// Returns `ShapeMismatch` if the matrix does not have the grid's shape and
/// `IndexOverflow` if a stored index does not fit `I`.
///
/// # Panics
///
/// Panics if the emitted non-zero count differs from the input's; that can
/// only happen if the grid's block ranges fail to partition the matrix.
pub fn block_sparse<I: SparseIndex>(
    arena: &Arena,
    csr: &CsrMatrix,
    grid: &BlockGrid,
    layout: InputLayout,
) -> Result<BlockedCsr<I>> {
    if csr.rows() != grid.rows() || csr.cols() != grid.cols() {
        return Err(Error::shape_mismatch(
            &[grid.rows(), grid.cols()],
            &[csr.rows(), csr.cols()],
        ));
    }

    let stride = if I::PRESCALED {
        layout.row_stride(grid)
    } else {
        1
    };
    // Largest index is checked once instead of per entry
    let max_stored = grid.cols().saturating_sub(1).checked_mul(stride);
    match max_stored {
        Some(v) if I::from_usize(v).is_some() => {}
        _ => {
            return Err(Error::IndexOverflow {
                value: max_stored.unwrap_or(usize::MAX),
                bits: I::BITS,
            });
        }
    }

    let nnz_total = csr.nnz();
    let mut row_ptrs: AlignedBuffer<usize> = arena.alloc(grid.blocked_row_ptrs_len())?;
    let mut col_indices: AlignedBuffer<I> = arena.alloc(nnz_total)?;
    let mut values: AlignedBuffer<f32> = arena.alloc(nnz_total)?;

    let src_cols = csr.col_indices();
    let src_vals = csr.values();
    let src_ptrs = csr.row_ptrs();

    let mut nnz = 0usize;
    row_ptrs[0] = 0;
    for rb in 0..grid.row_blocks() {
        let rows = grid.row_range(rb);
        for cb in 0..grid.col_blocks() {
            let cols = grid.col_range(cb);
            let base = grid.segment_base(rb, cb);

            for i in rows.clone() {
                for j in src_ptrs[i]..src_ptrs[i + 1] {
                    let c = src_cols[j];
                    if cols.contains(&c) {
                        // Range checked above
                        col_indices[nnz] = I::from_usize(c * stride).unwrap_or_else(I::zeroed);
                        values[nnz] = src_vals[j];
                        nnz += 1;
                    }
                }
                let idx = base + (i - rows.start) + 1;
                assert!(idx < row_ptrs.len(), "row pointer index {idx} out of range");
                row_ptrs[idx] = nnz;
            }
        }
    }

    assert_eq!(nnz, nnz_total, "blocking emitted {nnz} of {nnz_total} non-zeros");
    assert_eq!(row_ptrs[grid.rows() * grid.col_blocks()], nnz_total);

    debug!(
        mb = grid.row_blocks(),
        kb = grid.col_blocks(),
        nnz = nnz_total,
        index_bits = I::BITS,
        prescaled = I::PRESCALED,
        "blocked sparse matrix"
    );

    Ok(BlockedCsr {
        grid: *grid,
        layout,
        row_ptrs,
        col_indices,
        values,
    })
}

impl<I: SparseIndex> BlockedCsr<I> {
    /// Grid the matrix was blocked with
    pub fn grid(&self) -> &BlockGrid {
        &self.grid
    }

    /// Input layout the stored indices are scaled for
    pub fn layout(&self) -> InputLayout {
        self.layout
    }

    /// Stride folded into stored indices (1 when indices are raw columns)
    pub fn index_scale(&self) -> usize {
        if I::PRESCALED {
            self.layout.row_stride(&self.grid)
        } else {
            1
        }
    }

    /// Total stored non-zeros
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Blocked row pointers (`rows · kb + 1` entries)
    pub fn row_ptrs(&self) -> &[usize] {
        &self.row_ptrs
    }

    /// Stored column indices (pre-scaled when `I::PRESCALED`)
    pub fn col_indices(&self) -> &[I] {
        &self.col_indices
    }

    /// Non-zero values in blocked order
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Local CSR segment for `(rb, cb)`
    #[inline]
    pub fn segment(&self, rb: usize, cb: usize) -> Segment<'_> {
        let rows = self.grid.row_range(rb);
        let base = self.grid.segment_base(rb, cb);
        Segment {
            first_row: rows.start,
            row_ptrs: &self.row_ptrs[base..base + rows.len() + 1],
        }
    }

    /// Original sparse column for stored entry `k`
    #[inline]
    pub fn column(&self, k: usize) -> usize {
        self.col_indices[k].to_usize() / self.index_scale()
    }

    /// `(row block, column block)` whose segment holds entry `(row, col)`
    #[inline]
    pub fn block_of(&self, row: usize, col: usize) -> (usize, usize) {
        (self.grid.row_block_of(row), self.grid.col_block_of(col))
    }

    /// Every stored entry as `(row, col, value)`, in blocked order
    pub fn entries(&self) -> Vec<(usize, usize, f32)> {
        let mut out = Vec::with_capacity(self.nnz());
        for rb in 0..self.grid.row_blocks() {
            for cb in 0..self.grid.col_blocks() {
                let seg = self.segment(rb, cb);
                for r in 0..seg.rows() {
                    for k in seg.entries(r) {
                        out.push((seg.first_row + r, self.column(k), self.values[k]));
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocking::ColumnBlocking;

    // 4×4:
    // [1 0 0 0]
    // [0 0 2 0]
    // [0 0 0 0]
    // [0 3 0 0]
    fn scenario() -> CsrMatrix {
        CsrMatrix::from_triplets(4, 4, &[(0, 0, 1.0), (1, 2, 2.0), (3, 1, 3.0)]).unwrap()
    }

    #[test]
    fn test_scenario_column_blocks() {
        let csr = scenario();
        let grid = BlockGrid::new(4, 4, 2, 1, 2, ColumnBlocking::Count(2)).unwrap();
        let blocked: BlockedCsr<u32> =
            block_sparse(&Arena::new(), &csr, &grid, InputLayout::Partitioned).unwrap();

        // Column block 0 (cols 0..2): (0,0)=1, (3,1)=3; column block 1: (1,2)=2
        assert_eq!(blocked.row_ptrs(), &[0, 1, 1, 1, 2, 2, 3, 3, 3]);
        assert_eq!(blocked.values(), &[1.0, 3.0, 2.0]);
        // Pre-scaled by bn = 2
        assert_eq!(blocked.col_indices(), &[0, 2, 4]);

        let seg = blocked.segment(0, 1);
        assert_eq!(seg.first_row, 0);
        assert_eq!(seg.rows(), 4);
        assert_eq!(seg.entries(1), 2..3);
        assert_eq!(blocked.column(2), 2);
    }

    #[test]
    fn test_narrow_indices_store_raw_columns() {
        let csr = scenario();
        let grid = BlockGrid::new(4, 4, 2, 1, 2, ColumnBlocking::Count(2)).unwrap();
        let blocked: BlockedCsr<u16> =
            block_sparse(&Arena::new(), &csr, &grid, InputLayout::Partitioned).unwrap();
        assert_eq!(blocked.col_indices(), &[0, 1, 2]);
        assert_eq!(blocked.index_scale(), 1);
    }

    #[test]
    fn test_row_major_prescales_by_batch() {
        let csr = scenario();
        let grid = BlockGrid::new(4, 4, 6, 1, 8, ColumnBlocking::Count(1)).unwrap();
        let blocked: BlockedCsr<u32> =
            block_sparse(&Arena::new(), &csr, &grid, InputLayout::RowMajor).unwrap();
        assert_eq!(blocked.col_indices(), &[0, 12, 6]);
    }

    #[test]
    fn test_entries_preserve_row_order_within_block() {
        // Unsorted columns in row 0 stay in their original order inside a block
        let csr = CsrMatrix::new(2, 4, vec![0, 3, 4], vec![3, 0, 1, 2], vec![1.0, 2.0, 3.0, 4.0])
            .unwrap();
        let grid = BlockGrid::new(2, 4, 2, 2, 1, ColumnBlocking::Count(2)).unwrap();
        let blocked: BlockedCsr<u32> =
            block_sparse(&Arena::new(), &csr, &grid, InputLayout::Partitioned).unwrap();
        assert_eq!(
            blocked.entries(),
            vec![(0, 0, 2.0), (0, 1, 3.0), (0, 3, 1.0), (1, 2, 4.0)]
        );
    }

    #[test]
    fn test_index_overflow_detected() {
        let csr = CsrMatrix::from_triplets(1, 70_000, &[(0, 69_999, 1.0)]).unwrap();
        let grid = BlockGrid::new(1, 70_000, 1, 1, 1, ColumnBlocking::Count(1)).unwrap();
        let result = block_sparse::<u16>(&Arena::new(), &csr, &grid, InputLayout::Partitioned);
        assert!(matches!(result, Err(Error::IndexOverflow { bits: 16, .. })));
    }

    #[test]
    fn test_shape_mismatch() {
        let grid = BlockGrid::new(5, 4, 2, 1, 2, ColumnBlocking::Count(2)).unwrap();
        let result =
            block_sparse::<u32>(&Arena::new(), &scenario(), &grid, InputLayout::Partitioned);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }
}
