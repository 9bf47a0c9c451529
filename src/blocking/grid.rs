//! Block grid derivation and the sizing formulas shared by every blocked layout
//!
//! The output `C = A · B` (`rows × batch`) is split into `mb` row blocks and
//! `nb` batch blocks; each of the `mb · nb` tiles belongs to exactly one
//! worker, so `mb · nb` must equal the worker count. The reduction dimension
//! (`cols`) is split into `kb` column blocks for cache locality only.

use std::ops::Range;

use crate::error::{Error, Result};

/// How the reduction dimension is split into column blocks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnBlocking {
    /// Target number of column blocks
    Count(usize),
    /// Number of columns per block
    Size(usize),
}

impl Default for ColumnBlocking {
    fn default() -> Self {
        Self::Count(256)
    }
}

/// 2D tiling of a sparse × dense product
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockGrid {
    rows: usize,
    cols: usize,
    batch: usize,
    threads: usize,
    mb: usize,
    kb: usize,
    nb: usize,
    bn: usize,
    rows_per_block: usize,
    cols_per_block: usize,
}

#[inline]
fn div_ceil(a: usize, b: usize) -> usize {
    a.div_ceil(b)
}

impl BlockGrid {
    /// Derive the grid for a `rows × cols` sparse matrix times a `cols × batch` dense matrix
    ///
    /// # Arguments
    ///
    /// * `threads` - Worker count; fixed for the whole run
    /// * `batch_block_width` - Preferred batch-block width (usually the SIMD stripe)
    /// * `columns` - Column blocking of the reduction dimension
    ///
    /// # Errors
    ///
    /// Returns `InvalidBlocking` when the derived batch-block count does not
    /// divide `threads`, and `InvalidArgument` for zero-sized inputs.
    pub fn new(
        rows: usize,
        cols: usize,
        batch: usize,
        threads: usize,
        batch_block_width: usize,
        columns: ColumnBlocking,
    ) -> Result<Self> {
        for (arg, value) in [
            ("rows", rows),
            ("cols", cols),
            ("batch", batch),
            ("threads", threads),
            ("batch_block_width", batch_block_width),
        ] {
            if value == 0 {
                return Err(Error::invalid_argument(arg, "must be at least 1"));
            }
        }

        let mut bn = batch_block_width;
        let mut nb = div_ceil(batch, bn);
        if threads < nb {
            bn = div_ceil(batch, threads);
            nb = div_ceil(batch, bn);
        }
        if threads % nb != 0 {
            return Err(Error::InvalidBlocking {
                threads,
                batch_blocks: nb,
            });
        }
        // Panels are sized to the even split; nb is unchanged by this.
        bn = div_ceil(batch, nb);
        let mb = threads / nb;

        let cols_per_block = match columns {
            ColumnBlocking::Count(0) | ColumnBlocking::Size(0) => {
                return Err(Error::invalid_argument(
                    "columns",
                    "block count/size must be at least 1",
                ));
            }
            ColumnBlocking::Count(count) => div_ceil(cols, count.min(cols)),
            ColumnBlocking::Size(size) => size.min(cols),
        };
        let kb = div_ceil(cols, cols_per_block);

        Ok(Self {
            rows,
            cols,
            batch,
            threads,
            mb,
            kb,
            nb,
            bn,
            rows_per_block: div_ceil(rows, mb),
            cols_per_block,
        })
    }

    /// Output rows (sparse matrix rows)
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Reduction dimension (sparse matrix columns, dense matrix rows)
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Batch width (dense matrix columns)
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Worker count
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Row-block count (`mb`), also the number of row partitions
    pub fn row_blocks(&self) -> usize {
        self.mb
    }

    /// Column-block count (`kb`)
    pub fn col_blocks(&self) -> usize {
        self.kb
    }

    /// Batch-block count (`nb`)
    pub fn batch_blocks(&self) -> usize {
        self.nb
    }

    /// Batch-block width (`bn`); the last block may be narrower
    pub fn batch_block_width(&self) -> usize {
        self.bn
    }

    /// Rows per row block; the last block may be shorter
    pub fn rows_per_block(&self) -> usize {
        self.rows_per_block
    }

    /// Columns per column block; the last block may be narrower
    pub fn cols_per_block(&self) -> usize {
        self.cols_per_block
    }

    /// Output rows covered by row block `rb`
    #[inline]
    pub fn row_range(&self, rb: usize) -> Range<usize> {
        let begin = (self.rows_per_block * rb).min(self.rows);
        let end = (begin + self.rows_per_block).min(self.rows);
        begin..end
    }

    /// Sparse columns covered by column block `cb`
    #[inline]
    pub fn col_range(&self, cb: usize) -> Range<usize> {
        let begin = (self.cols_per_block * cb).min(self.cols);
        let end = (begin + self.cols_per_block).min(self.cols);
        begin..end
    }

    /// Batch columns covered by batch block `nbk`
    #[inline]
    pub fn batch_range(&self, nbk: usize) -> Range<usize> {
        let begin = (self.bn * nbk).min(self.batch);
        let end = (begin + self.bn).min(self.batch);
        begin..end
    }

    /// Row block containing output row `row`
    #[inline]
    pub fn row_block_of(&self, row: usize) -> usize {
        row / self.rows_per_block
    }

    /// Column block containing sparse column `col`
    #[inline]
    pub fn col_block_of(&self, col: usize) -> usize {
        col / self.cols_per_block
    }

    /// Position in the blocked row-pointer array where segment `(rb, cb)` starts
    ///
    /// Entry `segment_base(rb, cb) + local_row + 1` holds the cumulative
    /// non-zero count at the end of that local row.
    #[inline]
    pub fn segment_base(&self, rb: usize, cb: usize) -> usize {
        let rows = self.row_range(rb);
        self.kb * rows.start + cb * rows.len()
    }

    /// Length of the blocked row-pointer array: `rows · kb + 1`
    pub fn blocked_row_ptrs_len(&self) -> usize {
        self.rows * self.kb + 1
    }

    /// Number of output tiles, `mb · nb`
    pub fn tiles(&self) -> usize {
        self.mb * self.nb
    }

    /// Elements in one output tile: `rows_per_block · bn`
    pub fn tile_len(&self) -> usize {
        self.rows_per_block * self.bn
    }

    /// Index of the tile owned by `(rb, nbk)`; also the owning worker id
    #[inline]
    pub fn tile_index(&self, rb: usize, nbk: usize) -> usize {
        rb * self.nb + nbk
    }

    /// Inverse of [`tile_index`](Self::tile_index)
    #[inline]
    pub fn tile_coords(&self, tile: usize) -> (usize, usize) {
        (tile / self.nb, tile % self.nb)
    }

    /// Length of the blocked output buffer:
    /// `threads · ceil(rows / mb) · ceil(batch / nb)`
    pub fn blocked_output_len(&self) -> usize {
        self.tiles() * self.tile_len()
    }
}
