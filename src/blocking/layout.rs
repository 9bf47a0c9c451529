//! Dense input layout variants

use super::BlockGrid;

/// How the dense input matrix is laid out for the kernel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputLayout {
    /// Canonical row-major `[cols][batch]`, no rearrangement
    RowMajor,
    /// One `[col][bn]` panel per batch block
    #[default]
    Partitioned,
    /// One `[col][bn]` panel per (batch block, row partition) pair
    Replicated,
}

impl InputLayout {
    /// Name used on the command line and in logs
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RowMajor => "row-major",
            Self::Partitioned => "partitioned",
            Self::Replicated => "replicated",
        }
    }

    /// Distance in elements between consecutive input rows inside a panel
    ///
    /// Pre-scaled column indices are multiplied by this stride.
    #[inline]
    pub fn row_stride(self, grid: &BlockGrid) -> usize {
        match self {
            Self::RowMajor => grid.batch(),
            Self::Partitioned | Self::Replicated => grid.batch_block_width(),
        }
    }

    /// Number of panels stored
    pub fn panel_count(self, grid: &BlockGrid) -> usize {
        match self {
            Self::RowMajor => 1,
            Self::Partitioned => grid.batch_blocks(),
            Self::Replicated => grid.batch_blocks() * grid.row_blocks(),
        }
    }

    /// Length of the blocked input buffer
    ///
    /// Row-major keeps `cols · batch`; panel layouts store `cols · bn` per panel
    /// with the tail of the last batch block zero padded.
    pub fn blocked_len(self, grid: &BlockGrid) -> usize {
        match self {
            Self::RowMajor => grid.cols() * grid.batch(),
            Self::Partitioned | Self::Replicated => {
                self.panel_count(grid) * grid.cols() * grid.batch_block_width()
            }
        }
    }

    /// Element offset where the data read by tile `(rb, nbk)` starts
    #[inline]
    pub fn panel_offset(self, grid: &BlockGrid, rb: usize, nbk: usize) -> usize {
        let panel_len = grid.cols() * grid.batch_block_width();
        match self {
            Self::RowMajor => grid.batch_range(nbk).start,
            Self::Partitioned => nbk * panel_len,
            Self::Replicated => (nbk * grid.row_blocks() + rb) * panel_len,
        }
    }
}

impl std::fmt::Display for InputLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
