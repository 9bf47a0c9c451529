//! Run configuration
//!
//! Everything a run needs besides the matrix itself. The CLI fills a
//! [`RunConfig`]; library users can build one directly.

use std::path::PathBuf;

use crate::blocking::{BlockGrid, ColumnBlocking, InputLayout};
use crate::error::{Error, Result};
use crate::runtime::{available_threads, default_batch_block_width};
use crate::sparse::IndexWidth;
use crate::verify::{DEFAULT_TOLERANCE, Verifier, ZeroPolicy};

/// Default batch width
pub const DEFAULT_BATCH: usize = 256;

/// Default trial count
pub const DEFAULT_TRIALS: usize = 256;

/// Inputs to [`BlockGrid::new`] that do not come from the matrix
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridParams {
    /// Worker count
    pub threads: usize,
    /// Batch width
    pub batch: usize,
    /// Preferred batch-block width
    pub batch_block_width: usize,
    /// Column blocking of the reduction dimension
    pub columns: ColumnBlocking,
}

impl GridParams {
    /// Derive the grid for a `rows × cols` weight matrix
    pub fn grid(&self, rows: usize, cols: usize) -> Result<BlockGrid> {
        BlockGrid::new(
            rows,
            cols,
            self.batch,
            self.threads,
            self.batch_block_width,
            self.columns,
        )
    }
}

/// Complete configuration of one run
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    /// Matrix Market file with the weights
    pub matrix: PathBuf,
    /// Batch width (dense input columns)
    pub batch: usize,
    /// Column blocking of the reduction dimension
    pub columns: ColumnBlocking,
    /// Worker count
    pub threads: usize,
    /// Timed trials
    pub trials: usize,
    /// Input layout variant
    pub layout: InputLayout,
    /// Stored column index width
    pub index: IndexWidth,
    /// Override for the batch-block width; detected from the CPU when unset
    pub batch_block_width: Option<usize>,
    /// Relative verification tolerance
    pub tolerance: f32,
    /// Zero-expected handling
    pub zero_policy: ZeroPolicy,
    /// Keep only the first `rows / scale_down` weight rows; 1 keeps all
    pub scale_down: usize,
    /// Output element `(row, col)` whose reference terms are logged at trace level
    pub trace: Option<(usize, usize)>,
}

impl RunConfig {
    /// Defaults for everything but the matrix path
    pub fn new(matrix: impl Into<PathBuf>) -> Self {
        Self {
            matrix: matrix.into(),
            batch: DEFAULT_BATCH,
            columns: ColumnBlocking::default(),
            threads: available_threads(),
            trials: DEFAULT_TRIALS,
            layout: InputLayout::default(),
            index: IndexWidth::default(),
            batch_block_width: None,
            tolerance: DEFAULT_TOLERANCE,
            zero_policy: ZeroPolicy::default(),
            scale_down: 1,
            trace: None,
        }
    }

    /// Reject values no run could use
    ///
    /// Blocking divisibility is checked later, once the matrix shape is known.
    pub fn validate(&self) -> Result<()> {
        if self.batch == 0 {
            return Err(Error::invalid_argument("batch", "must be at least 1"));
        }
        if self.threads == 0 {
            return Err(Error::invalid_argument("threads", "must be at least 1"));
        }
        if self.trials == 0 {
            return Err(Error::invalid_argument("trials", "must be at least 1"));
        }
        if self.scale_down == 0 {
            return Err(Error::invalid_argument("scale_down", "must be at least 1"));
        }
        if self.batch_block_width == Some(0) {
            return Err(Error::invalid_argument("batch_block_width", "must be at least 1"));
        }
        match self.columns {
            ColumnBlocking::Count(0) | ColumnBlocking::Size(0) => {
                return Err(Error::invalid_argument(
                    "columns",
                    "block count/size must be at least 1",
                ));
            }
            _ => {}
        }
        Verifier::new(self.tolerance, self.zero_policy)?;
        Ok(())
    }

    /// Grid parameters, with the batch-block width resolved
    pub fn grid_params(&self) -> GridParams {
        GridParams {
            threads: self.threads,
            batch: self.batch,
            batch_block_width: self.batch_block_width.unwrap_or_else(default_batch_block_width),
            columns: self.columns,
        }
    }

    /// Verifier for this run
    pub fn verifier(&self) -> Result<Verifier> {
        Verifier::new(self.tolerance, self.zero_policy)
    }
}
