//! Data layout transformations for the blocked product
//!
//! - [`BlockGrid`]: tile counts and sizes derived from shape and worker count
//! - [`block_sparse`]: CSR → `(row block, column block)` segments
//! - [`rearrange`]: dense input → per-batch-block panels
//! - [`deblock`] / [`tile`]: tile-ordered output ↔ canonical row-major

mod dense;
mod grid;
mod layout;
mod output;
mod sparse;

pub use dense::{BlockedDense, DenseMatrix, Panel, rearrange};
pub use grid::{BlockGrid, ColumnBlocking};
pub use layout::InputLayout;
pub use output::{BlockedOutput, deblock, tile};
pub use sparse::{BlockedCsr, Segment, block_sparse};
