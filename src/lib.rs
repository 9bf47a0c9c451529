//! # spfc
//!
//! **Blocked sparse × dense fully-connected layer for multi-core CPUs.**
//!
//! spfc computes `C = relu(bias + A · B)` for a pruned (CSR) weight matrix
//! `A` and a dense activation batch `B`. The multiply itself is simple; the
//! work is in the data layout: `A` and `B` are cut into 2D tiles aligned to
//! worker and vector-register boundaries, a fused kernel fills one output
//! tile per worker, and the tiles are reassembled and checked against a
//! reference product.
//!
//! ## Pipeline
//!
//! ```text
//! Matrix Market ─► CsrMatrix ─► block_sparse ─► BlockedCsr ──┐
//! workload::input ─────────────► rearrange ───► BlockedDense ┼─► Dispatcher ─► BlockedOutput
//!                                                            │        (trials)        │
//!                                                 bias ──────┘                     deblock
//!                                                                                     │
//!                                           reference_fc ─► Verifier ◄── DenseMatrix ◄┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spfc::prelude::*;
//!
//! let config = RunConfig { threads: 8, ..RunConfig::new("weights.mtx") };
//! let outcome = spfc::pipeline::run(&config)?;
//! println!("{}", outcome.report);
//! ```
//!
//! ## Layout variants
//!
//! - [`InputLayout::RowMajor`](blocking::InputLayout::RowMajor): kernel reads the canonical input
//! - [`InputLayout::Partitioned`](blocking::InputLayout::Partitioned): one panel per batch block
//! - [`InputLayout::Replicated`](blocking::InputLayout::Replicated): one panel per batch
//!   block and row partition

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blocking;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod kernel;
pub mod pipeline;
pub mod report;
pub mod runtime;
pub mod sparse;
pub mod telemetry;
pub mod verify;
pub mod workload;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::blocking::{
        BlockGrid, BlockedCsr, BlockedDense, BlockedOutput, ColumnBlocking, DenseMatrix,
        InputLayout, block_sparse, deblock, rearrange, tile,
    };
    pub use crate::config::{GridParams, RunConfig};
    pub use crate::dispatch::{DispatchStats, Dispatcher, NoopRoi, RoiMarker, TracingRoi};
    pub use crate::error::{Error, Result};
    pub use crate::kernel::{FusedKernel, KernelArgs, PassThroughKernel, TiledKernel};
    pub use crate::report::ThroughputReport;
    pub use crate::runtime::{Arena, WorkerPool};
    pub use crate::sparse::{CsrMatrix, IndexWidth, SparseIndex, read_matrix_market};
    pub use crate::telemetry::{TelemetrySummary, WorkerTelemetry};
    pub use crate::verify::{Verifier, ZeroPolicy, reference_fc, reference_spmm, trace_element};
}
