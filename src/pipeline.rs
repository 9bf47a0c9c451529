//! End-to-end run: load → block → rearrange → dispatch → de-block → verify
//!
//! Configuration problems (including blocking divisibility) are reported
//! before anything is allocated. A verification mismatch aborts the run and
//! no report is produced.

use std::borrow::Cow;
use std::time::Instant;

use tracing::{debug, info};

use crate::blocking::{BlockGrid, BlockedOutput, DenseMatrix, block_sparse, deblock, rearrange};
use crate::config::RunConfig;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::kernel::{FusedKernel, KernelArgs, TiledKernel};
use crate::report::ThroughputReport;
use crate::runtime::Arena;
use crate::sparse::{CsrMatrix, IndexWidth, SparseIndex, read_matrix_market};
use crate::verify::{reference_fc, trace_element};
use crate::workload;

/// Result of a verified run
#[derive(Debug)]
pub struct RunOutcome {
    /// Grid the run used
    pub grid: BlockGrid,
    /// Throughput figures
    pub report: ThroughputReport,
    /// De-blocked `rows × batch` output of the last trial
    pub output: DenseMatrix,
    /// Largest number of bytes the arena held at once
    pub peak_bytes: usize,
}

/// Load the configured matrix and run it
pub fn run(config: &RunConfig) -> Result<RunOutcome> {
    config.validate()?;
    let start = Instant::now();
    let csr = read_matrix_market(&config.matrix)?;
    info!(
        path = %config.matrix.display(),
        rows = csr.rows(),
        cols = csr.cols(),
        nnz = csr.nnz(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
        "loaded matrix"
    );
    run_matrix(&csr, config)
}

/// Run an already-loaded weight matrix with the tiled kernel
///
/// # Errors
///
/// `InvalidBlocking` and other configuration errors come back before any
/// blocked structure is allocated; `VerificationMismatch` if the blocked
/// result disagrees with the reference.
pub fn run_matrix(csr: &CsrMatrix, config: &RunConfig) -> Result<RunOutcome> {
    run_matrix_with(csr, config, &TiledKernel)
}

/// Run an already-loaded weight matrix with any fused kernel
///
/// The kernel must handle both index widths; `config.index` picks one.
pub fn run_matrix_with<K>(csr: &CsrMatrix, config: &RunConfig, kernel: &K) -> Result<RunOutcome>
where
    K: FusedKernel<u16> + FusedKernel<u32>,
{
    config.validate()?;
    let csr = scale_down(csr, config.scale_down)?;
    let csr: &CsrMatrix = &csr;
    let grid = config.grid_params().grid(csr.rows(), csr.cols())?;
    let verifier = config.verifier()?;
    info!(
        mb = grid.row_blocks(),
        nb = grid.batch_blocks(),
        kb = grid.col_blocks(),
        bn = grid.batch_block_width(),
        layout = %config.layout,
        index = config.index.as_str(),
        "derived block grid"
    );

    let input = workload::input(grid.cols(), grid.batch());
    let bias = workload::bias(grid.rows());
    if let Some((row, col)) = config.trace {
        let sum = trace_element(csr, &input, &bias, row, col)?;
        debug!(row, col, sum, "traced reference element");
    }

    let (output, report, peak_bytes) = match config.index {
        IndexWidth::U16 => compute::<u16, K>(csr, &input, &bias, &grid, config, kernel)?,
        IndexWidth::U32 => compute::<u32, K>(csr, &input, &bias, &grid, config, kernel)?,
    };

    let start = Instant::now();
    let expected = reference_fc(csr, &input, &bias)?;
    verifier.verify(&expected, &output)?;
    info!(elapsed_ms = start.elapsed().as_secs_f64() * 1e3, "verified output");

    Ok(RunOutcome {
        grid,
        report,
        output,
        peak_bytes,
    })
}

/// Keep the first `rows / factor` rows so a large problem fits one tile
fn scale_down(csr: &CsrMatrix, factor: usize) -> Result<Cow<'_, CsrMatrix>> {
    if factor <= 1 {
        return Ok(Cow::Borrowed(csr));
    }
    let rows = csr.rows() / factor;
    if rows == 0 {
        return Err(Error::invalid_argument(
            "scale_down",
            format!("factor {factor} leaves no rows of {}", csr.rows()),
        ));
    }
    let scaled = csr.truncate_rows(rows);
    info!(
        factor,
        rows = scaled.rows(),
        nnz = scaled.nnz(),
        "scaled weight matrix down"
    );
    Ok(Cow::Owned(scaled))
}

fn compute<I, K>(
    csr: &CsrMatrix,
    input: &DenseMatrix,
    bias: &[f32],
    grid: &BlockGrid,
    config: &RunConfig,
    kernel: &K,
) -> Result<(DenseMatrix, ThroughputReport, usize)>
where
    I: SparseIndex,
    K: FusedKernel<I>,
{
    let dispatcher = Dispatcher::new(config.threads, config.trials)?;
    let arena = Arena::new();

    let start = Instant::now();
    let weights = block_sparse::<I>(&arena, csr, grid, config.layout)?;
    let blocked_input = rearrange(&arena, input, grid, config.layout)?;
    let bias = arena.alloc_from_slice(bias)?;
    let mut output = BlockedOutput::new(&arena, grid)?;
    info!(
        elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
        arena_bytes = arena.live_bytes(),
        buffers = arena.live_allocations(),
        "blocked operands"
    );

    let args = KernelArgs::new(&weights, &blocked_input, &bias);
    let stats = dispatcher.run(kernel, &args, &mut output)?;

    let start = Instant::now();
    let dense = deblock(&output);
    info!(elapsed_ms = start.elapsed().as_secs_f64() * 1e3, "de-blocked output");

    let report = ThroughputReport::new(grid, csr, &stats);
    Ok((dense, report, arena.peak_bytes()))
}
