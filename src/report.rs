//! Throughput report printed after a verified run

use std::fmt;
use std::time::Duration;

use crate::blocking::BlockGrid;
use crate::dispatch::DispatchStats;
use crate::sparse::CsrMatrix;
use crate::telemetry::TelemetrySummary;

/// Problem shape, blocking and timing of one run
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThroughputReport {
    /// Output rows (`m`)
    pub rows: usize,
    /// Batch width (`n`)
    pub batch: usize,
    /// Reduction dimension (`k`)
    pub cols: usize,
    /// Fraction of non-zero weights
    pub density: f64,
    /// Row blocks
    pub mb: usize,
    /// Batch blocks
    pub nb: usize,
    /// Column blocks
    pub kb: usize,
    /// Trials executed
    pub trials: usize,
    /// Wall-clock time over all trials
    pub wall: Duration,
    /// Worker counters over all trials
    pub telemetry: TelemetrySummary,
    /// Wall-clock time of one trial
    pub wall_per_trial: Duration,
    /// Worker counters averaged over trials
    pub telemetry_per_trial: TelemetrySummary,
}

impl ThroughputReport {
    /// Collect the report for a finished dispatch
    pub fn new(grid: &BlockGrid, weights: &CsrMatrix, stats: &DispatchStats) -> Self {
        Self {
            rows: grid.rows(),
            batch: grid.batch(),
            cols: grid.cols(),
            density: weights.density(),
            mb: grid.row_blocks(),
            nb: grid.batch_blocks(),
            kb: grid.col_blocks(),
            trials: stats.trials,
            wall: stats.wall,
            telemetry: stats.telemetry,
            wall_per_trial: stats.wall_per_trial(),
            telemetry_per_trial: stats.telemetry_per_trial(),
        }
    }

    /// Dense-equivalent flops per batch column: `2 · rows · cols`
    pub fn flops_per_column(&self) -> f64 {
        2.0 * self.rows as f64 * self.cols as f64
    }

    /// Dense-equivalent GF/s over wall-clock time
    pub fn wall_gflops(&self) -> f64 {
        gflops(self.flops_per_column() * self.batch as f64 * self.trials as f64, self.wall)
    }

    /// Dense-equivalent GF/s over the slowest worker's multiply time
    pub fn kernel_gflops(&self) -> f64 {
        gflops(
            self.flops_per_column() * self.batch as f64 * self.trials as f64,
            self.telemetry.max_conv,
        )
    }
}

fn gflops(flops: f64, time: Duration) -> f64 {
    let secs = time.as_secs_f64();
    if secs > 0.0 { flops / secs / 1e9 } else { 0.0 }
}

impl fmt::Display for ThroughputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let per_trial = &self.telemetry_per_trial;
        writeln!(
            f,
            "m = {} n = {} k = {} nnz_proportion = {}",
            self.rows, self.batch, self.cols, self.density
        )?;
        writeln!(f, "mb = {}, nb = {}, kb = {}", self.mb, self.nb, self.kb)?;
        writeln!(f, "REPEAT = {}, nbatch = {}", self.trials, self.batch)?;
        writeln!(f, "mflops-per-file {}", self.flops_per_column() / 1e6)?;
        writeln!(f, "effective-GF/s {} {}", self.wall_gflops(), self.kernel_gflops())?;
        write!(
            f,
            "wall_clock_time = {}, max_csrmm_time = {}, avg_csrmm_time = {}, \
             max_reduce_time = {}, avg_reduce_time = {}",
            self.wall_per_trial.as_secs_f64(),
            per_trial.max_conv.as_secs_f64(),
            per_trial.avg_conv().as_secs_f64(),
            per_trial.max_reduce.as_secs_f64(),
            per_trial.avg_reduce().as_secs_f64(),
        )
    }
}
