//! Compute dispatcher: repeated fork-join trials over a fixed worker pool
//!
//! Every trial hands the whole output to the kernel inside the pool; the
//! kernel splits it into one tile per worker. Telemetry slots live in the
//! dispatcher, are lent to the kernel for every trial, and are aggregated once
//! after the last join. Only the final trial is bracketed by region-of-interest
//! markers.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::blocking::BlockedOutput;
use crate::error::{Error, Result};
use crate::kernel::{FusedKernel, KernelArgs};
use crate::runtime::WorkerPool;
use crate::sparse::SparseIndex;
use crate::telemetry::{TelemetrySummary, WorkerTelemetry};

/// Hook around the profiled trial
pub trait RoiMarker: Send + Sync {
    /// Called right before the final trial starts
    fn begin(&self);
    /// Called right after the final trial's join
    fn end(&self);
}

/// Marks the region of interest with `tracing` events
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingRoi;

impl RoiMarker for TracingRoi {
    fn begin(&self) {
        info!(target: "spfc::roi", "roi begin");
    }

    fn end(&self) {
        info!(target: "spfc::roi", "roi end");
    }
}

/// Does nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRoi;

impl RoiMarker for NoopRoi {
    fn begin(&self) {}
    fn end(&self) {}
}

/// Timing of a completed dispatch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchStats {
    /// Trials executed
    pub trials: usize,
    /// Wall-clock time over all trials
    pub wall: Duration,
    /// Per-worker counters accumulated over all trials
    pub telemetry: TelemetrySummary,
}

impl DispatchStats {
    /// Wall-clock time of one trial
    pub fn wall_per_trial(&self) -> Duration {
        self.wall / self.trials.max(1) as u32
    }

    /// Worker counters averaged over trials
    pub fn telemetry_per_trial(&self) -> TelemetrySummary {
        self.telemetry.per_trial(self.trials)
    }
}

/// Runs a fused kernel for a fixed number of trials
pub struct Dispatcher {
    pool: WorkerPool,
    trials: usize,
    roi: Box<dyn RoiMarker>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("threads", &self.pool.threads())
            .field("trials", &self.trials)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Build a dispatcher with `threads` workers and the tracing ROI marker
    pub fn new(threads: usize, trials: usize) -> Result<Self> {
        if trials == 0 {
            return Err(Error::invalid_argument("trials", "must be at least 1"));
        }
        Ok(Self {
            pool: WorkerPool::new(threads)?,
            trials,
            roi: Box::new(TracingRoi),
        })
    }

    /// Replace the region-of-interest marker
    pub fn with_roi(mut self, roi: impl RoiMarker + 'static) -> Self {
        self.roi = Box::new(roi);
        self
    }

    /// Worker count
    pub fn threads(&self) -> usize {
        self.pool.threads()
    }

    /// Trials per run
    pub fn trials(&self) -> usize {
        self.trials
    }

    /// Run `kernel` for every trial, leaving the last trial's result in `output`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the grid's tile count differs from the
    /// worker count, and the kernel's own error if any trial fails.
    pub fn run<I, K>(
        &self,
        kernel: &K,
        args: &KernelArgs<'_, I>,
        output: &mut BlockedOutput,
    ) -> Result<DispatchStats>
    where
        I: SparseIndex,
        K: FusedKernel<I> + ?Sized,
    {
        let tiles = args.weights.grid().tiles();
        if tiles != self.threads() {
            return Err(Error::invalid_argument(
                "threads",
                format!("grid has {tiles} tiles for {} workers", self.threads()),
            ));
        }

        let mut telemetry = vec![WorkerTelemetry::default(); tiles];
        let start = Instant::now();

        for trial in 0..self.trials {
            let last = trial + 1 == self.trials;
            if last {
                self.roi.begin();
            }
            self.pool.install(|| kernel.compute(args, output, &mut telemetry))?;
            if last {
                self.roi.end();
            }
        }

        let wall = start.elapsed();
        let stats = DispatchStats {
            trials: self.trials,
            wall,
            telemetry: TelemetrySummary::from_workers(&telemetry),
        };

        debug!(kernel = kernel.name(), workers = tiles, "dispatch complete");
        info!(
            trials = self.trials,
            wall_ms = wall.as_secs_f64() * 1e3,
            max_conv_ms = stats.telemetry.max_conv.as_secs_f64() * 1e3,
            "compute trials finished"
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::blocking::{
        BlockGrid, BlockedCsr, BlockedDense, ColumnBlocking, DenseMatrix, InputLayout,
        block_sparse, deblock, rearrange,
    };
    use crate::kernel::TiledKernel;
    use crate::runtime::Arena;
    use crate::sparse::CsrMatrix;

    #[derive(Default)]
    struct CountingRoi {
        begins: Arc<AtomicUsize>,
        ends: Arc<AtomicUsize>,
    }

    impl RoiMarker for CountingRoi {
        fn begin(&self) {
            self.begins.fetch_add(1, Ordering::SeqCst);
        }
        fn end(&self) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingKernel;

    impl FusedKernel<u32> for FailingKernel {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn compute(
            &self,
            _args: &KernelArgs<'_, u32>,
            _output: &mut BlockedOutput,
            _telemetry: &mut [WorkerTelemetry],
        ) -> Result<()> {
            Err(Error::kernel("failing", "always fails"))
        }
    }

    /// Charges worker `t` a fixed `10 · (t + 1)` µs of multiply time per trial
    struct FixedCostKernel;

    impl FusedKernel<u32> for FixedCostKernel {
        fn name(&self) -> &'static str {
            "fixed-cost"
        }

        fn compute(
            &self,
            _args: &KernelArgs<'_, u32>,
            _output: &mut BlockedOutput,
            telemetry: &mut [WorkerTelemetry],
        ) -> Result<()> {
            for (t, slot) in telemetry.iter_mut().enumerate() {
                slot.record_conv(Duration::from_micros(10 * (t as u64 + 1)));
            }
            Ok(())
        }
    }

    fn setup(threads: usize) -> (BlockGrid, BlockedCsr<u32>, BlockedDense, BlockedOutput) {
        let csr =
            CsrMatrix::from_triplets(6, 4, &[(0, 0, 1.0), (2, 3, 2.0), (5, 1, -1.0)]).unwrap();
        let grid = BlockGrid::new(6, 4, 8, threads, 4, ColumnBlocking::Count(2)).unwrap();
        let arena = Arena::new();
        let weights = block_sparse(&arena, &csr, &grid, InputLayout::Partitioned).unwrap();
        let dense = DenseMatrix::from_fn(4, 8, |i, j| (i + j) as f32);
        let input = rearrange(&arena, &dense, &grid, InputLayout::Partitioned).unwrap();
        let output = BlockedOutput::new(&arena, &grid).unwrap();
        (grid, weights, input, output)
    }

    #[test]
    fn test_only_last_trial_is_marked() {
        let roi = CountingRoi::default();
        let (begins, ends) = (roi.begins.clone(), roi.ends.clone());
        let dispatcher = Dispatcher::new(4, 5).unwrap().with_roi(roi);
        let (_, weights, input, mut output) = setup(4);
        let bias = [0.0; 6];

        let stats = dispatcher
            .run(&TiledKernel, &KernelArgs::new(&weights, &input, &bias), &mut output)
            .unwrap();
        assert_eq!(stats.trials, 5);
        assert_eq!(stats.telemetry.workers, 4);
        assert_eq!(begins.load(Ordering::SeqCst), 1);
        assert_eq!(ends.load(Ordering::SeqCst), 1);

        let out = deblock(&output);
        assert_eq!(out.get(0, 3), 3.0);
        assert_eq!(out.get(2, 0), 6.0);
        // Row 5 is -1 * B[1][j], rectified to zero
        assert_eq!(out.get(5, 7), 0.0);
    }

    #[test]
    fn test_telemetry_accumulates_across_trials() {
        let dispatcher = Dispatcher::new(4, 3).unwrap().with_roi(NoopRoi);
        let (_, weights, input, mut output) = setup(4);
        let bias = [0.0; 6];

        let stats = dispatcher
            .run(&FixedCostKernel, &KernelArgs::new(&weights, &input, &bias), &mut output)
            .unwrap();
        // Slowest worker: 40 µs × 3 trials; all workers: 100 µs × 3 trials
        assert_eq!(stats.telemetry.max_conv, Duration::from_micros(120));
        assert_eq!(stats.telemetry.sum_conv, Duration::from_micros(300));

        let per_trial = stats.telemetry_per_trial();
        assert_eq!(per_trial.max_conv, Duration::from_micros(40));
        assert_eq!(per_trial.avg_conv(), Duration::from_micros(25));
        assert_eq!(stats.wall_per_trial(), stats.wall / 3);
    }

    #[test]
    fn test_kernel_failure_aborts() {
        let dispatcher = Dispatcher::new(2, 3).unwrap().with_roi(NoopRoi);
        let (_, weights, input, mut output) = setup(2);
        let bias = [0.0; 6];
        let err = dispatcher
            .run(&FailingKernel, &KernelArgs::new(&weights, &input, &bias), &mut output)
            .unwrap_err();
        assert!(matches!(err, Error::Kernel { kernel: "failing", .. }));
    }

    #[test]
    fn test_worker_count_must_match_tiles() {
        let dispatcher = Dispatcher::new(4, 1).unwrap();
        let (_, weights, input, mut output) = setup(2);
        let bias = [0.0; 6];
        assert!(
            dispatcher
                .run(&TiledKernel, &KernelArgs::new(&weights, &input, &bias), &mut output)
                .is_err()
        );
    }

    #[test]
    fn test_zero_trials_rejected() {
        assert!(Dispatcher::new(1, 0).is_err());
    }
}
