//! Per-worker timing counters
//!
//! Each worker owns one [`WorkerTelemetry`] slot for the duration of a trial.
//! Slots are cache-line aligned so neighbouring workers never share a line;
//! the dispatcher reads them only after the trial's join.

use std::time::Duration;

/// Time one worker spent in the multiply and in the bias/rectify epilogue
#[repr(align(64))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerTelemetry {
    conv_ns: u64,
    reduce_ns: u64,
}

impl WorkerTelemetry {
    /// Add time spent accumulating products
    #[inline]
    pub fn record_conv(&mut self, elapsed: Duration) {
        self.conv_ns += elapsed.as_nanos() as u64;
    }

    /// Add time spent in the reduction epilogue
    #[inline]
    pub fn record_reduce(&mut self, elapsed: Duration) {
        self.reduce_ns += elapsed.as_nanos() as u64;
    }

    /// Accumulated multiply time
    pub fn conv(&self) -> Duration {
        Duration::from_nanos(self.conv_ns)
    }

    /// Accumulated epilogue time
    pub fn reduce(&self) -> Duration {
        Duration::from_nanos(self.reduce_ns)
    }
}

/// Max/sum aggregate over all workers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TelemetrySummary {
    /// Number of workers aggregated
    pub workers: usize,
    /// Slowest worker's multiply time
    pub max_conv: Duration,
    /// Total multiply time over workers
    pub sum_conv: Duration,
    /// Slowest worker's epilogue time
    pub max_reduce: Duration,
    /// Total epilogue time over workers
    pub sum_reduce: Duration,
}

impl TelemetrySummary {
    /// Aggregate a set of worker slots
    pub fn from_workers(slots: &[WorkerTelemetry]) -> Self {
        slots.iter().fold(
            Self {
                workers: slots.len(),
                ..Self::default()
            },
            |acc, t| Self {
                workers: acc.workers,
                max_conv: acc.max_conv.max(t.conv()),
                sum_conv: acc.sum_conv + t.conv(),
                max_reduce: acc.max_reduce.max(t.reduce()),
                sum_reduce: acc.sum_reduce + t.reduce(),
            },
        )
    }

    /// Mean multiply time per worker
    pub fn avg_conv(&self) -> Duration {
        self.sum_conv / self.workers.max(1) as u32
    }

    /// Mean epilogue time per worker
    pub fn avg_reduce(&self) -> Duration {
        self.sum_reduce / self.workers.max(1) as u32
    }

    /// Divide every counter by `trials`
    pub fn per_trial(&self, trials: usize) -> Self {
        let n = trials.max(1) as u32;
        Self {
            workers: self.workers,
            max_conv: self.max_conv / n,
            sum_conv: self.sum_conv / n,
            max_reduce: self.max_reduce / n,
            sum_reduce: self.sum_reduce / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_cache_line_aligned() {
        assert_eq!(std::mem::align_of::<WorkerTelemetry>(), 64);
        assert_eq!(std::mem::size_of::<WorkerTelemetry>(), 64);
    }

    #[test]
    fn test_summary_max_and_sum() {
        let mut slots = [WorkerTelemetry::default(); 3];
        slots[0].record_conv(Duration::from_micros(10));
        slots[1].record_conv(Duration::from_micros(30));
        slots[2].record_conv(Duration::from_micros(20));
        slots[1].record_reduce(Duration::from_micros(4));

        let summary = TelemetrySummary::from_workers(&slots);
        assert_eq!(summary.workers, 3);
        assert_eq!(summary.max_conv, Duration::from_micros(30));
        assert_eq!(summary.sum_conv, Duration::from_micros(60));
        assert_eq!(summary.avg_conv(), Duration::from_micros(20));
        assert_eq!(summary.max_reduce, Duration::from_micros(4));

        let half = summary.per_trial(2);
        assert_eq!(half.max_conv, Duration::from_micros(15));
    }
}
