//! Fixed-size worker pool
//!
//! Each compute trial is a fork-join over the pool: every worker owns one
//! output tile, and the trial completes when all of them have returned.

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{Error, Result};

/// Number of hardware threads visible to the process
pub fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// A rayon thread pool whose size never changes after construction
#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
}

impl WorkerPool {
    /// Build a pool with exactly `threads` workers
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Error::invalid_argument("threads", "must be at least 1"));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("spfc-worker-{i}"))
            .build()
            .map_err(|e| Error::Backend(e.to_string()))?;
        Ok(Self { pool, threads })
    }

    /// Worker count
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `op` inside the pool; parallel iterators in `op` use its workers
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_has_requested_size() {
        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(pool.threads(), 3);
        assert_eq!(pool.install(rayon::current_num_threads), 3);
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(Error::InvalidArgument { arg: "threads", .. })
        ));
    }
}
