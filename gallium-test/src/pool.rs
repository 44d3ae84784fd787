use crate::error::HarnessError;
use log::debug;
use rayon::prelude::*;

/// A fixed-size pool of worker threads.
///
/// Each item handed to `map` is one unit of work and runs start to finish on a
/// single worker. Results come back in input order no matter which worker
/// finishes first.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, HarnessError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("gct-worker-{i}"))
            .build()?;
        debug!("started worker pool with {workers} threads");
        Ok(Self { pool })
    }

    /// Pool sized to the number of logical CPUs
    pub fn with_available_parallelism() -> Result<Self, HarnessError> {
        Self::new(num_cpus::get())
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Apply `task` to every item, calling `on_done` as each one completes
    pub fn map<T, R, F, D>(&self, items: &[T], task: F, on_done: D) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> R + Sync + Send,
        D: Fn(&T, &R) + Sync + Send,
    {
        self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .with_max_len(1)
                .map(|(index, item)| {
                    let result = task(index, item);
                    on_done(item, &result);
                    result
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_results_keep_input_order() {
        let pool = WorkerPool::new(4).unwrap();
        let items: Vec<u64> = (0..32).collect();

        // later items finish first
        let results = pool.map(
            &items,
            |_, n| {
                std::thread::sleep(Duration::from_millis(32 - n));
                n * 10
            },
            |_, _| {},
        );

        assert_eq!(results, items.iter().map(|n| n * 10).collect::<Vec<_>>());
    }

    #[test]
    fn test_index_matches_position() {
        let pool = WorkerPool::new(3).unwrap();
        let items = vec!["a", "b", "c", "d"];
        let results = pool.map(&items, |i, s| format!("{i}{s}"), |_, _| {});
        assert_eq!(results, ["0a", "1b", "2c", "3d"]);
    }

    #[test]
    fn test_on_done_called_once_per_item() {
        let pool = WorkerPool::new(2).unwrap();
        let done = AtomicUsize::new(0);
        let items = vec![1, 2, 3, 4, 5];
        pool.map(&items, |_, n| n + 1, |_, _| {
            done.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(done.load(Ordering::SeqCst), items.len());
    }

    #[test]
    fn test_pool_is_bounded() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.workers(), 2);

        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<usize> = (0..16).collect();
        pool.map(
            &items,
            |_, _| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                active.fetch_sub(1, Ordering::SeqCst);
            },
            |_, _| {},
        );
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_empty_input() {
        let pool = WorkerPool::with_available_parallelism().unwrap();
        let results: Vec<u8> = pool.map(&Vec::<u8>::new(), |_, n| *n, |_, _| {});
        assert!(results.is_empty());
    }
}
