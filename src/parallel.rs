//! Bounded task execution for the regridding stage.
//!
//! Tasks run on a dedicated `rayon` pool; each result travels back over a
//! `crossbeam-channel` tagged with its task index and the results are put
//! back into submission order before they are returned.

use crossbeam_channel::{self, Receiver, Sender};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Failed to create thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Runs independent tasks either inline (one thread) or on a fixed-size
/// thread pool
pub struct TaskScheduler {
    num_threads: usize,
    pool: Option<rayon::ThreadPool>,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("num_threads", &self.num_threads)
            .finish()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::synchronous()
    }
}

impl TaskScheduler {
    /// Scheduler with `num_threads` workers; 0 and 1 both mean synchronous
    pub fn new(num_threads: usize) -> Result<Self, SchedulerError> {
        if num_threads <= 1 {
            return Ok(Self::synchronous());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("regrid-{}", i))
            .build()?;
        debug!(num_threads, "created worker pool");
        Ok(Self {
            num_threads,
            pool: Some(pool),
        })
    }

    pub fn synchronous() -> Self {
        Self {
            num_threads: 1,
            pool: None,
        }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Run every task and return the results in task order. The first
    /// error (by task index) is returned; there is no cancellation, so in
    /// pooled mode the remaining tasks still run to completion.
    pub fn run<T, E, F>(&self, tasks: Vec<F>) -> Result<Vec<T>, E>
    where
        F: FnOnce() -> Result<T, E> + Send,
        T: Send,
        E: Send,
    {
        let monitor = ProgressMonitor::new(tasks.len());

        let Some(pool) = &self.pool else {
            return tasks
                .into_iter()
                .map(|task| {
                    let result = task();
                    monitor.increment();
                    result
                })
                .collect();
        };

        let (tx, rx): (Sender<(usize, Result<T, E>)>, Receiver<(usize, Result<T, E>)>) =
            crossbeam_channel::unbounded();

        pool.install(|| {
            tasks
                .into_par_iter()
                .enumerate()
                .for_each_with(tx, |tx, (idx, task)| {
                    let result = task();
                    monitor.increment();
                    // The receiver outlives the pool; a send cannot fail here
                    let _ = tx.send((idx, result));
                });
        });

        let mut results: Vec<(usize, Result<T, E>)> = rx.iter().collect();
        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, result)| result).collect()
    }
}

/// Logs task throughput at regular intervals
pub struct ProgressMonitor {
    total_tasks: usize,
    completed_tasks: AtomicUsize,
    start_time: Instant,
}

impl ProgressMonitor {
    pub fn new(total_tasks: usize) -> Self {
        Self {
            total_tasks,
            completed_tasks: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn completed(&self) -> usize {
        self.completed_tasks.load(Ordering::Relaxed)
    }

    pub fn increment(&self) {
        let completed = self.completed_tasks.fetch_add(1, Ordering::Relaxed) + 1;

        if completed % 100 == 0 || completed == self.total_tasks {
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                completed as f64 / elapsed
            } else {
                0.0
            };
            let percent = completed as f64 / self.total_tasks.max(1) as f64 * 100.0;
            if completed == self.total_tasks {
                info!(completed, total = self.total_tasks, rate = %format!("{:.1}/s", rate), "tasks finished");
            } else {
                debug!(completed, total = self.total_tasks, percent = %format!("{:.1}", percent), "task progress");
            }
        }
    }
}
