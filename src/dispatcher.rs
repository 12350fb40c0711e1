//! Dispatcher: fills the queue, runs a fixed worker pool, collects results.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::accumulator::ResultLog;
use crate::error::ConfigError;
use crate::task_queue::{QueueStats, TaskQueue};
use crate::types::{ResultRecord, Task, WorkerId};
use crate::work::Work;
use crate::worker::{Retirement, Worker, WorkerReport};

/// Pool size, task count, and termination policy for one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchConfig {
    pub workers: usize,
    pub tasks: u64,
    pub pop_timeout: Duration,
    pub retirement: Retirement,
    /// Producer-side bound on pending tasks; `None` is unbounded.
    pub capacity: Option<NonZeroUsize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            tasks: 10,
            pop_timeout: Duration::from_millis(500),
            retirement: Retirement::OnClose,
            capacity: None,
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        // Workers start before a bounded queue is filled, so a timed-out
        // first pop would retire them with tasks still to come.
        if self.capacity.is_some() && self.retirement == Retirement::OnTimeout {
            return Err(ConfigError::BoundedTimeoutRetirement);
        }
        Ok(())
    }
}

/// Everything observable after the pool has been joined.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Successful tasks ordered by magnitude.
    pub records: Vec<ResultRecord>,
    pub reports: Vec<WorkerReport>,
    pub stats: QueueStats,
    pub elapsed: Duration,
}

impl DispatchOutcome {
    pub fn total_popped(&self) -> usize {
        self.reports.iter().map(|report| report.popped).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.reports.iter().map(|report| report.failed).sum()
    }
}

pub struct Dispatcher {
    config: DispatchConfig,
    work: Arc<dyn Work>,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, work: Arc<dyn Work>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, work })
    }

    /// Run every task to completion and return the joined results.
    ///
    /// Tasks whose work fails are marked done but have no record.
    pub fn run(&self) -> DispatchOutcome {
        let config = self.config;
        let queue = Arc::new(match config.capacity {
            Some(capacity) => TaskQueue::bounded(capacity),
            None => TaskQueue::new(),
        });
        let results = Arc::new(ResultLog::new());

        // A bounded queue cannot hold every task up front, so workers must
        // already be draining while the dispatcher submits.
        let submit_first = config.capacity.is_none();
        if submit_first {
            self.submit_all(&queue);
        }

        let start = Instant::now();
        let mut handles = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let worker = Worker::new(
                index as WorkerId,
                Arc::clone(&queue),
                Arc::clone(&results),
                Arc::clone(&self.work),
                config.pop_timeout,
                config.retirement,
            );
            let handle = thread::Builder::new()
                .name(format!("worker-{index}"))
                .spawn(move || worker.run())
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        if !submit_first {
            self.submit_all(&queue);
        }

        queue.join();
        debug!("queue drained");

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.join() {
                Ok(report) => reports.push(report),
                Err(_) => error!("worker thread panicked outside of work"),
            }
        }
        let elapsed = start.elapsed();
        let stats = queue.stats();

        // Every worker is joined, so this is the only remaining owner.
        let records = match Arc::try_unwrap(results) {
            Ok(log) => log.into_sorted(),
            Err(shared) => shared.snapshot_sorted(),
        };
        info!(
            workers = config.workers,
            tasks = config.tasks,
            recorded = records.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "dispatch finished"
        );
        DispatchOutcome {
            records,
            reports,
            stats,
            elapsed,
        }
    }

    fn submit_all(&self, queue: &TaskQueue) {
        for n in 0..self.config.tasks {
            if queue.submit(Task::new(n, n)).is_err() {
                error!(task = n, "queue closed before submission finished");
                break;
            }
        }
        debug!(tasks = self.config.tasks, pending = queue.len(), "tasks submitted");
        if self.config.retirement == Retirement::OnClose {
            queue.close();
        }
    }
}
