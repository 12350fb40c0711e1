//! Worker loop: pop, work, record, repeat until retired.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::accumulator::ResultLog;
use crate::error::WorkError;
use crate::task_queue::{Pop, TaskGuard, TaskQueue};
use crate::types::{ResultRecord, Task, WorkerId};
use crate::work::Work;

/// When a worker gives up waiting for tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retirement {
    /// Retire on the first pop timeout. Only safe when every task is
    /// submitted before workers start; a slow producer can strand tasks.
    OnTimeout,
    /// Keep re-checking after timeouts; retire only once the queue is
    /// closed and drained.
    OnClose,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorkerState {
    Idle,
    Popping,
    Working,
    Recording,
    Retired,
}

/// Per-worker tallies returned when the worker retires.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: WorkerId,
    pub name: String,
    pub popped: usize,
    pub recorded: usize,
    pub failed: usize,
}

pub struct Worker {
    id: WorkerId,
    name: String,
    queue: Arc<TaskQueue>,
    results: Arc<ResultLog>,
    work: Arc<dyn Work>,
    pop_timeout: Duration,
    retirement: Retirement,
    state: WorkerState,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        queue: Arc<TaskQueue>,
        results: Arc<ResultLog>,
        work: Arc<dyn Work>,
        pop_timeout: Duration,
        retirement: Retirement,
    ) -> Self {
        Self {
            id,
            name: format!("worker-{id}"),
            queue,
            results,
            work,
            pop_timeout,
            retirement,
            state: WorkerState::Idle,
        }
    }

    fn transition(&mut self, next: WorkerState) {
        trace!(worker = %self.name, from = ?self.state, to = ?next, "state");
        self.state = next;
    }

    /// Drain the queue until retirement and report what this worker did.
    pub fn run(mut self) -> WorkerReport {
        let queue = Arc::clone(&self.queue);
        let mut report = WorkerReport {
            id: self.id,
            name: self.name.clone(),
            ..WorkerReport::default()
        };
        loop {
            self.transition(WorkerState::Popping);
            let task = match queue.try_pop(self.pop_timeout) {
                Pop::Task(task) => task,
                Pop::TimedOut if self.retirement == Retirement::OnClose => {
                    trace!(worker = %self.name, "pop timed out, rechecking");
                    continue;
                }
                Pop::TimedOut | Pop::Closed => break,
            };
            report.popped += 1;
            // Marks the task done on every path out of this iteration.
            let _done = TaskGuard::new(&queue);
            debug!(worker = %self.name, task = task.id, "fetched task");

            self.transition(WorkerState::Working);
            let start = Instant::now();
            match self.perform(&task) {
                Ok(()) => {
                    let elapsed = start.elapsed();
                    self.transition(WorkerState::Recording);
                    let record = ResultRecord::new(self.name.as_str(), task.magnitude, elapsed);
                    self.results.record(record);
                    report.recorded += 1;
                }
                Err(err) => {
                    warn!(worker = %self.name, error = %err, "work failed");
                    report.failed += 1;
                }
            }
        }
        self.transition(WorkerState::Retired);
        debug!(
            worker = %report.name,
            worker_id = report.id,
            popped = report.popped,
            recorded = report.recorded,
            failed = report.failed,
            "worker retired"
        );
        report
    }

    fn perform(&self, task: &Task) -> Result<(), WorkError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.work.perform(task))) {
            Ok(result) => result,
            Err(payload) => Err(WorkError::Panicked {
                task: task.id,
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::SleepWork;
    use std::sync::mpsc;
    use std::thread;

    fn filled_queue(tasks: u64) -> Arc<TaskQueue> {
        let queue = Arc::new(TaskQueue::new());
        for n in 0..tasks {
            queue.submit(Task::new(n, n)).expect("task queue closed");
        }
        queue
    }

    fn worker(
        queue: &Arc<TaskQueue>,
        results: &Arc<ResultLog>,
        work: Arc<dyn Work>,
        retirement: Retirement,
    ) -> Worker {
        Worker::new(
            0,
            Arc::clone(queue),
            Arc::clone(results),
            work,
            Duration::from_millis(20),
            retirement,
        )
    }

    #[test]
    fn drains_queue_then_retires_on_timeout() {
        let queue = filled_queue(5);
        let results = Arc::new(ResultLog::new());
        let work = Arc::new(SleepWork::fixed(Duration::ZERO));
        let report = worker(&queue, &results, work, Retirement::OnTimeout).run();

        assert_eq!(report.popped, 5);
        assert_eq!(report.recorded, 5);
        assert_eq!(report.failed, 0);
        assert_eq!(results.len(), 5);
        assert!(queue.join_timeout(Duration::ZERO));
    }

    #[test]
    fn failed_work_is_marked_done_but_not_recorded() {
        let queue = filled_queue(4);
        let results = Arc::new(ResultLog::new());
        let work: Arc<dyn Work> = Arc::new(|task: &Task| {
            if task.id == 2 {
                Err(WorkError::failed(task.id, "boom"))
            } else {
                Ok(())
            }
        });
        let report = worker(&queue, &results, work, Retirement::OnTimeout).run();

        assert_eq!(report.popped, 4);
        assert_eq!(report.recorded, 3);
        assert_eq!(report.failed, 1);
        let stats = queue.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.completed, 4);
        assert!(results.snapshot_sorted().iter().all(|r| r.magnitude != 2));
    }

    #[test]
    fn panicking_work_does_not_kill_worker() {
        let queue = filled_queue(3);
        let results = Arc::new(ResultLog::new());
        let work: Arc<dyn Work> = Arc::new(|task: &Task| -> Result<(), WorkError> {
            if task.id == 0 {
                panic!("work exploded");
            }
            Ok(())
        });
        let report = worker(&queue, &results, work, Retirement::OnTimeout).run();

        assert_eq!(report.popped, 3);
        assert_eq!(report.recorded, 2);
        assert_eq!(report.failed, 1);
        assert!(queue.join_timeout(Duration::ZERO));
    }

    #[test]
    fn elapsed_covers_simulated_delay() {
        let queue = filled_queue(3);
        let results = Arc::new(ResultLog::new());
        let sleep = SleepWork::new(Duration::from_millis(5), Duration::from_millis(3));
        let report = worker(&queue, &results, Arc::new(sleep), Retirement::OnTimeout).run();

        assert_eq!(report.recorded, 3);
        for record in results.snapshot_sorted() {
            let task = Task::new(record.magnitude, record.magnitude);
            assert!(record.elapsed >= sleep.duration_for(&task));
            assert_eq!(record.worker, "worker-0");
        }
    }

    #[test]
    fn close_retirement_waits_for_late_tasks() {
        let queue = Arc::new(TaskQueue::new());
        let results = Arc::new(ResultLog::new());
        let work = Arc::new(SleepWork::fixed(Duration::ZERO));
        let worker = worker(&queue, &results, work, Retirement::OnClose);

        let (done_tx, done_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let report = worker.run();
            done_tx.send(()).expect("done");
            report
        });

        // Several pop timeouts elapse before the first task arrives.
        thread::sleep(Duration::from_millis(80));
        assert!(done_rx.try_recv().is_err());
        queue.submit(Task::new(0, 0)).expect("task queue closed");
        thread::sleep(Duration::from_millis(80));
        queue.submit(Task::new(1, 1)).expect("task queue closed");
        queue.close();

        done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("worker retired after close");
        let report = handle.join().expect("worker thread panicked");
        assert_eq!(report.popped, 2);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn retires_on_closed_empty_queue() {
        let queue = Arc::new(TaskQueue::new());
        queue.close();
        let results = Arc::new(ResultLog::new());
        let work = Arc::new(SleepWork::fixed(Duration::ZERO));
        let report = worker(&queue, &results, work, Retirement::OnClose).run();
        assert_eq!(
            report,
            WorkerReport {
                id: 0,
                name: "worker-0".to_string(),
                ..WorkerReport::default()
            }
        );
    }
}
