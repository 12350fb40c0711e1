//! Thread-safe FIFO task queue with timed pops, completion tracking, and join.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::types::Task;

/// Outcome of a timed pop.
#[derive(Debug, PartialEq, Eq)]
pub enum Pop {
    /// A task was handed to this caller and is now in flight.
    Task(Task),
    /// Nothing arrived within the timeout; more tasks may still come.
    TimedOut,
    /// The queue is closed and drained; nothing will ever arrive.
    Closed,
}

/// Point-in-time view of the queue counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
}

/// A synchronized FIFO queue of tasks with `task_done`/`join` accounting.
///
/// `pending + in_flight + completed == submitted` holds whenever the lock is
/// not held.
pub struct TaskQueue {
    inner: Mutex<TaskQueueState>,
    capacity: Option<NonZeroUsize>,
    available: Condvar,
    space: Condvar,
    drained: Condvar,
}

struct TaskQueueState {
    queue: VecDeque<Task>,
    closed: bool,
    submitted: usize,
    in_flight: usize,
    completed: usize,
}

impl TaskQueueState {
    fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.in_flight == 0
    }
}

impl TaskQueue {
    /// Create an empty, unbounded task queue.
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Create a queue whose producers block while `capacity` tasks are pending.
    pub fn bounded(capacity: NonZeroUsize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    fn with_capacity(capacity: Option<NonZeroUsize>) -> Self {
        Self {
            inner: Mutex::new(TaskQueueState {
                queue: VecDeque::new(),
                closed: false,
                submitted: 0,
                in_flight: 0,
                completed: 0,
            }),
            capacity,
            available: Condvar::new(),
            space: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TaskQueueState> {
        self.inner.lock().expect("task queue mutex poisoned")
    }

    /// Append a task; returns the task back if the queue is closed.
    ///
    /// Blocks while a bounded queue is full.
    pub fn submit(&self, task: Task) -> Result<(), Task> {
        let mut guard = self.lock();
        if let Some(capacity) = self.capacity {
            guard = self
                .space
                .wait_while(guard, |state| !state.closed && state.queue.len() >= capacity.get())
                .expect("condvar wait failed");
        }
        if guard.closed {
            return Err(task);
        }
        guard.queue.push_back(task);
        guard.submitted += 1;
        self.available.notify_one();
        Ok(())
    }

    /// Pop the head task, waiting at most `timeout` for one to arrive.
    ///
    /// A closed queue still hands out its remaining tasks before reporting
    /// [`Pop::Closed`].
    pub fn try_pop(&self, timeout: Duration) -> Pop {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock();
        loop {
            if let Some(task) = guard.queue.pop_front() {
                guard.in_flight += 1;
                self.space.notify_one();
                return Pop::Task(task);
            }
            if guard.closed {
                return Pop::Closed;
            }
            let now = Instant::now();
            if now >= deadline {
                return Pop::TimedOut;
            }
            // Wait releases the lock and re-acquires it before returning.
            let (next, _) = self
                .available
                .wait_timeout(guard, deadline - now)
                .expect("condvar wait failed");
            guard = next;
        }
    }

    /// Record completion of one popped task; returns false if none was in flight.
    pub fn mark_done(&self) -> bool {
        let mut guard = self.lock();
        if guard.in_flight == 0 {
            warn!("mark_done called with no task in flight");
            return false;
        }
        guard.in_flight -= 1;
        guard.completed += 1;
        if guard.is_drained() {
            self.drained.notify_all();
        }
        true
    }

    /// Stop accepting submissions and wake every waiting producer and consumer.
    pub fn close(&self) {
        let mut guard = self.lock();
        guard.closed = true;
        self.available.notify_all();
        self.space.notify_all();
    }

    /// Block until every submitted task has been popped and marked done.
    pub fn join(&self) {
        let guard = self.lock();
        let _guard = self
            .drained
            .wait_while(guard, |state| !state.is_drained())
            .expect("condvar wait failed");
    }

    /// Like [`join`](Self::join) but gives up after `timeout`; returns true if drained.
    #[allow(dead_code)]
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .drained
            .wait_timeout_while(guard, timeout, |state| !state.is_drained())
            .expect("condvar wait failed");
        guard.is_drained()
    }

    pub fn stats(&self) -> QueueStats {
        let guard = self.lock();
        QueueStats {
            submitted: guard.submitted,
            pending: guard.queue.len(),
            in_flight: guard.in_flight,
            completed: guard.completed,
        }
    }

    /// Current number of pending tasks.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }
}

/// Marks one in-flight task done when dropped, including during unwinding.
pub struct TaskGuard<'a> {
    queue: &'a TaskQueue,
}

impl<'a> TaskGuard<'a> {
    pub fn new(queue: &'a TaskQueue) -> Self {
        Self { queue }
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.queue.mark_done();
    }
}
