//! Shared result state: a locked result log and two counter flavours.
//!
//! Each shared variable has its own lock, and every critical section is a
//! single push or read-modify-write. Nothing here sleeps or does I/O while
//! holding a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use tracing::debug;

use crate::types::ResultRecord;

/// Result records appended by workers in completion order.
pub struct ResultLog {
    records: Mutex<Vec<ResultRecord>>,
}

impl ResultLog {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Append one record.
    pub fn record(&self, entry: ResultRecord) {
        let mut guard = self.records.lock().expect("result log mutex poisoned");
        guard.push(entry);
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.records.lock().expect("result log mutex poisoned").len()
    }

    /// Consume the log and return records ordered by task magnitude.
    ///
    /// Only meaningful once every writer has been joined.
    pub fn into_sorted(self) -> Vec<ResultRecord> {
        let mut records = self
            .records
            .into_inner()
            .expect("result log mutex poisoned");
        records.sort_by_key(|record| record.magnitude);
        records
    }

    /// Copy of the current records ordered by task magnitude.
    pub fn snapshot_sorted(&self) -> Vec<ResultRecord> {
        let mut records = self
            .records
            .lock()
            .expect("result log mutex poisoned")
            .clone();
        records.sort_by_key(|record| record.magnitude);
        records
    }
}

/// A shared integer that many threads bump concurrently.
pub trait Counter: Send + Sync {
    fn increment(&self);
    fn value(&self) -> u64;
}

/// Counter whose read-modify-write runs under one exclusive lock.
pub struct GuardedCounter {
    value: Mutex<u64>,
}

impl GuardedCounter {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(0),
        }
    }
}

impl Counter for GuardedCounter {
    fn increment(&self) {
        let mut guard = self.value.lock().expect("counter mutex poisoned");
        *guard += 1;
    }

    fn value(&self) -> u64 {
        *self.value.lock().expect("counter mutex poisoned")
    }
}

/// Counter with no lock around its read-modify-write.
///
/// The load and the store are separate atomic operations, so two threads can
/// read the same value and both write `value + 1`, losing an update. The
/// result is wrong but never undefined behaviour.
pub struct UnguardedCounter {
    value: AtomicU64,
}

impl UnguardedCounter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }
}

impl Counter for UnguardedCounter {
    fn increment(&self) {
        let current = self.value.load(Ordering::Relaxed);
        self.value.store(current + 1, Ordering::Relaxed);
    }

    fn value(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

/// Increment `counter` from `threads` threads, `increments` times each.
///
/// All threads start together behind a barrier; the value is read after
/// every thread has been joined.
pub fn run_counter(threads: usize, increments: u64, counter: Arc<dyn Counter>) -> u64 {
    let barrier = Arc::new(Barrier::new(threads));
    let mut handles = Vec::with_capacity(threads);
    for index in 0..threads {
        let counter = Arc::clone(&counter);
        let barrier = Arc::clone(&barrier);
        let handle = thread::Builder::new()
            .name(format!("counter-{index}"))
            .spawn(move || {
                barrier.wait();
                for _ in 0..increments {
                    counter.increment();
                }
            })
            .expect("failed to spawn counter thread");
        handles.push(handle);
    }
    for handle in handles {
        handle.join().expect("counter thread panicked");
    }
    let value = counter.value();
    debug!(threads, increments, value, "counter run finished");
    value
}
