//! The replaceable work step run for each task.

use std::thread;
use std::time::Duration;

use crate::error::WorkError;
use crate::types::Task;

/// Work performed by a worker for one popped task.
///
/// Implementations run without any shared lock held, so they may sleep or
/// block freely.
pub trait Work: Send + Sync {
    fn perform(&self, task: &Task) -> Result<(), WorkError>;
}

impl<F> Work for F
where
    F: Fn(&Task) -> Result<(), WorkError> + Send + Sync,
{
    fn perform(&self, task: &Task) -> Result<(), WorkError> {
        self(task)
    }
}

/// Simulated work: sleeps `base + magnitude * per_unit`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SleepWork {
    pub base: Duration,
    pub per_unit: Duration,
}

impl SleepWork {
    pub fn new(base: Duration, per_unit: Duration) -> Self {
        Self { base, per_unit }
    }

    /// Fixed-duration work regardless of magnitude.
    pub fn fixed(duration: Duration) -> Self {
        Self::new(duration, Duration::ZERO)
    }

    /// Minimum time `perform` takes for this task.
    pub fn duration_for(&self, task: &Task) -> Duration {
        let units = u32::try_from(task.magnitude).unwrap_or(u32::MAX);
        self.base + self.per_unit.saturating_mul(units)
    }
}

impl Default for SleepWork {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_millis(10))
    }
}

impl Work for SleepWork {
    fn perform(&self, task: &Task) -> Result<(), WorkError> {
        let duration = self.duration_for(task);
        if !duration.is_zero() {
            thread::sleep(duration);
        }
        Ok(())
    }
}

/// Wraps another work step and fails every task whose id is a multiple of `every`.
pub struct FailEvery<W> {
    inner: W,
    every: u64,
}

impl<W: Work> FailEvery<W> {
    pub fn new(inner: W, every: u64) -> Self {
        Self { inner, every }
    }
}

impl<W: Work> Work for FailEvery<W> {
    fn perform(&self, task: &Task) -> Result<(), WorkError> {
        if self.every > 0 && task.id % self.every == 0 {
            return Err(WorkError::failed(task.id, "injected failure"));
        }
        self.inner.perform(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn default_sleep_matches_linear_delay() {
        let work = SleepWork::default();
        assert_eq!(work.duration_for(&Task::new(0, 0)), Duration::from_millis(50));
        assert_eq!(work.duration_for(&Task::new(9, 9)), Duration::from_millis(140));
    }

    #[test]
    fn sleep_work_takes_at_least_its_duration() {
        let work = SleepWork::new(Duration::from_millis(5), Duration::from_millis(2));
        let task = Task::new(3, 3);
        let start = Instant::now();
        work.perform(&task).expect("sleep work failed");
        assert!(start.elapsed() >= Duration::from_millis(11));
    }

    #[test]
    fn closures_are_work() {
        let work = |task: &Task| {
            if task.magnitude > 5 {
                Err(WorkError::failed(task.id, "too big"))
            } else {
                Ok(())
            }
        };
        assert!(work.perform(&Task::new(1, 1)).is_ok());
        assert_eq!(
            work.perform(&Task::new(2, 6)),
            Err(WorkError::failed(2, "too big"))
        );
    }

    #[test]
    fn fail_every_rejects_matching_ids_only() {
        let work = FailEvery::new(SleepWork::fixed(Duration::ZERO), 3);
        let failed: Vec<u64> = (0..7)
            .filter(|&id| work.perform(&Task::new(id, id)).is_err())
            .collect();
        assert_eq!(failed, vec![0, 3, 6]);
    }
}
