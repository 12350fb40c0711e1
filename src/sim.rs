//! Demo, counter, and benchmark runners for the CLI.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::accumulator::{self, Counter, GuardedCounter, UnguardedCounter};
use crate::dispatcher::{DispatchConfig, Dispatcher};
use crate::error::ConfigError;
use crate::work::{FailEvery, SleepWork, Work};
use crate::worker::Retirement;

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    use libc::{RUSAGE_SELF, getrusage, rusage, timeval};
    let mut usage = rusage {
        ru_utime: timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
        ru_stime: timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
        ru_maxrss: 0,
        ru_ixrss: 0,
        ru_idrss: 0,
        ru_isrss: 0,
        ru_minflt: 0,
        ru_majflt: 0,
        ru_nswap: 0,
        ru_inblock: 0,
        ru_oublock: 0,
        ru_msgsnd: 0,
        ru_msgrcv: 0,
        ru_nsignals: 0,
        ru_nvcsw: 0,
        ru_nivcsw: 0,
    };
    let rc = unsafe { getrusage(RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return None;
    }
    let user = usage.ru_utime.tv_sec as f64 + (usage.ru_utime.tv_usec as f64 / 1_000_000.0);
    let sys = usage.ru_stime.tv_sec as f64 + (usage.ru_stime.tv_usec as f64 / 1_000_000.0);
    Some((user, sys))
}

/// Stub on non-Unix platforms.
#[cfg(not(unix))]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

/// Run the queue demo: 4 workers, 10 tasks, one line per task.
pub fn run_demo(retirement: Retirement) -> Result<(), ConfigError> {
    let config = DispatchConfig {
        retirement,
        ..DispatchConfig::default()
    };
    info!(workers = config.workers, tasks = config.tasks, "demo start");
    let outcome = Dispatcher::new(config, Arc::new(SleepWork::default()))?.run();
    for record in &outcome.records {
        println!("{record}");
    }
    Ok(())
}

/// Run the shared-counter demo and print the final value.
pub fn run_counter(threads: Option<usize>, increments: Option<u64>, unguarded: bool) {
    let threads = threads.unwrap_or(4);
    let increments = increments.unwrap_or(100_000);
    let counter: Arc<dyn Counter> = if unguarded {
        Arc::new(UnguardedCounter::new())
    } else {
        Arc::new(GuardedCounter::new())
    };
    let value = accumulator::run_counter(threads, increments, counter);
    let expected = threads as u64 * increments;
    if value != expected {
        warn!(
            value,
            expected,
            lost = expected.saturating_sub(value),
            "counter lost updates"
        );
    }
    println!("{value}");
}

/// Run one dispatcher pass with fixed-duration work and print a CSV row.
pub fn run_benchmark(
    workers: Option<usize>,
    tasks: Option<u64>,
    work_ms: Option<u64>,
    fail_every: Option<u64>,
) -> Result<(), ConfigError> {
    let config = DispatchConfig {
        workers: workers.unwrap_or(4),
        tasks: tasks.unwrap_or(100),
        pop_timeout: Duration::from_millis(100),
        ..DispatchConfig::default()
    };
    let sleep = SleepWork::fixed(Duration::from_millis(work_ms.unwrap_or(5)));
    let work: Arc<dyn Work> = match fail_every {
        Some(every) => Arc::new(FailEvery::new(sleep, every)),
        None => Arc::new(sleep),
    };
    let dispatcher = Dispatcher::new(config, work)?;

    let cpu_start = cpu_times_seconds();
    let outcome = dispatcher.run();
    let (cpu_user, cpu_sys) = match (cpu_start, cpu_times_seconds()) {
        (Some((user_start, sys_start)), Some((user_end, sys_end))) => (
            format!("{:.4}", user_end - user_start),
            format!("{:.4}", sys_end - sys_start),
        ),
        _ => ("NA".to_string(), "NA".to_string()),
    };

    let elapsed_ms = outcome.elapsed.as_secs_f64() * 1000.0;
    let throughput = if elapsed_ms > 0.0 {
        outcome.records.len() as f64 / (elapsed_ms / 1000.0)
    } else {
        0.0
    };
    println!(
        "workers,tasks,completed,failed,elapsed_ms,throughput_tasks_per_s,cpu_user_s,cpu_sys_s"
    );
    println!(
        "{},{},{},{},{:.2},{:.2},{},{}",
        config.workers,
        config.tasks,
        outcome.records.len(),
        outcome.total_failed(),
        elapsed_ms,
        throughput,
        cpu_user,
        cpu_sys
    );
    let popped = outcome.total_popped() as u64;
    if outcome.stats.submitted as u64 != config.tasks || popped != config.tasks {
        eprintln!("# violation,handout_count,{popped}");
    }
    if outcome.stats.pending > 0 || outcome.stats.in_flight > 0 {
        eprintln!(
            "# violation,unfinished_tasks,{}",
            outcome.stats.pending + outcome.stats.in_flight
        );
    }
    Ok(())
}
