mod accumulator;
mod dispatcher;
mod error;
mod logging;
mod sim;
mod task_queue;
mod types;
mod work;
mod worker;

use std::process::ExitCode;

use crate::error::ConfigError;
use crate::worker::Retirement;

fn parse_arg<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError> {
    match value.as_deref() {
        None | Some("-") => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidArgument {
                name,
                value: raw.to_string(),
            }),
    }
}

fn print_usage(program: &str) {
    println!("Task dispatch CLI");
    println!("Usage:");
    println!("  {program} (run queue demo)");
    println!("  {program} demo [timeout-retire]");
    println!("  {program} counter [threads] [increments] [unguarded]");
    println!("  {program} bench [workers] [tasks] [work_ms] [fail_every]");
    println!("  {program} --help");
    println!();
    println!("Use \"-\" to keep a default.");
    println!("Defaults:");
    println!("  demo     workers=4 tasks=10 work=50ms+10ms*task");
    println!("  counter  threads=4 increments=100000 (guarded)");
    println!("  bench    workers=4 tasks=100 work_ms=5");
    println!("Flags:");
    println!("  timeout-retire  workers retire on the first empty pop instead of on close");
    println!("  unguarded       increment without a lock (lost updates)");
    println!("Logging: set RUST_LOG (e.g. RUST_LOG=trace) to override the level.");
}

fn exit_with_usage(program: &str, message: &str) -> ExitCode {
    eprintln!("{message}");
    print_usage(program);
    ExitCode::from(2)
}

fn run(command: Option<&str>, mut args: impl Iterator<Item = String>) -> Result<(), ConfigError> {
    match command {
        Some("counter") => {
            let threads = parse_arg::<usize>("threads", args.next())?;
            let increments = parse_arg::<u64>("increments", args.next())?;
            let unguarded = match args.next().as_deref() {
                None => false,
                Some("unguarded") => true,
                Some(other) => {
                    return Err(ConfigError::InvalidArgument {
                        name: "flag",
                        value: other.to_string(),
                    });
                }
            };
            sim::run_counter(threads, increments, unguarded);
            Ok(())
        }
        Some("bench") => {
            let workers = parse_arg::<usize>("workers", args.next())?;
            let tasks = parse_arg::<u64>("tasks", args.next())?;
            let work_ms = parse_arg::<u64>("work_ms", args.next())?;
            let fail_every = parse_arg::<u64>("fail_every", args.next())?;
            sim::run_benchmark(workers, tasks, work_ms, fail_every)
        }
        Some("demo") => {
            let retirement = match args.next().as_deref() {
                None => Retirement::OnClose,
                Some("timeout-retire") => Retirement::OnTimeout,
                Some(other) => {
                    return Err(ConfigError::InvalidArgument {
                        name: "flag",
                        value: other.to_string(),
                    });
                }
            };
            sim::run_demo(retirement)
        }
        Some(other) => Err(ConfigError::InvalidArgument {
            name: "command",
            value: other.to_string(),
        }),
        None => sim::run_demo(Retirement::OnClose),
    }
}

fn main() -> ExitCode {
    logging::init();
    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "task_dispatch".to_string());
    let mut args = std::env::args().skip(1);
    let command = args.next();
    if matches!(command.as_deref(), Some("--help" | "-h" | "help")) {
        print_usage(&program);
        return ExitCode::SUCCESS;
    }
    match run(command.as_deref(), args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => exit_with_usage(&program, &err.to_string()),
    }
}
