//! CLI integration tests for the queue and counter demos.

use std::process::Command;

fn bin() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_task_dispatch"));
    // Keep stderr quiet regardless of the caller's environment.
    command.env("RUST_LOG", "off");
    command
}

#[test]
fn demo_prints_one_sorted_line_per_task() {
    let output = bin().output().expect("failed to run demo binary");

    assert!(
        output.status.success(),
        "demo exited with non-zero status: {:?}",
        output.status
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 10, "unexpected output: {stdout}");

    for (task, line) in lines.iter().enumerate() {
        // e.g. "worker-2 processed task 3 in 0.081s"
        let parts: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(parts.len(), 6, "malformed line: {line}");
        assert!(parts[0].starts_with("worker-"), "bad worker: {line}");
        assert_eq!(parts[3], task.to_string(), "lines not sorted: {stdout}");

        let secs = parts[5].strip_suffix('s').expect("missing unit");
        let decimals = secs.split('.').nth(1).expect("missing decimals");
        assert_eq!(decimals.len(), 3, "precision: {line}");
        let secs: f64 = secs.parse().expect("elapsed not numeric");
        let minimum = 0.05 + task as f64 * 0.01;
        // Allow for rounding to three decimals.
        assert!(secs + 0.0005 >= minimum, "too fast: {line}");
    }
}

#[test]
fn guarded_counter_reports_exact_total() {
    let output = bin()
        .arg("counter")
        .output()
        .expect("failed to run counter");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "400000");
}

#[test]
fn unguarded_counter_never_exceeds_total() {
    let output = bin()
        .args(["counter", "-", "-", "unguarded"])
        .output()
        .expect("failed to run counter");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let value: u64 = stdout.trim().parse().expect("counter output not numeric");
    assert!(value <= 400_000);
}

#[test]
fn bench_reports_failed_tasks() {
    let output = bin()
        .args(["bench", "2", "20", "0", "5"])
        .output()
        .expect("failed to run bench");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let row = stdout.lines().nth(1).expect("csv row missing");
    let fields: Vec<&str> = row.split(',').collect();
    // Ids 0, 5, 10, 15 fail.
    assert_eq!(&fields[..4], &["2", "20", "16", "4"]);
}

#[test]
fn invalid_argument_exits_with_usage() {
    let output = bin()
        .args(["counter", "many"])
        .output()
        .expect("failed to run counter");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid threads value: many"));
}

#[test]
fn timeout_retirement_demo_still_completes() {
    let output = bin()
        .args(["demo", "timeout-retire"])
        .output()
        .expect("failed to run demo");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 10);
}
