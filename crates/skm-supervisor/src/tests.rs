#![cfg(unix)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::{StreamKind, SupervisedCommand};

fn capture_sink() -> (crate::LineSink, Arc<Mutex<Vec<(StreamKind, String)>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink_lines = Arc::clone(&lines);
    let sink: crate::LineSink = Arc::new(move |kind, line: &str| {
        sink_lines.lock().unwrap().push((kind, line.to_string()));
    });
    (sink, lines)
}

#[test]
fn relays_stdout_and_stderr_lines() {
    let (sink, lines) = capture_sink();

    let handle = SupervisedCommand::new("echo-test", "sh")
        .arg("-c")
        .arg("echo out-line; echo err-line >&2")
        .spawn_with_sink(sink)
        .expect("must spawn");
    let status = handle.wait().expect("must wait");
    assert!(status.success());

    let lines = lines.lock().unwrap();
    assert!(lines.contains(&(StreamKind::Stdout, "out-line".to_string())));
    assert!(lines.contains(&(StreamKind::Stderr, "err-line".to_string())));
}

#[test]
fn stop_terminates_a_long_running_process() {
    let (sink, _lines) = capture_sink();

    let handle = SupervisedCommand::new("sleeper", "sh")
        .arg("-c")
        .arg("sleep 60")
        .spawn_with_sink(sink)
        .expect("must spawn");

    let started = Instant::now();
    handle.stop().expect("must stop");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn stop_reaches_grandchildren_through_the_group() {
    let (sink, lines) = capture_sink();

    // The shell forks a background child that echoes after a delay. A
    // group-wide signal kills both, so the echo must never arrive.
    let handle = SupervisedCommand::new("forker", "sh")
        .arg("-c")
        .arg("(sleep 2; echo survived) & sleep 60")
        .spawn_with_sink(sink)
        .expect("must spawn");

    std::thread::sleep(Duration::from_millis(200));
    handle.stop().expect("must stop");
    std::thread::sleep(Duration::from_millis(2500));

    let lines = lines.lock().unwrap();
    assert!(!lines
        .iter()
        .any(|(_, line)| line.contains("survived")));
}

#[test]
fn stop_after_natural_exit_is_not_an_error() {
    let (sink, _lines) = capture_sink();

    let handle = SupervisedCommand::new("quick", "sh")
        .arg("-c")
        .arg("true")
        .spawn_with_sink(sink)
        .expect("must spawn");

    std::thread::sleep(Duration::from_millis(200));
    handle.stop().expect("stopping an exited process must succeed");
}

#[test]
fn spawn_fails_for_a_missing_program() {
    let (sink, _lines) = capture_sink();

    let err = SupervisedCommand::new("ghost", "definitely-not-a-real-binary")
        .spawn_with_sink(sink)
        .expect_err("must fail");
    assert!(err.to_string().contains("failed to start"));
}

#[test]
fn runs_in_the_requested_working_directory() {
    let (sink, lines) = capture_sink();

    let dir = std::env::temp_dir();
    let handle = SupervisedCommand::new("pwd-test", "sh")
        .arg("-c")
        .arg("pwd")
        .current_dir(&dir)
        .spawn_with_sink(sink)
        .expect("must spawn");
    handle.wait().expect("must wait");

    let lines = lines.lock().unwrap();
    let printed = lines
        .iter()
        .find(|(kind, _)| *kind == StreamKind::Stdout)
        .map(|(_, line)| line.clone())
        .expect("must print the working directory");
    let canonical = std::fs::canonicalize(&dir).expect("must canonicalize");
    assert_eq!(
        std::fs::canonicalize(&printed).expect("must canonicalize"),
        canonical
    );
}
