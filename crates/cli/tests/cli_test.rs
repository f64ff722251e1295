use assert_cmd::Command;
use predicates::prelude::*;
use runcached_cache::fingerprint;
use runcached_core::CommandSpec;
use std::fs;
use std::path::Path;

mod common;
use common::TestCache;

const ENV_OVERRIDES: [&str; 5] = [
    "RUNCACHED_CACHE_DIR",
    "RUNCACHED_MAX_WAIT",
    "RUNCACHED_SHELL",
    "RUNCACHED_LOCK",
    "RUNCACHED_JITTER_MS",
];

fn runcached_in(cache_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("runcached").unwrap();
    for var in ENV_OVERRIDES {
        cmd.env_remove(var);
    }
    cmd.env_remove("RUST_LOG");
    cmd.arg("--cache-dir").arg(cache_dir);
    cmd
}

fn runcached(cache: &TestCache) -> Command {
    runcached_in(&cache.cache_dir())
}

fn counting_args(cache: &TestCache, tail: &str) -> Vec<String> {
    cache.counting_command(tail).as_slice().to_vec()
}

#[test]
fn test_output_and_exit_code_pass_through() {
    let cache = TestCache::new();

    runcached(&cache)
        .args(["echo", "hello"])
        .assert()
        .success()
        .stdout("hello\n");

    runcached(&cache)
        .args(["sh", "-c", "echo failing; exit 5"])
        .assert()
        .code(5)
        .stdout("failing\n");
}

#[test]
fn test_repeat_invocation_replays() {
    let cache = TestCache::new();
    let args = counting_args(&cache, "echo err >&2");

    for _ in 0..3 {
        runcached(&cache)
            .args(&args)
            .assert()
            .success()
            .stdout("run 1\nerr\n")
            .stderr("");
    }
    assert_eq!(cache.runs(), 1);
}

#[test]
fn test_zero_timeout_always_executes() {
    let cache = TestCache::new();
    let args = counting_args(&cache, ":");

    runcached(&cache).args(["-c", "0"]).args(&args).assert().success();
    std::thread::sleep(std::time::Duration::from_millis(20));
    runcached(&cache)
        .args(["-c", "0"])
        .args(&args)
        .assert()
        .success()
        .stdout("run 2\n");
}

#[test]
fn test_cache_on_error_flag() {
    let cache = TestCache::new();
    let args = counting_args(&cache, "exit 4");

    for _ in 0..2 {
        runcached(&cache)
            .arg("-e")
            .args(&args)
            .assert()
            .code(4)
            .stdout("run 1\n");
    }
    assert_eq!(cache.runs(), 1);
}

#[test]
fn test_usage_errors_exit_64() {
    let cache = TestCache::new();

    runcached(&cache).assert().code(64);
    runcached(&cache)
        .args(["--cache-timeout", "soon", "date"])
        .assert()
        .code(64);
    runcached(&cache)
        .args(["--max-wait", "-1", "date"])
        .assert()
        .code(64)
        .stderr(predicate::str::starts_with("runcached: "));
}

#[test]
fn test_help_and_version_succeed() {
    let cache = TestCache::new();

    runcached(&cache)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--cache-timeout"));
    runcached(&cache).arg("--version").assert().success();
}

#[test]
fn test_held_lock_times_out_with_exit_2() {
    let cache = TestCache::new();
    let spec = CommandSpec::new(["date"]).unwrap();
    fs::create_dir_all(cache.cache_dir()).unwrap();

    // This test process is alive, so its PID makes the lock live
    let lock = cache
        .cache_dir()
        .join(format!("{}.pid", fingerprint(&spec)));
    fs::write(&lock, format!("{}\n", std::process::id())).unwrap();

    runcached(&cache)
        .args(["--max-wait", "0.2", "date"])
        .assert()
        .code(2)
        .stdout("")
        .stderr(predicate::str::contains("timed out"));
    assert!(lock.exists());
}

#[test]
fn test_verbose_reports_on_stderr_only() {
    let cache = TestCache::new();

    runcached(&cache)
        .args(["-v", "echo", "quiet stdout"])
        .assert()
        .success()
        .stdout("quiet stdout\n")
        .stderr(predicate::str::contains("executing"));

    runcached(&cache)
        .args(["-v", "echo", "quiet stdout"])
        .assert()
        .success()
        .stdout("quiet stdout\n")
        .stderr(predicate::str::contains("replaying"));
}

#[test]
fn test_missing_shell_exits_127() {
    let cache = TestCache::new();

    runcached(&cache)
        .args(["--shell", "/nonexistent/sh", "true"])
        .assert()
        .code(127)
        .stderr(predicate::str::contains("failed to start"));
}

#[test]
fn test_unusable_cache_dir_reported_briefly() {
    let cache = TestCache::new();
    fs::create_dir_all(cache.cache_dir()).unwrap();
    let not_a_dir = cache.cache_dir().join("file");
    fs::write(&not_a_dir, "").unwrap();

    let output = runcached_in(&not_a_dir.join("cache"))
        .arg("date")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert_eq!(stderr.lines().count(), 1);
    assert!(stderr.starts_with("runcached: failed to "));
    assert!(!stderr.contains("os error"));
}

#[cfg(unix)]
mod interrupted {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::os::unix::process::{CommandExt, ExitStatusExt};
    use std::process::{Child, Stdio};
    use std::time::Duration;

    /// Start runcached in a process group of its own and wait for the
    /// command's first line
    fn spawn_running(cache: &TestCache, flags: &[&str], args: &[String]) -> Child {
        let mut cmd = std::process::Command::new(assert_cmd::cargo::cargo_bin("runcached"));
        for var in ENV_OVERRIDES {
            cmd.env_remove(var);
        }
        cmd.env_remove("RUST_LOG")
            .arg("--cache-dir")
            .arg(cache.cache_dir())
            .args(flags)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .process_group(0);
        let mut child = cmd.spawn().unwrap();

        let mut line = String::new();
        BufReader::new(child.stdout.as_mut().unwrap())
            .read_line(&mut line)
            .unwrap();
        assert_eq!(line, "run 1\n");
        child
    }

    fn signal_group(child: &Child, signal: i32) {
        assert_eq!(unsafe { libc::kill(-(child.id() as i32), signal) }, 0);
    }

    fn signal_process(child: &Child, signal: i32) {
        assert_eq!(unsafe { libc::kill(child.id() as i32, signal) }, 0);
    }

    #[test]
    fn test_interrupted_run_replays_with_cache_on_abort() {
        let cache = TestCache::new();
        let args = counting_args(&cache, "sleep 5");

        let mut child = spawn_running(&cache, &["-a"], &args);
        signal_group(&child, libc::SIGINT);
        let status = child.wait().unwrap();
        assert_eq!(status.code(), Some(130));

        // The partial output was committed and is replayed
        runcached(&cache)
            .arg("-a")
            .args(&args)
            .assert()
            .code(130)
            .stdout("run 1\n");
        assert_eq!(cache.runs(), 1);

        let lock = cache
            .cache_dir()
            .join(format!("{}.pid", fingerprint(&cache.counting_command("sleep 5"))));
        assert!(!lock.exists());
    }

    #[test]
    fn test_interrupted_run_is_discarded_by_default() {
        let cache = TestCache::new();
        let args = counting_args(&cache, "sleep 5");

        let mut child = spawn_running(&cache, &[], &args);
        signal_group(&child, libc::SIGINT);
        assert_eq!(child.wait().unwrap().code(), Some(130));

        let first = fingerprint(&cache.counting_command("sleep 5"));
        assert!(!cache.cache_dir().join(format!("{first}.data")).exists());
        assert!(!cache.cache_dir().join(format!("{first}.pid")).exists());
    }

    #[test]
    fn test_second_signal_tears_down_and_removes_lock() {
        let cache = TestCache::new();
        let spec = cache.counting_command("sleep 10");
        let args = counting_args(&cache, "sleep 10");
        let fp = fingerprint(&spec);

        let mut child = spawn_running(&cache, &[], &args);
        let lock = cache.cache_dir().join(format!("{fp}.pid"));
        assert!(lock.exists());

        // The first signal goes to the command; its inner shell keeps
        // the output open, so the second one ends the wait
        signal_process(&child, libc::SIGTERM);
        std::thread::sleep(Duration::from_millis(300));
        assert!(child.try_wait().unwrap().is_none());
        signal_process(&child, libc::SIGTERM);

        let status = child.wait().unwrap();
        assert_eq!(status.code(), Some(143));
        assert_eq!(status.signal(), None);

        // Only the command record survives the teardown
        let mut left: Vec<String> = fs::read_dir(cache.cache_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, [format!("{fp}.cmd")]);
    }
}
