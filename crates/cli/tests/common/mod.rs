#![allow(dead_code)]

use runcached_core::{CommandSpec, RunConfig, RunConfigBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Isolated cache directory plus a counter file that records executions
pub struct TestCache {
    temp_dir: TempDir,
}

impl TestCache {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.temp_dir.path().join("cache")
    }

    pub fn counter_path(&self) -> PathBuf {
        self.temp_dir.path().join("counter")
    }

    /// Number of times a counting command has run
    pub fn runs(&self) -> u32 {
        match fs::read_to_string(self.counter_path()) {
            Ok(contents) => contents.trim().parse().unwrap(),
            Err(_) => 0,
        }
    }

    /// Fast-polling configuration rooted in this cache directory
    pub fn config(&self) -> RunConfigBuilder {
        RunConfig::builder()
            .cache_dir(self.cache_dir())
            .poll_interval(Duration::from_millis(50))
            .max_wait(Duration::from_secs(10))
    }

    /// `sh -c` script that bumps the counter, prints the run number and
    /// then runs `tail`
    pub fn counting_command(&self, tail: &str) -> CommandSpec {
        CommandSpec::new(["sh".to_string(), "-c".to_string(), counting_script(&self.counter_path(), tail)])
            .unwrap()
    }
}

pub fn counting_script(counter: &Path, tail: &str) -> String {
    let counter = counter.display();
    format!(
        "n=$(cat '{counter}' 2>/dev/null || echo 0); n=$((n + 1)); echo $n > '{counter}'; echo run $n; {tail}"
    )
}
