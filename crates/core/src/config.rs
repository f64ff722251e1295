//! Per-invocation configuration
//!
//! Everything that varies between invocations lives in [`RunConfig`] and is
//! passed down explicitly, so two orchestrators with different settings can
//! run side by side in one process (tests rely on this).
//!
//! Precedence is command line > environment > defaults. The CLI layer applies
//! environment overrides first and its own flags last.

use crate::constants::{
    DEFAULT_CACHE_TIMEOUT_SECS, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL, DEFAULT_SHELL,
    RUNCACHED_CACHE_DIR_VAR, RUNCACHED_JITTER_VAR, RUNCACHED_LOCK_VAR, RUNCACHED_MAX_WAIT_VAR,
    RUNCACHED_SHELL_VAR,
};
use crate::errors::{Error, Result};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Which mutual-exclusion mechanism guards a fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockStrategy {
    /// Lock file holding the owner's PID, staleness decided by a liveness probe
    #[default]
    PidFile,
    /// Kernel advisory lock (`flock`) on the lock file
    Advisory,
}

impl FromStr for LockStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pid" | "pidfile" | "pid-file" => Ok(LockStrategy::PidFile),
            "advisory" | "flock" => Ok(LockStrategy::Advisory),
            other => Err(Error::configuration(format!(
                "unknown lock strategy '{other}' (expected 'pid' or 'advisory')"
            ))),
        }
    }
}

impl fmt::Display for LockStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockStrategy::PidFile => write!(f, "pid"),
            LockStrategy::Advisory => write!(f, "advisory"),
        }
    }
}

/// Configuration threaded through one orchestrator run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum age of a cache entry that may still be replayed
    pub cache_timeout: Duration,
    /// Keep entries produced by a non-zero exit
    pub cache_on_error: bool,
    /// Keep entries produced by a run killed by a signal
    pub cache_on_abort: bool,
    /// Report cache hits, misses and lock waits
    pub verbose: bool,
    /// Report cache paths, entry ages and lock holders
    pub debug: bool,
    /// Wait budget for a live lock held by another invocation
    pub max_wait: Duration,
    /// Interval between lock probes
    pub poll_interval: Duration,
    /// Directory holding cache entries and lock files
    pub cache_dir: PathBuf,
    /// POSIX shell that interprets the command line
    pub shell: String,
    /// Guard implementation
    pub lock_strategy: LockStrategy,
    /// Optional random delay `[min, max)` before touching the lock
    pub start_jitter: Option<(Duration, Duration)>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cache_timeout: Duration::from_secs_f64(DEFAULT_CACHE_TIMEOUT_SECS),
            cache_on_error: false,
            cache_on_abort: false,
            verbose: false,
            debug: false,
            max_wait: DEFAULT_MAX_WAIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cache_dir: default_cache_dir(),
            shell: DEFAULT_SHELL.to_string(),
            lock_strategy: LockStrategy::default(),
            start_jitter: None,
        }
    }
}

impl RunConfig {
    /// Start building a configuration from defaults
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::new()
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::configuration("poll interval must be greater than zero"));
        }
        if self.shell.trim().is_empty() {
            return Err(Error::configuration("shell must not be empty"));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::configuration("cache directory must not be empty"));
        }
        if let Some((min, max)) = self.start_jitter {
            if min > max {
                return Err(Error::configuration(format!(
                    "jitter range is inverted: {}ms > {}ms",
                    min.as_millis(),
                    max.as_millis()
                )));
            }
        }
        Ok(())
    }
}

/// Default cache location: a per-user directory under the system temp dir
pub fn default_cache_dir() -> PathBuf {
    let user = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "default".to_string());
    env::temp_dir().join(format!("runcached-{user}"))
}

/// Parse a seconds value as given on the command line or in the environment
///
/// Negative values clamp to zero; NaN and infinities are rejected.
pub fn parse_seconds(name: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() {
        return Err(Error::configuration(format!(
            "{name} must be a finite number of seconds, got {value}"
        )));
    }
    Duration::try_from_secs_f64(value.max(0.0))
        .map_err(|e| Error::configuration(format!("{name} is out of range: {e}")))
}

/// Parse a wait budget; unlike a cache timeout it may not be negative
pub fn parse_wait(name: &str, value: f64) -> Result<Duration> {
    if value < 0.0 {
        return Err(Error::configuration(format!(
            "{name} must not be negative, got {value}"
        )));
    }
    parse_seconds(name, value)
}

fn parse_jitter(value: &str) -> Result<(Duration, Duration)> {
    let (min, max) = value.split_once('-').ok_or_else(|| {
        Error::configuration(format!(
            "{RUNCACHED_JITTER_VAR} must look like 'MIN-MAX' in milliseconds, got '{value}'"
        ))
    })?;
    let parse = |part: &str| {
        part.trim().parse::<u64>().map(Duration::from_millis).map_err(|e| {
            Error::configuration(format!("invalid {RUNCACHED_JITTER_VAR} bound '{part}': {e}"))
        })
    };
    Ok((parse(min)?, parse(max)?))
}

/// Builder for [`RunConfig`]
#[derive(Debug, Clone, Default)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `RUNCACHED_*` overrides from the process environment
    pub fn with_env(self) -> Result<Self> {
        self.with_env_lookup(|key| env::var(key).ok())
    }

    /// Apply `RUNCACHED_*` overrides read through `lookup`
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(RUNCACHED_CACHE_DIR_VAR).filter(|v| !v.is_empty()) {
            self.config.cache_dir = PathBuf::from(dir);
        }
        if let Some(wait) = lookup(RUNCACHED_MAX_WAIT_VAR) {
            let secs = wait.trim().parse::<f64>().map_err(|e| {
                Error::configuration(format!("invalid {RUNCACHED_MAX_WAIT_VAR} '{wait}': {e}"))
            })?;
            self.config.max_wait = parse_wait(RUNCACHED_MAX_WAIT_VAR, secs)?;
        }
        if let Some(shell) = lookup(RUNCACHED_SHELL_VAR).filter(|v| !v.is_empty()) {
            self.config.shell = shell;
        }
        if let Some(strategy) = lookup(RUNCACHED_LOCK_VAR) {
            self.config.lock_strategy = strategy.parse()?;
        }
        if let Some(jitter) = lookup(RUNCACHED_JITTER_VAR) {
            self.config.start_jitter = Some(parse_jitter(&jitter)?);
        }
        Ok(self)
    }

    pub fn cache_timeout(mut self, timeout: Duration) -> Self {
        self.config.cache_timeout = timeout;
        self
    }

    pub fn cache_on_error(mut self, enabled: bool) -> Self {
        self.config.cache_on_error = enabled;
        self
    }

    pub fn cache_on_abort(mut self, enabled: bool) -> Self {
        self.config.cache_on_abort = enabled;
        self
    }

    pub fn verbose(mut self, enabled: bool) -> Self {
        self.config.verbose = enabled;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    pub fn max_wait(mut self, wait: Duration) -> Self {
        self.config.max_wait = wait;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn cache_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.cache_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.config.shell = shell.into();
        self
    }

    pub fn lock_strategy(mut self, strategy: LockStrategy) -> Self {
        self.config.lock_strategy = strategy;
        self
    }

    pub fn start_jitter(mut self, min: Duration, max: Duration) -> Self {
        self.config.start_jitter = Some((min, max));
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<RunConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
