//! Per-fingerprint mutual exclusion
//!
//! At most one invocation executes a given command at a time; the others
//! wait for it and then replay its output. Two interchangeable backends
//! implement the primitive:
//!
//! - [`PidFileLock`]: exclusive creation of a file holding the owner's PID.
//!   A file whose PID no longer names a live process is stale and cleared.
//! - [`AdvisoryLock`]: an `flock` on the same path. The kernel drops it when
//!   the holder dies, so it never goes stale.
//!
//! [`LockManager`] drives either one with the poll/deadline loop and hands
//! out a [`LockGuard`] that releases on drop.

mod advisory;
mod pid_file;

pub use advisory::AdvisoryLock;
pub use pid_file::PidFileLock;

use crate::fingerprint::Fingerprint;
use runcached_core::{Error, LockStrategy, Result, RunConfig};
use runcached_utils::CleanupRegistration;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Retries that skip the poll sleep (stale holder cleared, holder vanished)
/// before the manager falls back to waiting
const MAX_IMMEDIATE_RETRIES: u32 = 8;

/// Observed state of whoever holds the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderState {
    /// Lock released between the attempt and the inspection
    Absent,
    /// Held by a running process; `pid` is `None` when not yet recorded
    Live { pid: Option<u32> },
    /// Left behind by a process that no longer runs
    Stale { pid: Option<u32> },
}

impl HolderState {
    pub fn pid(&self) -> Option<u32> {
        match self {
            HolderState::Absent => None,
            HolderState::Live { pid } | HolderState::Stale { pid } => *pid,
        }
    }
}

/// Outcome of a single non-blocking acquisition attempt
#[derive(Debug)]
pub enum LockAttempt {
    Acquired(HeldLock),
    Busy(HolderState),
}

/// A lock owned by this process
#[derive(Debug)]
pub struct HeldLock {
    path: PathBuf,
    pid: u32,
    // Open descriptor carrying the flock for the advisory backend
    file: Option<File>,
}

impl HeldLock {
    pub(crate) fn new(path: PathBuf, pid: u32, file: Option<File>) -> Self {
        Self { path, pid, file }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub(crate) fn take_file(&mut self) -> Option<File> {
        self.file.take()
    }
}

/// Mutual-exclusion primitive keyed by a lock file path
pub trait LockBackend: Send + Sync + fmt::Debug {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    /// Try once to take the lock without blocking
    fn try_acquire(&self, path: &Path) -> Result<LockAttempt>;

    /// Whether a running process currently holds the lock at `path`
    fn is_live(&self, path: &Path) -> bool;

    /// Remove a stale lock, provided it still belongs to `observed`
    fn clear_stale(&self, path: &Path, observed: HolderState) -> Result<()>;

    /// Give the lock up
    fn release(&self, held: &mut HeldLock) -> Result<()>;
}

/// RAII guard for a held lock
///
/// While alive, the lock path is registered for removal on fatal signals.
#[derive(Debug)]
pub struct LockGuard {
    held: Option<HeldLock>,
    backend: Arc<dyn LockBackend>,
    _registration: CleanupRegistration,
}

impl LockGuard {
    fn new(held: HeldLock, backend: Arc<dyn LockBackend>) -> Self {
        let registration = CleanupRegistration::path(
            held.path().to_path_buf(),
            format!("lock file: {}", held.path().display()),
        );
        Self {
            held: Some(held),
            backend,
            _registration: registration,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.held.as_ref().map(HeldLock::path)
    }

    /// Release now, reporting failures instead of logging them
    pub fn release(mut self) -> Result<()> {
        match self.held.take() {
            Some(mut held) => self.backend.release(&mut held),
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(mut held) = self.held.take() {
            if let Err(e) = self.backend.release(&mut held) {
                tracing::warn!("Failed to release lock {}: {}", held.path().display(), e);
            }
        }
    }
}

/// Acquires locks with bounded waiting
#[derive(Debug, Clone)]
pub struct LockManager {
    backend: Arc<dyn LockBackend>,
    max_wait: Duration,
    poll_interval: Duration,
}

impl LockManager {
    pub fn new(backend: Arc<dyn LockBackend>, max_wait: Duration, poll_interval: Duration) -> Self {
        Self {
            backend,
            max_wait,
            poll_interval,
        }
    }

    pub fn for_strategy(strategy: LockStrategy, max_wait: Duration, poll_interval: Duration) -> Self {
        let backend: Arc<dyn LockBackend> = match strategy {
            LockStrategy::PidFile => Arc::new(PidFileLock::new()),
            LockStrategy::Advisory => Arc::new(AdvisoryLock::new()),
        };
        Self::new(backend, max_wait, poll_interval)
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::for_strategy(config.lock_strategy, config.max_wait, config.poll_interval)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Whether another process is running the command behind `path` right now
    pub fn is_held(&self, path: &Path) -> bool {
        self.backend.is_live(path)
    }

    /// Take the lock at `path`, waiting up to the configured maximum
    ///
    /// Busy locks are polled every `poll_interval`; the last attempt happens
    /// at the deadline. A stale holder is cleared and the attempt repeated
    /// without sleeping.
    pub async fn acquire(&self, fingerprint: &Fingerprint, path: &Path) -> Result<LockGuard> {
        let started = Instant::now();
        let deadline = started + self.max_wait;
        let mut immediate_retries = 0;

        loop {
            let holder = match self.backend.try_acquire(path)? {
                LockAttempt::Acquired(held) => {
                    tracing::debug!(
                        fingerprint = %fingerprint.short(),
                        backend = self.backend.name(),
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Acquired lock"
                    );
                    return Ok(LockGuard::new(held, Arc::clone(&self.backend)));
                }
                LockAttempt::Busy(holder) => holder,
            };

            match holder {
                HolderState::Stale { pid } if immediate_retries < MAX_IMMEDIATE_RETRIES => {
                    immediate_retries += 1;
                    tracing::info!(
                        fingerprint = %fingerprint.short(),
                        pid = ?pid,
                        "Removing stale lock"
                    );
                    self.backend.clear_stale(path, holder)?;
                    continue;
                }
                HolderState::Absent if immediate_retries < MAX_IMMEDIATE_RETRIES => {
                    immediate_retries += 1;
                    continue;
                }
                _ => {}
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(
                    fingerprint = %fingerprint.short(),
                    holder = ?holder,
                    "Gave up waiting for lock"
                );
                return Err(Error::lock_timeout(
                    fingerprint.as_str(),
                    started.elapsed(),
                    holder.pid(),
                ));
            }

            tracing::debug!(
                fingerprint = %fingerprint.short(),
                holder = ?holder,
                "Lock busy, waiting"
            );
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
