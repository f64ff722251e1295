//! One memoized invocation from start to exit code
//!
//! ```text
//! Start -> AcquireGuard -> CacheCheck -> Replay | Execute -> ReleaseGuard -> Done
//!               |
//!               +-> lock timeout (exit 2)
//! ```
//!
//! The guard is held across the cache check, so a waiter that finally gets
//! it rides on the entry the previous holder just wrote.

use crate::executor::{ExecutionEngine, ExecutionOutcome};
use rand::Rng;
use runcached_cache::{
    fingerprint, CacheLookup, CacheStore, Fingerprint, LockManager, MissReason,
};
use runcached_core::{CommandSpec, Result, RunConfig, EXIT_INTERNAL_ERROR, EXIT_SIGNAL_BASE};
use runcached_utils::DeferredTeardown;
use std::time::Duration;
use tokio::io::AsyncWrite;

/// Why a finished execution's entry is thrown away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Non-zero exit without cache-on-error
    Failed,
    /// Killed by a signal without cache-on-abort
    Aborted,
}

/// Decide whether an execution's entry stays in the cache
///
/// Cache-on-error keeps every unsuccessful run; cache-on-abort additionally
/// keeps runs cut short by a signal.
pub fn discard_reason(config: &RunConfig, outcome: &ExecutionOutcome) -> Option<DiscardReason> {
    let aborted = outcome.aborted();
    if (outcome.exit_code == 0 && !aborted) || config.cache_on_error {
        return None;
    }
    if aborted {
        return (!config.cache_on_abort).then_some(DiscardReason::Aborted);
    }
    Some(DiscardReason::Failed)
}

/// Drives cache check, locking and execution for one configuration
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: RunConfig,
    store: CacheStore,
    locks: LockManager,
    engine: ExecutionEngine,
}

impl Orchestrator {
    /// Validate `config` and open its cache directory
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        let store = CacheStore::open(&config.cache_dir)?;
        let locks = LockManager::from_config(&config);
        let engine = ExecutionEngine::new(config.shell.clone());
        Ok(Self {
            config,
            store,
            locks,
            engine,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Run `spec` through the cache, writing its output to `out`
    ///
    /// Returns the exit code the invocation should terminate with. Errors
    /// carry their own exit code through [`runcached_core::Error::exit_code`].
    pub async fn run<W>(&self, spec: &CommandSpec, out: &mut W) -> Result<i32>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let fp = fingerprint(spec);
        self.report(&fp, spec);
        self.start_jitter().await;

        let paths = self.store.paths(&fp);
        let guard = self.locks.acquire(&fp, &paths.lock).await?;
        self.store.record_command(&fp, spec)?;

        let exit_code = match self.store.lookup(&fp, self.config.cache_timeout) {
            CacheLookup::Hit { exit_code, age } => {
                if self.verbose() {
                    tracing::info!(
                        fingerprint = %fp.short(),
                        age_ms = age.as_millis() as u64,
                        exit_code,
                        "Cache hit, replaying output"
                    );
                }
                let replay = self.store.replay(&fp, exit_code, out).await?;
                if replay.caller_closed {
                    tracing::debug!(fingerprint = %fp.short(), "Output closed during replay");
                    EXIT_INTERNAL_ERROR
                } else {
                    replay.exit_code
                }
            }
            CacheLookup::Miss(reason) => {
                self.log_miss(&fp, reason);
                self.execute(&fp, spec, out).await?
            }
        };

        guard.release()?;
        Ok(exit_code)
    }

    async fn execute<W>(&self, fp: &Fingerprint, spec: &CommandSpec, out: &mut W) -> Result<i32>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        // Held until the keep/discard decision is applied
        let teardown = DeferredTeardown::begin();
        let outcome = self.engine.execute(spec, &self.store, fp, out).await?;

        if let Some(reason) = discard_reason(&self.config, &outcome) {
            if self.verbose() {
                tracing::info!(
                    fingerprint = %fp.short(),
                    exit_code = outcome.exit_code,
                    reason = ?reason,
                    "Not caching output"
                );
            }
            self.store.invalidate(fp)?;
        }

        if let Some(signal) = outcome.interrupted.or_else(|| teardown.signal()) {
            tracing::debug!(fingerprint = %fp.short(), signal, "Interrupted while executing");
            return Ok(EXIT_SIGNAL_BASE + signal);
        }
        if outcome.caller_closed {
            tracing::debug!(
                fingerprint = %fp.short(),
                bytes = outcome.bytes,
                "Output closed early; cache entry completed anyway"
            );
            return Ok(EXIT_INTERNAL_ERROR);
        }
        Ok(outcome.exit_code)
    }

    /// Hit and miss reports, requested by verbose or debug
    fn verbose(&self) -> bool {
        self.config.verbose || self.config.debug
    }

    fn log_miss(&self, fp: &Fingerprint, reason: MissReason) {
        if !self.verbose() {
            return;
        }
        match reason {
            MissReason::Absent => {
                tracing::info!(fingerprint = %fp.short(), "No cached output, executing")
            }
            MissReason::Expired { age } => tracing::info!(
                fingerprint = %fp.short(),
                age_ms = age.as_millis() as u64,
                "Cached output expired, executing"
            ),
            MissReason::Unreadable => {
                tracing::info!(fingerprint = %fp.short(), "Cached output unusable, executing")
            }
        }
    }

    /// Debug report of where this invocation's files live
    fn report(&self, fp: &Fingerprint, spec: &CommandSpec) {
        if !self.config.debug {
            return;
        }
        let paths = self.store.paths(fp);
        tracing::debug!(
            fingerprint = %fp,
            command = %spec,
            output = %paths.output.display(),
            exit = %paths.exit.display(),
            lock = %paths.lock.display(),
            backend = self.locks.backend_name(),
            "Cache files"
        );
        tracing::debug!(
            age_ms = self.store.entry_age(fp).map(|age| age.as_millis() as u64),
            timeout_ms = self.config.cache_timeout.as_millis() as u64,
            lock_held = self.locks.is_held(&paths.lock),
            "Cache state"
        );
    }

    async fn start_jitter(&self) {
        let Some((min, max)) = self.config.start_jitter else {
            return;
        };
        let delay = jitter_delay(min, max);
        if !delay.is_zero() {
            tracing::debug!(delay_ms = delay.as_millis() as u64, "Start jitter");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Random delay in `[min, max)`, or `min` for an empty range
fn jitter_delay(min: Duration, max: Duration) -> Duration {
    let (min_ms, max_ms) = (min.as_millis() as u64, max.as_millis() as u64);
    if min_ms >= max_ms {
        return min;
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..max_ms))
}
