//! Running a command and capturing its output into the cache
//!
//! The command line goes through `shell -c` with stderr folded into stdout.
//! The merged stream is copied to the caller and into a staged cache entry
//! at the same time; the entry is committed only after the child exited and
//! the copy drained.
//!
//! A termination signal arriving meanwhile is forwarded to the shell rather
//! than killing this process, so whatever the command printed before dying is
//! still committed and the abort policy decides whether it stays.

pub mod output;
pub mod process;

pub use output::{fan_out, FanOutReport};

use crate::shell::build_script;
use runcached_cache::{CacheStore, CommittedEntry, Fingerprint};
use runcached_core::{CommandSpec, Error, Result, EXIT_SIGNAL_BASE, EXIT_SPAWN_FAILURE};
use runcached_utils::DeferredTeardown;
use tokio::io::AsyncWrite;

/// Highest signal number a shell folds into `128 + signal`
const MAX_SIGNAL: i32 = 64;

/// How one execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Code reported for the run, `128 + signal` when killed
    pub exit_code: i32,
    /// Fatal signal, when the command did not exit on its own
    pub signal: Option<i32>,
    /// Signal this invocation received while the command ran
    pub interrupted: Option<i32>,
    /// Output bytes captured
    pub bytes: u64,
    /// The caller's output closed before the command finished
    pub caller_closed: bool,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && self.signal.is_none()
    }

    /// Killed by a signal rather than exiting
    ///
    /// A shell that does not exec its last command reports the command's
    /// death as `128 + signal`, so such codes count as well.
    pub fn aborted(&self) -> bool {
        self.signal.is_some()
            || self.interrupted.is_some()
            || (EXIT_SIGNAL_BASE + 1..=EXIT_SIGNAL_BASE + MAX_SIGNAL).contains(&self.exit_code)
    }
}

/// Runs commands through a POSIX shell
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    shell: String,
}

impl ExecutionEngine {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Run `spec`, streaming its output to `out` and into the entry for
    /// `fingerprint`
    ///
    /// A shell that cannot be started fails with exit code 127 and leaves
    /// the cache untouched.
    pub async fn execute<W>(
        &self,
        spec: &CommandSpec,
        store: &CacheStore,
        fingerprint: &Fingerprint,
        out: &mut W,
    ) -> Result<ExecutionOutcome>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let script = build_script(spec)?;
        let mut entry = store.writer(fingerprint).await?;
        let mut teardown = DeferredTeardown::begin();

        tracing::debug!(shell = %self.shell, script = %script, "Spawning command");
        let mut child = process::shell_command(&self.shell, &script)
            .spawn()
            .map_err(|e| {
                Error::command_execution(
                    spec.to_string(),
                    format!("failed to start '{}': {e}", self.shell),
                    Some(EXIT_SPAWN_FAILURE),
                )
            })?;
        let pid = child.id();

        let stdout = child.stdout.take().ok_or_else(|| {
            Error::command_execution(
                spec.to_string(),
                "command output was not captured",
                None,
            )
        })?;

        let (report, status) = {
            let run = process::drain_then_reap(&mut child, fan_out(stdout, out, &mut entry));
            tokio::pin!(run);

            let mut forwarded = false;
            loop {
                tokio::select! {
                    finished = &mut run => break finished,
                    signal = teardown.interrupted(), if !forwarded => {
                        forwarded = true;
                        forward_signal(pid, signal);
                    }
                }
            }
        };

        let report = report?;
        let status = status.map_err(|e| {
            Error::command_execution(spec.to_string(), format!("failed to wait: {e}"), None)
        })?;
        let exit_code = process::exit_code_of(status);
        let signal = process::terminating_signal(status);
        let interrupted = teardown.signal();

        let CommittedEntry { bytes, .. } = entry.commit(exit_code).await?;

        tracing::debug!(
            fingerprint = %fingerprint.short(),
            exit_code,
            signal = ?signal,
            interrupted = ?interrupted,
            bytes,
            "Command finished"
        );

        Ok(ExecutionOutcome {
            exit_code,
            signal,
            interrupted,
            bytes: report.bytes,
            caller_closed: report.caller_closed,
        })
    }
}

/// Pass a signal this invocation received on to the shell
fn forward_signal(pid: Option<u32>, signal: i32) {
    tracing::debug!(pid = ?pid, signal, "Forwarding signal to command");

    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            if let Err(e) = runcached_utils::send_signal(pid, signal) {
                tracing::debug!("Failed to forward signal {signal}: {e}");
            }
        }
    }
}
