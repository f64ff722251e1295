use runcached_core::{Result, EXIT_INTERNAL_ERROR, EXIT_SIGNAL_BASE};
use std::future::Future;
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// Configure `shell -c script` with the merged output on a pipe
pub fn shell_command(shell: &str, script: &str) -> Command {
    let mut cmd = Command::new(shell);
    cmd.arg("-c")
        .arg(script)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    cmd
}

/// Await `drain`, then reap `child`
///
/// A failed drain leaves nobody reading the child's output, so the child is
/// killed before it is waited for.
pub async fn drain_then_reap<T, F>(
    child: &mut Child,
    drain: F,
) -> (Result<T>, io::Result<ExitStatus>)
where
    F: Future<Output = Result<T>>,
{
    let drained = drain.await;
    if drained.is_err() {
        if let Err(e) = child.start_kill() {
            tracing::debug!("Failed to kill command after output error: {e}");
        }
    }
    (drained, child.wait().await)
}

/// Exit status as the code this invocation reports
///
/// Normal exits keep their code; a fatal signal becomes `128 + signal`.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    match terminating_signal(status) {
        Some(signal) => EXIT_SIGNAL_BASE + signal,
        None => EXIT_INTERNAL_ERROR,
    }
}

/// Signal that killed the process, if any
pub fn terminating_signal(status: ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    }

    #[cfg(not(unix))]
    {
        let _ = status;
        None
    }
}
