//! Display implementations for error types

use super::types::Error;
use std::fmt;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::FileSystem {
                path, operation, ..
            } => {
                // The raw io error stays reachable through `source()`
                write!(f, "failed to {operation} '{}'", path.display())
            }
            Error::LockTimeout {
                fingerprint,
                waited,
                holder_pid,
            } => match holder_pid {
                Some(pid) => write!(
                    f,
                    "timed out after {waited:?} waiting for previous run of command {fingerprint} (pid {pid})"
                ),
                None => write!(
                    f,
                    "timed out after {waited:?} waiting for previous run of command {fingerprint}"
                ),
            },
            Error::CommandExecution {
                command,
                message,
                exit_code,
            } => match exit_code {
                Some(code) => {
                    write!(f, "command '{command}' failed with exit code {code}: {message}")
                }
                None => write!(f, "command '{command}' failed: {message}"),
            },
            Error::ShellQuoting { argument, message } => {
                write!(f, "cannot quote argument {argument:?}: {message}")
            }
            Error::InvalidCommand { message } => {
                write!(f, "invalid command: {message}")
            }
            Error::Configuration { message } => {
                write!(f, "configuration error: {message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_file_system_display_is_brief() {
        let err = Error::file_system(
            "/tmp/runcached/abc.data",
            "create cache file",
            std::io::Error::other("disk on fire"),
        );
        let text = err.to_string();
        assert_eq!(text, "failed to create cache file '/tmp/runcached/abc.data'");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_lock_timeout_display() {
        let err = Error::lock_timeout("abc", Duration::from_secs(5), Some(7));
        assert!(err.to_string().contains("pid 7"));
    }
}
