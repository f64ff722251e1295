//! Builder methods for creating errors with context

use super::types::Error;
use crate::constants::{EXIT_INTERNAL_ERROR, EXIT_LOCK_TIMEOUT, EXIT_USAGE};
use std::path::PathBuf;
use std::time::Duration;

// Helper methods for creating errors with context
impl Error {
    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create a lock timeout error
    #[must_use]
    pub fn lock_timeout(
        fingerprint: impl Into<String>,
        waited: Duration,
        holder_pid: Option<u32>,
    ) -> Self {
        Error::LockTimeout {
            fingerprint: fingerprint.into(),
            waited,
            holder_pid,
        }
    }

    /// Create a command execution error
    #[must_use]
    pub fn command_execution(
        command: impl Into<String>,
        message: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Error::CommandExecution {
            command: command.into(),
            message: message.into(),
            exit_code,
        }
    }

    /// Create a shell quoting error
    #[must_use]
    pub fn shell_quoting(argument: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ShellQuoting {
            argument: argument.into(),
            message: message.into(),
        }
    }

    /// Create an invalid command error
    #[must_use]
    pub fn invalid_command(message: impl Into<String>) -> Self {
        Error::InvalidCommand {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Process exit code an invocation terminates with when this error escapes
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::LockTimeout { .. } => EXIT_LOCK_TIMEOUT,
            Error::InvalidCommand { .. } | Error::Configuration { .. } => EXIT_USAGE,
            Error::CommandExecution {
                exit_code: Some(code),
                ..
            } => *code,
            Error::FileSystem { .. }
            | Error::ShellQuoting { .. }
            | Error::CommandExecution { .. } => EXIT_INTERNAL_ERROR,
        }
    }

    /// Whether this is a lock timeout
    #[must_use]
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Error::LockTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        let err = Error::lock_timeout("abc", Duration::from_secs(5), Some(42));
        assert_eq!(err.exit_code(), EXIT_LOCK_TIMEOUT);
        assert!(err.is_lock_timeout());

        let err = Error::file_system(
            "/tmp/x.data",
            "create cache file",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.exit_code(), EXIT_INTERNAL_ERROR);

        let err = Error::shell_quoting("a\0b", "contains a NUL byte");
        assert_eq!(err.exit_code(), EXIT_INTERNAL_ERROR);

        let err = Error::invalid_command("empty command");
        assert_eq!(err.exit_code(), EXIT_USAGE);

        let err = Error::command_execution("sh", "spawn failed", Some(127));
        assert_eq!(err.exit_code(), 127);
    }
}
