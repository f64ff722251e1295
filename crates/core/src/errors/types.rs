//! Core error type definitions

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for runcached operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for runcached operations using thiserror
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system operations on cache, exit, command or lock files
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// A live holder kept the command's lock for the whole wait budget
    LockTimeout {
        fingerprint: String,
        waited: Duration,
        holder_pid: Option<u32>,
    },

    /// The command could not be run at all
    CommandExecution {
        command: String,
        message: String,
        exit_code: Option<i32>,
    },

    /// An argument cannot be turned into a shell command line
    ShellQuoting { argument: String, message: String },

    /// The command specification itself is unusable
    InvalidCommand { message: String },

    /// Configuration errors
    Configuration { message: String },
}
