//! Shared utilities for runcached
//!
//! Filesystem helpers (atomic writes, private directories), process liveness
//! probing, process-teardown cleanup, and logging setup.

pub mod atomic_file;
pub mod cleanup;
pub mod paths;
pub mod process;
pub mod tracing;

pub use atomic_file::*;
pub use cleanup::*;
pub use paths::*;
pub use process::*;
