//! Command execution and orchestration for runcached
//!
//! This crate turns a command specification into a shell command line, runs
//! it while teeing its output into the cache, and sequences lock, cache check
//! and execution for a whole invocation.

pub mod executor;
pub mod orchestrator;
pub mod shell;

pub use executor::{ExecutionEngine, ExecutionOutcome};
pub use orchestrator::{discard_reason, DiscardReason, Orchestrator};
pub use shell::{build_command_line, build_script, quote};
