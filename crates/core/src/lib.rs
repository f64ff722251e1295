//! Core domain types, errors, and configuration for `runcached`.
//!
//! This crate holds the building blocks shared by every other crate in the
//! workspace.
//!
//! ## Key Components
//!
//! - **`errors`**: the primary `Error` enum and `Result` alias. Every failure
//!   an invocation can hit is one of its variants, and each variant knows the
//!   process exit code it maps to.
//! - **`types`**: the validated `CommandSpec` newtype for the command being
//!   memoized.
//! - **`config`**: `RunConfig`, the explicit per-invocation configuration that
//!   replaces ambient process-wide flags.
//! - **`constants`**: exit codes, file suffixes and defaults.

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

pub use self::{
    config::{parse_seconds, parse_wait, LockStrategy, RunConfig, RunConfigBuilder},
    constants::*,
    errors::{Error, Result, ResultExt},
    types::*,
};
