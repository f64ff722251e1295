//! Cache system for runcached
//!
//! This crate provides the persistent half of memoization:
//! - Fingerprinting a command into the key shared by cache and lock files
//! - The cache store: output blob, exit record and command record per key
//! - Atomic entry writes through a staging file
//! - Per-fingerprint mutual exclusion behind the [`LockBackend`] trait

pub mod fingerprint;
pub mod lock;
pub mod store;
pub mod writer;

pub use fingerprint::{fingerprint, Fingerprint};
pub use lock::{
    AdvisoryLock, HeldLock, HolderState, LockAttempt, LockBackend, LockGuard, LockManager,
    PidFileLock,
};
pub use store::{CacheLookup, CacheStore, EntryPaths, MissReason, ReplayOutcome};
pub use writer::{CommittedEntry, EntryWriter};
