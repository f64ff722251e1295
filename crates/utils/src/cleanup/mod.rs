//! Resource cleanup on normal and abnormal termination

pub mod handler;

pub use handler::{init_cleanup_handler, CleanupRegistration, DeferredTeardown, TempFileGuard};
