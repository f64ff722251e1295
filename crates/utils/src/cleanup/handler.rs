//! Resource cleanup and teardown hooks
//!
//! Lock files and staging files must not outlive an interrupted invocation:
//! a leftover lock blocks every later run of the same command until its PID
//! is judged stale, and a leftover staging file is just litter. Each such
//! path is registered here for the time it exists; the signal thread and the
//! panic hook remove whatever is still registered before the process dies.
//!
//! While a [`DeferredTeardown`] scope is open, the first signal is recorded
//! instead of tearing the process down, so the owner can let its child finish
//! dying and keep what it produced. A second signal tears down as usual.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Global cleanup registry for tracking resources
static CLEANUP_REGISTRY: Lazy<Arc<Mutex<CleanupRegistry>>> =
    Lazy::new(|| Arc::new(Mutex::new(CleanupRegistry::new())));

/// Registry for tracking paths that need removal on teardown
struct CleanupRegistry {
    resources: HashMap<u64, CleanupResource>,
    next_id: u64,
}

struct CleanupResource {
    description: String,
    path: PathBuf,
}

impl CleanupRegistry {
    fn new() -> Self {
        Self {
            resources: HashMap::with_capacity(4),
            next_id: 0,
        }
    }

    fn register(&mut self, description: String, path: PathBuf) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.resources
            .insert(id, CleanupResource { description, path });
        id
    }

    fn unregister(&mut self, id: u64) {
        self.resources.remove(&id);
    }

    fn cleanup_all(&mut self) {
        for (_, resource) in self.resources.drain() {
            tracing::debug!(
                path = %resource.path.display(),
                "Emergency cleanup: {}",
                resource.description
            );
            let _ = fs::remove_file(&resource.path);
        }
    }
}

/// Registration of a path for emergency removal
///
/// Dropping the registration unregisters the path without touching it; the
/// owner is expected to have dealt with the file on its normal path.
#[derive(Debug)]
pub struct CleanupRegistration {
    id: Option<u64>,
}

impl CleanupRegistration {
    /// Register `path` to be removed if the process is torn down
    pub fn path(path: impl Into<PathBuf>, description: impl Into<String>) -> Self {
        let id = match CLEANUP_REGISTRY.lock() {
            Ok(mut registry) => Some(registry.register(description.into(), path.into())),
            Err(e) => {
                tracing::error!("Failed to lock cleanup registry: {e}");
                None
            }
        };
        Self { id }
    }

}

impl Drop for CleanupRegistration {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            if let Ok(mut registry) = CLEANUP_REGISTRY.lock() {
                registry.unregister(id);
            } else {
                tracing::error!("Failed to lock cleanup registry for unregister");
            }
        }
    }
}

/// RAII guard for temporary files
///
/// The file is removed on drop unless [`TempFileGuard::keep`] was called,
/// and on process teardown while the guard is alive.
#[derive(Debug)]
pub struct TempFileGuard {
    path: PathBuf,
    registration: Option<CleanupRegistration>,
}

impl TempFileGuard {
    /// Create a new temporary file guard
    pub fn new(path: PathBuf) -> Self {
        let registration =
            CleanupRegistration::path(path.clone(), format!("temporary file: {}", path.display()));
        Self {
            path,
            registration: Some(registration),
        }
    }

    /// Get the path to the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file after the guard is dropped
    pub fn keep(mut self) -> PathBuf {
        self.registration = None;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.registration.take().is_none() {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    "Failed to remove temporary file {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

/// Signal bookkeeping shared with the signal thread
struct TeardownState {
    /// Open [`DeferredTeardown`] scopes
    deferred: usize,
    /// First signal received while a scope was open
    signal: watch::Sender<Option<i32>>,
}

static TEARDOWN: Lazy<Mutex<TeardownState>> = Lazy::new(|| {
    Mutex::new(TeardownState {
        deferred: 0,
        signal: watch::channel(None).0,
    })
});

/// Record `signal` if a scope is open and no signal was deferred yet
///
/// Returns false when the process should be torn down now.
fn defer_signal(signal: i32) -> bool {
    let state = TEARDOWN.lock().unwrap_or_else(PoisonError::into_inner);
    if state.deferred == 0 || state.signal.borrow().is_some() {
        return false;
    }
    state.signal.send_replace(Some(signal));
    true
}

/// Scope during which the first termination signal is handed to the owner
///
/// Registered paths stay registered; if a second signal arrives, or the
/// signal comes after the scope closed, they are removed and the process
/// exits as usual.
#[derive(Debug)]
pub struct DeferredTeardown {
    signal: watch::Receiver<Option<i32>>,
}

impl DeferredTeardown {
    pub fn begin() -> Self {
        let mut state = TEARDOWN.lock().unwrap_or_else(PoisonError::into_inner);
        state.deferred += 1;
        Self {
            signal: state.signal.subscribe(),
        }
    }

    /// The signal received so far, if any
    pub fn signal(&self) -> Option<i32> {
        *self.signal.borrow()
    }

    /// Wait until a signal is deferred
    pub async fn interrupted(&mut self) -> i32 {
        loop {
            if let Some(signal) = *self.signal.borrow_and_update() {
                return signal;
            }
            if self.signal.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Drop for DeferredTeardown {
    fn drop(&mut self) {
        let mut state = TEARDOWN.lock().unwrap_or_else(PoisonError::into_inner);
        state.deferred = state.deferred.saturating_sub(1);
    }
}

/// Initialize cleanup handling (called once at startup)
///
/// SIGINT, SIGTERM and SIGHUP remove every registered path and exit with
/// `128 + signal`, unless a [`DeferredTeardown`] scope takes the signal.
/// Panics remove them before the previous panic hook runs.
pub fn init_cleanup_handler() {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;
        use std::thread;

        let registry = Arc::downgrade(&CLEANUP_REGISTRY);

        let mut signals = match Signals::new([SIGINT, SIGTERM, SIGHUP]) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to register signal handlers: {e}");
                return;
            }
        };

        thread::spawn(move || {
            for sig in signals.forever() {
                if defer_signal(sig) {
                    tracing::debug!("Received signal {sig}, deferring to the running command");
                    continue;
                }
                tracing::debug!("Received signal {sig}, cleaning up resources");

                if let Some(registry) = registry.upgrade() {
                    if let Ok(mut reg) = registry.lock() {
                        reg.cleanup_all();
                    } else {
                        tracing::error!("Failed to lock cleanup registry in signal handler");
                    }
                }

                std::process::exit(128 + sig);
            }
        });
    }

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        if let Ok(mut registry) = CLEANUP_REGISTRY.lock() {
            registry.cleanup_all();
        }
        original_hook(panic_info);
    }));
}
