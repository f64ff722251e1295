//! Lock by exclusive creation of a PID file

use super::{HeldLock, HolderState, LockAttempt, LockBackend};
use runcached_core::{Error, Result, ResultExt};
use runcached_utils::is_process_running;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, SystemTime};

/// How long a lock file may stay empty or garbled before it counts as stale
///
/// Covers the window between the holder creating the file and writing its
/// PID into it.
const UNRECORDED_PID_GRACE: Duration = Duration::from_secs(1);

/// PID-file lock backend
#[derive(Debug, Default, Clone, Copy)]
pub struct PidFileLock;

impl PidFileLock {
    pub fn new() -> Self {
        Self
    }

    /// Judge the current holder of `path`
    pub fn inspect(&self, path: &Path) -> HolderState {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return HolderState::Absent,
            // Unreadable lock files are left alone
            Err(_) => return HolderState::Live { pid: None },
        };

        match parse_pid(&contents) {
            Some(pid) if is_process_running(pid) => HolderState::Live { pid: Some(pid) },
            Some(pid) => HolderState::Stale { pid: Some(pid) },
            None if recently_modified(path) => HolderState::Live { pid: None },
            None => HolderState::Stale { pid: None },
        }
    }
}

fn parse_pid(contents: &str) -> Option<u32> {
    contents.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
}

fn recently_modified(path: &Path) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age < UNRECORDED_PID_GRACE,
        Err(_) => true,
    }
}

impl LockBackend for PidFileLock {
    fn name(&self) -> &'static str {
        "pid-file"
    }

    fn try_acquire(&self, path: &Path) -> Result<LockAttempt> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Ok(LockAttempt::Busy(self.inspect(path)));
            }
            Err(e) => return Err(Error::file_system(path, "create lock file", e)),
        };

        let pid = std::process::id();
        let written = writeln!(file, "{pid}").and_then(|()| file.sync_all());
        drop(file);
        if let Err(e) = written {
            let _ = fs::remove_file(path);
            return Err(Error::file_system(path, "write lock file", e));
        }

        // Someone who judged the file stale before our PID landed may have
        // replaced it with their own
        let recorded = fs::read_to_string(path).fs_context(path, "read back lock file")?;
        if parse_pid(&recorded) != Some(pid) {
            return Err(Error::file_system(
                path,
                "verify lock file",
                io::Error::other(format!(
                    "expected pid {pid}, found {:?}",
                    recorded.trim()
                )),
            ));
        }

        Ok(LockAttempt::Acquired(HeldLock::new(path.to_path_buf(), pid, None)))
    }

    fn is_live(&self, path: &Path) -> bool {
        matches!(self.inspect(path), HolderState::Live { .. })
    }

    fn clear_stale(&self, path: &Path, observed: HolderState) -> Result<()> {
        let HolderState::Stale { pid } = observed else {
            return Ok(());
        };

        // Only remove the file if it still names the holder we judged dead
        let current = match fs::read_to_string(path) {
            Ok(contents) => parse_pid(&contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::file_system(path, "read lock file", e)),
        };
        if current != pid || self.inspect(path) != observed {
            return Ok(());
        }

        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::file_system(path, "remove stale lock file", e)),
        }
    }

    fn release(&self, held: &mut HeldLock) -> Result<()> {
        let path = held.path();
        match fs::read_to_string(path) {
            Ok(contents) if parse_pid(&contents) == Some(held.pid()) => {}
            Ok(_) => {
                tracing::warn!("Lock file {} no longer holds our PID", path.display());
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::file_system(path, "read lock file", e)),
        }

        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::file_system(path, "remove lock file", e)),
        }
    }
}
