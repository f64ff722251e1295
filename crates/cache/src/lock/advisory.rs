//! Lock by `flock` on the lock file

use super::{HeldLock, HolderState, LockAttempt, LockBackend};
use fs2::FileExt;
use runcached_core::{Error, Result, ResultExt};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Attempts at locking a file that is unlinked underneath us before
/// reporting the lock as busy
const MAX_REOPEN_ATTEMPTS: u32 = 3;

/// Advisory-lock backend
///
/// The holder writes its PID into the file for diagnostics only; liveness
/// comes from the kernel, which drops the lock with the holder's last
/// descriptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdvisoryLock;

impl AdvisoryLock {
    pub fn new() -> Self {
        Self
    }
}

/// Whether `file` is still the inode linked at `path`
///
/// A releasing holder unlinks the file while still locked; a waiter that
/// opened it before the unlink can lock the orphaned inode afterwards.
#[cfg(unix)]
fn is_linked_at(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let ours = file.metadata()?;
    match fs::metadata(path) {
        Ok(linked) => Ok(linked.dev() == ours.dev() && linked.ino() == ours.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn is_linked_at(_file: &File, path: &Path) -> io::Result<bool> {
    Ok(path.exists())
}

fn recorded_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

impl LockBackend for AdvisoryLock {
    fn name(&self) -> &'static str {
        "advisory"
    }

    fn try_acquire(&self, path: &Path) -> Result<LockAttempt> {
        for _ in 0..MAX_REOPEN_ATTEMPTS {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .fs_context(path, "open lock file")?;

            match file.try_lock_exclusive() {
                Ok(()) => {}
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    return Ok(LockAttempt::Busy(HolderState::Live {
                        pid: recorded_pid(path),
                    }));
                }
                Err(e) => return Err(Error::file_system(path, "lock", e)),
            }

            if !is_linked_at(&file, path).fs_context(path, "stat lock file")? {
                tracing::debug!("Lock file {} replaced while locking, retrying", path.display());
                continue;
            }

            let pid = std::process::id();
            file.set_len(0)
                .and_then(|()| writeln!(file, "{pid}"))
                .and_then(|()| file.sync_all())
                .fs_context(path, "write lock file")?;

            return Ok(LockAttempt::Acquired(HeldLock::new(
                path.to_path_buf(),
                pid,
                Some(file),
            )));
        }

        Ok(LockAttempt::Busy(HolderState::Live {
            pid: recorded_pid(path),
        }))
    }

    fn is_live(&self, path: &Path) -> bool {
        let Ok(file) = OpenOptions::new().write(true).open(path) else {
            return false;
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }

    fn clear_stale(&self, _path: &Path, _observed: HolderState) -> Result<()> {
        Ok(())
    }

    fn release(&self, held: &mut HeldLock) -> Result<()> {
        let Some(file) = held.take_file() else {
            return Ok(());
        };

        // Unlink while still locked so no newcomer locks the old inode
        let removed = match fs::remove_file(held.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::file_system(held.path(), "remove lock file", e)),
        };
        let unlocked = FileExt::unlock(&file).fs_context(held.path(), "unlock");
        drop(file);

        removed.and(unlocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn acquire(lock: &AdvisoryLock, path: &Path) -> HeldLock {
        match lock.try_acquire(path).unwrap() {
            LockAttempt::Acquired(held) => held,
            LockAttempt::Busy(holder) => panic!("lock busy: {holder:?}"),
        }
    }

    #[test]
    fn test_exclusive_between_descriptors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("abc.pid");
        let lock = AdvisoryLock::new();

        let mut held = acquire(&lock, &path);
        match lock.try_acquire(&path).unwrap() {
            LockAttempt::Busy(holder) => assert_eq!(
                holder,
                HolderState::Live {
                    pid: Some(std::process::id())
                }
            ),
            LockAttempt::Acquired(_) => panic!("lock acquired twice"),
        }

        lock.release(&mut held).unwrap();
        assert!(!path.exists());

        let mut again = acquire(&lock, &path);
        lock.release(&mut again).unwrap();
    }

    #[test]
    fn test_leftover_unlocked_file_is_reused() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("abc.pid");
        fs::write(&path, "999999\n").unwrap();
        let lock = AdvisoryLock::new();

        let mut held = acquire(&lock, &path);
        assert_eq!(recorded_pid(&path), Some(std::process::id()));
        lock.release(&mut held).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_unlinked_inode_is_detected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("abc.pid");
        let file = File::create(&path).unwrap();
        assert!(is_linked_at(&file, &path).unwrap());

        fs::remove_file(&path).unwrap();
        assert!(!is_linked_at(&file, &path).unwrap());

        File::create(&path).unwrap();
        assert!(!is_linked_at(&file, &path).unwrap());
    }
}
