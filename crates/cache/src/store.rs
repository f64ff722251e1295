//! On-disk cache store
//!
//! Every fingerprint owns up to four files in the cache directory, all named
//! `<fingerprint>.<suffix>`:
//!
//! | suffix | content                                   |
//! |--------|-------------------------------------------|
//! | `data` | combined output of the last execution     |
//! | `exit` | exit code of the last execution, decimal  |
//! | `cmd`  | the command line, for humans              |
//! | `pid`  | lock file, present only while a run holds |
//!
//! Validity is purely a function of the output blob's modification time.

use crate::fingerprint::Fingerprint;
use crate::writer::EntryWriter;
use runcached_core::{
    CommandSpec, Error, Result, ResultExt, COMMAND_SUFFIX, EXIT_SUFFIX, LOCK_SUFFIX,
    OUTPUT_SUFFIX,
};
use runcached_utils::{ensure_cache_dir, write_atomic_string};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

const REPLAY_CHUNK_SIZE: usize = 64 * 1024;

/// Locations of one fingerprint's artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPaths {
    pub output: PathBuf,
    pub exit: PathBuf,
    pub command: PathBuf,
    pub lock: PathBuf,
}

impl EntryPaths {
    fn new(dir: &Path, fingerprint: &Fingerprint) -> Self {
        let file = |suffix: &str| dir.join(format!("{fingerprint}.{suffix}"));
        Self {
            output: file(OUTPUT_SUFFIX),
            exit: file(EXIT_SUFFIX),
            command: file(COMMAND_SUFFIX),
            lock: file(LOCK_SUFFIX),
        }
    }
}

/// Why an entry cannot be replayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// No output blob
    Absent,
    /// Output blob older than the timeout
    Expired { age: Duration },
    /// Blob metadata or exit record unreadable
    Unreadable,
}

/// Result of checking the store for a replayable entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    Hit { exit_code: i32, age: Duration },
    Miss(MissReason),
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit { .. })
    }
}

/// What a replay delivered to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub exit_code: i32,
    pub bytes: u64,
    /// The caller's output closed before the whole blob was written
    pub caller_closed: bool,
}

/// Fingerprint-keyed store in a local directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Open the store, creating its directory when missing
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        ensure_cache_dir(&dir).fs_context(&dir, "create cache directory")?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn paths(&self, fingerprint: &Fingerprint) -> EntryPaths {
        EntryPaths::new(&self.dir, fingerprint)
    }

    /// Age of the output blob, `None` when absent or unreadable
    pub fn entry_age(&self, fingerprint: &Fingerprint) -> Option<Duration> {
        let output = self.paths(fingerprint).output;
        let modified = fs::metadata(&output).and_then(|m| m.modified()).ok()?;
        // A clock step backwards makes the blob look newer than now
        Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO),
        )
    }

    /// Whether the output blob exists and is no older than `timeout`
    pub fn is_valid(&self, fingerprint: &Fingerprint, timeout: Duration) -> bool {
        matches!(self.entry_age(fingerprint), Some(age) if age <= timeout)
    }

    /// Read the exit record; `None` when missing or not a number
    pub fn read_exit_code(&self, fingerprint: &Fingerprint) -> Option<i32> {
        let exit = self.paths(fingerprint).exit;
        fs::read_to_string(exit).ok()?.trim().parse().ok()
    }

    /// Decide whether the entry can be replayed
    ///
    /// A valid blob with an unreadable exit record is a miss: replaying it
    /// would have to guess the exit code.
    pub fn lookup(&self, fingerprint: &Fingerprint, timeout: Duration) -> CacheLookup {
        let output = self.paths(fingerprint).output;
        let age = match fs::metadata(&output) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return CacheLookup::Miss(MissReason::Absent)
            }
            Err(_) => return CacheLookup::Miss(MissReason::Unreadable),
            Ok(metadata) => match metadata.modified() {
                Ok(modified) => SystemTime::now()
                    .duration_since(modified)
                    .unwrap_or(Duration::ZERO),
                Err(_) => return CacheLookup::Miss(MissReason::Unreadable),
            },
        };

        if age > timeout {
            return CacheLookup::Miss(MissReason::Expired { age });
        }

        match self.read_exit_code(fingerprint) {
            Some(exit_code) => CacheLookup::Hit { exit_code, age },
            None => {
                tracing::warn!(
                    fingerprint = %fingerprint.short(),
                    "Cached output has no readable exit record, re-executing"
                );
                CacheLookup::Miss(MissReason::Unreadable)
            }
        }
    }

    /// Stream the output blob verbatim into `out`
    ///
    /// `exit_code` is the one [`CacheStore::lookup`] reported. A caller that
    /// stops reading (closed pipe) ends the replay early without an error.
    pub async fn replay<W>(
        &self,
        fingerprint: &Fingerprint,
        exit_code: i32,
        out: &mut W,
    ) -> Result<ReplayOutcome>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let output = self.paths(fingerprint).output;
        let mut file = tokio::fs::File::open(&output)
            .await
            .fs_context(&output, "open cached output")?;

        let mut buffer = vec![0u8; REPLAY_CHUNK_SIZE];
        let mut bytes = 0u64;
        loop {
            let n = file
                .read(&mut buffer)
                .await
                .fs_context(&output, "read cached output")?;
            if n == 0 {
                break;
            }
            match out.write_all(&buffer[..n]).await {
                Ok(()) => bytes += n as u64,
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    return Ok(ReplayOutcome {
                        exit_code,
                        bytes,
                        caller_closed: true,
                    })
                }
                Err(e) => return Err(Error::file_system("<stdout>", "write cached output to", e)),
            }
        }

        let caller_closed = match out.flush().await {
            Ok(()) => false,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => true,
            Err(e) => return Err(Error::file_system("<stdout>", "flush", e)),
        };

        Ok(ReplayOutcome {
            exit_code,
            bytes,
            caller_closed,
        })
    }

    /// Remove the output blob so the next lookup misses
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> Result<()> {
        let output = self.paths(fingerprint).output;
        match fs::remove_file(&output) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::file_system(output, "remove cached output", e)),
        }
    }

    /// Write the command record unless one already exists
    pub fn record_command(&self, fingerprint: &Fingerprint, spec: &CommandSpec) -> Result<()> {
        let command = self.paths(fingerprint).command;
        if command.is_file() {
            return Ok(());
        }
        write_atomic_string(&command, &spec.to_string())
    }

    /// Start a new entry for `fingerprint`
    pub async fn writer(&self, fingerprint: &Fingerprint) -> Result<EntryWriter> {
        EntryWriter::create(self.paths(fingerprint)).await
    }
}
