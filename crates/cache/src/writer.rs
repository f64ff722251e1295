//! Staged writes of a cache entry
//!
//! Output is streamed into a hidden sibling of the blob while the command
//! runs. Nothing under the entry's real names changes until
//! [`EntryWriter::commit`], so a concurrent or crashed run never leaves a
//! truncated blob behind.

use crate::store::EntryPaths;
use runcached_core::{Error, Result, ResultExt};
use runcached_utils::{temp_sibling, write_atomic_string, TempFileGuard};
use std::fs;
use std::io;
use std::time::SystemTime;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Summary of a committed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedEntry {
    pub exit_code: i32,
    pub bytes: u64,
}

/// Writer for one execution's output
#[derive(Debug)]
pub struct EntryWriter {
    file: BufWriter<File>,
    staging: TempFileGuard,
    paths: EntryPaths,
    bytes_written: u64,
}

impl EntryWriter {
    /// Create the staging file next to the entry's output blob
    pub async fn create(paths: EntryPaths) -> Result<Self> {
        let staging = TempFileGuard::new(temp_sibling(&paths.output));
        let file = File::create(staging.path())
            .await
            .fs_context(staging.path(), "create staging file")?;

        Ok(Self {
            file: BufWriter::new(file),
            staging,
            paths,
            bytes_written: 0,
        })
    }

    /// Append a chunk of output
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .fs_context(self.staging.path(), "write staging file")?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Publish the staged output together with its exit code
    ///
    /// The old exit record goes first and the new one last: a reader that
    /// sees an exit record always sees the blob it belongs to, and a crash
    /// halfway leaves a blob without a record, which lookups treat as a miss.
    pub async fn commit(mut self, exit_code: i32) -> Result<CommittedEntry> {
        self.file
            .flush()
            .await
            .fs_context(self.staging.path(), "flush staging file")?;

        let file = self.file.into_inner().into_std().await;
        file.set_modified(SystemTime::now())
            .fs_context(self.staging.path(), "set modification time of")?;
        file.sync_all()
            .fs_context(self.staging.path(), "sync staging file")?;
        drop(file);

        match fs::remove_file(&self.paths.exit) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::file_system(&self.paths.exit, "remove exit record", e)),
        }

        fs::rename(self.staging.path(), &self.paths.output)
            .fs_context(&self.paths.output, "rename staging file onto")?;
        self.staging.keep();

        write_atomic_string(&self.paths.exit, &exit_code.to_string())?;

        tracing::debug!(
            output = %self.paths.output.display(),
            bytes = self.bytes_written,
            exit_code,
            "Committed cache entry"
        );

        Ok(CommittedEntry {
            exit_code,
            bytes: self.bytes_written,
        })
    }

    /// Discard the staged output, leaving any previous entry untouched
    pub fn abort(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::store::{CacheLookup, CacheStore};
    use runcached_core::CommandSpec;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (TempDir, CacheStore, crate::Fingerprint) {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::open(temp_dir.path()).unwrap();
        let fp = fingerprint(&CommandSpec::new(["date"]).unwrap());
        (temp_dir, store, fp)
    }

    fn staging_files(store: &CacheStore) -> Vec<String> {
        fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect()
    }

    #[tokio::test]
    async fn test_commit_publishes_blob_and_exit_record() {
        let (_tmp, store, fp) = setup();
        let mut writer = store.writer(&fp).await.unwrap();
        writer.write_chunk(b"Mon Jan  1\n").await.unwrap();
        writer.write_chunk(b"second chunk\n").await.unwrap();

        let committed = writer.commit(0).await.unwrap();
        assert_eq!(committed.bytes, 24);

        let paths = store.paths(&fp);
        assert_eq!(
            fs::read(&paths.output).unwrap(),
            b"Mon Jan  1\nsecond chunk\n"
        );
        assert_eq!(fs::read_to_string(&paths.exit).unwrap(), "0");
        assert!(staging_files(&store).is_empty());
    }

    #[tokio::test]
    async fn test_commit_refreshes_age() {
        let (_tmp, store, fp) = setup();
        let paths = store.paths(&fp);
        fs::write(&paths.output, "stale").unwrap();
        fs::write(&paths.exit, "1").unwrap();
        fs::File::options()
            .write(true)
            .open(&paths.output)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();
        assert!(!store.is_valid(&fp, Duration::from_secs(20)));

        let mut writer = store.writer(&fp).await.unwrap();
        writer.write_chunk(b"fresh").await.unwrap();
        writer.commit(5).await.unwrap();

        assert!(matches!(
            store.lookup(&fp, Duration::from_secs(20)),
            CacheLookup::Hit { exit_code: 5, .. }
        ));
        assert_eq!(fs::read(&paths.output).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_empty_output_commits() {
        let (_tmp, store, fp) = setup();
        let writer = store.writer(&fp).await.unwrap();
        writer.commit(0).await.unwrap();

        assert_eq!(fs::read(store.paths(&fp).output).unwrap(), b"");
        assert!(store.lookup(&fp, Duration::from_secs(20)).is_hit());
    }

    #[tokio::test]
    async fn test_abort_leaves_previous_entry() {
        let (_tmp, store, fp) = setup();
        let paths = store.paths(&fp);
        fs::write(&paths.output, "previous").unwrap();
        fs::write(&paths.exit, "0").unwrap();

        let mut writer = store.writer(&fp).await.unwrap();
        writer.write_chunk(b"partial").await.unwrap();
        writer.abort();

        assert_eq!(fs::read(&paths.output).unwrap(), b"previous");
        assert!(staging_files(&store).is_empty());
    }
}
