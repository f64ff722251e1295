//! Path utilities for the shared cache directory

use std::fs;
use std::io;
use std::path::Path;

/// Ensure the cache directory exists
///
/// A freshly created directory is owner-only on Unix; an existing directory
/// is left as the administrator set it up.
pub fn ensure_cache_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        let result = fs::DirBuilder::new().recursive(true).mode(0o700).create(dir);
        match result {
            // Lost a creation race with a sibling invocation
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
            other => other,
        }
    }

    #[cfg(not(unix))]
    {
        fs::create_dir_all(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_nested_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("a").join("b");

        ensure_cache_dir(&dir).unwrap();
        assert!(dir.is_dir());

        // Second call is a no-op
        ensure_cache_dir(&dir).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_new_directory_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("cache");
        ensure_cache_dir(&dir).unwrap();

        let mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
