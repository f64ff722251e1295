//! Extension traits for error handling

use super::types::{Error, Result};
use std::path::Path;

/// Extension trait for attaching file context to io results
pub trait ResultExt<T> {
    /// Attach the path and operation that failed
    fn fs_context(self, path: &Path, operation: &str) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, path: &Path, operation: &str) -> Result<T> {
        self.map_err(|e| Error::file_system(path, operation, e))
    }
}
