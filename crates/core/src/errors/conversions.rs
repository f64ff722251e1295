//! Conversion implementations for error types

use super::types::Error;
use std::path::PathBuf;

// Prefer `Error::file_system` at call sites; this keeps `?` usable on bare io results
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::FileSystem {
            path: PathBuf::new(),
            operation: "perform I/O on".to_string(),
            source: error,
        }
    }
}
