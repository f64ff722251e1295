//! The command being memoized

use crate::errors::{Error, Result};
use std::fmt;
use std::ops::Deref;

/// Program name followed by its arguments, exactly as the caller passed them
///
/// A `CommandSpec` is never empty and never changes after construction. It is
/// the only input to fingerprinting and to building the shell command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandSpec(Vec<String>);

impl CommandSpec {
    /// Create a command specification, rejecting an empty sequence
    pub fn new<I, S>(parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        if parts.is_empty() {
            return Err(Error::invalid_command("no command given"));
        }
        Ok(Self(parts))
    }

    /// The program name
    #[must_use]
    pub fn program(&self) -> &str {
        &self.0[0]
    }

    /// Arguments after the program name
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.0[1..]
    }

    /// All elements, program first
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Deref for CommandSpec {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Space-joined form, used for the command record and log lines
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}
