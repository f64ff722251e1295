//! Building the command line handed to the shell

use runcached_core::{CommandSpec, Error, Result};
use std::borrow::Cow;

/// Prefix that folds the command's stderr into its stdout
///
/// Both streams then travel through one pipe, in the order the command
/// produced them.
pub const MERGE_STDERR_PREFIX: &str = "exec 2>&1; ";

/// Quote one element so the shell hands it back as a single word
///
/// NUL cannot be passed through an argv at all, so it is rejected here
/// rather than silently truncating the argument.
pub fn quote(element: &str) -> Result<Cow<'_, str>> {
    if element.contains('\0') {
        return Err(Error::shell_quoting(
            element,
            "arguments cannot contain NUL bytes",
        ));
    }
    Ok(shell_words::quote(element))
}

/// One shell-interpretable line running `spec` with its arguments unchanged
///
/// Every element is quoted, the program name included, so shell syntax in the
/// arguments is never interpreted. Pipelines need an explicit `sh -c '...'`.
pub fn build_command_line(spec: &CommandSpec) -> Result<String> {
    let quoted = spec
        .iter()
        .map(|element| quote(element))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(" "))
}

/// The script passed to `shell -c`
pub fn build_script(spec: &CommandSpec) -> Result<String> {
    Ok(format!("{MERGE_STDERR_PREFIX}{}", build_command_line(spec)?))
}
