/// Constants used throughout the runcached codebase
use std::time::Duration;

// Cache window applied when `--cache-timeout` is not given
pub const DEFAULT_CACHE_TIMEOUT_SECS: f64 = 20.0;

// How long an invocation waits for a live holder of the same command's lock
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5);

// Lock polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// Interpreter used to run the memoized command line
pub const DEFAULT_SHELL: &str = "sh";

// Cache artifact suffixes, appended to the fingerprint stem
pub const OUTPUT_SUFFIX: &str = "data";
pub const EXIT_SUFFIX: &str = "exit";
pub const COMMAND_SUFFIX: &str = "cmd";
pub const LOCK_SUFFIX: &str = "pid";

// Environment variable names
pub const RUNCACHED_CACHE_DIR_VAR: &str = "RUNCACHED_CACHE_DIR";
pub const RUNCACHED_MAX_WAIT_VAR: &str = "RUNCACHED_MAX_WAIT";
pub const RUNCACHED_SHELL_VAR: &str = "RUNCACHED_SHELL";
pub const RUNCACHED_LOCK_VAR: &str = "RUNCACHED_LOCK";
pub const RUNCACHED_JITTER_VAR: &str = "RUNCACHED_JITTER_MS";

// Process exit codes
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_INTERNAL_ERROR: i32 = 1;
pub const EXIT_LOCK_TIMEOUT: i32 = 2;
pub const EXIT_USAGE: i32 = 64;
pub const EXIT_SPAWN_FAILURE: i32 = 127;
pub const EXIT_SIGNAL_BASE: i32 = 128;
