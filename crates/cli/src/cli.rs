use clap::Parser;
use runcached_core::{
    parse_seconds, parse_wait, CommandSpec, Result, RunConfig, DEFAULT_CACHE_TIMEOUT_SECS,
};
use std::path::PathBuf;

/// Run a command and cache its output for a short time
///
/// Repeated calls within the cache timeout replay the previous output and exit
/// code instead of running the command again. Concurrent identical calls wait
/// for the one already running.
#[derive(Debug, Parser)]
#[command(name = "runcached")]
#[command(version, long_about = None)]
pub struct Cli {
    /// Seconds a cached result stays valid (negative means 0)
    #[arg(
        short = 'c',
        long = "cache-timeout",
        value_name = "SECS",
        default_value_t = DEFAULT_CACHE_TIMEOUT_SECS,
        allow_negative_numbers = true
    )]
    pub cache_timeout: f64,

    /// Cache the output even when the command exits non-zero
    #[arg(short = 'e', long)]
    pub cache_on_error: bool,

    /// Cache the output even when the command is killed by a signal
    #[arg(short = 'a', long)]
    pub cache_on_abort: bool,

    /// Report cache hits, misses and lock waits on stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Report cache paths, entry ages and lock holders on stderr
    #[arg(short, long)]
    pub debug: bool,

    /// Seconds to wait for another invocation of the same command
    #[arg(long, value_name = "SECS", allow_negative_numbers = true)]
    pub max_wait: Option<f64>,

    /// Directory holding cached output and lock files
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// POSIX shell used to run the command
    #[arg(long, value_name = "SHELL")]
    pub shell: Option<String>,

    /// The command and its arguments
    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

impl Cli {
    /// Resolve the configuration: environment over defaults, flags over both
    pub fn run_config(&self) -> Result<RunConfig> {
        self.run_config_with_env(|key| std::env::var(key).ok())
    }

    pub fn run_config_with_env<F>(&self, lookup: F) -> Result<RunConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = RunConfig::builder()
            .with_env_lookup(lookup)?
            .cache_timeout(parse_seconds("--cache-timeout", self.cache_timeout)?)
            .cache_on_error(self.cache_on_error)
            .cache_on_abort(self.cache_on_abort)
            .verbose(self.verbose)
            .debug(self.debug);

        if let Some(wait) = self.max_wait {
            builder = builder.max_wait(parse_wait("--max-wait", wait)?);
        }
        if let Some(dir) = &self.cache_dir {
            builder = builder.cache_dir(dir);
        }
        if let Some(shell) = &self.shell {
            builder = builder.shell(shell.as_str());
        }

        builder.build()
    }

    pub fn command_spec(&self) -> Result<CommandSpec> {
        CommandSpec::new(self.command.iter().cloned())
    }
}
