use crate::cli::Cli;
use runcached_core::{Error, Result};
use runcached_task::Orchestrator;
use std::error::Error as _;

/// Run the invocation described by `cli` and return its process exit code
///
/// Failures are reported as a single brief line on stderr; `--debug` adds
/// the underlying cause.
pub async fn execute(cli: &Cli) -> i32 {
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", report(&e, cli.debug));
            e.exit_code()
        }
    }
}

async fn run(cli: &Cli) -> Result<i32> {
    let config = cli.run_config()?;
    let spec = cli.command_spec()?;
    let orchestrator = Orchestrator::new(config)?;

    let mut stdout = tokio::io::stdout();
    orchestrator.run(&spec, &mut stdout).await
}

fn report(err: &Error, debug: bool) -> String {
    tracing::debug!(error = ?err, "Invocation failed");
    match err.source() {
        Some(cause) if debug => format!("runcached: {err}: {cause}"),
        _ => format!("runcached: {err}"),
    }
}
