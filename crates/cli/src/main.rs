use clap::error::ErrorKind;
use clap::Parser;
use runcached::Cli;
use runcached_core::{EXIT_SUCCESS, EXIT_USAGE};
use runcached_utils::tracing::Verbosity;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_SUCCESS,
                _ => EXIT_USAGE,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    runcached_utils::tracing::init(Verbosity::from_flags(cli.verbose, cli.debug))
        .map_err(|e| eyre::eyre!("failed to initialise logging: {e}"))?;

    // Lock and staging files are removed if we are interrupted
    runcached_utils::init_cleanup_handler();

    let code = runcached::execute(&cli).await;
    std::process::exit(code);
}
