//! vaultify command line entry point.

use clap::Parser;
use std::process::ExitCode;
use tracing::error;
use vaultify::{Cli, VaultifyError};
use vaultify_common::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut tracing_config = TracingConfig::default().with_verbosity(cli.verbose);
    if cli.json_logs {
        tracing_config = tracing_config.with_json_output();
    }
    if let Err(e) = init_tracing(&tracing_config) {
        eprintln!("failed to initialise logging: {e}");
    }

    let command = cli.command.name();
    let usage = cli.command.usage();
    match vaultify::commands::execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(VaultifyError::Config(e)) => {
            eprintln!("error: {e}\n\n{usage}");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(command, error = %e, "Command failed");
            eprintln!("{command} failed: {e}");
            ExitCode::FAILURE
        }
    }
}
