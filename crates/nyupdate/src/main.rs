//! nyupdate CLI: feed-driven download daemon.

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use nyupdate::{CliArgs, Config, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let config = match Config::from_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        update_interval_secs = config.update_interval_secs,
        command = ?config.dispatch.command,
        "Starting nyupdate"
    );

    match nyupdate::run(config, args.once).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("nyupdate failed: {e}");
            ExitCode::FAILURE
        }
    }
}
