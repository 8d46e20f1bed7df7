use std::process::ExitCode;

use clap::Parser;
use ledger_service::cli::{Cli, report_error};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    cli.init_tracing();
    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_error(&err),
    }
}
