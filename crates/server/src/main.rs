use clap::Parser;
use std::process::ExitCode;
use ucss_server::cli::{Cli, run};

#[tokio::main]
async fn main() -> ExitCode {
    ucss_server::init_tracing();
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "command failed");
            ExitCode::FAILURE
        },
    }
}
