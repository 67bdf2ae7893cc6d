//! `takeoff` binary entrypoint: parses the command-line surface and
//! dispatches to `takeoff_core::cli::run`.

use clap::Parser;
use takeoff_core::cli::Cli;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let code = takeoff_core::cli::run(cli).await;
    std::process::exit(code);
}
