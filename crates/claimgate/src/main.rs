//! claimgate CLI entry point

#![warn(clippy::all)]

use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = claimgate::cli::Cli::parse();

    if let Err(e) = cli.execute().await {
        eprintln!("Error [{}]: {e}", e.kind());
        std::process::exit(1);
    }
}
