//! medquery CLI entry point

use anyhow::Context;
use clap::Parser;
use medquery::cli::{Cli, Commands};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_env("MEDQUERY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => medquery::cli::serve::run(args)
            .await
            .context("server exited with an error"),
        Commands::Ask(args) => medquery::cli::ask::run(args)
            .await
            .context("failed to answer question"),
    }
}
