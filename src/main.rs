//! smartlists - rule-driven smart playlists and collections.
//!
//! Every subcommand is a thin wrapper over [`smartlists::service`]; see
//! `smartlists --help`.

use clap::Parser;
use smartlists::cli;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("smartlists=info".parse()?))
        .init();

    cli::run_command(&args)
}
