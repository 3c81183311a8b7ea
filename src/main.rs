//! Incremental media-library scanner.
//!
//! Walks configured library roots, reconciles what's on disk against the
//! media-file catalog in SQLite, and keeps the catalog up to date without
//! ever re-reading a folder that hasn't changed since the last run.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod metadata;
pub mod model;
pub mod scanner;
#[cfg(test)]
pub mod test_support;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("libromaid_scanner=info".parse().unwrap()))
        .init();

    cli::run_command(&args)
}
