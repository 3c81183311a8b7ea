//! Command-line interface for the scanner.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use crate::config;
use crate::db;
use crate::error::Error;
use crate::scanner::Scanner;

/// Incremental media library scanner.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Scan every configured library for changes.
    Scan {
        /// Ignore persisted folder timestamps and reprocess every folder.
        #[arg(long)]
        full: bool,
    },
    /// Add a library root to the configuration.
    AddLibrary {
        /// Display name for the library.
        name: String,
        /// Absolute filesystem root to scan.
        path: PathBuf,
        /// Prefix used by external consumers to rewrite URLs.
        #[arg(long, default_value = "")]
        remote_path: String,
    },
    /// Print the status of the last (or currently running) scan.
    Status,
}

/// Run the requested subcommand to completion.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    match &cli.command {
        Commands::Scan { full } => cmd_scan(&rt, *full),
        Commands::AddLibrary {
            name,
            path,
            remote_path,
        } => cmd_add_library(name, path, remote_path),
        Commands::Status => cmd_status(&rt),
    }
}

fn cmd_scan(rt: &Runtime, full: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let cfg = config::load();
        if cfg.libraries.is_empty() {
            println!("No libraries configured. Use `add-library` first.");
            return Ok(());
        }

        let db_url = db::db_url(cfg.db_path.as_deref());
        let pool = db::init_db(&db_url).await?;

        for lib in &cfg.libraries {
            db::put_library(&pool, &lib.name, &lib.path.to_string_lossy(), &lib.remote_path).await?;
        }

        let scanner = Arc::new(Scanner::new(pool, cfg.scanner.workers, cfg.scanner.follow_symlinks));
        println!(
            "Scanning {} librar{}... (press Ctrl+C to cancel)",
            cfg.libraries.len(),
            if cfg.libraries.len() == 1 { "y" } else { "ies" }
        );

        // A cooperative cancel: signal the in-flight run rather than
        // aborting it, so the current folder finishes writing before the
        // run unwinds (spec's cancellation-safety requirement).
        let for_signal = scanner.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!(target: "cli", "Ctrl+C received, cancelling scan");
                for_signal.cancel();
            }
        });

        match scanner.rescan_all(full || cfg.scanner.full_rescan).await {
            Ok(()) => {}
            Err(Error::Cancelled) => {
                println!("Scan cancelled.");
                return anyhow::Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let status = scanner.status();
        println!(
            "Scan complete in {}ms: {} folders walked, {} processed, {} tracks imported, {} missing",
            status.duration().map(|d| d.num_milliseconds()).unwrap_or(0),
            status.counts.walked,
            status.counts.processed,
            status.counts.imported,
            status.counts.missing
        );
        anyhow::Ok(())
    })
}

fn cmd_add_library(name: &str, path: &Path, remote_path: &str) -> anyhow::Result<()> {
    let mut cfg = config::load();
    cfg.libraries.push(config::LibraryConfig {
        name: name.to_string(),
        path: path.to_path_buf(),
        remote_path: remote_path.to_string(),
    });
    config::save(&cfg)?;
    println!("Added library {name:?} at {path:?}");
    Ok(())
}

fn cmd_status(rt: &Runtime) -> anyhow::Result<()> {
    rt.block_on(async {
        let cfg = config::load();
        let db_url = db::db_url(cfg.db_path.as_deref());
        let pool = db::init_db(&db_url).await?;

        let libraries = db::get_all_libraries(&pool).await?;
        if libraries.is_empty() {
            println!("No libraries configured.");
            return anyhow::Ok(());
        }

        for library in libraries {
            match library.last_scan_at {
                Some(t) => println!("{}: last scanned {}", library.name, t),
                None => println!("{}: never scanned", library.name),
            }
        }
        anyhow::Ok(())
    })
}
