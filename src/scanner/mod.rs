//! Scanner: the public entry point that wires the library loader, scan
//! context, walker, filter, processor and sink into one run.
//!
//! Only one run is ever in flight for a given [`Scanner`] instance — a
//! second call to [`Scanner::rescan_all`] while one is running returns
//! [`crate::error::Error::AlreadyRunning`] rather than queuing or
//! interleaving with it.

pub mod aggregate;
pub mod context;
pub mod folder;
pub mod pipeline;
pub mod status;
pub mod walker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use context::ScanContext;
use status::{StatusInfo, StatusTracker};

/// Owns the database pool and run state for one configured set of
/// libraries. Cheap to clone-by-reference (wrap in `Arc` at the call site);
/// cheap to construct.
pub struct Scanner {
    pool: SqlitePool,
    workers: usize,
    follow_symlinks: bool,
    running: AtomicBool,
    status: Arc<StatusTracker>,
    active_cancel: Mutex<Option<CancellationToken>>,
}

impl Scanner {
    pub fn new(pool: SqlitePool, workers: usize, follow_symlinks: bool) -> Self {
        Self {
            pool,
            workers,
            follow_symlinks,
            running: AtomicBool::new(false),
            status: Arc::new(StatusTracker::default()),
            active_cancel: Mutex::new(None),
        }
    }

    /// Scan every configured library, one at a time, persisting changed
    /// folders as they're processed. Returns once every library has been
    /// walked or the run hit a fatal error.
    ///
    /// Rejects with [`Error::AlreadyRunning`] if a scan is already in
    /// flight on this `Scanner`.
    pub async fn rescan_all(&self, full_rescan: bool) -> Result<(), Error> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        *self.active_cancel.lock().unwrap() = Some(cancel.clone());
        self.status.mark_started();

        let result = self.run_all_libraries(full_rescan, cancel).await;

        *self.active_cancel.lock().unwrap() = None;
        self.running.store(false, Ordering::SeqCst);
        self.status
            .mark_finished(result.as_ref().err().map(|e: &Error| e.to_string()));

        result
    }

    async fn run_all_libraries(&self, full_rescan: bool, cancel: CancellationToken) -> Result<(), Error> {
        let libraries = crate::db::get_all_libraries(&self.pool).await?;
        if libraries.is_empty() {
            tracing::warn!(target: "scanner", "Scanner: no libraries configured, nothing to do");
            return Ok(());
        }

        // Libraries are scanned one at a time; only folders within a
        // library run concurrently.
        for library in libraries {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            tracing::info!(target: "scanner", library = %library.name, "Scanner: starting library scan");
            let ctx = ScanContext::new(self.pool.clone(), library.clone(), full_rescan).await?;

            pipeline::run_library(
                ctx,
                self.workers,
                self.follow_symlinks,
                self.status.clone(),
                cancel.clone(),
            )
            .await?;

            crate::db::update_last_scan(&self.pool, library.id, Utc::now()).await?;
            tracing::info!(target: "scanner", library = %library.name, "Scanner: finished library scan");
        }

        Ok(())
    }

    /// Request cancellation of the run currently in flight, if any. A
    /// no-op when no scan is running.
    pub fn cancel(&self) {
        if let Some(token) = self.active_cancel.lock().unwrap().as_ref() {
            token.cancel();
        }
    }

    /// Snapshot of the current/last run.
    pub fn status(&self) -> StatusInfo {
        self.status.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{temp_db, write_file};

    #[tokio::test]
    async fn rescan_all_is_a_no_op_with_no_libraries() {
        let (pool, _dir) = temp_db().await;
        let scanner = Scanner::new(pool, 2, true);
        scanner.rescan_all(false).await.unwrap();
        assert_eq!(scanner.status().counts.processed, 0);
    }

    #[tokio::test]
    async fn rescan_all_walks_every_configured_library() {
        let (pool, _dir) = temp_db().await;
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        write_file(dir_a.path(), "song.mp3", b"x");
        write_file(dir_b.path(), "song.mp3", b"x");

        crate::db::put_library(&pool, "A", &dir_a.path().to_string_lossy(), "")
            .await
            .unwrap();
        crate::db::put_library(&pool, "B", &dir_b.path().to_string_lossy(), "")
            .await
            .unwrap();

        let scanner = Scanner::new(pool.clone(), 2, true);
        scanner.rescan_all(false).await.unwrap();

        let libs = crate::db::get_all_libraries(&pool).await.unwrap();
        assert!(libs.iter().all(|l| l.last_scan_at.is_some()));
    }

    #[tokio::test]
    async fn a_second_concurrent_rescan_is_rejected() {
        let (pool, _dir) = temp_db().await;
        let scanner = Scanner::new(pool, 2, true);

        // `tokio::join!` polls its futures in argument order; `rescan_all`
        // flips the running flag before its first await point, so the
        // first future always wins the race deterministically here.
        let (first, second) = tokio::join!(scanner.rescan_all(false), scanner.rescan_all(false));

        assert!(first.is_ok());
        assert!(matches!(second, Err(Error::AlreadyRunning)));
    }

    #[tokio::test]
    async fn status_reports_idle_before_any_run() {
        let (pool, _dir) = temp_db().await;
        let scanner = Scanner::new(pool, 2, true);
        assert!(!scanner.status().running);
    }
}
