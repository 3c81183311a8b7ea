//! Scan context.
//!
//! Constructed once per (library, run). At construction it issues a single
//! query to the folder repository for the entire `folder ID → last-update`
//! mapping of that library, and stores it. The mapping is read-only for the
//! rest of the run — the `RwLock` around it exists for forward
//! compatibility only; nothing ever writes to it again.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::model::Library;

/// Per-library, per-run state shared by every folder entry produced while
/// walking that library.
pub struct ScanContext {
    pub library: Library,
    pub pool: SqlitePool,
    pub start_time: DateTime<Utc>,
    pub full_rescan: bool,
    last_updates: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl ScanContext {
    /// Preload the folder → last-update mapping for `library` and build a
    /// context around it.
    pub async fn new(
        pool: SqlitePool,
        library: Library,
        full_rescan: bool,
    ) -> Result<Arc<Self>, sqlx::Error> {
        let last_updates = crate::db::get_folder_last_updates(&pool, library.id).await?;
        Ok(Arc::new(Self {
            library,
            pool,
            start_time: Utc::now(),
            full_rescan,
            last_updates: RwLock::new(last_updates),
        }))
    }

    /// `getLastUpdatedInDB(id)` — zero/epoch time if the folder was never
    /// seen before.
    pub async fn last_updated_in_db(&self, folder_id: &str) -> DateTime<Utc> {
        self.last_updates
            .read()
            .await
            .get(folder_id)
            .copied()
            .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH)
    }
}
