//! Walker / producer.
//!
//! Recursively enumerates directories under a library root, invoking the
//! folder loader for each one and pushing the resulting [`FolderEntry`]
//! onto a channel. A single unreadable directory never aborts the library
//! walk; a library is walked single-threaded and sequentially relative to
//! other libraries.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::context::ScanContext;
use super::folder::{load_folder, FolderEntry};
use crate::error::Error;

/// Walk `ctx.library` and push every visited folder onto `tx`.
///
/// Returns `Ok(())` when the walk completes normally, or `Err(Error::Cancelled)`
/// if `cancel` fired before the walk finished. Per-directory faults
/// (`PathUnreadable`, `EntryInvalid`) are logged and absorbed — they never
/// appear in the return value.
pub async fn walk_library(
    ctx: Arc<ScanContext>,
    tx: mpsc::Sender<FolderEntry>,
    follow_symlinks: bool,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let root = PathBuf::from(&ctx.library.path);
    let mut queue: VecDeque<PathBuf> = VecDeque::from([root]);
    let mut visited: HashSet<PathBuf> = HashSet::new();

    while let Some(path) = queue.pop_front() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let canonical = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if !visited.insert(canonical) {
            tracing::warn!(target: "scanner::walker", path = %path.display(), "Symlink loop detected, skipping");
            continue;
        }

        let folder_id = crate::ids::folder_id(&ctx.library, &path.to_string_lossy());
        let db_last_update = ctx.last_updated_in_db(&folder_id).await;

        let library = ctx.library.clone();
        let path_clone = path.clone();
        let load_result = tokio::task::spawn_blocking(move || {
            load_folder(&library, &path_clone, db_last_update, follow_symlinks)
        })
        .await;

        let (entry, children) = match load_result {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                tracing::warn!(target: "scanner::walker", path = %path.display(), error = %e, "Scanner: Error walking path");
                continue;
            }
            Err(join_err) => {
                tracing::error!(target: "scanner::walker", path = %path.display(), error = %join_err, "Folder loader task panicked");
                continue;
            }
        };

        for child in children {
            queue.push_back(child);
        }

        if tx.send(entry).await.is_err() {
            // Receiver dropped: downstream pipeline is shutting down.
            return Ok(());
        }
    }

    Ok(())
}
