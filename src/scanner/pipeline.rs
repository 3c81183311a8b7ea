//! The staged concurrent pipeline: change filter, folder processor, and
//! the runtime that wires both into one run per library.
//!
//! ```text
//! walk(library)              -> folderEntryChan
//!   -> filter(outdated, N)   -> changedChan
//!   -> process(reconcile, N) -> processedChan
//!   -> sink(persist, N)      -> done
//! ```
//!
//! Each stage is a small bounded-channel worker pool (default size from
//! [`crate::config::ScannerConfig::workers`]). Workers share a receiver
//! behind a `tokio::sync::Mutex` so any idle worker can pick up the next
//! item — the simplest fan-out idiom available on top of `tokio::mpsc`,
//! which is itself multi-producer/single-consumer.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::aggregate::{albums_from_tracks, artists_from_tracks};
use super::context::ScanContext;
use super::folder::FolderEntry;
use super::status::StatusTracker;
use super::walker::walk_library;
use crate::error::Error;
use crate::model::{Folder, MediaFile};

/// Channel capacity between stages: `workers * 2`.
fn capacity(workers: usize) -> usize {
    workers.max(1) * 2
}

/// Stateless filter: forward a folder entry iff it's expired or this is a
/// full rescan. Filtering happens after the folder is loaded, so
/// `fs_mtime` already reflects child files.
fn should_process(entry: &FolderEntry, full_rescan: bool) -> bool {
    full_rescan || entry.is_expired()
}

/// Reconcile one folder's on-disk audio files against the DB media-file
/// catalog. Soft failures (DB read error, tag-extraction error) return the
/// entry unprocessed/partial rather than propagating.
async fn process_folder_entry(ctx: &ScanContext, mut entry: FolderEntry) -> FolderEntry {
    let db_tracks = match crate::db::get_media_files_by_folder(&ctx.pool, &entry.folder_id).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(
                target: "scanner::pipeline",
                folder = %entry.full_path.display(),
                error = %e,
                "Scanner: Error loading mediafiles from DB. Skipping"
            );
            return entry;
        }
    };

    let mut by_path: HashMap<String, MediaFile> =
        db_tracks.into_iter().map(|mf| (mf.path.clone(), mf)).collect();

    let mut files_to_import = Vec::new();
    for af in &entry.audio_files {
        let rel_path = af.name.clone();
        match by_path.remove(&rel_path) {
            None => files_to_import.push(af.full_path.clone()),
            Some(db_track) => {
                if ctx.full_rescan || af.mtime > db_track.updated_at {
                    files_to_import.push(af.full_path.clone());
                }
            }
        }
    }
    // What remains is the missing set.
    entry.missing_tracks = by_path.into_values().collect();

    // Extract tags in batches of 100.
    let mut tracks = Vec::new();
    let mut tags_by_track_pid = HashMap::new();
    for chunk in files_to_import.chunks(100) {
        let tags = crate::metadata::extract(chunk);
        if tags.len() < chunk.len() {
            tracing::warn!(
                target: "scanner::pipeline",
                folder = %entry.full_path.display(),
                requested = chunk.len(),
                extracted = tags.len(),
                "Scanner: Error extracting tags for some files in chunk"
            );
        }
        for (path, tag) in tags {
            let rel_path = path
                .strip_prefix(&entry.full_path)
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|_| path.to_string_lossy().to_string());
            let track_pid = crate::ids::track_pid(&tag);
            tracks.push(MediaFile {
                id: 0,
                folder_id: entry.folder_id.clone(),
                path: rel_path,
                album_pid: crate::ids::album_pid(&tag),
                track_pid: track_pid.clone(),
                title: tag.title.clone(),
                artist: tag.artist.clone(),
                album: tag.album.clone(),
                track_number: tag.track_number.map(|n| n as i64),
                updated_at: Utc::now(),
                created_at: Utc::now(),
                missing: false,
            });
            tags_by_track_pid.insert(track_pid, tag);
        }
    }

    entry.albums = albums_from_tracks(&tracks);
    for album in entry.albums.iter_mut() {
        if let Some(tag) = tracks
            .iter()
            .find(|t| t.album_pid == album.id)
            .and_then(|t| tags_by_track_pid.get(&t.track_pid))
        {
            album.artist_pid = crate::ids::album_artist_pid(tag);
        }
    }
    entry.artists = artists_from_tracks(&tracks, |t| {
        tags_by_track_pid
            .get(&t.track_pid)
            .map(crate::ids::artist_pid)
            .unwrap_or_default()
    });
    entry.tracks = tracks;

    entry
}

/// Final step: persist the reconciled folder (upsert folder row, upsert
/// tracks/albums/artists, mark missing tracks, then `Touch` the folder so
/// the change filter converges on the next scan).
async fn persist_folder_entry(ctx: &ScanContext, entry: &FolderEntry) -> Result<(), Error> {
    let folder = Folder::new(&ctx.library, &entry.full_path.to_string_lossy());
    crate::db::put_folder(&ctx.pool, &folder)
        .await
        .map_err(Error::DbWrite)?;

    for track in &entry.tracks {
        let mut t = track.clone();
        t.folder_id = folder.id.clone();
        crate::db::upsert_media_file(&ctx.pool, &t)
            .await
            .map_err(Error::DbWrite)?;
    }

    if !entry.missing_tracks.is_empty() {
        let pids: Vec<String> = entry.missing_tracks.iter().map(|t| t.track_pid.clone()).collect();
        crate::db::mark_missing(&ctx.pool, &pids)
            .await
            .map_err(Error::DbWrite)?;
    }

    for album in &entry.albums {
        crate::db::upsert_album(&ctx.pool, album, album.song_count)
            .await
            .map_err(Error::DbWrite)?;
    }
    for artist in &entry.artists {
        crate::db::upsert_artist(&ctx.pool, artist, artist.song_count)
            .await
            .map_err(Error::DbWrite)?;
    }

    crate::db::touch_folder(&ctx.pool, &folder.id, entry.fs_mtime)
        .await
        .map_err(Error::DbWrite)?;

    Ok(())
}

/// Run the full pipeline for one library: walk, filter, process, persist.
/// Returns the first fatal error encountered, if any.
pub async fn run_library(
    ctx: Arc<ScanContext>,
    workers: usize,
    follow_symlinks: bool,
    status: Arc<StatusTracker>,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let cap = capacity(workers);

    let (walked_tx, walked_rx) = mpsc::channel::<FolderEntry>(cap);
    let (changed_tx, changed_rx) = mpsc::channel::<FolderEntry>(cap);
    let (processed_tx, mut processed_rx) = mpsc::channel::<FolderEntry>(cap);

    let walker_ctx = ctx.clone();
    let walker_cancel = cancel.clone();
    let walker_handle = tokio::spawn(async move {
        walk_library(walker_ctx, walked_tx, follow_symlinks, walker_cancel).await
    });

    // Change filter fan-out.
    let walked_rx = Arc::new(Mutex::new(walked_rx));
    let mut filter_handles = Vec::new();
    for _ in 0..workers.max(1) {
        let walked_rx = walked_rx.clone();
        let changed_tx = changed_tx.clone();
        let full_rescan = ctx.full_rescan;
        let status = status.clone();
        let cancel = cancel.clone();
        filter_handles.push(tokio::spawn(async move {
            loop {
                let entry = {
                    let mut rx = walked_rx.lock().await;
                    rx.recv().await
                };
                let Some(entry) = entry else { break };
                status.record(|c| c.walked += 1);
                if cancel.is_cancelled() {
                    break;
                }
                if should_process(&entry, full_rescan) {
                    status.record(|c| c.filtered += 1);
                    if changed_tx.send(entry).await.is_err() {
                        break;
                    }
                }
            }
        }));
    }
    drop(changed_tx);

    // Folder processor fan-out.
    let changed_rx = Arc::new(Mutex::new(changed_rx));
    let mut process_handles = Vec::new();
    for _ in 0..workers.max(1) {
        let changed_rx = changed_rx.clone();
        let processed_tx = processed_tx.clone();
        let ctx = ctx.clone();
        let cancel = cancel.clone();
        process_handles.push(tokio::spawn(async move {
            loop {
                let entry = {
                    let mut rx = changed_rx.lock().await;
                    rx.recv().await
                };
                let Some(entry) = entry else { break };
                if cancel.is_cancelled() {
                    break;
                }
                let processed = process_folder_entry(&ctx, entry).await;
                if processed_tx.send(processed).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(processed_tx);

    // Sink fan-out: persist each processed folder. The first fatal DB error
    // cancels the run (other in-flight folders finish their current work)
    // and is reported back over an unbounded channel — unbounded so a sink
    // worker sending its error can never block on a receiver that isn't
    // drained until every worker has joined.
    let processed_rx = Arc::new(Mutex::new(processed_rx));
    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<Error>();
    let mut sink_handles = Vec::new();
    for _ in 0..workers.max(1) {
        let processed_rx = processed_rx.clone();
        let ctx = ctx.clone();
        let status = status.clone();
        let cancel = cancel.clone();
        let fatal_tx = fatal_tx.clone();
        sink_handles.push(tokio::spawn(async move {
            loop {
                let entry = {
                    let mut rx = processed_rx.lock().await;
                    rx.recv().await
                };
                let Some(entry) = entry else { break };
                if cancel.is_cancelled() {
                    break;
                }
                match persist_folder_entry(&ctx, &entry).await {
                    Ok(()) => {
                        status.record(|c| {
                            c.processed += 1;
                            c.imported += entry.tracks.len() as u64;
                            c.missing += entry.missing_tracks.len() as u64;
                        });
                    }
                    Err(e) => {
                        tracing::error!(target: "scanner::pipeline", error = %e, "Scanner: fatal error persisting folder");
                        status.record(|c| c.dropped += 1);
                        cancel.cancel();
                        let _ = fatal_tx.send(e);
                        break;
                    }
                }
            }
        }));
    }
    drop(fatal_tx);

    for h in filter_handles {
        let _ = h.await;
    }
    for h in process_handles {
        let _ = h.await;
    }
    for h in sink_handles {
        let _ = h.await;
    }
    let walk_result = walker_handle.await.map_err(|_| Error::Cancelled)?;

    if let Some(e) = fatal_rx.recv().await {
        return Err(e);
    }
    walk_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mock_tags, temp_db, write_file};

    async fn context_for(path: &std::path::Path, full_rescan: bool) -> Arc<ScanContext> {
        let (pool, _dir) = temp_db().await;
        let lib_id = crate::db::put_library(&pool, "Main", &path.to_string_lossy(), "")
            .await
            .unwrap();
        let library = crate::db::get_library(&pool, lib_id).await.unwrap().unwrap();
        ScanContext::new(pool, library, full_rescan).await.unwrap()
    }

    #[test]
    fn should_process_requires_expiry_unless_full_rescan() {
        use crate::model::Library;
        let lib = Library {
            id: 1,
            name: "M".into(),
            path: "/m".into(),
            remote_path: String::new(),
            last_scan_at: None,
            updated_at: Utc::now(),
            created_at: Utc::now(),
        };
        let mut entry = FolderEntry {
            folder_id: crate::ids::folder_id(&lib, "/m/A"),
            full_path: "/m/A".into(),
            db_last_update: Utc::now(),
            fs_mtime: Utc::now() - chrono::Duration::days(1),
            audio_files: vec![],
            image_files: vec![],
            playlists: vec![],
            images_updated_at: chrono::DateTime::<Utc>::UNIX_EPOCH,
            tracks: vec![],
            albums: vec![],
            artists: vec![],
            missing_tracks: vec![],
        };
        assert!(!should_process(&entry, false));
        assert!(should_process(&entry, true));

        entry.fs_mtime = Utc::now() + chrono::Duration::days(1);
        assert!(should_process(&entry, false));
    }

    #[tokio::test]
    async fn empty_library_produces_just_the_root_folder() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_for(dir.path(), false).await;
        let status = Arc::new(StatusTracker::default());
        status.mark_started();

        run_library(ctx.clone(), 2, true, status.clone(), CancellationToken::new())
            .await
            .unwrap();

        let s = status.snapshot();
        assert_eq!(s.counts.processed, 1);
        assert_eq!(s.counts.imported, 0);
    }

    #[tokio::test]
    async fn rescan_of_unchanged_tree_imports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "A/song.mp3", b"not really audio, lofty will fail to parse");

        let ctx = context_for(dir.path(), false).await;
        let status = Arc::new(StatusTracker::default());
        status.mark_started();
        run_library(ctx.clone(), 2, true, status.clone(), CancellationToken::new())
            .await
            .unwrap();

        // Second run over the same, now up-to-date tree should classify
        // every folder as non-expired.
        let ctx2 = ScanContext::new(ctx.pool.clone(), ctx.library.clone(), false)
            .await
            .unwrap();
        let status2 = Arc::new(StatusTracker::default());
        status2.mark_started();
        run_library(ctx2, 2, true, status2.clone(), CancellationToken::new())
            .await
            .unwrap();

        let s2 = status2.snapshot();
        assert_eq!(s2.counts.filtered, 0);
        assert_eq!(s2.counts.processed, 0);
    }

    #[tokio::test]
    async fn missing_file_is_marked_missing_without_touching_others() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = write_file(dir.path(), "A/keep.mp3", b"x");
        let b_path = write_file(dir.path(), "A/remove.mp3", b"y");
        let _ = (&a_path, &b_path);

        let ctx = context_for(dir.path(), false).await;

        // Seed the DB as if these two files were tracks already imported.
        let folder = Folder::new(&ctx.library, &dir.path().join("A").to_string_lossy());
        crate::db::put_folder(&ctx.pool, &folder).await.unwrap();
        for name in ["keep.mp3", "remove.mp3"] {
            let mut tags = mock_tags();
            tags.file_path = name.to_string();
            let mf = MediaFile {
                id: 0,
                folder_id: folder.id.clone(),
                path: name.to_string(),
                album_pid: crate::ids::album_pid(&tags),
                track_pid: crate::ids::track_pid(&tags) + name,
                title: name.to_string(),
                artist: "Artist".into(),
                album: "Album".into(),
                track_number: None,
                updated_at: Utc::now() + chrono::Duration::days(3650),
                created_at: Utc::now(),
                missing: false,
            };
            crate::db::upsert_media_file(&ctx.pool, &mf).await.unwrap();
        }

        std::fs::remove_file(dir.path().join("A/remove.mp3")).unwrap();

        let status = Arc::new(StatusTracker::default());
        status.mark_started();
        run_library(ctx.clone(), 2, true, status.clone(), CancellationToken::new())
            .await
            .unwrap();

        let remaining = crate::db::get_media_files_by_folder(&ctx.pool, &folder.id)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].path, "keep.mp3");
    }
}
