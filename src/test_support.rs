//! Test fixtures shared by this crate's `#[cfg(test)]` modules.
//!
//! A temp-database helper plus small factories for tags and on-disk fixture
//! trees, so individual test modules stay focused on what they're actually
//! exercising.

use std::fs;
use std::path::Path;

use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use crate::metadata::Tags;

/// Creates a temporary SQLite database with migrations applied.
///
/// Keep the returned `TempDir` alive for the duration of your test; the
/// database file is deleted when it drops.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("failed to initialize test database");

    (pool, dir)
}

/// Build `{root}/{relative}` with the given byte contents, creating parent
/// directories as needed.
pub fn write_file(root: &Path, relative: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

/// A mock tag set with sensible defaults, overridable via struct update
/// syntax.
pub fn mock_tags() -> Tags {
    Tags {
        artist: "Test Artist".into(),
        album_artist: "Test Artist".into(),
        album: "Test Album".into(),
        compilation: false,
        mbz_artist_id: String::new(),
        mbz_album_artist_id: String::new(),
        mbz_album_id: String::new(),
        file_path: "/test/song.mp3".into(),
        title: "Test Song".into(),
        track_number: Some(1),
    }
}
