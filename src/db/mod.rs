//! Data store for library, folder, media-file, album, and artist
//! persistence.
//!
//! Uses SQLx with SQLite for lightweight, embedded storage. All operations
//! are idempotent and keyed by the deterministic IDs from [`crate::ids`],
//! so they are safe to call concurrently from the folder-processor worker
//! pool.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::model::{Album, Artist, Folder, Library, MediaFile};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "libromaid.db";

/// Build a SQLite database URL from an optional path.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

// ---------------------------------------------------------------------
// Library repository
// ---------------------------------------------------------------------

/// `Library.GetAll()`.
pub async fn get_all_libraries(pool: &SqlitePool) -> sqlx::Result<Vec<Library>> {
    sqlx::query_as::<_, Library>(
        "SELECT id, name, path, remote_path, last_scan_at, updated_at, created_at FROM library",
    )
    .fetch_all(pool)
    .await
}

/// `Library.Get(id)`.
pub async fn get_library(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Library>> {
    sqlx::query_as::<_, Library>(
        "SELECT id, name, path, remote_path, last_scan_at, updated_at, created_at FROM library WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// `Library.UpdateLastScan(id, time)` — only called after a library's
/// walker finishes successfully.
pub async fn update_last_scan(pool: &SqlitePool, id: i64, t: DateTime<Utc>) -> sqlx::Result<()> {
    sqlx::query("UPDATE library SET last_scan_at = ? WHERE id = ?")
        .bind(t)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Ensure the well-known root library (id 1) exists, for single-folder
/// compatibility mode.
pub async fn ensure_default_library(pool: &SqlitePool, path: &str) -> sqlx::Result<Library> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM library WHERE id = 1")
        .fetch_optional(pool)
        .await?;

    if row.is_none() {
        sqlx::query(
            "INSERT INTO library (id, name, path, remote_path, updated_at, created_at) VALUES (1, 'Music Library', ?, '', ?, ?)",
        )
        .bind(path)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(pool)
        .await?;
    } else {
        sqlx::query("UPDATE library SET path = ?, updated_at = ? WHERE id = 1")
            .bind(path)
            .bind(Utc::now())
            .execute(pool)
            .await?;
    }

    Ok(get_library(pool, 1).await?.expect("just inserted or updated"))
}

/// Insert a library configured via `config::LibraryConfig`, or update it in
/// place if the name/path already exists — the same `ON CONFLICT ...
/// excluded` idiom the original design's `libraryRepository.Put` uses.
pub async fn put_library(
    pool: &SqlitePool,
    name: &str,
    path: &str,
    remote_path: &str,
) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO library (name, path, remote_path, updated_at, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            name = excluded.name,
            remote_path = excluded.remote_path,
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(path)
    .bind(remote_path)
    .bind(Utc::now())
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

// ---------------------------------------------------------------------
// Folder repository
// ---------------------------------------------------------------------

/// `Folder.GetLastUpdates(lib)` — the single per-library query issued at
/// scan-context construction.
pub async fn get_folder_last_updates(
    pool: &SqlitePool,
    library_id: i64,
) -> sqlx::Result<HashMap<String, DateTime<Utc>>> {
    let rows: Vec<(String, DateTime<Utc>)> =
        sqlx::query_as("SELECT id, updated_at FROM folder WHERE library_id = ?")
            .bind(library_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().collect())
}

/// `Folder.Put(lib, path)` — upsert the folder row itself.
pub async fn put_folder(pool: &SqlitePool, folder: &Folder) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO folder (id, library_id, parent_id, path, name, updated_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            path = excluded.path,
            name = excluded.name,
            parent_id = excluded.parent_id
        "#,
    )
    .bind(&folder.id)
    .bind(folder.library_id)
    .bind(&folder.parent_id)
    .bind(&folder.path)
    .bind(&folder.name)
    .bind(folder.updated_at)
    .bind(folder.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// `Folder.Touch(lib, path, t)` — advance a folder's `updated_at` once it
/// has been successfully processed.
pub async fn touch_folder(pool: &SqlitePool, folder_id: &str, t: DateTime<Utc>) -> sqlx::Result<()> {
    sqlx::query("UPDATE folder SET updated_at = ? WHERE id = ?")
        .bind(t)
        .bind(folder_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------
// Media-file repository
// ---------------------------------------------------------------------

/// `MediaFile.GetByFolder(folderID)`.
pub async fn get_media_files_by_folder(
    pool: &SqlitePool,
    folder_id: &str,
) -> sqlx::Result<Vec<MediaFile>> {
    sqlx::query_as::<_, MediaFile>(
        r#"
        SELECT id, folder_id, path, album_pid, track_pid, title, artist, album,
               track_number, updated_at, created_at, missing
        FROM media_file WHERE folder_id = ? AND missing = 0
        "#,
    )
    .bind(folder_id)
    .fetch_all(pool)
    .await
}

/// Insert or update one media-file row.
///
/// A file is identified two ways that can each go stale independently:
/// `(folder_id, path)` is the on-disk identity the reconciler matches
/// against, while `track_pid` is the content-derived identity (it embeds
/// `album_pid`, so editing a track's album/artist tags changes it even
/// though the file's path doesn't move). Re-importing an edited track
/// keeps the old `(folder_id, path)` row and gives it a new `track_pid`,
/// so the upsert must resolve a conflict on *either* key in place rather
/// than only on `track_pid` — otherwise the insert collides with the
/// surviving `(folder_id, path)` row and fails.
pub async fn upsert_media_file(pool: &SqlitePool, mf: &MediaFile) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO media_file
            (folder_id, path, album_pid, track_pid, title, artist, album, track_number,
             updated_at, created_at, missing)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
        ON CONFLICT(folder_id, path) DO UPDATE SET
            album_pid = excluded.album_pid,
            track_pid = excluded.track_pid,
            title = excluded.title,
            artist = excluded.artist,
            album = excluded.album,
            track_number = excluded.track_number,
            updated_at = excluded.updated_at,
            missing = 0
        ON CONFLICT(track_pid) DO UPDATE SET
            folder_id = excluded.folder_id,
            path = excluded.path,
            album_pid = excluded.album_pid,
            title = excluded.title,
            artist = excluded.artist,
            album = excluded.album,
            track_number = excluded.track_number,
            updated_at = excluded.updated_at,
            missing = 0
        RETURNING id
        "#,
    )
    .bind(&mf.folder_id)
    .bind(&mf.path)
    .bind(&mf.album_pid)
    .bind(&mf.track_pid)
    .bind(&mf.title)
    .bind(&mf.artist)
    .bind(&mf.album)
    .bind(mf.track_number)
    .bind(mf.updated_at)
    .bind(mf.created_at)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Mark the given media-file rows missing.
pub async fn mark_missing(pool: &SqlitePool, track_pids: &[String]) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    for pid in track_pids {
        sqlx::query("UPDATE media_file SET missing = 1 WHERE track_pid = ?")
            .bind(pid)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

// ---------------------------------------------------------------------
// Album / artist upserts
// ---------------------------------------------------------------------

/// Upsert one album aggregate, replacing `song_count` with this call's
/// count rather than accumulating it.
///
/// The folder processor recomputes a folder's full contribution to an
/// album on every run that touches it (including every file on a full
/// rescan), so summing into the stored count would double it each time
/// the same folder is reprocessed. Replacing keeps repeated runs over
/// unchanged content idempotent.
pub async fn upsert_album(pool: &SqlitePool, album: &Album, song_count: i64) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO album (id, name, artist_pid, artist, compilation, song_count)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            artist_pid = excluded.artist_pid,
            artist = excluded.artist,
            compilation = excluded.compilation,
            song_count = excluded.song_count
        "#,
    )
    .bind(&album.id)
    .bind(&album.name)
    .bind(&album.artist_pid)
    .bind(&album.artist)
    .bind(album.compilation)
    .bind(song_count)
    .execute(pool)
    .await?;
    Ok(())
}

/// Upsert one artist aggregate, replacing `song_count` for the same
/// idempotence reason as [`upsert_album`].
pub async fn upsert_artist(pool: &SqlitePool, artist: &Artist, song_count: i64) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO artist (id, name, song_count)
        VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            song_count = excluded.song_count
        "#,
    )
    .bind(&artist.id)
    .bind(&artist.name)
    .bind(song_count)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_db;

    #[tokio::test]
    async fn test_init_db_creates_database() {
        let (pool, _dir) = temp_db().await;
        let libs = get_all_libraries(&pool).await.unwrap();
        assert!(libs.is_empty());
    }

    #[tokio::test]
    async fn test_put_library_is_idempotent_on_path() {
        let (pool, _dir) = temp_db().await;
        let id1 = put_library(&pool, "Main", "/music", "").await.unwrap();
        let id2 = put_library(&pool, "Main Renamed", "/music", "").await.unwrap();
        assert_eq!(id1, id2);

        let lib = get_library(&pool, id1).await.unwrap().unwrap();
        assert_eq!(lib.name, "Main Renamed");
    }

    #[tokio::test]
    async fn test_ensure_default_library_uses_id_one() {
        let (pool, _dir) = temp_db().await;
        let lib = ensure_default_library(&pool, "/music").await.unwrap();
        assert_eq!(lib.id, 1);

        // Calling it again just updates the path, not creates a second row.
        ensure_default_library(&pool, "/music2").await.unwrap();
        let libs = get_all_libraries(&pool).await.unwrap();
        assert_eq!(libs.len(), 1);
        assert_eq!(libs[0].path, "/music2");
    }

    #[tokio::test]
    async fn test_folder_put_and_get_last_updates() {
        let (pool, _dir) = temp_db().await;
        let lib_id = put_library(&pool, "Main", "/music", "").await.unwrap();
        let library = get_library(&pool, lib_id).await.unwrap().unwrap();

        let folder = Folder::new(&library, "/music/Artist");
        put_folder(&pool, &folder).await.unwrap();

        let updates = get_folder_last_updates(&pool, lib_id).await.unwrap();
        assert!(updates.contains_key(&folder.id));
    }

    #[tokio::test]
    async fn test_touch_folder_advances_updated_at() {
        let (pool, _dir) = temp_db().await;
        let lib_id = put_library(&pool, "Main", "/music", "").await.unwrap();
        let library = get_library(&pool, lib_id).await.unwrap().unwrap();
        let folder = Folder::new(&library, "/music/Artist");
        put_folder(&pool, &folder).await.unwrap();

        let future = Utc::now() + chrono::Duration::days(1);
        touch_folder(&pool, &folder.id, future).await.unwrap();

        let updates = get_folder_last_updates(&pool, lib_id).await.unwrap();
        assert_eq!(updates[&folder.id], future);
    }

    #[tokio::test]
    async fn test_upsert_and_mark_missing_media_file() {
        let (pool, _dir) = temp_db().await;
        let lib_id = put_library(&pool, "Main", "/music", "").await.unwrap();
        let library = get_library(&pool, lib_id).await.unwrap().unwrap();
        let folder = Folder::new(&library, "/music/Artist");
        put_folder(&pool, &folder).await.unwrap();

        let mf = MediaFile {
            id: 0,
            folder_id: folder.id.clone(),
            path: "song.mp3".into(),
            album_pid: "abc".into(),
            track_pid: "abc-track".into(),
            title: "Song".into(),
            artist: "Artist".into(),
            album: "Album".into(),
            track_number: Some(1),
            updated_at: Utc::now(),
            created_at: Utc::now(),
            missing: false,
        };
        upsert_media_file(&pool, &mf).await.unwrap();

        let files = get_media_files_by_folder(&pool, &folder.id).await.unwrap();
        assert_eq!(files.len(), 1);

        mark_missing(&pool, &["abc-track".to_string()]).await.unwrap();
        let files = get_media_files_by_folder(&pool, &folder.id).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_media_file_handles_track_pid_change_on_same_path() {
        // Retagging a file changes its album_pid (and therefore track_pid)
        // while its on-disk path is unchanged. The reconciler re-imports it
        // under the new track_pid without first deleting the old row, so
        // the upsert must resolve the (folder_id, path) collision in place
        // rather than fail with a UNIQUE violation.
        let (pool, _dir) = temp_db().await;
        let lib_id = put_library(&pool, "Main", "/music", "").await.unwrap();
        let library = get_library(&pool, lib_id).await.unwrap().unwrap();
        let folder = Folder::new(&library, "/music/Artist");
        put_folder(&pool, &folder).await.unwrap();

        let mut mf = MediaFile {
            id: 0,
            folder_id: folder.id.clone(),
            path: "song.mp3".into(),
            album_pid: "album-old".into(),
            track_pid: "album-old-track".into(),
            title: "Song".into(),
            artist: "Artist".into(),
            album: "Album".into(),
            track_number: Some(1),
            updated_at: Utc::now(),
            created_at: Utc::now(),
            missing: false,
        };
        upsert_media_file(&pool, &mf).await.unwrap();

        mf.album_pid = "album-new".into();
        mf.track_pid = "album-new-track".into();
        mf.album = "Retagged Album".into();
        upsert_media_file(&pool, &mf).await.unwrap();

        let files = get_media_files_by_folder(&pool, &folder.id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].track_pid, "album-new-track");
        assert_eq!(files[0].album, "Retagged Album");
    }

    #[tokio::test]
    async fn test_album_song_count_is_replaced_not_accumulated() {
        let (pool, _dir) = temp_db().await;
        let album = Album {
            id: "album1".into(),
            name: "Y".into(),
            artist_pid: "artist1".into(),
            artist: "X".into(),
            compilation: false,
            song_count: 0,
        };
        // A second upsert with a smaller count (e.g. a track removed from
        // the folder, or a full rescan of the same unchanged folder) must
        // land exactly, not add on top of the previous run's count.
        upsert_album(&pool, &album, 2).await.unwrap();
        upsert_album(&pool, &album, 3).await.unwrap();

        let row: (i64,) = sqlx::query_as("SELECT song_count FROM album WHERE id = ?")
            .bind("album1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 3);
    }

    #[tokio::test]
    async fn test_put_folder_accepts_child_before_parent_row_exists() {
        // Folders are processed concurrently with no guaranteed ordering
        // (spec §5), so a child's row can land before its parent's.
        // parent_id must not be an enforced FK or this would fail.
        let (pool, _dir) = temp_db().await;
        let lib_id = put_library(&pool, "Main", "/music", "").await.unwrap();
        let library = get_library(&pool, lib_id).await.unwrap().unwrap();

        let child = Folder::new(&library, "/music/Artist/Album");
        put_folder(&pool, &child).await.unwrap();

        let parent = Folder::new(&library, "/music/Artist");
        assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
        put_folder(&pool, &parent).await.unwrap();
    }

    #[tokio::test]
    async fn test_library_delete_cascades_to_folder_and_media_file() {
        let (pool, _dir) = temp_db().await;
        let lib_id = put_library(&pool, "Main", "/music", "").await.unwrap();
        let library = get_library(&pool, lib_id).await.unwrap().unwrap();
        let folder = Folder::new(&library, "/music/Artist");
        put_folder(&pool, &folder).await.unwrap();

        sqlx::query("DELETE FROM library WHERE id = ?")
            .bind(lib_id)
            .execute(&pool)
            .await
            .unwrap();

        let updates = get_folder_last_updates(&pool, lib_id).await.unwrap();
        assert!(updates.is_empty());
    }
}
