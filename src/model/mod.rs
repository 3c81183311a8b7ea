//! Core data models for the media library.
//!
//! These map to the five tables the scanner reads and writes:
//! `library`, `folder`, `media_file`, `album`, `artist`.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A configured root directory.
#[derive(Debug, Clone, FromRow)]
pub struct Library {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub remote_path: String,
    /// Timestamp of the last completed scan. `None` means "never scanned".
    pub last_scan_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A directory observed during a scan.
#[derive(Debug, Clone, FromRow)]
pub struct Folder {
    /// 32-character hex ID, see [`crate::ids::folder_id`].
    pub id: String,
    pub library_id: i64,
    /// Parent folder ID; `None` for a library root.
    pub parent_id: Option<String>,
    /// Path relative to the library root, with a trailing separator,
    /// matching `filepath.Split`'s "directory" half.
    pub path: String,
    /// Leaf directory name.
    pub name: String,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Folder {
    /// Build a new folder row for `path` within `library`, splitting it into
    /// a relative parent path and a leaf name the way the original design's
    /// `NewFolder` does (`filepath.Split` equivalent).
    ///
    /// `parent_id` is derived from the parent directory's own `folder_id` so
    /// the self-referential chain can be followed without ever storing an
    /// in-memory pointer — the root folder (whose relative path is empty)
    /// has none.
    pub fn new(library: &Library, path: &str) -> Self {
        let id = crate::ids::folder_id(library, path);
        let relative = path.strip_prefix(library.path.as_str()).unwrap_or(path);
        let relative = relative.trim_start_matches('/');
        let (parent, name) = match relative.rfind('/') {
            Some(idx) => (format!("{}/", &relative[..idx]), relative[idx + 1..].to_string()),
            None => (String::new(), relative.to_string()),
        };
        let parent_id = if relative.is_empty() {
            None
        } else {
            std::path::Path::new(path)
                .parent()
                .map(|p| crate::ids::folder_id(library, &p.to_string_lossy()))
        };
        Self {
            id,
            library_id: library.id,
            parent_id,
            path: parent,
            name,
            updated_at: Utc::now(),
            created_at: Utc::now(),
        }
    }
}

/// A row representing one audio file on disk.
#[derive(Debug, Clone, FromRow)]
pub struct MediaFile {
    pub id: i64,
    pub folder_id: String,
    /// Path relative to the folder.
    pub path: String,
    pub album_pid: String,
    pub track_pid: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub track_number: Option<i64>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// `true` once a scan fails to observe this file on disk.
    pub missing: bool,
}

/// Derived entity keyed by [`crate::ids::album_pid`].
#[derive(Debug, Clone, FromRow, Default)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub artist_pid: String,
    pub artist: String,
    pub compilation: bool,
    pub song_count: i64,
}

/// Derived entity keyed by [`crate::ids::artist_pid`].
#[derive(Debug, Clone, FromRow, Default)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub song_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lib() -> Library {
        Library {
            id: 1,
            name: "Main".into(),
            path: "/music".into(),
            remote_path: String::new(),
            last_scan_at: None,
            updated_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn folder_new_splits_path_and_name() {
        let l = lib();
        let f = Folder::new(&l, "/music/Artist/Album");
        assert_eq!(f.name, "Album");
        assert_eq!(f.path, "Artist/");
    }

    #[test]
    fn folder_new_for_root_has_empty_parent() {
        let l = lib();
        let f = Folder::new(&l, "/music");
        assert_eq!(f.path, "");
        assert_eq!(f.name, "");
        assert!(f.parent_id.is_none());
    }

    #[test]
    fn folder_new_sets_parent_id_to_parent_folder_id() {
        let l = lib();
        let root = Folder::new(&l, "/music");
        let artist = Folder::new(&l, "/music/Artist");
        let album = Folder::new(&l, "/music/Artist/Album");

        assert_eq!(artist.parent_id.as_deref(), Some(root.id.as_str()));
        assert_eq!(album.parent_id.as_deref(), Some(artist.id.as_str()));
    }
}
