//! Folder entry data object and folder loader.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::model::{Album, Artist, Library, MediaFile};

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "oga", "opus", "wav", "m4a", "aac", "wma", "ape", "wv", "aiff",
];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];
const PLAYLIST_EXTENSIONS: &[&str] = &["m3u", "m3u8", "pls", "cue"];

fn ext_of(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase())
}

fn is_audio(path: &Path) -> bool {
    ext_of(path).is_some_and(|e| AUDIO_EXTENSIONS.contains(&e.as_str()))
}

fn is_image(path: &Path) -> bool {
    ext_of(path).is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

fn is_playlist(path: &Path) -> bool {
    ext_of(path).is_some_and(|e| PLAYLIST_EXTENSIONS.contains(&e.as_str()))
}

fn to_datetime(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

/// One classified on-disk child (relative file name, full path, mtime).
#[derive(Debug, Clone)]
pub struct ChildFile {
    pub name: String,
    pub full_path: PathBuf,
    pub mtime: DateTime<Utc>,
}

/// In-memory snapshot of one directory at the moment the walker visits it
///.
#[derive(Debug, Clone)]
pub struct FolderEntry {
    pub folder_id: String,
    pub full_path: PathBuf,
    pub db_last_update: DateTime<Utc>,
    pub fs_mtime: DateTime<Utc>,
    pub audio_files: Vec<ChildFile>,
    pub image_files: Vec<ChildFile>,
    pub playlists: Vec<ChildFile>,
    pub images_updated_at: DateTime<Utc>,

    /// Populated by the folder processor; empty right after the folder is
    /// first loaded and walked.
    pub tracks: Vec<MediaFile>,
    pub albums: Vec<Album>,
    pub artists: Vec<Artist>,
    pub missing_tracks: Vec<MediaFile>,
}

impl FolderEntry {
    /// `isExpired()`: `dbLastUpdate < fsMtime`.
    pub fn is_expired(&self) -> bool {
        self.db_last_update < self.fs_mtime
    }
}

/// Load one directory: classify its children and report which subdirectories
/// to descend into. Never fails the whole scan for a single-directory
/// problem — per-entry faults are logged and skipped.
///
/// `path` must already be known to be a directory. `db_last_update` is the
/// value the caller already resolved from the [`crate::scanner::context::ScanContext`]
/// for this folder's ID.
pub fn load_folder(
    library: &Library,
    path: &Path,
    db_last_update: DateTime<Utc>,
    follow_symlinks: bool,
) -> Result<(FolderEntry, Vec<PathBuf>), Error> {
    let path_str = path.to_string_lossy().to_string();
    let folder_id = crate::ids::folder_id(library, &path_str);

    let dir_meta = fs::metadata(path).map_err(|e| Error::PathUnreadable {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let mut mod_time = to_datetime(dir_meta.modified().unwrap_or(SystemTime::UNIX_EPOCH));

    let read_dir = fs::read_dir(path).map_err(|e| Error::PathUnreadable {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // Resilient read: tolerate per-entry errors, bail only if the same
    // error message repeats consecutively (guards against a runaway loop on
    // an unreadable filesystem).
    let mut entries = Vec::new();
    let mut last_err: Option<String> = None;
    for item in read_dir {
        match item {
            Ok(entry) => {
                entries.push(entry);
                last_err = None;
            }
            Err(e) => {
                let msg = e.to_string();
                tracing::warn!(target: "scanner::folder", path = %path.display(), error = %msg, "Error reading directory entry");
                if last_err.as_deref() == Some(msg.as_str()) {
                    break;
                }
                last_err = Some(msg);
            }
        }
    }
    entries.sort_by_key(|e| e.file_name());

    let mut children = Vec::new();
    let mut audio_files = Vec::new();
    let mut image_files = Vec::new();
    let mut playlists = Vec::new();
    let mut images_updated_at = DateTime::<Utc>::UNIX_EPOCH;

    for entry in entries {
        let entry_path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(e) => {
                tracing::warn!(target: "scanner::folder", path = %entry_path.display(), error = %e, "Entry invalid, skipping");
                continue;
            }
        };

        let is_dir = if file_type.is_symlink() {
            if !follow_symlinks {
                continue;
            }
            match fs::metadata(&entry_path) {
                Ok(target_meta) => target_meta.is_dir(),
                Err(e) => {
                    tracing::warn!(target: "scanner::folder", path = %entry_path.display(), error = %e, "Symlink could not be resolved, skipping");
                    continue;
                }
            }
        } else {
            file_type.is_dir()
        };

        if is_dir {
            // Trial open to confirm the directory is actually readable before
            // handing it to the walker.
            match fs::read_dir(&entry_path) {
                Ok(_) => children.push(entry_path),
                Err(e) => {
                    tracing::warn!(target: "scanner::folder", path = %entry_path.display(), error = %e, "Directory unreadable, skipping");
                }
            }
            continue;
        }

        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(target: "scanner::folder", path = %entry_path.display(), error = %e, "Entry invalid, skipping");
                continue;
            }
        };
        let mtime = to_datetime(meta.modified().unwrap_or(SystemTime::UNIX_EPOCH));
        mod_time = mod_time.max(mtime);

        let child = ChildFile {
            name: name.clone(),
            full_path: entry_path.clone(),
            mtime,
        };

        if is_audio(&entry_path) {
            audio_files.push(child);
        } else if is_playlist(&entry_path) {
            playlists.push(child);
        } else if is_image(&entry_path) {
            images_updated_at = images_updated_at.max(mtime);
            image_files.push(child);
        }
    }

    audio_files.sort_by(|a, b| a.name.cmp(&b.name));
    image_files.sort_by(|a, b| a.name.cmp(&b.name));
    playlists.sort_by(|a, b| a.name.cmp(&b.name));

    let entry = FolderEntry {
        folder_id,
        full_path: path.to_path_buf(),
        db_last_update,
        fs_mtime: mod_time,
        audio_files,
        image_files,
        playlists,
        images_updated_at,
        tracks: Vec::new(),
        albums: Vec::new(),
        artists: Vec::new(),
        missing_tracks: Vec::new(),
    };

    Ok((entry, children))
}
