//! Audio file tag extraction — the scanner's one external collaborator for
//! reading file contents.
//!
//! Uses the `lofty` crate for format-independent metadata access.

use std::collections::HashMap;
use std::path::Path;

use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};

/// Tags read from one audio file.
///
/// All accessors return the empty string / zero value when the underlying
/// tag is absent, so downstream code ([`crate::ids`]) never has to special-case
/// missing fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags {
    pub artist: String,
    pub album_artist: String,
    pub album: String,
    pub compilation: bool,
    pub mbz_artist_id: String,
    pub mbz_album_artist_id: String,
    pub mbz_album_id: String,
    pub file_path: String,
    pub title: String,
    pub track_number: Option<u32>,
}

/// Error reading tags from one file; always a soft error.
#[derive(Debug, thiserror::Error)]
#[error("failed to read tags from {path}: {message}")]
pub struct ExtractError {
    pub path: std::path::PathBuf,
    pub message: String,
}

/// Extract tags from a single file path.
pub fn extract_one(path: &Path) -> Result<Tags, ExtractError> {
    let err = |message: String| ExtractError {
        path: path.to_path_buf(),
        message,
    };

    let tagged_file = Probe::open(path)
        .map_err(|e| err(e.to_string()))?
        .read()
        .map_err(|e| err(e.to_string()))?;

    let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());

    let get = |key: ItemKey| -> String {
        tag.and_then(|t| t.get_string(&key))
            .unwrap_or_default()
            .to_string()
    };

    Ok(Tags {
        artist: tag.and_then(|t| t.artist()).unwrap_or_default().to_string(),
        album_artist: get(ItemKey::AlbumArtist),
        album: tag.and_then(|t| t.album()).unwrap_or_default().to_string(),
        compilation: get(ItemKey::FlagCompilation) == "1",
        mbz_artist_id: get(ItemKey::MusicBrainzArtistId),
        mbz_album_artist_id: get(ItemKey::MusicBrainzReleaseArtistId),
        mbz_album_id: get(ItemKey::MusicBrainzReleaseId),
        file_path: path.to_string_lossy().to_string(),
        title: tag.and_then(|t| t.title()).unwrap_or_default().to_string(),
        track_number: tag.and_then(|t| t.track()),
    })
}

/// Extract tags from a batch of paths.
///
/// A file that fails to parse is simply omitted from the result map; the
/// caller (the folder processor) decides how to treat a short result.
pub fn extract(paths: &[std::path::PathBuf]) -> HashMap<std::path::PathBuf, Tags> {
    paths
        .iter()
        .filter_map(|p| extract_one(p).ok().map(|t| (p.clone(), t)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_one_on_missing_file_is_a_soft_error() {
        let err = extract_one(Path::new("/nonexistent/path/does/not/exist.mp3")).unwrap_err();
        assert!(err.to_string().contains("exist.mp3"));
    }

    #[test]
    fn extract_skips_unreadable_files_without_panicking() {
        let result = extract(&[std::path::PathBuf::from("/nonexistent/file.mp3")]);
        assert!(result.is_empty());
    }
}
