//! Deterministic, content-derived identifiers.
//!
//! Every function here is pure: given the same library/path/tags it always
//! returns the same string. That's what lets a second scan of an unchanged
//! tree recognize every folder and track it has already seen, and what lets
//! a file that moved within a library keep resolving to the same album and
//! artist rows.
//!
//! Collisions are accepted: these are content-addressing keys, not security
//! tokens, so plain MD5 is enough.

use crate::metadata::Tags;
use crate::model::Library;

fn hex_md5(data: &str) -> String {
    format!("{:x}", md5::compute(data.as_bytes()))
}

/// Derive the folder ID for `path` within `library`.
///
/// `path` is the full filesystem path to the directory; the library's root
/// prefix is stripped (without further normalization) before hashing, so
/// `folder_id(lib, &lib.path)` is stable and names the "root folder".
pub fn folder_id(library: &Library, path: &str) -> String {
    let relative = path.strip_prefix(library.path.as_str()).unwrap_or(path);
    hex_md5(&format!("{}:{}", library.id, relative))
}

/// `"M" + id` is a discriminator domain so a MusicBrainz ID can never
/// collide with a plain name of the same text.
fn mbz_or(name: &str, mbz_id: &str) -> String {
    if !name.is_empty() {
        name.to_string()
    } else {
        format!("M{mbz_id}")
    }
}

/// Persistent ID of the track's artist.
pub fn artist_pid(tags: &Tags) -> String {
    hex_md5(&mbz_or(&tags.artist, &tags.mbz_artist_id))
}

/// Persistent ID of the track's album artist.
pub fn album_artist_pid(tags: &Tags) -> String {
    hex_md5(&mbz_or(&tags.album_artist, &tags.mbz_album_artist_id))
}

fn bool_text(b: bool) -> &'static str {
    if b { "true" } else { "false" }
}

/// Persistent ID of the track's album.
pub fn album_pid(tags: &Tags) -> String {
    let key = if !tags.mbz_album_id.is_empty() {
        format!("M{}", tags.mbz_album_id)
    } else {
        format!(
            "{}{}{}",
            album_artist_pid(tags),
            tags.album,
            bool_text(tags.compilation)
        )
    };
    hex_md5(&key)
}

/// Persistent ID of the track itself: the album PID followed by the hex
/// digest of the file path, giving a 64-hex-char deterministic string.
pub fn track_pid(tags: &Tags) -> String {
    format!("{}{}", album_pid(tags), hex_md5(&tags.file_path))
}
