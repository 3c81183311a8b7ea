//! Album/artist aggregation.
//!
//! Album-level and artist-level fields are picked from the first track's
//! tags, with conflicts resolved by most-frequent-value-wins on a
//! per-field basis. See DESIGN.md for why nothing more elaborate was
//! added here.

use std::collections::HashMap;

use crate::model::{Album, Artist, MediaFile};

/// Pick the most frequent value in `values`; ties break in favor of the
/// first value encountered.
fn most_frequent<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order = Vec::new();
    for v in values {
        if !counts.contains_key(v) {
            order.push(v);
        }
        *counts.entry(v).or_insert(0) += 1;
    }
    order
        .into_iter()
        .max_by_key(|v| counts[v])
        .unwrap_or_default()
        .to_string()
}

/// Reduce a folder's imported/updated tracks into album aggregates, grouped
/// by `album_pid`.
pub fn albums_from_tracks(tracks: &[MediaFile]) -> Vec<Album> {
    let mut by_pid: HashMap<&str, Vec<&MediaFile>> = HashMap::new();
    for t in tracks {
        by_pid.entry(&t.album_pid).or_default().push(t);
    }

    by_pid
        .into_iter()
        .map(|(pid, group)| Album {
            id: pid.to_string(),
            name: most_frequent(group.iter().map(|t| t.album.as_str())),
            artist_pid: String::new(),
            artist: most_frequent(group.iter().map(|t| t.artist.as_str())),
            compilation: false,
            song_count: group.len() as i64,
        })
        .collect()
}

/// Reduce a folder's imported/updated tracks into artist aggregates, grouped
/// by the artist name carried on the track row.
///
/// The folder processor is responsible for also calling this with the
/// album-artist's PID/name when that differs from the track artist; the
/// aggregation rule itself is identical either way.
pub fn artists_from_tracks(tracks: &[MediaFile], pid_of: impl Fn(&MediaFile) -> String) -> Vec<Artist> {
    let mut by_pid: HashMap<String, Vec<&MediaFile>> = HashMap::new();
    for t in tracks {
        by_pid.entry(pid_of(t)).or_default().push(t);
    }

    by_pid
        .into_iter()
        .map(|(pid, group)| Artist {
            id: pid,
            name: most_frequent(group.iter().map(|t| t.artist.as_str())),
            song_count: group.len() as i64,
        })
        .collect()
}
