//! Portable playlist export (M3U).
//!
//! Only music file entries have a path, so every other entry kind is left
//! out. Files flagged missing are still written; orphaned entries are not.

use core_library::models::{EntryDetail, MusicFile, PlaylistEntry};
use core_runtime::config::PathMapping;
use std::path::Path;

/// How to render an M3U file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct M3uOptions {
    /// Write the `#EXTM3U` header and an `#EXTINF` line per track
    pub extended: bool,
    /// Prefix substitution applied to every path
    pub mapping: Option<PathMapping>,
}

impl M3uOptions {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn extended() -> Self {
        Self {
            extended: true,
            mapping: None,
        }
    }

    pub fn with_mapping(mut self, mapping: Option<PathMapping>) -> Self {
        self.mapping = mapping;
        self
    }
}

/// Render entries, in the order given, as M3U text with one path per line.
pub fn render_m3u(entries: &[PlaylistEntry], options: &M3uOptions) -> String {
    let mut out = String::new();
    if options.extended {
        out.push_str("#EXTM3U\n");
    }

    for file in entries.iter().filter_map(music_file) {
        let path = match &options.mapping {
            Some(mapping) => mapping.apply(&file.path),
            None => file.path.clone(),
        };

        if options.extended {
            out.push_str(&format!(
                "#EXTINF:{},{}\n",
                file.length.unwrap_or(-1),
                display_name(file)
            ));
        }
        out.push_str(&path);
        out.push('\n');
    }

    out
}

/// File name for an exported playlist: the playlist name with path
/// separators and other unsafe characters replaced.
pub fn playlist_file_name(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.' | '(' | ')' | '\'') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_matches('.').trim();

    if stem.is_empty() {
        "playlist.m3u".to_string()
    } else {
        format!("{}.m3u", stem)
    }
}

fn music_file(entry: &PlaylistEntry) -> Option<&MusicFile> {
    match entry.details.as_ref()? {
        EntryDetail::MusicFile(file) => Some(file),
        _ => None,
    }
}

fn display_name(file: &MusicFile) -> String {
    match (file.artist.as_deref(), file.title.as_deref()) {
        (Some(artist), Some(title)) => format!("{} - {}", artist, title),
        (None, Some(title)) => title.to_string(),
        (Some(artist), None) => artist.to_string(),
        (None, None) => Path::new(&file.path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::models::{EntryKind, EntryTarget, PlaylistSummary};

    fn file_entry(position: i64, path: &str, artist: Option<&str>, title: Option<&str>) -> PlaylistEntry {
        PlaylistEntry {
            id: position + 1,
            position,
            kind: EntryKind::MusicFile,
            target: EntryTarget::MusicFile { id: position + 1 },
            details: Some(EntryDetail::MusicFile(MusicFile {
                id: position + 1,
                path: path.to_string(),
                title: title.map(str::to_string),
                artist: artist.map(str::to_string),
                album_artist: None,
                album: None,
                year: None,
                length: Some(241),
                publisher: None,
                kind: Some("audio/mpeg".to_string()),
                last_scanned: 0,
                missing: false,
                genres: Vec::new(),
            })),
        }
    }

    fn entries() -> Vec<PlaylistEntry> {
        vec![
            file_entry(0, "/srv/music/a.mp3", Some("Portishead"), Some("Roads")),
            PlaylistEntry {
                id: 10,
                position: 1,
                kind: EntryKind::NestedPlaylist,
                target: EntryTarget::NestedPlaylist { id: 3 },
                details: Some(EntryDetail::NestedPlaylist(PlaylistSummary {
                    id: 3,
                    name: "Other".to_string(),
                    entry_count: 0,
                })),
            },
            PlaylistEntry {
                id: 11,
                position: 2,
                kind: EntryKind::MusicFile,
                target: EntryTarget::MusicFile { id: 99 },
                details: None,
            },
            file_entry(3, "/srv/music/Untitled.flac", None, None),
        ]
    }

    #[test]
    fn test_plain_export_lists_music_file_paths_only() {
        let m3u = render_m3u(&entries(), &M3uOptions::plain());
        assert_eq!(m3u, "/srv/music/a.mp3\n/srv/music/Untitled.flac\n");
    }

    #[test]
    fn test_extended_export_with_mapping() {
        let options =
            M3uOptions::extended().with_mapping(Some(PathMapping::new("/srv/music", "/mnt/nas")));
        let m3u = render_m3u(&entries(), &options);

        assert_eq!(
            m3u,
            "#EXTM3U\n\
             #EXTINF:241,Portishead - Roads\n/mnt/nas/a.mp3\n\
             #EXTINF:241,Untitled\n/mnt/nas/Untitled.flac\n"
        );
    }

    #[test]
    fn test_playlist_file_name_is_safe() {
        assert_eq!(playlist_file_name("Road Trip"), "Road Trip.m3u");
        assert_eq!(playlist_file_name("AC/DC: Best"), "AC_DC_ Best.m3u");
        assert_eq!(playlist_file_name(".."), "playlist.m3u");
        assert_eq!(playlist_file_name("   "), "playlist.m3u");
    }
}
