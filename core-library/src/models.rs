//! Domain models for the catalog and playlists
//!
//! Catalog rows map directly onto tables through `FromRow`. Genre sets live in
//! the `track_genres` child table and are attached by the repositories after a
//! row is loaded, so every model carries them as a skipped field.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::LibraryError;

// =============================================================================
// Shared Track Details
// =============================================================================

/// Descriptive tag fields shared by every track-like entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDetails {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    /// Duration in whole seconds
    pub length: Option<i64>,
    pub publisher: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl TrackDetails {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            artist: Some(artist.into()),
            ..Self::default()
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
        self
    }

    /// Genre set with blanks dropped and duplicates collapsed
    /// (case-insensitively, first spelling wins).
    pub fn normalized_genres(&self) -> Vec<String> {
        normalize_genres(&self.genres)
    }
}

/// Full Unicode lowercase used for the `*_key` match columns. SQLite's own
/// `lower()` and `LIKE` only fold ASCII.
pub(crate) fn fold_case(value: &str) -> String {
    value.to_lowercase()
}

pub(crate) fn fold_case_opt(value: Option<&str>) -> Option<String> {
    value.map(fold_case)
}

pub(crate) fn normalize_genres(genres: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for genre in genres {
        let trimmed = genre.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(fold_case(trimmed)) {
            out.push(trimmed.to_string());
        }
    }
    out
}

// =============================================================================
// Catalog
// =============================================================================

/// An indexed local audio file. Identity is `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MusicFile {
    pub id: i64,
    pub path: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub length: Option<i64>,
    pub publisher: Option<String>,
    /// MIME type of the container, e.g. `audio/flac`
    pub kind: Option<String>,
    /// Unix seconds of the last successful extraction or state change
    pub last_scanned: i64,
    pub missing: bool,
    #[sqlx(skip)]
    pub genres: Vec<String>,
}

impl MusicFile {
    pub fn details(&self) -> TrackDetails {
        TrackDetails {
            title: self.title.clone(),
            artist: self.artist.clone(),
            album_artist: self.album_artist.clone(),
            album: self.album.clone(),
            year: self.year,
            length: self.length,
            publisher: self.publisher.clone(),
            genres: self.genres.clone(),
        }
    }

    /// `"Artist - Title"`, falling back to the file name.
    pub fn display_name(&self) -> String {
        match (&self.artist, &self.title) {
            (Some(artist), Some(title)) => format!("{} - {}", artist, title),
            (None, Some(title)) => title.clone(),
            _ => self
                .path
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(&self.path)
                .to_string(),
        }
    }
}

/// Input for inserting or refreshing a catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMusicFile {
    pub path: String,
    pub kind: Option<String>,
    pub details: TrackDetails,
}

impl NewMusicFile {
    pub fn new(path: impl Into<String>, details: TrackDetails) -> Self {
        Self {
            path: path.into(),
            kind: None,
            details,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("Path cannot be empty".to_string());
        }
        if let Some(length) = self.details.length {
            if length < 0 {
                return Err("Length cannot be negative".to_string());
            }
        }
        Ok(())
    }
}

/// Outcome of [`upsert`](crate::repositories::MusicFileRepository::upsert).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
}

impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => *id,
        }
    }
}

/// Aggregate numbers for the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LibraryStats {
    pub total_files: i64,
    pub missing_files: i64,
    pub artists: i64,
    pub albums: i64,
    /// Sum of known track lengths in seconds
    pub total_length: i64,
}

// =============================================================================
// Reference Registries
// =============================================================================

/// A track on a remote service. Identity is the canonical `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RemoteTrack {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub length: Option<i64>,
    pub publisher: Option<String>,
    pub created_at: i64,
    #[sqlx(skip)]
    pub genres: Vec<String>,
}

/// A track the user asked for but does not own. Identity is `(artist, title)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RequestedTrack {
    pub id: i64,
    pub artist: String,
    pub title: String,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub length: Option<i64>,
    pub publisher: Option<String>,
    pub created_at: i64,
    #[sqlx(skip)]
    pub genres: Vec<String>,
}

/// Owner kind in the `track_genres` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenreParent {
    MusicFile,
    RemoteTrack,
    RequestedTrack,
}

impl GenreParent {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenreParent::MusicFile => "music_file",
            GenreParent::RemoteTrack => "remote_track",
            GenreParent::RequestedTrack => "requested_track",
        }
    }
}

// =============================================================================
// Playlists
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Playlist {
    pub fn validate_name(name: &str) -> Result<(), String> {
        if name.trim().is_empty() {
            return Err("Playlist name cannot be empty".to_string());
        }
        if name.len() > 255 {
            return Err("Playlist name cannot exceed 255 characters".to_string());
        }
        Ok(())
    }
}

/// Playlist plus its entry count, used for listings and nested references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PlaylistSummary {
    pub id: i64,
    pub name: String,
    pub entry_count: i64,
}

/// Discriminator stored in `playlist_entries.entry_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    MusicFile,
    RemoteTrack,
    NestedPlaylist,
    RequestedTrack,
    Album,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::MusicFile => "music_file",
            EntryKind::RemoteTrack => "remote_track",
            EntryKind::NestedPlaylist => "nested_playlist",
            EntryKind::RequestedTrack => "requested_track",
            EntryKind::Album => "album",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "music_file" => Ok(EntryKind::MusicFile),
            "remote_track" => Ok(EntryKind::RemoteTrack),
            "nested_playlist" => Ok(EntryKind::NestedPlaylist),
            "requested_track" => Ok(EntryKind::RequestedTrack),
            "album" => Ok(EntryKind::Album),
            other => Err(LibraryError::InvalidInput {
                field: "entry_kind".to_string(),
                message: format!("Unknown entry kind: {}", other),
            }),
        }
    }
}

/// What a caller asks to put into a playlist.
///
/// Remote and requested tracks are given by natural key plus descriptive
/// fields; the playlist engine resolves them to registry rows before storing
/// the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entry_type", rename_all = "snake_case")]
pub enum EntryRef {
    MusicFile {
        music_file_id: i64,
    },
    RemoteTrack {
        url: String,
        #[serde(default)]
        details: TrackDetails,
    },
    NestedPlaylist {
        playlist_id: i64,
    },
    RequestedTrack {
        artist: String,
        title: String,
        #[serde(default)]
        details: TrackDetails,
    },
    Album {
        artist: String,
        title: String,
    },
}

impl EntryRef {
    pub fn music_file(id: i64) -> Self {
        EntryRef::MusicFile { music_file_id: id }
    }

    pub fn remote_track(url: impl Into<String>, details: TrackDetails) -> Self {
        EntryRef::RemoteTrack {
            url: url.into(),
            details,
        }
    }

    pub fn nested_playlist(playlist_id: i64) -> Self {
        EntryRef::NestedPlaylist { playlist_id }
    }

    pub fn requested_track(artist: impl Into<String>, title: impl Into<String>) -> Self {
        EntryRef::RequestedTrack {
            artist: artist.into(),
            title: title.into(),
            details: TrackDetails::default(),
        }
    }

    pub fn album(artist: impl Into<String>, title: impl Into<String>) -> Self {
        EntryRef::Album {
            artist: artist.into(),
            title: title.into(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            EntryRef::MusicFile { .. } => EntryKind::MusicFile,
            EntryRef::RemoteTrack { .. } => EntryKind::RemoteTrack,
            EntryRef::NestedPlaylist { .. } => EntryKind::NestedPlaylist,
            EntryRef::RequestedTrack { .. } => EntryKind::RequestedTrack,
            EntryRef::Album { .. } => EntryKind::Album,
        }
    }
}

/// An [`EntryRef`] tagged with the position it occupied, used by removals so
/// the inverse operation can put the entry back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionedRef {
    pub position: i64,
    pub entry: EntryRef,
}

impl PositionedRef {
    pub fn new(position: i64, entry: EntryRef) -> Self {
        Self { position, entry }
    }
}

/// Identity recorded on a stored entry after registry resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryTarget {
    MusicFile { id: i64 },
    RemoteTrack { id: i64 },
    NestedPlaylist { id: i64 },
    RequestedTrack { id: i64 },
    Album { artist: String, title: String },
}

impl EntryTarget {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryTarget::MusicFile { .. } => EntryKind::MusicFile,
            EntryTarget::RemoteTrack { .. } => EntryKind::RemoteTrack,
            EntryTarget::NestedPlaylist { .. } => EntryKind::NestedPlaylist,
            EntryTarget::RequestedTrack { .. } => EntryKind::RequestedTrack,
            EntryTarget::Album { .. } => EntryKind::Album,
        }
    }
}

/// Raw `playlist_entries` row.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PlaylistEntryRow {
    pub id: i64,
    pub playlist_id: i64,
    pub position: i64,
    pub entry_kind: String,
    pub music_file_id: Option<i64>,
    pub remote_track_id: Option<i64>,
    pub nested_playlist_id: Option<i64>,
    pub requested_track_id: Option<i64>,
    pub album_artist: Option<String>,
    pub album_title: Option<String>,
}

impl PlaylistEntryRow {
    /// Decode the discriminator and its active reference column.
    pub fn target(&self) -> Result<EntryTarget, LibraryError> {
        let kind: EntryKind = self.entry_kind.parse()?;
        let corrupt = || LibraryError::InvalidInput {
            field: "playlist_entries".to_string(),
            message: format!("Entry {} has no {} reference", self.id, kind),
        };

        Ok(match kind {
            EntryKind::MusicFile => EntryTarget::MusicFile {
                id: self.music_file_id.ok_or_else(corrupt)?,
            },
            EntryKind::RemoteTrack => EntryTarget::RemoteTrack {
                id: self.remote_track_id.ok_or_else(corrupt)?,
            },
            EntryKind::NestedPlaylist => EntryTarget::NestedPlaylist {
                id: self.nested_playlist_id.ok_or_else(corrupt)?,
            },
            EntryKind::RequestedTrack => EntryTarget::RequestedTrack {
                id: self.requested_track_id.ok_or_else(corrupt)?,
            },
            EntryKind::Album => EntryTarget::Album {
                artist: self.album_artist.clone().ok_or_else(corrupt)?,
                title: self.album_title.clone().ok_or_else(corrupt)?,
            },
        })
    }
}

/// Album resolved from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumDetail {
    pub artist: String,
    pub title: String,
    pub tracks: Vec<MusicFile>,
}

/// Snapshot of the entity an entry points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EntryDetail {
    MusicFile(MusicFile),
    RemoteTrack(RemoteTrack),
    NestedPlaylist(PlaylistSummary),
    RequestedTrack(RequestedTrack),
    Album(AlbumDetail),
}

/// A stored entry with its lazily resolved detail. `details` is `None` when
/// the target no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub id: i64,
    pub position: i64,
    pub kind: EntryKind,
    pub target: EntryTarget,
    pub details: Option<EntryDetail>,
}

impl PlaylistEntry {
    pub fn is_orphaned(&self) -> bool {
        self.details.is_none()
    }

    /// Title of the referenced entity, if it resolved.
    pub fn title(&self) -> Option<&str> {
        match self.details.as_ref()? {
            EntryDetail::MusicFile(f) => f.title.as_deref(),
            EntryDetail::RemoteTrack(t) => t.title.as_deref(),
            EntryDetail::NestedPlaylist(p) => Some(p.name.as_str()),
            EntryDetail::RequestedTrack(t) => Some(t.title.as_str()),
            EntryDetail::Album(a) => Some(a.title.as_str()),
        }
    }

    /// Rebuild the value a caller would pass to re-add this entry.
    ///
    /// Remote tracks need their resolved detail for the URL, so an orphaned
    /// remote entry yields `None`.
    pub fn to_entry_ref(&self) -> Option<EntryRef> {
        match (&self.target, &self.details) {
            (EntryTarget::MusicFile { id }, _) => Some(EntryRef::music_file(*id)),
            (EntryTarget::NestedPlaylist { id }, _) => Some(EntryRef::nested_playlist(*id)),
            (EntryTarget::Album { artist, title }, _) => Some(EntryRef::album(artist, title)),
            (EntryTarget::RemoteTrack { .. }, Some(EntryDetail::RemoteTrack(track))) => {
                Some(EntryRef::RemoteTrack {
                    url: track.url.clone(),
                    details: TrackDetails {
                        title: track.title.clone(),
                        artist: track.artist.clone(),
                        album_artist: track.album_artist.clone(),
                        album: track.album.clone(),
                        year: track.year,
                        length: track.length,
                        publisher: track.publisher.clone(),
                        genres: track.genres.clone(),
                    },
                })
            }
            (EntryTarget::RequestedTrack { .. }, Some(EntryDetail::RequestedTrack(track))) => {
                Some(EntryRef::RequestedTrack {
                    artist: track.artist.clone(),
                    title: track.title.clone(),
                    details: TrackDetails {
                        title: Some(track.title.clone()),
                        artist: Some(track.artist.clone()),
                        album_artist: track.album_artist.clone(),
                        album: track.album.clone(),
                        year: track.year,
                        length: track.length,
                        publisher: track.publisher.clone(),
                        genres: track.genres.clone(),
                    },
                })
            }
            _ => None,
        }
    }

    pub fn to_positioned_ref(&self) -> Option<PositionedRef> {
        self.to_entry_ref()
            .map(|entry| PositionedRef::new(self.position, entry))
    }
}

/// A playlist and one page of its entries in position order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistWithEntries {
    pub playlist: Playlist,
    /// Entry count of the whole playlist, not just this page
    pub total_entries: i64,
    pub entries: Vec<PlaylistEntry>,
}
