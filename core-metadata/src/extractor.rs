//! Audio Tag Extraction
//!
//! Reads descriptive tags from audio files with the `lofty` crate. ID3v2,
//! Vorbis Comments, MP4 atoms, APE and RIFF INFO tags are supported.
//!
//! ## Overview
//!
//! - [`TagExtractor`] is the seam the scanner depends on
//! - [`MetadataExtractor`] is the `lofty` implementation
//! - Text fields are whitespace-normalized; blank values become `None`
//! - A file without any tag still extracts, with its file stem as title
//! - Unreadable or unparsable files return
//!   [`MetadataError::ExtractionFailed`]
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::extractor::{MetadataExtractor, TagExtractor};
//! use std::path::Path;
//!
//! let extractor = MetadataExtractor::new();
//! let metadata = extractor.extract(Path::new("song.flac")).await?;
//! println!("{:?} by {:?}", metadata.title, metadata.artist);
//! ```

use async_trait::async_trait;
use core_library::models::{NewMusicFile, TrackDetails};
use lofty::config::ParseOptions;
use lofty::file::{AudioFile, FileType, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{MetadataError, Result};

/// Default allowlist of file extensions the scanner hands to the extractor.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "m4a", "mp4", "aac", "ogg", "oga", "opus", "wav", "aif", "aiff", "wv", "ape",
];

/// Tags read from one audio file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    /// Duration rounded to whole seconds
    pub length: Option<i64>,
    pub publisher: Option<String>,
    pub genres: Vec<String>,
    /// MIME type of the container
    pub mime_type: String,
    /// True when the file had no tag and the title came from the file name
    pub untagged: bool,
}

impl ExtractedMetadata {
    pub fn to_details(&self) -> TrackDetails {
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

    /// Catalog input for the file at `path`.
    pub fn into_new_music_file(self, path: impl Into<String>) -> NewMusicFile {
        let details = self.to_details();
        NewMusicFile::new(path, details).with_kind(self.mime_type)
    }
}

/// Source of track metadata for a file on disk
#[async_trait]
pub trait TagExtractor: Send + Sync {
    /// Read the tags of one file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed. Callers treat
    /// this as "skip this file" rather than a fatal condition.
    async fn extract(&self, path: &Path) -> Result<ExtractedMetadata>;
}

/// `lofty`-backed extractor
pub struct MetadataExtractor {
    parse_options: ParseOptions,
}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self {
            parse_options: ParseOptions::new(),
        }
    }

    pub fn with_options(parse_options: ParseOptions) -> Self {
        Self { parse_options }
    }

    fn parse(path: &Path, data: Vec<u8>, options: ParseOptions) -> Result<ExtractedMetadata> {
        let tagged_file = Probe::new(Cursor::new(data))
            .options(options)
            .guess_file_type()
            .map_err(|e| MetadataError::extraction(path, format!("probe failed: {}", e)))?
            .read()
            .map_err(|e| MetadataError::extraction(path, format!("parse failed: {}", e)))?;

        let mime_type = Self::file_type_to_mime_type(tagged_file.file_type()).to_string();
        let duration = tagged_file.properties().duration();
        let length = if duration.is_zero() {
            None
        } else {
            Some(duration.as_secs_f64().round() as i64)
        };

        let tag = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag());

        let Some(tag) = tag else {
            warn!(path = %path.display(), "No tags found, using file name as title");
            return Ok(ExtractedMetadata {
                title: path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(Self::normalize_text),
                length,
                mime_type,
                untagged: true,
                ..ExtractedMetadata::default()
            });
        };

        Ok(ExtractedMetadata {
            title: tag.title().as_deref().and_then(Self::normalize_text),
            artist: tag.artist().as_deref().and_then(Self::normalize_text),
            album_artist: tag
                .get_string(&ItemKey::AlbumArtist)
                .and_then(Self::normalize_text),
            album: tag.album().as_deref().and_then(Self::normalize_text),
            year: tag.year().and_then(|y| i32::try_from(y).ok()),
            length,
            publisher: tag
                .get_string(&ItemKey::Publisher)
                .or_else(|| tag.get_string(&ItemKey::Label))
                .and_then(Self::normalize_text),
            genres: Self::genres(tag),
            mime_type,
            untagged: false,
        })
    }

    /// Every genre value of the tag. Multi-valued frames packed into one
    /// string with `;` or NUL separators are split.
    fn genres(tag: &Tag) -> Vec<String> {
        tag.get_strings(&ItemKey::Genre)
            .flat_map(|value| value.split([';', '\0']))
            .filter_map(Self::normalize_text)
            .collect()
    }

    /// Collapse runs of whitespace, drop control characters, map blank to `None`.
    fn normalize_text(text: &str) -> Option<String> {
        let normalized: String = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .filter(|c| !c.is_control())
            .collect();

        if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        }
    }

    fn file_type_to_mime_type(file_type: FileType) -> &'static str {
        match file_type {
            FileType::Aac => "audio/aac",
            FileType::Aiff => "audio/aiff",
            FileType::Ape => "audio/ape",
            FileType::Flac => "audio/flac",
            FileType::Mpeg => "audio/mpeg",
            FileType::Mp4 => "audio/mp4",
            FileType::Mpc => "audio/musepack",
            FileType::Opus => "audio/opus",
            FileType::Vorbis => "audio/vorbis",
            FileType::Speex => "audio/speex",
            FileType::Wav => "audio/wav",
            FileType::WavPack => "audio/wavpack",
            _ => "application/octet-stream",
        }
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TagExtractor for MetadataExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedMetadata> {
        debug!(path = %path.display(), "Extracting metadata");

        let data = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MetadataError::FileNotFound(path.display().to_string()),
            _ => MetadataError::extraction(path, format!("failed to read file: {}", e)),
        })?;

        // Tag parsing is CPU-bound; keep it off the async workers.
        let owned_path = path.to_path_buf();
        let options = self.parse_options;
        tokio::task::spawn_blocking(move || Self::parse(&owned_path, data, options))
            .await
            .map_err(|e| MetadataError::extraction(path, format!("parser task failed: {}", e)))?
    }
}
