//! # Metadata Module
//!
//! Reads tags from audio files and looks up remote metadata.
//!
//! ## Overview
//!
//! This module handles:
//! - Audio tag extraction (ID3, Vorbis, MP4, FLAC, RIFF) behind the
//!   [`TagExtractor`] seam
//! - Remote lookups (similar tracks, track search, album art) through
//!   Last.fm, degrading softly when the service or key is unavailable

pub mod error;
pub mod extractor;
pub mod providers;

pub use error::{MetadataError, Result};
pub use extractor::{ExtractedMetadata, MetadataExtractor, TagExtractor};
pub use providers::{LastFmClient, RemoteLookup, RemoteMetadata, RemoteMetadataProvider, RemoteTrackInfo};
