//! Integration tests for metadata extraction
//!
//! Audio fixtures are generated on the fly: a short PCM WAV file is small
//! enough to write byte by byte, and lofty can tag it.

use core_metadata::extractor::{MetadataExtractor, TagExtractor};
use core_metadata::MetadataError;
use lofty::config::WriteOptions;
use lofty::tag::{Accessor, Tag, TagExt, TagType};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write a mono 8-bit PCM WAV file of `seconds` length.
fn write_wav(path: &Path, seconds: u32) {
    let sample_rate: u32 = 8000;
    let data_len = sample_rate * seconds;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes()); // byte rate
    bytes.extend_from_slice(&1u16.to_le_bytes()); // block align
    bytes.extend_from_slice(&8u16.to_le_bytes()); // bits per sample
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(44 + data_len as usize, 128);

    fs::write(path, bytes).unwrap();
}

fn fixture(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

#[tokio::test]
async fn test_extract_missing_file() {
    let dir = TempDir::new().unwrap();
    let extractor = MetadataExtractor::new();

    let result = extractor.extract(&fixture(&dir, "nonexistent.mp3")).await;
    assert!(matches!(result, Err(MetadataError::FileNotFound(_))));
}

#[tokio::test]
async fn test_extract_corrupted_file_fails() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "corrupt.mp3");
    fs::write(&path, b"This is not a valid audio file").unwrap();

    let result = MetadataExtractor::new().extract(&path).await;
    assert!(matches!(result, Err(MetadataError::ExtractionFailed { .. })));
}

#[tokio::test]
async fn test_untagged_file_uses_file_stem_as_title() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "Untitled  Demo.wav");
    write_wav(&path, 2);

    let metadata = MetadataExtractor::new().extract(&path).await.unwrap();

    assert!(metadata.untagged);
    assert_eq!(metadata.title.as_deref(), Some("Untitled Demo"));
    assert_eq!(metadata.artist, None);
    assert_eq!(metadata.length, Some(2));
    assert_eq!(metadata.mime_type, "audio/wav");
}

#[tokio::test]
async fn test_tagged_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = fixture(&dir, "roads.wav");
    write_wav(&path, 1);

    let mut tag = Tag::new(TagType::Id3v2);
    tag.set_title("Roads".to_string());
    tag.set_artist("Portishead".to_string());
    tag.set_album("Dummy".to_string());
    tag.set_genre("Trip-Hop".to_string());
    tag.save_to_path(&path, WriteOptions::default()).unwrap();

    let metadata = MetadataExtractor::new().extract(&path).await.unwrap();

    assert!(!metadata.untagged);
    assert_eq!(metadata.title.as_deref(), Some("Roads"));
    assert_eq!(metadata.artist.as_deref(), Some("Portishead"));
    assert_eq!(metadata.album.as_deref(), Some("Dummy"));
    assert_eq!(metadata.genres, vec!["Trip-Hop"]);
    assert_eq!(metadata.length, Some(1));

    let file = metadata.into_new_music_file(path.display().to_string());
    assert_eq!(file.kind.as_deref(), Some("audio/wav"));
}
