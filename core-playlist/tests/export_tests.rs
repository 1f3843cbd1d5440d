//! Integration tests for playlist export and sync targets

use async_trait::async_trait;
use bridge_desktop::DirectorySyncTarget;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::time::SystemClock;
use bridge_traits::PlaylistSyncTarget;
use core_library::db::create_test_pool;
use core_library::models::{EntryRef, NewMusicFile, TrackDetails};
use core_library::repositories::{MusicFileRepository, SqliteMusicFileRepository};
use core_playlist::{M3uOptions, PlaylistEngine, PlaylistError};
use core_runtime::config::PathMapping;
use core_runtime::events::EventBus;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Mock Implementations
// ============================================================================

struct RejectingTarget;

#[async_trait]
impl PlaylistSyncTarget for RejectingTarget {
    fn name(&self) -> &str {
        "rejecting"
    }

    async fn push(&self, _playlist_file: &Path, _display_name: &str) -> BridgeResult<()> {
        Err(BridgeError::OperationFailed("server offline".to_string()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Engine with one playlist: two catalog files (one later flagged missing),
/// a remote track and an orphaned file entry.
async fn engine_with_playlist() -> (PlaylistEngine, i64) {
    let pool = create_test_pool().await.unwrap();
    let files = SqliteMusicFileRepository::new(pool.clone());

    let mut ids = Vec::new();
    for (path, title, length) in [
        ("/srv/music/Portishead/Dummy/01.mp3", "Mysterons", 302),
        ("/srv/music/Portishead/Dummy/02.mp3", "Sour Times", 251),
        ("/srv/music/Portishead/Dummy/03.mp3", "Strangers", 238),
    ] {
        let mut details = TrackDetails::new(title, "Portishead").with_album("Dummy");
        details.length = Some(length);
        ids.push(
            files
                .upsert(&NewMusicFile::new(path, details), 0)
                .await
                .unwrap()
                .id(),
        );
    }

    let engine = PlaylistEngine::new(pool, Arc::new(SystemClock), EventBus::default());
    let playlist = engine
        .create(
            "Dummy / Side A",
            &[
                EntryRef::music_file(ids[0]),
                EntryRef::remote_track(
                    "https://www.last.fm/music/Portishead/_/Roads",
                    TrackDetails::new("Roads", "Portishead"),
                ),
                EntryRef::music_file(ids[1]),
                EntryRef::music_file(ids[2]),
            ],
        )
        .await
        .unwrap();

    files.mark_missing(ids[1], 10).await.unwrap();
    assert!(files.delete(ids[2]).await.unwrap());

    (engine, playlist.id)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_plain_export_keeps_missing_files_and_drops_others() {
    let (engine, id) = engine_with_playlist().await;

    let m3u = engine.export_m3u(id, &M3uOptions::plain()).await.unwrap();
    assert_eq!(
        m3u,
        "/srv/music/Portishead/Dummy/01.mp3\n/srv/music/Portishead/Dummy/02.mp3\n"
    );
}

#[tokio::test]
async fn test_extended_export_with_mapping() {
    let (engine, id) = engine_with_playlist().await;

    let options = M3uOptions::extended()
        .with_mapping(Some(PathMapping::new("/srv/music", "/media/usb")));
    let m3u = engine.export_m3u(id, &options).await.unwrap();

    let lines: Vec<&str> = m3u.lines().collect();
    assert_eq!(
        lines,
        vec![
            "#EXTM3U",
            "#EXTINF:302,Portishead - Mysterons",
            "/media/usb/Portishead/Dummy/01.mp3",
            "#EXTINF:251,Portishead - Sour Times",
            "/media/usb/Portishead/Dummy/02.mp3",
        ]
    );
}

#[tokio::test]
async fn test_sync_to_directory_target() {
    let (engine, id) = engine_with_playlist().await;
    let export_dir = TempDir::new().unwrap();
    let target_dir = TempDir::new().unwrap();
    let target = DirectorySyncTarget::new(target_dir.path());

    let written = engine
        .sync_to_target(id, &target, export_dir.path(), &M3uOptions::plain())
        .await
        .unwrap();

    assert_eq!(written, export_dir.path().join("Dummy _ Side A.m3u"));
    let exported = std::fs::read_to_string(&written).unwrap();
    assert!(exported.starts_with("/srv/music/Portishead/Dummy/01.mp3\n"));

    let pushed = std::fs::read_to_string(target.destination_for("Dummy / Side A")).unwrap();
    assert_eq!(pushed, exported);
}

#[tokio::test]
async fn test_sync_target_failure_is_reported() {
    let (engine, id) = engine_with_playlist().await;
    let export_dir = TempDir::new().unwrap();

    let err = engine
        .sync_to_target(id, &RejectingTarget, export_dir.path(), &M3uOptions::plain())
        .await
        .unwrap_err();

    match err {
        PlaylistError::SyncTarget { target, .. } => assert_eq!(target, "rejecting"),
        other => panic!("unexpected error: {:?}", other),
    }
}
