//! End-to-end tests for the `Setlist` façade
//!
//! Each test opens a real SQLite file inside a temporary directory, so the
//! pool, migrations and shutdown run exactly as they do for a host.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_library::models::{EntryRef, NewMusicFile, TrackDetails};
use core_library::TrackFilter;
use core_metadata::RemoteLookup;
use core_runtime::config::{CoreConfig, CoreConfigBuilder, PathMapping};
use core_runtime::events::{CoreEvent, PlaylistEvent};
use core_service::{ServiceError, Setlist};
use core_sync::ScanMode;
use mockall::mock;
use tempfile::TempDir;

// ============================================================================
// Mock Implementations
// ============================================================================

mock! {
    pub Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("music")).unwrap();
        Self { dir }
    }

    fn music_root(&self) -> PathBuf {
        self.dir.path().canonicalize().unwrap().join("music")
    }

    fn database_path(&self) -> PathBuf {
        self.dir.path().join("catalog.db")
    }

    fn builder(&self) -> CoreConfigBuilder {
        CoreConfig::builder()
            .database_path(self.database_path())
            .music_root(self.music_root())
    }

    async fn open(&self) -> Setlist {
        Setlist::open(self.builder().build().unwrap()).await.unwrap()
    }
}

fn song(path: &str, title: &str, artist: &str) -> NewMusicFile {
    let mut details = TrackDetails::new(title, artist).with_album("Dummy");
    details.length = Some(200);
    NewMusicFile::new(path, details)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_open_creates_database_and_scans_root() {
    let fixture = Fixture::new();
    std::fs::write(fixture.music_root().join("notes.txt"), b"not audio").unwrap();
    std::fs::write(fixture.music_root().join("broken.mp3"), b"not an mp3 either").unwrap();

    let setlist = fixture.open().await;
    assert!(fixture.database_path().exists());

    let gone = fixture.music_root().join("gone.mp3");
    setlist
        .catalog()
        .upsert(&song(&gone.to_string_lossy(), "Gone", "Nobody"), 1)
        .await
        .unwrap();

    let report = setlist.scan(ScanMode::Incremental).await.unwrap();
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.files_indexed, 0);
    assert_eq!(report.missing_count, 1);
    assert!(!setlist.is_scanning().await);

    let stats = setlist.stats().await.unwrap();
    assert_eq!(stats.total_files, 1);
    assert_eq!(stats.missing_files, 1);

    assert_eq!(setlist.purge_missing().await.unwrap(), 1);
    assert_eq!(setlist.stats().await.unwrap().total_files, 0);

    setlist.close().await;
}

#[test]
fn test_invalid_config_never_reaches_the_database() {
    let fixture = Fixture::new();
    let config = fixture.builder().max_concurrent_extractions(0).build();

    assert!(config.is_err());
    assert!(!fixture.database_path().exists());
}

#[tokio::test]
async fn test_scan_of_missing_root_is_sync_error() {
    let fixture = Fixture::new();
    let config = fixture
        .builder()
        .music_root(fixture.dir.path().join("nowhere"))
        .build()
        .unwrap();
    let setlist = Setlist::open(config).await.unwrap();

    let err = setlist.scan(ScanMode::Full).await.unwrap_err();
    assert!(matches!(err, ServiceError::Sync(_)));
}

#[tokio::test]
async fn test_search_filter_and_find_locals() {
    let fixture = Fixture::new();
    let setlist = fixture.open().await;
    let catalog = setlist.catalog();
    catalog
        .upsert(&song("/music/roads.mp3", "Roads", "Portishead"), 1)
        .await
        .unwrap();
    catalog
        .upsert(&song("/music/teardrop.mp3", "Teardrop", "Massive Attack"), 1)
        .await
        .unwrap();

    let hits = setlist.search("roads", Some(10)).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "/music/roads.mp3");

    let filtered = setlist
        .filter(&TrackFilter::new().artist("massive"))
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].title.as_deref(), Some("Teardrop"));

    let locals = setlist
        .find_locals(&[
            ("PORTISHEAD".to_string(), "roads".to_string()),
            ("Portishead".to_string(), "Glory Box".to_string()),
        ])
        .await
        .unwrap();
    assert_eq!(locals[0].as_ref().unwrap().path, "/music/roads.mp3");
    assert!(locals[1].is_none());
}

#[tokio::test]
async fn test_export_applies_configured_mapping() {
    let fixture = Fixture::new();
    let config = fixture
        .builder()
        .path_mapping(PathMapping::new("/music", "/media/usb"))
        .build()
        .unwrap();
    let setlist = Setlist::open(config).await.unwrap();

    let id = setlist
        .catalog()
        .upsert(&song("/music/roads.mp3", "Roads", "Portishead"), 1)
        .await
        .unwrap()
        .id();
    let playlist = setlist
        .playlists()
        .create("Evening", &[EntryRef::music_file(id)])
        .await
        .unwrap();

    let m3u = setlist.export(playlist.id).await.unwrap();
    assert_eq!(
        m3u,
        "#EXTM3U\n#EXTINF:200,Portishead - Roads\n/media/usb/roads.mp3\n"
    );

    let err = setlist.export(playlist.id + 100).await.unwrap_err();
    assert!(err.is_not_found());
}

#[cfg(feature = "desktop-shims")]
#[tokio::test]
async fn test_sync_playlist_needs_export_dir() {
    use bridge_desktop::DirectorySyncTarget;

    let fixture = Fixture::new();
    let target = DirectorySyncTarget::new(fixture.dir.path().join("device"));

    let setlist = fixture.open().await;
    let playlist = setlist.playlists().create("Road Trip", &[]).await.unwrap();
    let err = setlist.sync_playlist(playlist.id, &target).await.unwrap_err();
    assert!(matches!(err, ServiceError::CapabilityMissing { .. }));
    setlist.close().await;

    let config = fixture
        .builder()
        .export_dir(fixture.dir.path().join("exports"))
        .build()
        .unwrap();
    let setlist = Setlist::open(config).await.unwrap();
    let written = setlist.sync_playlist(playlist.id, &target).await.unwrap();

    assert_eq!(written, fixture.dir.path().join("exports/Road Trip.m3u"));
    let pushed = std::fs::read_to_string(target.destination_for("Road Trip")).unwrap();
    assert_eq!(pushed, "#EXTM3U\n");
}

#[tokio::test]
async fn test_remote_lookups_unavailable_without_key() {
    let fixture = Fixture::new();
    let setlist = fixture.open().await;

    let similar = setlist.similar_tracks("Portishead", "Roads").await;
    assert!(!similar.is_available());
    assert!(setlist.album_art("Portishead", "Dummy").await.into_option().is_none());
}

#[tokio::test]
async fn test_remote_lookups_use_lastfm_when_configured() {
    let mut http = MockHttp::new();
    http.expect_execute()
        .withf(|req| req.query_value("method") == Some("track.getsimilar"))
        .times(1)
        .returning(|_| {
            Ok(HttpResponse::new(
                200,
                r#"{"similartracks":{"track":[
                    {"name":"Glory Box","url":"https://www.last.fm/music/Portishead/_/Glory+Box","artist":{"name":"Portishead"}}
                ]}}"#,
            ))
        });

    let fixture = Fixture::new();
    let config = fixture
        .builder()
        .lastfm_api_key("test-key")
        .http_client(Arc::new(http))
        .build()
        .unwrap();
    let setlist = Setlist::open(config).await.unwrap();

    match setlist.similar_tracks("Portishead", "Roads").await {
        RemoteLookup::Available(tracks) => {
            assert_eq!(tracks.len(), 1);
            assert_eq!(tracks[0].title, "Glory Box");
        }
        other => panic!("expected tracks, got {:?}", other),
    }
}

#[tokio::test]
async fn test_playlist_events_reach_subscribers() {
    let fixture = Fixture::new();
    let setlist = fixture.open().await;
    let mut events = setlist.subscribe();

    let playlist = setlist.playlists().create("Mix", &[]).await.unwrap();

    match events.recv().await.unwrap() {
        CoreEvent::Playlist(PlaylistEvent::Created { playlist_id, name }) => {
            assert_eq!(playlist_id, playlist.id);
            assert_eq!(name, "Mix");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_reopen_keeps_catalog() {
    let fixture = Fixture::new();
    let setlist = fixture.open().await;
    setlist
        .catalog()
        .upsert(&song("/music/roads.mp3", "Roads", "Portishead"), 1)
        .await
        .unwrap();
    setlist.close().await;
    assert!(setlist.stats().await.is_err());

    let reopened = fixture.open().await;
    assert_eq!(reopened.stats().await.unwrap().total_files, 1);
}
