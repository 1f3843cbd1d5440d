//! Core service façade and bootstrap helpers.
//!
//! [`Setlist`] wires the catalog database, the reconciliation engine, the
//! playlist engine and the optional remote metadata client behind one handle.
//! Desktop hosts typically enable the `desktop-shims` feature (which depends
//! on `bridge-desktop`) to get a reqwest-backed HTTP client and a
//! directory sync target.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::Setlist;
//! use core_sync::ScanMode;
//!
//! let setlist = Setlist::open(CoreConfig::builder().music_root("/srv/music").build()?).await?;
//! let report = setlist.scan(ScanMode::Incremental).await?;
//! let hits = setlist.search("portishead roads", Some(20)).await?;
//! setlist.close().await;
//! ```

pub mod error;

pub use error::{Result, ServiceError};

use std::path::PathBuf;
use std::sync::Arc;

use bridge_traits::PlaylistSyncTarget;
use core_library::db::{close_pool, create_pool, DatabaseConfig};
use core_library::models::{LibraryStats, MusicFile};
use core_library::repositories::{MusicFileRepository, SqliteMusicFileRepository};
use core_library::{CatalogSearch, TrackFilter};
use core_metadata::{LastFmClient, MetadataExtractor, RemoteLookup, RemoteMetadata, RemoteTrackInfo};
use core_playlist::{M3uOptions, PlaylistEngine};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus};
use core_runtime::logging::redact_if_sensitive;
use core_sync::{ScanConfig, ScanCoordinator, ScanMode, ScanReport};
use sqlx::SqlitePool;
use tokio::sync::broadcast::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Primary façade exposed to host applications.
pub struct Setlist {
    config: CoreConfig,
    pool: SqlitePool,
    files: Arc<dyn MusicFileRepository>,
    search: CatalogSearch,
    scanner: ScanCoordinator,
    playlists: PlaylistEngine,
    remote: RemoteMetadata,
    event_bus: EventBus,
}

impl Setlist {
    /// Open the catalog described by `config`.
    ///
    /// Creates the database file if needed and applies pending migrations.
    /// Remote lookups are enabled only when both a Last.fm key and an HTTP
    /// client are configured.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] for an invalid configuration and
    /// [`ServiceError::Library`] if the database cannot be opened or migrated.
    #[instrument(skip(config), fields(database = %config.database_path.display()))]
    pub async fn open(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(DatabaseConfig::new(config.database_path.clone())).await?;
        let event_bus = EventBus::default();

        let files: Arc<dyn MusicFileRepository> =
            Arc::new(SqliteMusicFileRepository::new(pool.clone()));
        let scanner = ScanCoordinator::new(
            ScanConfig::from_settings(&config.scan),
            Arc::clone(&files),
            Arc::new(MetadataExtractor::new()),
            event_bus.clone(),
            Arc::clone(&config.clock),
        );
        let playlists =
            PlaylistEngine::new(pool.clone(), Arc::clone(&config.clock), event_bus.clone());
        let remote = remote_metadata(&config);

        info!(
            music_root = %config.music_root.display(),
            remote_lookups = remote.is_enabled(),
            "Setlist core ready"
        );

        Ok(Self {
            search: CatalogSearch::new(pool.clone()),
            config,
            pool,
            files,
            scanner,
            playlists,
            remote,
            event_bus,
        })
    }

    /// Open with settings from the environment and the desktop HTTP client.
    ///
    /// See [`CoreConfig::from_env`] for the variables read.
    #[cfg(feature = "desktop-shims")]
    pub async fn open_from_env() -> Result<Self> {
        let http_client = bridge_desktop::ReqwestHttpClient::new()?;
        let config = CoreConfig::builder_from_env()?
            .http_client(Arc::new(http_client))
            .build()?;
        Self::open(config).await
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Receiver for scan and playlist events emitted from now on.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Reconcile the configured music root.
    pub async fn scan(&self, mode: ScanMode) -> Result<ScanReport> {
        self.scan_with(mode, CancellationToken::new()).await
    }

    /// Like [`Setlist::scan`], stopping early once `cancel` fires.
    pub async fn scan_with(&self, mode: ScanMode, cancel: CancellationToken) -> Result<ScanReport> {
        let report = self
            .scanner
            .reconcile(&self.config.music_root, mode, cancel)
            .await?;
        Ok(report)
    }

    pub async fn is_scanning(&self) -> bool {
        self.scanner.is_scanning(&self.config.music_root).await
    }

    /// Relevance-ranked free-text search over the catalog.
    pub async fn search(&self, query: &str, limit: Option<u32>) -> Result<Vec<MusicFile>> {
        Ok(self.search.search(query, limit).await?)
    }

    /// Field filter (title, artist, album, genre) over the catalog.
    pub async fn filter(&self, filter: &TrackFilter) -> Result<Vec<MusicFile>> {
        Ok(self.search.filter(filter).await?)
    }

    pub async fn stats(&self) -> Result<LibraryStats> {
        Ok(self.files.stats().await?)
    }

    /// First present catalog file for each `(artist, title)` pair.
    pub async fn find_locals(&self, wanted: &[(String, String)]) -> Result<Vec<Option<MusicFile>>> {
        Ok(self.files.find_locals(wanted).await?)
    }

    /// Delete every file row flagged missing. Returns how many went.
    pub async fn purge_missing(&self) -> Result<u64> {
        let purged = self.files.purge_missing().await?;
        info!(purged, "Purged missing files");
        Ok(purged)
    }

    /// Direct access to the music file repository.
    pub fn catalog(&self) -> Arc<dyn MusicFileRepository> {
        Arc::clone(&self.files)
    }

    // =========================================================================
    // Playlists
    // =========================================================================

    pub fn playlists(&self) -> &PlaylistEngine {
        &self.playlists
    }

    /// Extended M3U for a playlist, with the configured path mapping applied.
    pub async fn export(&self, playlist_id: i64) -> Result<String> {
        Ok(self
            .playlists
            .export_m3u(playlist_id, &self.export_options())
            .await?)
    }

    /// Export a playlist into the configured export directory and hand it to
    /// `target`. Returns the path of the written file.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::CapabilityMissing`] when no export directory is
    /// configured.
    pub async fn sync_playlist(
        &self,
        playlist_id: i64,
        target: &dyn PlaylistSyncTarget,
    ) -> Result<PathBuf> {
        let export_dir = self.config.export_dir.as_deref().ok_or_else(|| {
            ServiceError::CapabilityMissing {
                capability: "export_dir".to_string(),
                message: "set an export directory to sync playlists".to_string(),
            }
        })?;

        Ok(self
            .playlists
            .sync_to_target(playlist_id, target, export_dir, &self.export_options())
            .await?)
    }

    fn export_options(&self) -> M3uOptions {
        M3uOptions::extended().with_mapping(self.config.path_mapping.clone())
    }

    // =========================================================================
    // Remote metadata
    // =========================================================================

    /// Tracks similar to `artist - title`. Never fails: an unconfigured or
    /// unreachable service yields [`RemoteLookup::Unavailable`].
    pub async fn similar_tracks(
        &self,
        artist: &str,
        title: &str,
    ) -> RemoteLookup<Vec<RemoteTrackInfo>> {
        self.remote.similar_tracks(artist, title).await
    }

    pub async fn search_track(
        &self,
        artist: &str,
        title: &str,
    ) -> RemoteLookup<Option<RemoteTrackInfo>> {
        self.remote.search_track(artist, title).await
    }

    /// Cover image URL for an album, degrading like [`Setlist::similar_tracks`].
    pub async fn album_art(&self, artist: &str, album: &str) -> RemoteLookup<Option<String>> {
        self.remote.album_art(artist, album).await
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Close the database. Calls made after this fail with a database error.
    pub async fn close(&self) {
        close_pool(&self.pool).await;
    }
}

fn remote_metadata(config: &CoreConfig) -> RemoteMetadata {
    let Some(http_client) = config.http_client.clone() else {
        debug!("No HTTP client configured, remote lookups disabled");
        return RemoteMetadata::disabled();
    };

    match LastFmClient::from_config(http_client, &config.metadata_api_config) {
        Some(client) => {
            let key = config
                .metadata_api_config
                .lastfm_api_key
                .as_deref()
                .unwrap_or_default();
            debug!(
                api_key = %redact_if_sensitive("api_key", key),
                "Last.fm lookups enabled"
            );
            RemoteMetadata::new(Arc::new(client))
        }
        None => RemoteMetadata::disabled(),
    }
}
