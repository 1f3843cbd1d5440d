//! # Core Configuration Module
//!
//! Builder-based configuration for the setlist core.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, PathMapping};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/setlist/catalog.db")
//!     .music_root("/mnt/nas/music")
//!     .path_mapping(PathMapping::new("/mnt/nas/music", "/storage/music"))
//!     .lastfm_api_key("...")
//!     .build()?;
//! ```
//!
//! [`CoreConfig::from_env`] reads the same settings from the process
//! environment:
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `SETLIST_DATABASE_PATH` | `database_path` (default `./setlist.db`) |
//! | `SETLIST_MUSIC_PATH` | `music_root` (default `data/music`) |
//! | `SETLIST_EXPORT_DIR` | `export_dir` |
//! | `SETLIST_MAPPING_SOURCE` / `SETLIST_MAPPING_TARGET` | `path_mapping` |
//! | `SETLIST_SCAN_CONCURRENCY` | `scan.max_concurrent_extractions` |
//! | `LASTFM_API_KEY` | `metadata_api_config.lastfm_api_key` |

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_DATABASE_PATH: &str = "./setlist.db";
const DEFAULT_MUSIC_PATH: &str = "data/music";

/// Core configuration. Construct with [`CoreConfig::builder`].
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Root directory the catalog is reconciled against
    pub music_root: PathBuf,

    /// Directory that receives synced playlist files, if any
    pub export_dir: Option<PathBuf>,

    /// Prefix substitution applied to paths on export
    pub path_mapping: Option<PathMapping>,

    /// Scanner tuning
    pub scan: ScanSettings,

    /// Remote metadata API settings
    pub metadata_api_config: MetadataApiConfig,

    /// HTTP client for remote lookups. Required only when Last.fm is configured.
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// Time source for scan stamps
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("music_root", &self.music_root)
            .field("export_dir", &self.export_dir)
            .field("path_mapping", &self.path_mapping)
            .field("scan", &self.scan)
            .field("metadata_api_config", &self.metadata_api_config)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .finish()
    }
}

/// Rewrites a leading path prefix, e.g. a scan-time mount point into the
/// mount point a playback device sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub source: String,
    pub target: String,
}

impl PathMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Apply the mapping. Paths that do not start with `source` are returned unchanged.
    pub fn apply(&self, path: &str) -> String {
        match path.strip_prefix(self.source.as_str()) {
            Some(rest) if !self.source.is_empty() => format!("{}{}", self.target, rest),
            _ => path.to_string(),
        }
    }
}

/// Scanner tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Number of files whose tags are read concurrently
    pub max_concurrent_extractions: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_concurrent_extractions: 4,
        }
    }
}

/// Remote metadata API settings.
///
/// API keys should come from the environment or a secrets file, never from
/// source.
#[derive(Clone, PartialEq, Eq)]
pub struct MetadataApiConfig {
    /// Last.fm API key. Without one, remote lookups report "unavailable".
    pub lastfm_api_key: Option<String>,

    /// Minimum delay between two requests to the same provider
    pub rate_limit_delay_ms: u64,
}

impl std::fmt::Debug for MetadataApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataApiConfig")
            .field(
                "lastfm_api_key",
                &self.lastfm_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("rate_limit_delay_ms", &self.rate_limit_delay_ms)
            .finish()
    }
}

impl Default for MetadataApiConfig {
    fn default() -> Self {
        Self {
            lastfm_api_key: None,
            rate_limit_delay_ms: 200,
        }
    }
}

impl MetadataApiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Last.fm API key
    pub fn with_lastfm_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.lastfm_api_key = Some(api_key.into());
        self
    }

    /// Sets the rate limit delay in milliseconds
    pub fn with_rate_limit_delay_ms(mut self, delay_ms: u64) -> Self {
        self.rate_limit_delay_ms = delay_ms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(key) = &self.lastfm_api_key {
            if key.trim().is_empty() {
                return Err(Error::Config("Last.fm API key cannot be empty".to_string()));
            }
        }

        if self.rate_limit_delay_ms > 60_000 {
            return Err(Error::Config(
                "Rate limit delay exceeds maximum of 60 seconds (60,000ms)".to_string(),
            ));
        }

        Ok(())
    }

    /// Checks if Last.fm is configured
    pub fn has_lastfm(&self) -> bool {
        self.lastfm_api_key.is_some()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Build a configuration from `SETLIST_*` and `LASTFM_API_KEY` variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a variable is malformed or only one half
    /// of the path mapping is set.
    pub fn from_env() -> Result<Self> {
        Self::builder_from_env()?.build()
    }

    /// Like [`CoreConfig::from_env`], but returns the builder so hosts can
    /// inject bridges (an HTTP client for Last.fm, a clock) before building.
    pub fn builder_from_env() -> Result<CoreConfigBuilder> {
        Self::builder_from_lookup(|key| std::env::var(key).ok())
    }

    fn builder_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<CoreConfigBuilder> {
        let mut builder = CoreConfig::builder()
            .database_path(
                lookup("SETLIST_DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATABASE_PATH.into()),
            )
            .music_root(lookup("SETLIST_MUSIC_PATH").unwrap_or_else(|| DEFAULT_MUSIC_PATH.into()));

        if let Some(dir) = lookup("SETLIST_EXPORT_DIR") {
            builder = builder.export_dir(dir);
        }

        match (lookup("SETLIST_MAPPING_SOURCE"), lookup("SETLIST_MAPPING_TARGET")) {
            (Some(source), Some(target)) => {
                builder = builder.path_mapping(PathMapping::new(source, target));
            }
            (None, None) => {}
            _ => {
                return Err(Error::Config(
                    "SETLIST_MAPPING_SOURCE and SETLIST_MAPPING_TARGET must be set together"
                        .to_string(),
                ))
            }
        }

        if let Some(raw) = lookup("SETLIST_SCAN_CONCURRENCY") {
            let value = raw.parse::<usize>().map_err(|_| Error::InvalidEnv {
                key: "SETLIST_SCAN_CONCURRENCY".to_string(),
                value: raw.clone(),
            })?;
            builder = builder.max_concurrent_extractions(value);
        }

        if let Some(key) = lookup("LASTFM_API_KEY") {
            builder = builder.lastfm_api_key(key);
        }

        Ok(builder)
    }

    /// Validates the configuration.
    ///
    /// Checks that paths are set, scan concurrency is positive, and an HTTP
    /// client is present whenever a remote API key is configured.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.music_root.as_os_str().is_empty() {
            return Err(Error::Config("Music root cannot be empty".to_string()));
        }

        if self.scan.max_concurrent_extractions == 0 {
            return Err(Error::Config(
                "Scan concurrency must be at least 1".to_string(),
            ));
        }

        if let Some(mapping) = &self.path_mapping {
            if mapping.source.is_empty() {
                return Err(Error::Config(
                    "Path mapping source cannot be empty".to_string(),
                ));
            }
        }

        self.metadata_api_config.validate()?;

        if self.metadata_api_config.has_lastfm() && self.http_client.is_none() {
            return Err(Error::CapabilityMissing {
                capability: "HttpClient".to_string(),
                message: "A Last.fm API key is configured but no HttpClient was provided. \
                          Desktop: inject bridge_desktop::ReqwestHttpClient."
                    .to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    music_root: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    path_mapping: Option<PathMapping>,
    scan: ScanSettings,
    metadata_api_config: MetadataApiConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the SQLite database path.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the directory reconciled into the catalog.
    pub fn music_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.music_root = Some(path.into());
        self
    }

    pub fn export_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.export_dir = Some(path.into());
        self
    }

    pub fn path_mapping(mut self, mapping: PathMapping) -> Self {
        self.path_mapping = Some(mapping);
        self
    }

    pub fn max_concurrent_extractions(mut self, limit: usize) -> Self {
        self.scan.max_concurrent_extractions = limit;
        self
    }

    pub fn lastfm_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.metadata_api_config.lastfm_api_key = Some(api_key.into());
        self
    }

    pub fn metadata_api_config(mut self, config: MetadataApiConfig) -> Self {
        self.metadata_api_config = config;
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Overrides the time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the database path or music root is
    /// missing, or any value fails [`CoreConfig::validate`].
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self
            .database_path
            .ok_or_else(|| Error::Config("Database path is required".to_string()))?;
        let music_root = self
            .music_root
            .ok_or_else(|| Error::Config("Music root is required".to_string()))?;

        let config = CoreConfig {
            database_path,
            music_root,
            export_dir: self.export_dir,
            path_mapping: self.path_mapping,
            scan: self.scan,
            metadata_api_config: self.metadata_api_config,
            http_client: self.http_client,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;
        Ok(config)
    }
}
