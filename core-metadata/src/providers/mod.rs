//! External Metadata Providers
//!
//! Remote lookups (similar tracks, track search, album art) sit behind
//! [`RemoteMetadataProvider`]. Callers go through [`RemoteMetadata`], which
//! turns a missing provider or a failed request into
//! [`RemoteLookup::Unavailable`] instead of an error.

pub mod lastfm;

pub use lastfm::LastFmClient;

use crate::error::Result;
use async_trait::async_trait;
use core_library::models::{EntryRef, TrackDetails};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// A track as described by a remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrackInfo {
    pub title: String,
    pub artist: String,
    /// Canonical page of the track on the service
    pub url: Option<String>,
}

impl RemoteTrackInfo {
    /// Playlist reference for this track. Tracks without a URL cannot be
    /// stored as remote entries.
    pub fn to_entry_ref(&self) -> Option<EntryRef> {
        self.url.as_ref().map(|url| {
            EntryRef::remote_track(url.clone(), TrackDetails::new(&self.title, &self.artist))
        })
    }
}

#[async_trait]
pub trait RemoteMetadataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Tracks similar to `artist - title`, most similar first
    async fn similar_tracks(&self, artist: &str, title: &str) -> Result<Vec<RemoteTrackInfo>>;

    /// Best match for `artist - title`, if any
    async fn search_track(&self, artist: &str, title: &str) -> Result<Option<RemoteTrackInfo>>;

    /// URL of the largest cover image available for an album
    async fn album_art(&self, artist: &str, album: &str) -> Result<Option<String>>;
}

/// Outcome of a lookup that is allowed to fail softly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum RemoteLookup<T> {
    Available(T),
    Unavailable(String),
}

impl<T> RemoteLookup<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, RemoteLookup::Available(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            RemoteLookup::Available(value) => Some(value),
            RemoteLookup::Unavailable(_) => None,
        }
    }
}

impl<T: Default> RemoteLookup<T> {
    /// The value, or `T::default()` (an empty list, `None`) when unavailable.
    pub fn unwrap_or_empty(self) -> T {
        self.into_option().unwrap_or_default()
    }
}

/// Degrading front for an optional provider.
#[derive(Clone, Default)]
pub struct RemoteMetadata {
    provider: Option<Arc<dyn RemoteMetadataProvider>>,
}

impl RemoteMetadata {
    pub fn new(provider: Arc<dyn RemoteMetadataProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// Front with no provider; every lookup reports unavailable.
    pub fn disabled() -> Self {
        Self { provider: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn similar_tracks(&self, artist: &str, title: &str) -> RemoteLookup<Vec<RemoteTrackInfo>> {
        match &self.provider {
            Some(p) => Self::degrade(p.name(), p.similar_tracks(artist, title).await),
            None => Self::not_configured(),
        }
    }

    pub async fn search_track(
        &self,
        artist: &str,
        title: &str,
    ) -> RemoteLookup<Option<RemoteTrackInfo>> {
        match &self.provider {
            Some(p) => Self::degrade(p.name(), p.search_track(artist, title).await),
            None => Self::not_configured(),
        }
    }

    pub async fn album_art(&self, artist: &str, album: &str) -> RemoteLookup<Option<String>> {
        match &self.provider {
            Some(p) => Self::degrade(p.name(), p.album_art(artist, album).await),
            None => Self::not_configured(),
        }
    }

    fn degrade<T>(provider: &str, result: Result<T>) -> RemoteLookup<T> {
        match result {
            Ok(value) => RemoteLookup::Available(value),
            Err(e) => {
                warn!(provider, error = %e, "Remote lookup failed");
                RemoteLookup::Unavailable(e.to_string())
            }
        }
    }

    fn not_configured<T>() -> RemoteLookup<T> {
        RemoteLookup::Unavailable("no remote metadata provider configured".to_string())
    }
}

impl std::fmt::Debug for RemoteMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteMetadata")
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}
