//! Last.fm API Client
//!
//! Similar-track, track-search and album-art lookups against the Last.fm
//! web service.
//!
//! ## API Endpoints
//!
//! - **Similar tracks**: `method=track.getsimilar&artist={artist}&track={title}&limit=10`
//! - **Track search**: `method=track.search&artist={artist}&track={title}&limit=1`
//! - **Album info**: `method=album.getinfo&artist={artist}&album={album}`
//!
//! Every request carries `api_key` and `format=json`.
//!
//! ## Rate Limiting
//!
//! A minimum delay is enforced between consecutive requests from one client.
//! HTTP 429 is reported as [`MetadataError::RateLimited`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::providers::lastfm::LastFmClient;
//!
//! let client = LastFmClient::new(http_client, "your_api_key".to_string(), 200);
//! let similar = client.similar_tracks("Portishead", "Roads").await?;
//! ```

use super::{RemoteMetadataProvider, RemoteTrackInfo};
use crate::error::{MetadataError, Result};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_runtime::config::MetadataApiConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Last.fm API base URL
const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";

/// Timeout for API requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SIMILAR_TRACKS_LIMIT: u32 = 10;

/// Last.fm error code for an unknown track, artist or album
const ERROR_NOT_FOUND: i32 = 6;

/// Last.fm API client
pub struct LastFmClient {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// Enforces a delay between requests
struct RateLimiter {
    last_request: Option<Instant>,
    min_delay: Duration,
}

impl RateLimiter {
    fn new(delay_ms: u64) -> Self {
        Self {
            last_request: None,
            min_delay: Duration::from_millis(delay_ms),
        }
    }

    async fn wait_if_needed(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

// ============================================================================
// Response shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SimilarResponse {
    similartracks: Option<SimilarTracks>,
}

#[derive(Debug, Deserialize)]
struct SimilarTracks {
    #[serde(default)]
    track: Vec<SimilarTrack>,
}

#[derive(Debug, Deserialize)]
struct SimilarTrack {
    #[serde(default)]
    name: String,
    url: Option<String>,
    artist: Option<NamedArtist>,
}

#[derive(Debug, Deserialize)]
struct NamedArtist {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Option<SearchResults>,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    trackmatches: Option<TrackMatches>,
}

#[derive(Debug, Deserialize)]
struct TrackMatches {
    #[serde(default)]
    track: Vec<SearchTrack>,
}

/// `track.search` returns the artist as a plain string
#[derive(Debug, Deserialize)]
struct SearchTrack {
    #[serde(default)]
    name: String,
    #[serde(default)]
    artist: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlbumResponse {
    album: Option<AlbumInfo>,
}

#[derive(Debug, Deserialize)]
struct AlbumInfo {
    #[serde(default)]
    image: Vec<AlbumImage>,
}

#[derive(Debug, Clone, Deserialize)]
struct AlbumImage {
    #[serde(rename = "#text")]
    url: String,
    size: String,
}

impl LastFmClient {
    /// Creates a new Last.fm API client
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client for making requests
    /// * `api_key` - Last.fm API key
    /// * `rate_limit_delay_ms` - Minimum delay between requests in milliseconds
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: String, rate_limit_delay_ms: u64) -> Self {
        Self {
            http_client,
            api_key,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(rate_limit_delay_ms))),
        }
    }

    /// Client for the configured key, or `None` when no key is set.
    pub fn from_config(http_client: Arc<dyn HttpClient>, config: &MetadataApiConfig) -> Option<Self> {
        config
            .lastfm_api_key
            .as_ref()
            .map(|key| Self::new(http_client, key.clone(), config.rate_limit_delay_ms))
    }

    /// Issue one API call and decode the body.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(T))` - decoded response
    /// - `Ok(None)` - Last.fm reported the entity as unknown (error 6)
    /// - `Err` - transport, HTTP, API or decoding failure
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let mut request = HttpRequest::get(LASTFM_API_BASE)
            .query("method", method)
            .query("api_key", self.api_key.as_str())
            .query("format", "json")
            .header("User-Agent", "Setlist/0.1")
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);
        for (key, value) in params {
            request = request.query(*key, *value);
        }

        self.rate_limiter.lock().await.wait_if_needed().await;

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| MetadataError::NetworkError(format!("Last.fm request failed: {}", e)))?;

        Self::decode(method, response)
    }

    fn decode<T: DeserializeOwned>(method: &str, response: HttpResponse) -> Result<Option<T>> {
        if !response.is_success() {
            if response.status == 429 {
                let retry_after = response
                    .headers
                    .get("Retry-After")
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);

                return Err(MetadataError::RateLimited {
                    provider: "Last.fm".to_string(),
                    retry_after_seconds: retry_after,
                });
            }

            // Last.fm also answers unknown entities with a 4xx plus an error body.
            if let Ok(error) = serde_json::from_slice::<ErrorResponse>(&response.body) {
                if error.error == ERROR_NOT_FOUND {
                    debug!(method, "Last.fm reported not found");
                    return Ok(None);
                }
            }

            return Err(MetadataError::HttpError {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).to_string(),
            });
        }

        if let Ok(error) = serde_json::from_slice::<ErrorResponse>(&response.body) {
            if error.error == ERROR_NOT_FOUND {
                debug!(method, "Last.fm reported not found");
                return Ok(None);
            }
            return Err(MetadataError::RemoteApi(format!(
                "Last.fm API error {}: {}",
                error.error, error.message
            )));
        }

        serde_json::from_slice::<T>(&response.body)
            .map(Some)
            .map_err(|e| MetadataError::JsonParse(format!("Failed to parse Last.fm {} response: {}", method, e)))
    }

    /// Prefer sizes in order: mega > extralarge > large > medium > first listed.
    fn best_image(images: &[AlbumImage]) -> Option<String> {
        ["mega", "extralarge", "large", "medium"]
            .iter()
            .find_map(|size| images.iter().find(|img| img.size == *size && !img.url.is_empty()))
            .or_else(|| images.iter().find(|img| !img.url.is_empty()))
            .map(|img| img.url.clone())
    }
}

#[async_trait]
impl RemoteMetadataProvider for LastFmClient {
    fn name(&self) -> &str {
        "Last.fm"
    }

    #[instrument(skip(self))]
    async fn similar_tracks(&self, artist: &str, title: &str) -> Result<Vec<RemoteTrackInfo>> {
        let limit = SIMILAR_TRACKS_LIMIT.to_string();
        let response: Option<SimilarResponse> = self
            .call(
                "track.getsimilar",
                &[("artist", artist), ("track", title), ("limit", limit.as_str())],
            )
            .await?;

        let tracks = response
            .and_then(|r| r.similartracks)
            .map(|s| s.track)
            .unwrap_or_default()
            .into_iter()
            .take(SIMILAR_TRACKS_LIMIT as usize)
            .map(|t| RemoteTrackInfo {
                title: t.name,
                artist: t.artist.map(|a| a.name).unwrap_or_default(),
                url: t.url.filter(|u| !u.is_empty()),
            })
            .collect::<Vec<_>>();

        debug!(count = tracks.len(), "Similar tracks fetched");
        Ok(tracks)
    }

    #[instrument(skip(self))]
    async fn search_track(&self, artist: &str, title: &str) -> Result<Option<RemoteTrackInfo>> {
        let response: Option<SearchResponse> = self
            .call(
                "track.search",
                &[("artist", artist), ("track", title), ("limit", "1")],
            )
            .await?;

        let first = response
            .and_then(|r| r.results)
            .and_then(|r| r.trackmatches)
            .and_then(|m| m.track.into_iter().next())
            .map(|t| RemoteTrackInfo {
                title: t.name,
                artist: t.artist,
                url: t.url.filter(|u| !u.is_empty()),
            });

        Ok(first)
    }

    #[instrument(skip(self))]
    async fn album_art(&self, artist: &str, album: &str) -> Result<Option<String>> {
        let response: Option<AlbumResponse> = self
            .call("album.getinfo", &[("artist", artist), ("album", album)])
            .await?;

        Ok(response
            .and_then(|r| r.album)
            .and_then(|a| Self::best_image(&a.image)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use mockall::mock;

    mock! {
        pub Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn client_with(http: MockHttp) -> LastFmClient {
        LastFmClient::new(Arc::new(http), "test-key".to_string(), 0)
    }

    #[tokio::test]
    async fn test_similar_tracks_parses_and_sends_params() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| {
                req.query_value("method") == Some("track.getsimilar")
                    && req.query_value("artist") == Some("Portishead")
                    && req.query_value("track") == Some("Roads")
                    && req.query_value("limit") == Some("10")
                    && req.query_value("api_key") == Some("test-key")
            })
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    r#"{"similartracks":{"track":[
                        {"name":"Glory Box","url":"https://www.last.fm/music/Portishead/_/Glory+Box","artist":{"name":"Portishead"}},
                        {"name":"Teardrop","url":"https://www.last.fm/music/Massive+Attack/_/Teardrop","artist":{"name":"Massive Attack"}}
                    ]}}"#,
                ))
            });

        let tracks = client_with(http)
            .similar_tracks("Portishead", "Roads")
            .await
            .unwrap();

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].title, "Teardrop");
        assert_eq!(tracks[1].artist, "Massive Attack");
        assert!(tracks[0].url.as_deref().unwrap().contains("Glory+Box"));
    }

    #[tokio::test]
    async fn test_search_track_returns_first_match_or_none() {
        let mut http = MockHttp::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(
                200,
                r#"{"results":{"trackmatches":{"track":[
                    {"name":"Roads","artist":"Portishead","url":"https://www.last.fm/music/Portishead/_/Roads"},
                    {"name":"Roads (Live)","artist":"Portishead","url":"https://x"}
                ]}}}"#,
            ))
        });
        let found = client_with(http).search_track("Portishead", "Roads").await.unwrap();
        assert_eq!(found.unwrap().title, "Roads");

        let mut http = MockHttp::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(
                200,
                r#"{"results":{"trackmatches":{"track":[]}}}"#,
            ))
        });
        assert!(client_with(http).search_track("X", "Y").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_album_art_prefers_largest_image() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| req.query_value("method") == Some("album.getinfo"))
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    r##"{"album":{"image":[
                        {"#text":"https://img/small.png","size":"small"},
                        {"#text":"https://img/large.png","size":"large"},
                        {"#text":"https://img/xl.png","size":"extralarge"},
                        {"#text":"","size":"mega"}
                    ]}}"##,
                ))
            });

        let url = client_with(http).album_art("Portishead", "Dummy").await.unwrap();
        assert_eq!(url.as_deref(), Some("https://img/xl.png"));
    }

    #[tokio::test]
    async fn test_not_found_error_code_is_none() {
        let mut http = MockHttp::new();
        http.expect_execute().returning(|_| {
            Ok(HttpResponse::new(
                200,
                r#"{"error":6,"message":"Track not found"}"#,
            ))
        });

        let client = client_with(http);
        assert!(client.search_track("X", "Y").await.unwrap().is_none());
        assert!(client.similar_tracks("X", "Y").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_and_api_errors() {
        let mut http = MockHttp::new();
        http.expect_execute().returning(|_| {
            let mut response = HttpResponse::new(429, "");
            response
                .headers
                .insert("Retry-After".to_string(), "5".to_string());
            Ok(response)
        });
        let err = client_with(http).album_art("A", "B").await.unwrap_err();
        assert!(matches!(
            err,
            MetadataError::RateLimited {
                retry_after_seconds: 5,
                ..
            }
        ));

        let mut http = MockHttp::new();
        http.expect_execute().returning(|_| {
            Ok(HttpResponse::new(
                200,
                r#"{"error":10,"message":"Invalid API key"}"#,
            ))
        });
        let err = client_with(http).album_art("A", "B").await.unwrap_err();
        assert!(matches!(err, MetadataError::RemoteApi(_)));

        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Err(BridgeError::OperationFailed("connection refused".to_string())));
        let err = client_with(http).album_art("A", "B").await.unwrap_err();
        assert!(matches!(err, MetadataError::NetworkError(_)));
    }

    #[tokio::test]
    async fn test_from_config_requires_key() {
        let http: Arc<dyn HttpClient> = Arc::new(MockHttp::new());
        assert!(LastFmClient::from_config(http.clone(), &MetadataApiConfig::new()).is_none());

        let config = MetadataApiConfig::new().with_lastfm_api_key("key");
        assert!(LastFmClient::from_config(http, &config).is_some());
    }

    #[tokio::test]
    async fn test_rate_limiter_waits_between_requests() {
        let mut limiter = RateLimiter::new(50);
        let start = Instant::now();
        limiter.wait_if_needed().await;
        limiter.wait_if_needed().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
