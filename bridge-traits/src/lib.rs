//! # Host Bridge Traits
//!
//! Capabilities the setlist core needs from its host but does not implement
//! itself.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP used by remote metadata lookups
//! - [`Clock`](time::Clock) - Time source for `last_scanned` stamps and deterministic tests
//! - [`PlaylistSyncTarget`](sync_target::PlaylistSyncTarget) - Receives rendered playlist files
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert their native errors into it and keep the message actionable
//! (include the URL, path or status involved).
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync` so adapters can be shared across tasks.
//!
//! ## Examples
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
//!
//! async fn fetch(client: &dyn HttpClient) -> bridge_traits::error::Result<String> {
//!     let request = HttpRequest::new(HttpMethod::Get, "https://example.com")
//!         .query("format", "json");
//!     client.execute(request).await?.text()
//! }
//! ```

pub mod error;
pub mod http;
pub mod sync_target;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use sync_target::PlaylistSyncTarget;
pub use time::{Clock, FixedClock, SystemClock};
