//! # Desktop Bridge Implementations
//!
//! Default implementations of the bridge traits for desktop hosts
//! (macOS, Windows, Linux):
//!
//! - `HttpClient` using `reqwest`
//! - `PlaylistSyncTarget` writing into a local directory with `tokio::fs`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DirectorySyncTarget, ReqwestHttpClient};
//!
//! let http_client = ReqwestHttpClient::new()?;
//! let target = DirectorySyncTarget::new("/srv/media/playlists");
//! ```

mod http;
mod sync_target;

pub use http::ReqwestHttpClient;
pub use sync_target::DirectorySyncTarget;
