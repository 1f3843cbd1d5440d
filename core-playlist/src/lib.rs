//! # Playlist Composition
//!
//! Ordered playlists mixing catalog files, remote tracks, nested playlists,
//! requested tracks and albums.
//!
//! - [`PlaylistEngine`] owns every playlist mutation and read
//! - [`export`] renders playlists as M3U

pub mod engine;
pub mod error;
pub mod export;
mod ordering;
mod resolve;

pub use engine::PlaylistEngine;
pub use error::{PlaylistError, Result};
pub use export::{playlist_file_name, render_m3u, M3uOptions};
