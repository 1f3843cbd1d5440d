//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations.
//!
//! - Traits define the standalone operations of each entity
//! - `Sqlite*Repository` types hold a pool and implement the trait
//! - Operations that other crates compose inside one transaction are also
//!   exposed as `*_in(&mut SqliteConnection, ..)` associated functions
//!
//! ## Available Repositories
//!
//! - `MusicFileRepository` - Indexed local files keyed by path
//! - `RemoteTrackRepository` - Remote tracks keyed by canonical URL
//! - `RequestedTrackRepository` - Wanted tracks keyed by artist and title
//! - `PlaylistRepository` - Playlists and their positioned entries

mod genres;
pub mod music_file;
pub mod pagination;
pub mod playlist;
pub mod remote_track;
pub mod requested_track;

pub use music_file::{MusicFileRepository, SqliteMusicFileRepository};
pub use pagination::{Page, PageRequest};
pub use playlist::{PlaylistRepository, SqlitePlaylistRepository};
pub use remote_track::{RemoteTrackRepository, SqliteRemoteTrackRepository};
pub use requested_track::{RequestedTrackRepository, SqliteRequestedTrackRepository};
