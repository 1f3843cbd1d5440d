//! External playlist sync targets.
//!
//! A sync target receives a playlist that has already been rendered to a
//! portable file (M3U) and pushes it somewhere the core knows nothing about:
//! a media server, a device folder, a network share.

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

#[async_trait]
pub trait PlaylistSyncTarget: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Hand off a rendered playlist file under the given display name.
    ///
    /// # Errors
    ///
    /// Returns an error if the target rejects or cannot receive the file.
    async fn push(&self, playlist_file: &Path, display_name: &str) -> Result<()>;
}
