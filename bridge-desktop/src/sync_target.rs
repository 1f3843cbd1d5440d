//! Playlist sync target that drops rendered playlists into a directory.
//!
//! Useful for media servers and portable players that watch a folder for
//! `.m3u` files.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    sync_target::PlaylistSyncTarget,
};
use std::path::{Path, PathBuf};
use tracing::info;

pub struct DirectorySyncTarget {
    directory: PathBuf,
}

impl DirectorySyncTarget {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Destination file for a display name. Path separators are replaced so a
    /// name can never escape the target directory.
    pub fn destination_for(&self, display_name: &str) -> PathBuf {
        let safe: String = display_name
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '\0' => '_',
                c => c,
            })
            .collect();
        self.directory.join(format!("{}.m3u", safe.trim()))
    }
}

#[async_trait]
impl PlaylistSyncTarget for DirectorySyncTarget {
    fn name(&self) -> &str {
        "directory"
    }

    async fn push(&self, playlist_file: &Path, display_name: &str) -> Result<()> {
        if display_name.trim().is_empty() {
            return Err(BridgeError::OperationFailed(
                "Playlist display name cannot be empty".to_string(),
            ));
        }

        tokio::fs::create_dir_all(&self.directory).await?;
        let destination = self.destination_for(display_name);
        tokio::fs::copy(playlist_file, &destination).await?;

        info!(
            source = %playlist_file.display(),
            destination = %destination.display(),
            "Playlist pushed to directory target"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_copies_file_under_display_name() {
        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let rendered = source_dir.path().join("rendered.m3u");
        tokio::fs::write(&rendered, "/music/a.mp3\n").await.unwrap();

        let target = DirectorySyncTarget::new(target_dir.path().join("playlists"));
        target.push(&rendered, "Road Trip").await.unwrap();

        let copied = tokio::fs::read_to_string(target_dir.path().join("playlists/Road Trip.m3u"))
            .await
            .unwrap();
        assert_eq!(copied, "/music/a.mp3\n");
    }

    #[test]
    fn test_destination_is_sanitised() {
        let target = DirectorySyncTarget::new("/srv/playlists");
        assert_eq!(
            target.destination_for("../etc/passwd"),
            PathBuf::from("/srv/playlists/.._etc_passwd.m3u")
        );
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let target = DirectorySyncTarget::new("/tmp");
        let result = target.push(Path::new("/tmp/none.m3u"), "  ").await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }
}
