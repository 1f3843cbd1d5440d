//! Lazy resolution of stored entries to detail snapshots.
//!
//! A target that no longer exists resolves to `None`; the entry itself is
//! kept.

use core_library::models::{AlbumDetail, EntryDetail, EntryTarget, PlaylistEntry, PlaylistEntryRow};
use core_library::repositories::{
    SqliteMusicFileRepository, SqlitePlaylistRepository, SqliteRemoteTrackRepository,
    SqliteRequestedTrackRepository,
};
use sqlx::SqliteConnection;

use crate::error::Result;

pub(crate) async fn entry_in(
    conn: &mut SqliteConnection,
    row: &PlaylistEntryRow,
) -> Result<PlaylistEntry> {
    let target = row.target()?;
    let details = target_in(conn, &target).await?;

    Ok(PlaylistEntry {
        id: row.id,
        position: row.position,
        kind: target.kind(),
        target,
        details,
    })
}

async fn target_in(conn: &mut SqliteConnection, target: &EntryTarget) -> Result<Option<EntryDetail>> {
    let detail = match target {
        EntryTarget::MusicFile { id } => SqliteMusicFileRepository::find_by_id_in(conn, *id)
            .await?
            .map(EntryDetail::MusicFile),
        EntryTarget::RemoteTrack { id } => SqliteRemoteTrackRepository::find_by_id_in(conn, *id)
            .await?
            .map(EntryDetail::RemoteTrack),
        EntryTarget::NestedPlaylist { id } => SqlitePlaylistRepository::summary_in(conn, *id)
            .await?
            .map(EntryDetail::NestedPlaylist),
        EntryTarget::RequestedTrack { id } => {
            SqliteRequestedTrackRepository::find_by_id_in(conn, *id)
                .await?
                .map(EntryDetail::RequestedTrack)
        }
        EntryTarget::Album { artist, title } => {
            let tracks = SqliteMusicFileRepository::album_tracks_in(conn, artist, title).await?;
            if tracks.is_empty() {
                None
            } else {
                Some(EntryDetail::Album(AlbumDetail {
                    artist: artist.clone(),
                    title: title.clone(),
                    tracks,
                }))
            }
        }
    };

    Ok(detail)
}
