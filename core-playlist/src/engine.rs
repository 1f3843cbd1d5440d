//! # Playlist Engine
//!
//! Ordered, mixed-kind playlists with positional mutations.
//!
//! ## Overview
//!
//! Every mutation runs in one SQLite transaction: either all of its entry
//! writes land or none do. Remote and requested tracks are find-or-created in
//! their registries before an entry points at them, so the same URL or
//! `(artist, title)` pair is shared by every playlist that references it.
//!
//! ## Positions
//!
//! Positions are dense (`0..n`) after `add_entries`, `reorder_entries`,
//! `replace_entries` and the undo forms of removal and reordering. A plain
//! `remove_entries` deletes rows without renumbering, so gaps can appear;
//! the next renumbering mutation closes them.
//!
//! `remove_entries` matches the stored positions it is given. The positions
//! passed to `reorder_entries` index entries in position order instead, so a
//! reorder after a removal closes the gaps first and its undo sees the same
//! numbering. `reorder_entries(id, &[], 0, false)` only compacts.
//!
//! ## Undo
//!
//! Each entry mutation accepts an `undo` flag that replays its inverse from
//! the same arguments:
//!
//! | Operation | Inverse |
//! |---|---|
//! | add `k` entries | remove the last `k` entries |
//! | remove entries at positions | re-add the same entries at those positions |
//! | move block to `destination` | lift the block at `destination`, put it back |

use bridge_traits::time::Clock;
use bridge_traits::PlaylistSyncTarget;
use core_library::models::{
    EntryRef, EntryTarget, PlaylistSummary, PlaylistWithEntries, PositionedRef,
};
use core_library::repositories::{
    PlaylistRepository, SqliteMusicFileRepository, SqlitePlaylistRepository,
    SqliteRemoteTrackRepository, SqliteRequestedTrackRepository,
};
use core_library::LibraryError;
use core_runtime::events::{CoreEvent, EventBus, PlaylistEvent};
use sqlx::{SqliteConnection, SqlitePool};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{PlaylistError, Result};
use crate::export::{playlist_file_name, render_m3u, M3uOptions};
use crate::{ordering, resolve};

pub struct PlaylistEngine {
    pool: SqlitePool,
    playlists: SqlitePlaylistRepository,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
}

impl PlaylistEngine {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, event_bus: EventBus) -> Self {
        Self {
            playlists: SqlitePlaylistRepository::new(pool.clone()),
            pool,
            clock,
            event_bus,
        }
    }

    // =========================================================================
    // Playlists
    // =========================================================================

    /// Create a playlist and add `entries` to it.
    ///
    /// # Errors
    /// - `Validation` if an entry reference is malformed
    /// - `Library(InvalidInput | Duplicate)` for a blank or taken name
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn create(&self, name: &str, entries: &[EntryRef]) -> Result<PlaylistSummary> {
        for entry in entries {
            validate_ref(None, entry)?;
        }

        let now = self.clock.unix_timestamp();
        let mut tx = self.pool.begin().await?;

        let playlist = SqlitePlaylistRepository::insert_in(&mut tx, name.trim(), now).await?;
        let added = append_in(&mut tx, playlist.id, entries, now).await?;
        let summary = summary_in(&mut tx, playlist.id).await?;

        tx.commit().await?;

        info!(playlist_id = playlist.id, added, "Playlist created");
        self.emit(PlaylistEvent::Created {
            playlist_id: playlist.id,
            name: playlist.name,
        });
        Ok(summary)
    }

    /// Every playlist with its entry count, ordered by name.
    pub async fn list(&self) -> Result<Vec<PlaylistSummary>> {
        Ok(self.playlists.list().await?)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<PlaylistSummary>> {
        let Some(playlist) = self.playlists.find_by_name(name).await? else {
            return Ok(None);
        };
        let mut conn = self.pool.acquire().await?;
        Ok(SqlitePlaylistRepository::summary_in(&mut conn, playlist.id).await?)
    }

    /// Number of entries in a playlist.
    pub async fn count(&self, playlist_id: i64) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        SqlitePlaylistRepository::require_in(&mut conn, playlist_id).await?;
        Ok(SqlitePlaylistRepository::entry_count_in(&mut conn, playlist_id).await?)
    }

    #[instrument(skip(self))]
    pub async fn rename(&self, playlist_id: i64, name: &str) -> Result<PlaylistSummary> {
        let now = self.clock.unix_timestamp();
        let playlist = self.playlists.rename(playlist_id, name.trim(), now).await?;

        self.emit(PlaylistEvent::Renamed {
            playlist_id,
            name: playlist.name,
        });

        let mut conn = self.pool.acquire().await?;
        summary_in(&mut conn, playlist_id).await
    }

    /// Delete a playlist and its entries. Entries in other playlists that
    /// nest it become orphans.
    ///
    /// Returns `false` if there was no such playlist.
    #[instrument(skip(self))]
    pub async fn delete(&self, playlist_id: i64) -> Result<bool> {
        let deleted = self.playlists.delete(playlist_id).await?;
        if deleted {
            info!("Playlist deleted");
            self.emit(PlaylistEvent::Deleted { playlist_id });
        }
        Ok(deleted)
    }

    /// Copy a playlist under a new name. Entries are copied by reference,
    /// orphans included.
    #[instrument(skip(self))]
    pub async fn clone_playlist(&self, playlist_id: i64, new_name: &str) -> Result<PlaylistSummary> {
        let now = self.clock.unix_timestamp();
        let mut tx = self.pool.begin().await?;

        SqlitePlaylistRepository::require_in(&mut tx, playlist_id).await?;
        let rows = SqlitePlaylistRepository::entry_rows_in(&mut tx, playlist_id).await?;
        let copy = SqlitePlaylistRepository::insert_in(&mut tx, new_name.trim(), now).await?;

        for (position, row) in rows.iter().enumerate() {
            SqlitePlaylistRepository::insert_entry_in(&mut tx, copy.id, position as i64, &row.target()?)
                .await?;
        }
        let summary = summary_in(&mut tx, copy.id).await?;

        tx.commit().await?;

        info!(copy_id = copy.id, entries = rows.len(), "Playlist cloned");
        self.emit(PlaylistEvent::Created {
            playlist_id: copy.id,
            name: copy.name,
        });
        Ok(summary)
    }

    // =========================================================================
    // Entries
    // =========================================================================

    /// The playlist and one window of its entries in position order.
    ///
    /// `offset` defaults to 0 and a missing `limit` means "to the end".
    /// Entries whose target is gone carry `details: None`.
    #[instrument(skip(self))]
    pub async fn get_with_entries(
        &self,
        playlist_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<PlaylistWithEntries> {
        if limit.is_some_and(|l| l < 0) || offset.is_some_and(|o| o < 0) {
            return Err(PlaylistError::validation("limit and offset cannot be negative"));
        }

        let mut conn = self.pool.acquire().await?;
        let playlist = SqlitePlaylistRepository::require_in(&mut conn, playlist_id).await?;
        let total_entries = SqlitePlaylistRepository::entry_count_in(&mut conn, playlist_id).await?;
        let rows = SqlitePlaylistRepository::entry_rows_page_in(
            &mut conn,
            playlist_id,
            limit,
            offset.unwrap_or(0),
        )
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(resolve::entry_in(&mut conn, row).await?);
        }

        Ok(PlaylistWithEntries {
            playlist,
            total_entries,
            entries,
        })
    }

    /// Append entries, or with `undo`, remove the last `entries.len()`.
    ///
    /// Music file references to unknown ids and nested references to unknown
    /// playlists are skipped with a warning.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn add_entries(
        &self,
        playlist_id: i64,
        entries: &[EntryRef],
        undo: bool,
    ) -> Result<PlaylistSummary> {
        if !undo {
            for entry in entries {
                validate_ref(Some(playlist_id), entry)?;
            }
        }

        let now = self.clock.unix_timestamp();
        let mut tx = self.pool.begin().await?;
        SqlitePlaylistRepository::require_in(&mut tx, playlist_id).await?;

        if undo {
            let rows = SqlitePlaylistRepository::entry_rows_in(&mut tx, playlist_id).await?;
            let keep = rows.len().saturating_sub(entries.len());
            let (kept, dropped) = rows.split_at(keep);

            let dropped: Vec<i64> = dropped.iter().map(|r| r.id).collect();
            SqlitePlaylistRepository::delete_entries_in(&mut tx, &dropped).await?;
            if !ordering::is_dense(kept) {
                let order: Vec<i64> = kept.iter().map(|r| r.id).collect();
                SqlitePlaylistRepository::rewrite_positions_in(&mut tx, playlist_id, &order).await?;
            }
            debug!(removed = dropped.len(), "Undid add");
        } else {
            let added = append_in(&mut tx, playlist_id, entries, now).await?;
            debug!(added, "Entries added");
        }

        self.finish_mutation(tx, playlist_id, now).await
    }

    /// Delete the entries at the given positions without renumbering, or
    /// with `undo`, put the given entries back at their positions.
    ///
    /// # Errors
    /// `Validation` if a position is repeated or holds no entry.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn remove_entries(
        &self,
        playlist_id: i64,
        entries: &[PositionedRef],
        undo: bool,
    ) -> Result<PlaylistSummary> {
        if undo {
            for positioned in entries {
                validate_ref(Some(playlist_id), &positioned.entry)?;
            }
        }

        let now = self.clock.unix_timestamp();
        let mut tx = self.pool.begin().await?;
        SqlitePlaylistRepository::require_in(&mut tx, playlist_id).await?;
        let rows = SqlitePlaylistRepository::entry_rows_in(&mut tx, playlist_id).await?;

        if undo {
            let mut order: Vec<i64> = rows.iter().map(|r| r.id).collect();
            let mut next_free = rows.last().map_or(0, |r| r.position + 1);
            let mut placed = Vec::with_capacity(entries.len());

            for positioned in entries {
                let Some(target) = target_in(&mut tx, playlist_id, &positioned.entry, now).await?
                else {
                    continue;
                };
                let id = SqlitePlaylistRepository::insert_entry_in(&mut tx, playlist_id, next_free, &target)
                    .await?;
                next_free += 1;
                placed.push((positioned.position, id));
            }

            debug!(restored = placed.len(), "Undid remove");
            order = ordering::insert_at_positions(order, placed);
            SqlitePlaylistRepository::rewrite_positions_in(&mut tx, playlist_id, &order).await?;
        } else {
            let positions: Vec<i64> = entries.iter().map(|e| e.position).collect();
            let doomed = ordering::ids_at(&rows, &positions)?;
            let removed = SqlitePlaylistRepository::delete_entries_in(&mut tx, &doomed).await?;
            debug!(removed, "Entries removed");
        }

        self.finish_mutation(tx, playlist_id, now).await
    }

    /// Move the entries at `positions` so they start at `destination` of the
    /// remaining sequence, or with `undo`, move them back.
    ///
    /// `positions` are indices into the entries in position order, which equal
    /// stored positions whenever the playlist has no gaps.
    ///
    /// # Errors
    /// `Validation` for repeated or unknown positions and out of range
    /// destinations, before anything is written.
    #[instrument(skip(self))]
    pub async fn reorder_entries(
        &self,
        playlist_id: i64,
        positions: &[i64],
        destination: i64,
        undo: bool,
    ) -> Result<PlaylistSummary> {
        let now = self.clock.unix_timestamp();
        let mut tx = self.pool.begin().await?;
        SqlitePlaylistRepository::require_in(&mut tx, playlist_id).await?;
        let rows = SqlitePlaylistRepository::entry_rows_in(&mut tx, playlist_id).await?;

        let order = if undo {
            ordering::restore_block(&rows, positions, destination)?
        } else {
            ordering::move_block(&rows, positions, destination)?
        };
        SqlitePlaylistRepository::rewrite_positions_in(&mut tx, playlist_id, &order).await?;

        self.finish_mutation(tx, playlist_id, now).await
    }

    /// Replace every entry with `entries`.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn replace_entries(&self, playlist_id: i64, entries: &[EntryRef]) -> Result<PlaylistSummary> {
        for entry in entries {
            validate_ref(Some(playlist_id), entry)?;
        }

        let now = self.clock.unix_timestamp();
        let mut tx = self.pool.begin().await?;
        SqlitePlaylistRepository::require_in(&mut tx, playlist_id).await?;

        let cleared = SqlitePlaylistRepository::clear_entries_in(&mut tx, playlist_id).await?;
        let added = append_in(&mut tx, playlist_id, entries, now).await?;
        debug!(cleared, added, "Entries replaced");

        self.finish_mutation(tx, playlist_id, now).await
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// Render a playlist as M3U.
    pub async fn export_m3u(&self, playlist_id: i64, options: &M3uOptions) -> Result<String> {
        let playlist = self.get_with_entries(playlist_id, None, None).await?;
        Ok(render_m3u(&playlist.entries, options))
    }

    /// Write the playlist as an M3U file into `export_dir` and hand it to
    /// `target`. Returns the written path.
    #[instrument(skip(self, target, options), fields(target = target.name()))]
    pub async fn sync_to_target(
        &self,
        playlist_id: i64,
        target: &dyn PlaylistSyncTarget,
        export_dir: &Path,
        options: &M3uOptions,
    ) -> Result<PathBuf> {
        let playlist = self.get_with_entries(playlist_id, None, None).await?;
        let body = render_m3u(&playlist.entries, options);

        tokio::fs::create_dir_all(export_dir).await?;
        let path = export_dir.join(playlist_file_name(&playlist.playlist.name));
        tokio::fs::write(&path, body).await?;

        target
            .push(&path, &playlist.playlist.name)
            .await
            .map_err(|source| {
                warn!(error = %source, "Sync target rejected playlist");
                PlaylistError::SyncTarget {
                    target: target.name().to_string(),
                    source,
                }
            })?;

        info!(path = %path.display(), "Playlist synced");
        Ok(path)
    }

    async fn finish_mutation(
        &self,
        mut tx: sqlx::Transaction<'_, sqlx::Sqlite>,
        playlist_id: i64,
        now: i64,
    ) -> Result<PlaylistSummary> {
        SqlitePlaylistRepository::touch_in(&mut tx, playlist_id, now).await?;
        let summary = summary_in(&mut tx, playlist_id).await?;
        tx.commit().await?;

        self.emit(PlaylistEvent::EntriesChanged {
            playlist_id,
            entry_count: summary.entry_count,
        });
        Ok(summary)
    }

    fn emit(&self, event: PlaylistEvent) {
        self.event_bus.emit(CoreEvent::Playlist(event)).ok();
    }
}

/// Append `entries` after closing any position gaps. Returns how many were
/// stored.
async fn append_in(
    conn: &mut SqliteConnection,
    playlist_id: i64,
    entries: &[EntryRef],
    now: i64,
) -> Result<usize> {
    let rows = SqlitePlaylistRepository::entry_rows_in(conn, playlist_id).await?;
    if !ordering::is_dense(&rows) {
        let order: Vec<i64> = rows.iter().map(|r| r.id).collect();
        SqlitePlaylistRepository::rewrite_positions_in(conn, playlist_id, &order).await?;
    }

    let mut position = rows.len() as i64;
    let mut added = 0;
    for entry in entries {
        if let Some(target) = target_in(conn, playlist_id, entry, now).await? {
            SqlitePlaylistRepository::insert_entry_in(conn, playlist_id, position, &target).await?;
            position += 1;
            added += 1;
        }
    }

    Ok(added)
}

/// Resolve a caller reference to the identity stored on the entry,
/// creating registry rows as needed. `None` means "skip this entry".
async fn target_in(
    conn: &mut SqliteConnection,
    playlist_id: i64,
    entry: &EntryRef,
    now: i64,
) -> Result<Option<EntryTarget>> {
    let target = match entry {
        EntryRef::MusicFile { music_file_id } => {
            if !SqliteMusicFileRepository::exists_in(conn, *music_file_id).await? {
                warn!(playlist_id, music_file_id, "Skipping entry for unknown music file");
                return Ok(None);
            }
            EntryTarget::MusicFile { id: *music_file_id }
        }
        EntryRef::RemoteTrack { url, details } => {
            let track = SqliteRemoteTrackRepository::find_or_create_in(conn, url, details, now).await?;
            EntryTarget::RemoteTrack { id: track.id }
        }
        EntryRef::NestedPlaylist {
            playlist_id: nested_id,
        } => {
            if SqlitePlaylistRepository::find_by_id_in(conn, *nested_id)
                .await?
                .is_none()
            {
                warn!(playlist_id, nested_id, "Skipping entry for unknown playlist");
                return Ok(None);
            }
            EntryTarget::NestedPlaylist { id: *nested_id }
        }
        EntryRef::RequestedTrack {
            artist,
            title,
            details,
        } => {
            let track =
                SqliteRequestedTrackRepository::find_or_create_in(conn, artist, title, details, now)
                    .await?;
            EntryTarget::RequestedTrack { id: track.id }
        }
        EntryRef::Album { artist, title } => EntryTarget::Album {
            artist: artist.trim().to_string(),
            title: title.trim().to_string(),
        },
    };

    Ok(Some(target))
}

/// Shape checks that need no database access.
fn validate_ref(playlist_id: Option<i64>, entry: &EntryRef) -> Result<()> {
    let blank = |value: &str| value.trim().is_empty();

    match entry {
        EntryRef::NestedPlaylist { playlist_id: nested } if Some(*nested) == playlist_id => Err(
            PlaylistError::validation(format!("playlist {} cannot contain itself", nested)),
        ),
        EntryRef::RemoteTrack { url, .. } if blank(url) => {
            Err(PlaylistError::validation("remote track url is blank"))
        }
        EntryRef::RequestedTrack { artist, title, .. } if blank(artist) || blank(title) => Err(
            PlaylistError::validation("requested track needs both artist and title"),
        ),
        EntryRef::Album { artist, title } if blank(artist) || blank(title) => {
            Err(PlaylistError::validation("album needs both artist and title"))
        }
        _ => Ok(()),
    }
}

async fn summary_in(conn: &mut SqliteConnection, playlist_id: i64) -> Result<PlaylistSummary> {
    SqlitePlaylistRepository::summary_in(conn, playlist_id)
        .await?
        .ok_or_else(|| LibraryError::not_found("Playlist", playlist_id).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::models::TrackDetails;

    #[test]
    fn test_validate_ref_rejects_self_nesting_and_blank_keys() {
        assert!(validate_ref(Some(4), &EntryRef::nested_playlist(4)).is_err());
        assert!(validate_ref(Some(4), &EntryRef::nested_playlist(5)).is_ok());
        assert!(validate_ref(None, &EntryRef::nested_playlist(4)).is_ok());

        assert!(validate_ref(None, &EntryRef::remote_track("  ", TrackDetails::default())).is_err());
        assert!(validate_ref(None, &EntryRef::requested_track("Artist", "")).is_err());
        assert!(validate_ref(None, &EntryRef::album("", "Dummy")).is_err());
        assert!(validate_ref(None, &EntryRef::album("Portishead", "Dummy")).is_ok());
    }
}
