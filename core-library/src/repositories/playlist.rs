//! Playlist and entry persistence
//!
//! Entry mutations are composed by the playlist engine inside one transaction,
//! so the entry-level operations are exposed as connection-scoped functions on
//! [`SqlitePlaylistRepository`]. The trait covers the standalone playlist
//! operations.

use crate::error::{is_unique_violation, LibraryError, Result};
use crate::models::{EntryTarget, Playlist, PlaylistEntryRow, PlaylistSummary};
use async_trait::async_trait;
use sqlx::{query, query_as, query_scalar, SqliteConnection, SqlitePool};

const SELECT_ENTRY_ROW: &str = "SELECT id, playlist_id, position, entry_kind, music_file_id, \
     remote_track_id, nested_playlist_id, requested_track_id, album_artist, album_title \
     FROM playlist_entries";

const SELECT_SUMMARY: &str = "SELECT p.id, p.name, \
     (SELECT COUNT(*) FROM playlist_entries e WHERE e.playlist_id = p.id) AS entry_count \
     FROM playlists p";

/// Playlist repository interface for data access operations
#[async_trait]
pub trait PlaylistRepository: Send + Sync {
    /// Find a playlist by its ID
    ///
    /// # Returns
    /// - `Ok(Some(playlist))` if found
    /// - `Ok(None)` if not found
    async fn find_by_id(&self, id: i64) -> Result<Option<Playlist>>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Playlist>>;

    /// Every playlist with its entry count, ordered by name
    async fn list(&self) -> Result<Vec<PlaylistSummary>>;

    /// Count total playlists
    async fn count(&self) -> Result<i64>;

    /// Change a playlist's name
    ///
    /// # Errors
    /// Returns error if:
    /// - Playlist does not exist
    /// - Name is blank or already taken
    async fn rename(&self, id: i64, name: &str, now: i64) -> Result<Playlist>;

    /// Delete a playlist and its own entries. Entries of other playlists that
    /// nest this one are left behind as orphans.
    ///
    /// # Returns
    /// - `Ok(true)` if playlist was deleted
    /// - `Ok(false)` if playlist was not found
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLite implementation of PlaylistRepository
pub struct SqlitePlaylistRepository {
    pool: SqlitePool,
}

impl SqlitePlaylistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Playlist rows
    // =========================================================================

    /// Insert a new, empty playlist.
    ///
    /// # Errors
    /// - `InvalidInput` if the name is blank or too long
    /// - `Duplicate` if the name is taken
    pub async fn insert_in(conn: &mut SqliteConnection, name: &str, now: i64) -> Result<Playlist> {
        Playlist::validate_name(name).map_err(|e| LibraryError::invalid("name", e))?;

        let inserted = query("INSERT INTO playlists (name, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await;

        match inserted {
            Ok(result) => Ok(Playlist {
                id: result.last_insert_rowid(),
                name: name.to_string(),
                created_at: now,
                updated_at: now,
            }),
            Err(e) if is_unique_violation(&e) => Err(LibraryError::Duplicate {
                entity_type: "Playlist".to_string(),
                key: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_id_in(conn: &mut SqliteConnection, id: i64) -> Result<Option<Playlist>> {
        let playlist = query_as::<_, Playlist>(
            "SELECT id, name, created_at, updated_at FROM playlists WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(playlist)
    }

    /// Load a playlist or fail with `NotFound`.
    pub async fn require_in(conn: &mut SqliteConnection, id: i64) -> Result<Playlist> {
        Self::find_by_id_in(conn, id)
            .await?
            .ok_or_else(|| LibraryError::not_found("Playlist", id))
    }

    pub async fn summary_in(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<PlaylistSummary>> {
        let summary = query_as::<_, PlaylistSummary>(&format!("{} WHERE p.id = ?", SELECT_SUMMARY))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(summary)
    }

    /// Bump `updated_at` after an entry mutation.
    pub async fn touch_in(conn: &mut SqliteConnection, id: i64, now: i64) -> Result<()> {
        query("UPDATE playlists SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Entry rows
    // =========================================================================

    /// All entry rows of a playlist in position order.
    pub async fn entry_rows_in(
        conn: &mut SqliteConnection,
        playlist_id: i64,
    ) -> Result<Vec<PlaylistEntryRow>> {
        let rows = query_as::<_, PlaylistEntryRow>(&format!(
            "{} WHERE playlist_id = ? ORDER BY position",
            SELECT_ENTRY_ROW
        ))
        .bind(playlist_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    /// One window of entry rows in position order. `limit` of `None` means
    /// everything from `offset` on.
    pub async fn entry_rows_page_in(
        conn: &mut SqliteConnection,
        playlist_id: i64,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<PlaylistEntryRow>> {
        // SQLite treats a negative LIMIT as unbounded.
        let rows = query_as::<_, PlaylistEntryRow>(&format!(
            "{} WHERE playlist_id = ? ORDER BY position LIMIT ? OFFSET ?",
            SELECT_ENTRY_ROW
        ))
        .bind(playlist_id)
        .bind(limit.unwrap_or(-1))
        .bind(offset.max(0))
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    pub async fn entry_count_in(conn: &mut SqliteConnection, playlist_id: i64) -> Result<i64> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM playlist_entries WHERE playlist_id = ?")
            .bind(playlist_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count)
    }

    /// Store one entry at `position`, returning its row id.
    pub async fn insert_entry_in(
        conn: &mut SqliteConnection,
        playlist_id: i64,
        position: i64,
        target: &EntryTarget,
    ) -> Result<i64> {
        let (mut music, mut remote, mut nested, mut requested) = (None, None, None, None);
        let (mut album_artist, mut album_title) = (None, None);
        match target {
            EntryTarget::MusicFile { id } => music = Some(*id),
            EntryTarget::RemoteTrack { id } => remote = Some(*id),
            EntryTarget::NestedPlaylist { id } => nested = Some(*id),
            EntryTarget::RequestedTrack { id } => requested = Some(*id),
            EntryTarget::Album { artist, title } => {
                album_artist = Some(artist.as_str());
                album_title = Some(title.as_str());
            }
        }

        let id = query(
            r#"
            INSERT INTO playlist_entries (
                playlist_id, position, entry_kind, music_file_id, remote_track_id,
                nested_playlist_id, requested_track_id, album_artist, album_title
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(playlist_id)
        .bind(position)
        .bind(target.kind().as_str())
        .bind(music)
        .bind(remote)
        .bind(nested)
        .bind(requested)
        .bind(album_artist)
        .bind(album_title)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        Ok(id)
    }

    pub async fn delete_entries_in(conn: &mut SqliteConnection, entry_ids: &[i64]) -> Result<u64> {
        let mut deleted = 0;
        for id in entry_ids {
            deleted += query("DELETE FROM playlist_entries WHERE id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?
                .rows_affected();
        }
        Ok(deleted)
    }

    pub async fn clear_entries_in(conn: &mut SqliteConnection, playlist_id: i64) -> Result<u64> {
        let result = query("DELETE FROM playlist_entries WHERE playlist_id = ?")
            .bind(playlist_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Give the listed entries positions `0..n` in the given order.
    ///
    /// Positions are first moved into the negative range so the
    /// `(playlist_id, position)` uniqueness holds at every step.
    pub async fn rewrite_positions_in(
        conn: &mut SqliteConnection,
        playlist_id: i64,
        ordered_entry_ids: &[i64],
    ) -> Result<()> {
        query("UPDATE playlist_entries SET position = -1 - position WHERE playlist_id = ?")
            .bind(playlist_id)
            .execute(&mut *conn)
            .await?;

        for (position, id) in ordered_entry_ids.iter().enumerate() {
            query("UPDATE playlist_entries SET position = ? WHERE id = ? AND playlist_id = ?")
                .bind(position as i64)
                .bind(id)
                .bind(playlist_id)
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl PlaylistRepository for SqlitePlaylistRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Playlist>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_by_id_in(&mut conn, id).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Playlist>> {
        let playlist = query_as::<_, Playlist>(
            "SELECT id, name, created_at, updated_at FROM playlists WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(playlist)
    }

    async fn list(&self) -> Result<Vec<PlaylistSummary>> {
        let playlists = query_as::<_, PlaylistSummary>(&format!(
            "{} ORDER BY p.name COLLATE NOCASE, p.id",
            SELECT_SUMMARY
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(playlists)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM playlists")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn rename(&self, id: i64, name: &str, now: i64) -> Result<Playlist> {
        Playlist::validate_name(name).map_err(|e| LibraryError::invalid("name", e))?;

        let mut conn = self.pool.acquire().await?;
        let updated = query("UPDATE playlists SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await;

        match updated {
            Ok(result) if result.rows_affected() == 0 => {
                Err(LibraryError::not_found("Playlist", id))
            }
            Ok(_) => Self::require_in(&mut conn, id).await,
            Err(e) if is_unique_violation(&e) => Err(LibraryError::Duplicate {
                entity_type: "Playlist".to_string(),
                key: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = query("DELETE FROM playlists WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
