//! Catalog repository: music files keyed by path

use crate::error::{LibraryError, Result};
use crate::models::{
    fold_case, fold_case_opt, GenreParent, LibraryStats, MusicFile, NewMusicFile, UpsertOutcome,
};
use crate::repositories::genres::{delete_genres, load_genres, replace_genres};
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use sqlx::{query, query_as, query_scalar, SqliteConnection, SqlitePool};
use tracing::debug;

const SELECT_MUSIC_FILE: &str = "SELECT id, path, title, artist, album_artist, album, year, \
     length, publisher, kind, last_scanned, missing FROM music_files";

/// Music file repository interface
#[async_trait]
pub trait MusicFileRepository: Send + Sync {
    /// Find a music file by its surrogate id
    async fn find_by_id(&self, id: i64) -> Result<Option<MusicFile>>;

    /// Find a music file by its path
    async fn find_by_path(&self, path: &str) -> Result<Option<MusicFile>>;

    /// Insert a new file or overwrite every descriptive field of an existing
    /// one, clearing `missing` and stamping `last_scanned`.
    ///
    /// The genre set is replaced, not merged.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the input fails validation.
    async fn upsert(&self, file: &NewMusicFile, scanned_at: i64) -> Result<UpsertOutcome>;

    /// Flag a file as missing. Only `missing` and `last_scanned` change.
    ///
    /// # Errors
    /// Returns `NotFound` if no row has this id.
    async fn mark_missing(&self, id: i64, at: i64) -> Result<()>;

    /// `(id, path)` of every file under `root` that is not flagged missing
    async fn present_under(&self, root: &str) -> Result<Vec<(i64, String)>>;

    /// Page through the catalog in id order
    async fn list(&self, request: PageRequest) -> Result<Page<MusicFile>>;

    /// Hard-delete one file and its genres. Playlist entries that point at it
    /// become orphaned.
    ///
    /// # Returns
    /// - `Ok(true)` if a row was deleted
    /// - `Ok(false)` if no row had this id
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Hard-delete every file flagged missing, returning how many were removed
    async fn purge_missing(&self) -> Result<u64>;

    /// Catalog totals
    async fn stats(&self) -> Result<LibraryStats>;

    /// For each `(artist, title)` pair, the first present file matching both
    /// case-insensitively
    async fn find_locals(&self, wanted: &[(String, String)]) -> Result<Vec<Option<MusicFile>>>;

    /// Files of one album, matched on album artist (falling back to artist)
    /// and album title, ordered by path
    async fn album_tracks(&self, artist: &str, album: &str) -> Result<Vec<MusicFile>>;
}

/// SQLite implementation of [`MusicFileRepository`]
pub struct SqliteMusicFileRepository {
    pool: SqlitePool,
}

impl SqliteMusicFileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up one file on an existing connection or transaction.
    pub async fn find_by_id_in(conn: &mut SqliteConnection, id: i64) -> Result<Option<MusicFile>> {
        let file = query_as::<_, MusicFile>(&format!("{} WHERE id = ?", SELECT_MUSIC_FILE))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match file {
            Some(file) => Ok(Self::with_genres(conn, vec![file]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Whether a file with this id exists, without loading it.
    pub async fn exists_in(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
        let found: Option<i64> = query_scalar("SELECT id FROM music_files WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(found.is_some())
    }

    pub async fn album_tracks_in(
        conn: &mut SqliteConnection,
        artist: &str,
        album: &str,
    ) -> Result<Vec<MusicFile>> {
        let files = query_as::<_, MusicFile>(&format!(
            "{} WHERE album_key = ? \
             AND COALESCE(album_artist_key, artist_key) = ? ORDER BY path",
            SELECT_MUSIC_FILE
        ))
        .bind(fold_case(album))
        .bind(fold_case(artist))
        .fetch_all(&mut *conn)
        .await?;

        Self::with_genres(conn, files).await
    }

    /// Attach genre sets to already loaded rows.
    pub(crate) async fn with_genres(
        conn: &mut SqliteConnection,
        mut files: Vec<MusicFile>,
    ) -> Result<Vec<MusicFile>> {
        let ids: Vec<i64> = files.iter().map(|f| f.id).collect();
        let mut genres = load_genres(conn, GenreParent::MusicFile, &ids).await?;
        for file in &mut files {
            file.genres = genres.remove(&file.id).unwrap_or_default();
        }
        Ok(files)
    }
}

#[async_trait]
impl MusicFileRepository for SqliteMusicFileRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<MusicFile>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_by_id_in(&mut conn, id).await
    }

    async fn find_by_path(&self, path: &str) -> Result<Option<MusicFile>> {
        let mut conn = self.pool.acquire().await?;
        let file = query_as::<_, MusicFile>(&format!("{} WHERE path = ?", SELECT_MUSIC_FILE))
            .bind(path)
            .fetch_optional(&mut *conn)
            .await?;

        match file {
            Some(file) => Ok(Self::with_genres(&mut conn, vec![file]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn upsert(&self, file: &NewMusicFile, scanned_at: i64) -> Result<UpsertOutcome> {
        file.validate()
            .map_err(|e| LibraryError::invalid("MusicFile", e))?;

        let details = &file.details;
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = query_scalar("SELECT id FROM music_files WHERE path = ?")
            .bind(&file.path)
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = match existing {
            Some(id) => {
                query(
                    r#"
                    UPDATE music_files
                    SET title = ?, artist = ?, album_artist = ?, album = ?, year = ?,
                        length = ?, publisher = ?, kind = ?, last_scanned = ?, missing = 0,
                        title_key = ?, artist_key = ?, album_artist_key = ?, album_key = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&details.title)
                .bind(&details.artist)
                .bind(&details.album_artist)
                .bind(&details.album)
                .bind(details.year)
                .bind(details.length)
                .bind(&details.publisher)
                .bind(&file.kind)
                .bind(scanned_at)
                .bind(fold_case_opt(details.title.as_deref()))
                .bind(fold_case_opt(details.artist.as_deref()))
                .bind(fold_case_opt(details.album_artist.as_deref()))
                .bind(fold_case_opt(details.album.as_deref()))
                .bind(id)
                .execute(&mut *tx)
                .await?;
                UpsertOutcome::Updated(id)
            }
            None => {
                let id = query(
                    r#"
                    INSERT INTO music_files (
                        path, title, artist, album_artist, album, year,
                        length, publisher, kind, last_scanned, missing,
                        title_key, artist_key, album_artist_key, album_key
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
                    "#,
                )
                .bind(&file.path)
                .bind(&details.title)
                .bind(&details.artist)
                .bind(&details.album_artist)
                .bind(&details.album)
                .bind(details.year)
                .bind(details.length)
                .bind(&details.publisher)
                .bind(&file.kind)
                .bind(scanned_at)
                .bind(fold_case_opt(details.title.as_deref()))
                .bind(fold_case_opt(details.artist.as_deref()))
                .bind(fold_case_opt(details.album_artist.as_deref()))
                .bind(fold_case_opt(details.album.as_deref()))
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();
                UpsertOutcome::Inserted(id)
            }
        };

        replace_genres(&mut tx, GenreParent::MusicFile, outcome.id(), &details.genres).await?;
        tx.commit().await?;

        debug!(path = %file.path, ?outcome, "Catalog row written");
        Ok(outcome)
    }

    async fn mark_missing(&self, id: i64, at: i64) -> Result<()> {
        let result = query("UPDATE music_files SET missing = 1, last_scanned = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("MusicFile", id));
        }

        Ok(())
    }

    async fn present_under(&self, root: &str) -> Result<Vec<(i64, String)>> {
        let rows = query_as::<_, (i64, String)>(
            "SELECT id, path FROM music_files \
             WHERE missing = 0 AND substr(path, 1, length(?)) = ? ORDER BY id",
        )
        .bind(root)
        .bind(root)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list(&self, request: PageRequest) -> Result<Page<MusicFile>> {
        let mut conn = self.pool.acquire().await?;

        let total: i64 = query_scalar("SELECT COUNT(*) FROM music_files")
            .fetch_one(&mut *conn)
            .await?;

        let files = query_as::<_, MusicFile>(&format!(
            "{} ORDER BY id LIMIT ? OFFSET ?",
            SELECT_MUSIC_FILE
        ))
        .bind(request.limit())
        .bind(request.offset())
        .fetch_all(&mut *conn)
        .await?;

        let files = Self::with_genres(&mut conn, files).await?;
        Ok(Page::new(files, total as u64, request))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        delete_genres(&mut tx, GenreParent::MusicFile, id).await?;
        let result = query("DELETE FROM music_files WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_missing(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        query(
            "DELETE FROM track_genres WHERE parent_kind = 'music_file' \
             AND parent_id IN (SELECT id FROM music_files WHERE missing = 1)",
        )
        .execute(&mut *tx)
        .await?;

        let result = query("DELETE FROM music_files WHERE missing = 1")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<LibraryStats> {
        let stats = query_as::<_, LibraryStats>(
            r#"
            SELECT
                COUNT(*) AS total_files,
                COALESCE(SUM(missing), 0) AS missing_files,
                COUNT(DISTINCT artist_key) AS artists,
                COUNT(DISTINCT album_key) AS albums,
                COALESCE(SUM(length), 0) AS total_length
            FROM music_files
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    async fn find_locals(&self, wanted: &[(String, String)]) -> Result<Vec<Option<MusicFile>>> {
        let mut conn = self.pool.acquire().await?;
        let mut found = Vec::with_capacity(wanted.len());

        for (artist, title) in wanted {
            let file = query_as::<_, MusicFile>(&format!(
                "{} WHERE missing = 0 AND artist_key = ? AND title_key = ? ORDER BY id LIMIT 1",
                SELECT_MUSIC_FILE
            ))
            .bind(fold_case(artist))
            .bind(fold_case(title))
            .fetch_optional(&mut *conn)
            .await?;

            found.push(match file {
                Some(file) => Self::with_genres(&mut conn, vec![file]).await?.pop(),
                None => None,
            });
        }

        Ok(found)
    }

    async fn album_tracks(&self, artist: &str, album: &str) -> Result<Vec<MusicFile>> {
        let mut conn = self.pool.acquire().await?;
        Self::album_tracks_in(&mut conn, artist, album).await
    }
}
