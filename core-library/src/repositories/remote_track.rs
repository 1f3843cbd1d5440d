//! Registry of remote tracks, deduplicated by canonical URL

use crate::error::{LibraryError, Result};
use crate::models::{GenreParent, RemoteTrack, TrackDetails};
use crate::repositories::genres::{load_genres, replace_genres};
use async_trait::async_trait;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};

const SELECT_REMOTE_TRACK: &str = "SELECT id, url, title, artist, album_artist, album, year, \
     length, publisher, created_at FROM remote_tracks";

#[async_trait]
pub trait RemoteTrackRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<RemoteTrack>>;

    async fn find_by_url(&self, url: &str) -> Result<Option<RemoteTrack>>;

    /// Return the existing row for `url`, or create one from `details`.
    ///
    /// An existing row keeps its stored fields; `details` only seeds new rows.
    async fn find_or_create(&self, url: &str, details: &TrackDetails, now: i64)
        -> Result<RemoteTrack>;
}

pub struct SqliteRemoteTrackRepository {
    pool: SqlitePool,
}

impl SqliteRemoteTrackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id_in(conn: &mut SqliteConnection, id: i64) -> Result<Option<RemoteTrack>> {
        let track = query_as::<_, RemoteTrack>(&format!("{} WHERE id = ?", SELECT_REMOTE_TRACK))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Self::attach_genres(conn, track).await
    }

    pub async fn find_by_url_in(
        conn: &mut SqliteConnection,
        url: &str,
    ) -> Result<Option<RemoteTrack>> {
        let track = query_as::<_, RemoteTrack>(&format!("{} WHERE url = ?", SELECT_REMOTE_TRACK))
            .bind(url)
            .fetch_optional(&mut *conn)
            .await?;
        Self::attach_genres(conn, track).await
    }

    pub async fn find_or_create_in(
        conn: &mut SqliteConnection,
        url: &str,
        details: &TrackDetails,
        now: i64,
    ) -> Result<RemoteTrack> {
        let url = url.trim();
        if url.is_empty() {
            return Err(LibraryError::invalid("url", "Remote track URL cannot be empty"));
        }

        let inserted = query(
            r#"
            INSERT INTO remote_tracks (
                url, title, artist, album_artist, album, year, length, publisher, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(url)
        .bind(&details.title)
        .bind(&details.artist)
        .bind(&details.album_artist)
        .bind(&details.album)
        .bind(details.year)
        .bind(details.length)
        .bind(&details.publisher)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if inserted.rows_affected() > 0 {
            replace_genres(
                conn,
                GenreParent::RemoteTrack,
                inserted.last_insert_rowid(),
                &details.genres,
            )
            .await?;
        }

        Self::find_by_url_in(conn, url)
            .await?
            .ok_or_else(|| LibraryError::not_found("RemoteTrack", url))
    }

    async fn attach_genres(
        conn: &mut SqliteConnection,
        track: Option<RemoteTrack>,
    ) -> Result<Option<RemoteTrack>> {
        let Some(mut track) = track else {
            return Ok(None);
        };
        let mut genres = load_genres(conn, GenreParent::RemoteTrack, &[track.id]).await?;
        track.genres = genres.remove(&track.id).unwrap_or_default();
        Ok(Some(track))
    }
}

#[async_trait]
impl RemoteTrackRepository for SqliteRemoteTrackRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<RemoteTrack>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_by_id_in(&mut conn, id).await
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<RemoteTrack>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_by_url_in(&mut conn, url).await
    }

    async fn find_or_create(
        &self,
        url: &str,
        details: &TrackDetails,
        now: i64,
    ) -> Result<RemoteTrack> {
        let mut tx = self.pool.begin().await?;
        let track = Self::find_or_create_in(&mut tx, url, details, now).await?;
        tx.commit().await?;
        Ok(track)
    }
}
